//! Collaborator traits for publishing offers and observing claim actions

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::PathBuf;

use trove_core::{CommunityId, ParticipantId, Result};

/// What a participant did to a published offer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    /// Intent to claim the offer
    Claim,
    /// Retraction of a previous claim action
    Unclaim,
}

/// One participant action observed on a published offer.
///
/// The platform may deliver duplicates and may reorder events; consumers
/// are responsible for debouncing and idempotence.
#[derive(Debug, Clone)]
pub struct ActionEvent {
    pub participant_id: ParticipantId,
    pub display_name: String,
    pub kind: ActionKind,
    pub timestamp: DateTime<Utc>,
}

impl ActionEvent {
    pub fn claim(participant_id: impl Into<ParticipantId>, display_name: impl Into<String>) -> Self {
        Self {
            participant_id: participant_id.into(),
            display_name: display_name.into(),
            kind: ActionKind::Claim,
            timestamp: Utc::now(),
        }
    }

    pub fn unclaim(
        participant_id: impl Into<ParticipantId>,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            participant_id: participant_id.into(),
            display_name: display_name.into(),
            kind: ActionKind::Unclaim,
            timestamp: Utc::now(),
        }
    }
}

/// Content of a published offer message
#[derive(Debug, Clone)]
pub struct OfferContent {
    pub text: String,
    /// Image file attached to the message, if any
    pub attachment: Option<PathBuf>,
}

impl OfferContent {
    pub fn text_only(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            attachment: None,
        }
    }

    pub fn with_attachment(text: impl Into<String>, attachment: impl Into<PathBuf>) -> Self {
        Self {
            text: text.into(),
            attachment: Some(attachment.into()),
        }
    }
}

/// Handle to one published offer message.
///
/// Dropping the handle abandons the offer without retracting it; callers
/// that want the message gone must call [`OfferHandle::retract`].
#[async_trait]
pub trait OfferHandle: Send {
    /// Rewrite the offer's visible text
    async fn edit(&mut self, text: &str) -> Result<()>;

    /// Delete the offer from the platform
    async fn retract(&mut self) -> Result<()>;

    /// Wait for the next participant action on this offer.
    ///
    /// Returns `None` once the underlying stream has terminated (the
    /// offer was retracted or the platform connection went away).
    async fn next_action(&mut self) -> Option<ActionEvent>;
}

/// Connection to the chat platform, scoped to what the reward core needs
#[async_trait]
pub trait ChatGateway: Send + Sync {
    /// Publish an offer to the first allowed channel of a community
    async fn publish(
        &self,
        community_id: &str,
        channels: &[String],
        offer: OfferContent,
    ) -> Result<Box<dyn OfferHandle>>;

    /// Current member ids of a community, for ledger reconciliation
    async fn roster(&self, community_id: &str) -> Result<Vec<ParticipantId>>;

    /// Communities the bot is currently joined to
    async fn communities(&self) -> Result<Vec<CommunityId>>;
}
