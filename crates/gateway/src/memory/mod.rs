//! In-memory gateway for tests and local dry runs
//!
//! Mirrors the externally visible behavior of a real platform connection:
//! published offers hold mutable text, can be retracted, and deliver a
//! stream of participant actions. Tests drive the stream through an
//! [`OfferProbe`].

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use trove_core::{CommunityId, Error, ParticipantId, Result};

use crate::chat::{ActionEvent, ChatGateway, OfferContent, OfferHandle};

/// Externally visible state of one published offer
#[derive(Debug, Default, Clone)]
pub struct OfferRecord {
    pub community_id: CommunityId,
    pub channel: Option<String>,
    pub text: String,
    pub attachment: Option<PathBuf>,
    /// Every text the offer has been edited to, in order
    pub edits: Vec<String>,
    pub retracted: bool,
}

/// Test-side handle to a published memory offer.
///
/// Injects actions into the offer's stream and inspects its visible
/// state. The stream terminates when every probe clone is dropped or
/// when the offer is retracted.
#[derive(Clone)]
pub struct OfferProbe {
    actions: mpsc::UnboundedSender<ActionEvent>,
    record: Arc<Mutex<OfferRecord>>,
}

impl OfferProbe {
    /// Deliver an action to the offer's stream
    pub fn send(&self, action: ActionEvent) {
        let _ = self.actions.send(action);
    }

    pub fn text(&self) -> String {
        self.record.lock().map(|r| r.text.clone()).unwrap_or_default()
    }

    pub fn retracted(&self) -> bool {
        self.record.lock().map(|r| r.retracted).unwrap_or(false)
    }

    pub fn edits(&self) -> Vec<String> {
        self.record.lock().map(|r| r.edits.clone()).unwrap_or_default()
    }

    pub fn record(&self) -> OfferRecord {
        self.record.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

/// One published offer held in memory
pub struct MemoryOffer {
    record: Arc<Mutex<OfferRecord>>,
    actions: mpsc::UnboundedReceiver<ActionEvent>,
}

impl MemoryOffer {
    /// Open a standalone offer with the given text, returning the offer
    /// and the probe that feeds its action stream
    pub fn open(text: impl Into<String>) -> (Self, OfferProbe) {
        Self::open_record(OfferRecord {
            text: text.into(),
            ..OfferRecord::default()
        })
    }

    fn open_record(record: OfferRecord) -> (Self, OfferProbe) {
        let (tx, rx) = mpsc::unbounded_channel();
        let record = Arc::new(Mutex::new(record));
        let probe = OfferProbe {
            actions: tx,
            record: record.clone(),
        };
        (
            Self {
                record,
                actions: rx,
            },
            probe,
        )
    }
}

#[async_trait]
impl OfferHandle for MemoryOffer {
    async fn edit(&mut self, text: &str) -> Result<()> {
        let mut record = self
            .record
            .lock()
            .map_err(|e| Error::GatewayError(e.to_string()))?;
        if record.retracted {
            return Err(Error::GatewayError("edit of a retracted offer".to_string()));
        }
        record.text = text.to_string();
        record.edits.push(text.to_string());
        Ok(())
    }

    async fn retract(&mut self) -> Result<()> {
        let mut record = self
            .record
            .lock()
            .map_err(|e| Error::GatewayError(e.to_string()))?;
        record.retracted = true;
        drop(record);
        // terminate the action stream
        self.actions.close();
        Ok(())
    }

    async fn next_action(&mut self) -> Option<ActionEvent> {
        self.actions.recv().await
    }
}

/// In-memory [`ChatGateway`] recording every publish
#[derive(Default)]
pub struct MemoryGateway {
    rosters: Mutex<HashMap<CommunityId, Vec<ParticipantId>>>,
    published: Mutex<Vec<OfferProbe>>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_roster(&self, community_id: impl Into<CommunityId>, members: Vec<ParticipantId>) {
        if let Ok(mut rosters) = self.rosters.lock() {
            rosters.insert(community_id.into(), members);
        }
    }

    /// Probes for every offer published so far, in publish order
    pub fn published(&self) -> Vec<OfferProbe> {
        self.published.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn published_count(&self) -> usize {
        self.published.lock().map(|p| p.len()).unwrap_or(0)
    }
}

#[async_trait]
impl ChatGateway for MemoryGateway {
    async fn publish(
        &self,
        community_id: &str,
        channels: &[String],
        offer: OfferContent,
    ) -> Result<Box<dyn OfferHandle>> {
        let (memory_offer, probe) = MemoryOffer::open_record(OfferRecord {
            community_id: community_id.to_string(),
            channel: channels.first().cloned(),
            text: offer.text,
            attachment: offer.attachment,
            ..OfferRecord::default()
        });

        self.published
            .lock()
            .map_err(|e| Error::GatewayError(e.to_string()))?
            .push(probe);

        Ok(Box::new(memory_offer))
    }

    async fn roster(&self, community_id: &str) -> Result<Vec<ParticipantId>> {
        Ok(self
            .rosters
            .lock()
            .map_err(|e| Error::GatewayError(e.to_string()))?
            .get(community_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn communities(&self) -> Result<Vec<CommunityId>> {
        let rosters = self
            .rosters
            .lock()
            .map_err(|e| Error::GatewayError(e.to_string()))?;
        Ok(rosters.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::ActionKind;

    #[tokio::test]
    async fn test_edit_and_retract_are_visible_to_probe() {
        let (mut offer, probe) = MemoryOffer::open("hello");
        offer.edit("claimed").await.unwrap();
        assert_eq!(probe.text(), "claimed");
        assert_eq!(probe.edits(), vec!["claimed".to_string()]);

        offer.retract().await.unwrap();
        assert!(probe.retracted());
        assert!(offer.edit("again").await.is_err());
    }

    #[tokio::test]
    async fn test_action_stream_delivers_and_terminates() {
        let (mut offer, probe) = MemoryOffer::open("hello");
        probe.send(ActionEvent::claim("u1", "Ana"));

        let action = offer.next_action().await.unwrap();
        assert_eq!(action.participant_id, "u1");
        assert_eq!(action.kind, ActionKind::Claim);

        drop(probe);
        assert!(offer.next_action().await.is_none());
    }

    #[tokio::test]
    async fn test_gateway_records_publishes_and_rosters() {
        let gateway = MemoryGateway::new();
        gateway.set_roster("g1", vec!["u1".to_string(), "u2".to_string()]);

        let offer = gateway
            .publish(
                "g1",
                &["coin-collectors".to_string()],
                OfferContent::text_only("Coin available"),
            )
            .await
            .unwrap();
        drop(offer);

        assert_eq!(gateway.published_count(), 1);
        let record = gateway.published()[0].record();
        assert_eq!(record.community_id, "g1");
        assert_eq!(record.channel.as_deref(), Some("coin-collectors"));

        assert_eq!(gateway.roster("g1").await.unwrap().len(), 2);
        assert!(gateway.roster("missing").await.unwrap().is_empty());
    }
}
