//! Reward drop lifecycle models

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::content::ContentAsset;
use crate::types::{CommunityId, ParticipantId, Points};

/// Kind of reward drop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DropKind {
    /// Free coin, first claimant wins one point
    Coin,
    /// Purchasable image, costs a random number of points
    Toy,
}

impl fmt::Display for DropKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropKind::Coin => write!(f, "coin"),
            DropKind::Toy => write!(f, "toy"),
        }
    }
}

/// Lifecycle state of a drop.
///
/// Transitions Open -> Resolving -> Closed exactly once. Resolving covers
/// the span between winner selection and the completed rewrite of the
/// published message, which is itself an interruptible operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropState {
    Open,
    Resolving,
    Closed,
}

/// One published, time-boxed reward offer
#[derive(Debug, Clone)]
pub struct RewardDrop {
    pub id: u64,
    pub community_id: CommunityId,
    pub kind: DropKind,
    /// Claim cost in points (always 0 for coin drops)
    pub cost: Points,
    /// Image attached to toy drops
    pub asset: Option<ContentAsset>,
    pub opened_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub state: DropState,
}

impl RewardDrop {
    /// Create an open coin drop with the given claim window
    pub fn coin(id: u64, community_id: impl Into<CommunityId>, claim_window: Duration) -> Self {
        let now = Utc::now();
        Self {
            id,
            community_id: community_id.into(),
            kind: DropKind::Coin,
            cost: 0,
            asset: None,
            opened_at: now,
            expires_at: now + claim_window,
            state: DropState::Open,
        }
    }

    /// Create an open toy drop for the given asset and cost
    pub fn toy(
        id: u64,
        community_id: impl Into<CommunityId>,
        cost: Points,
        asset: ContentAsset,
        claim_window: Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            community_id: community_id.into(),
            kind: DropKind::Toy,
            cost,
            asset: Some(asset),
            opened_at: now,
            expires_at: now + claim_window,
            state: DropState::Open,
        }
    }

    /// Message text for the open offer
    pub fn open_text(&self) -> String {
        match self.kind {
            DropKind::Coin => "Coin available - react to collect 1 coin!".to_string(),
            DropKind::Toy => format!("Claim prize now - {} coins", self.cost),
        }
    }

    /// Message text after a successful claim
    pub fn claimed_text(&self, display_name: &str, new_balance: Points) -> String {
        match self.kind {
            DropKind::Coin => format!(
                "{} collected the coin. Better luck next time, everyone! {} now has {} points.",
                display_name, display_name, new_balance
            ),
            DropKind::Toy => format!(
                "{} claimed the toy. Balance: {} points.",
                display_name, new_balance
            ),
        }
    }
}

/// The recorded winner of a resolved drop
#[derive(Debug, Clone)]
pub struct Winner {
    pub participant_id: ParticipantId,
    pub display_name: String,
}

/// Terminal outcome of one drop lifecycle
#[derive(Debug, Clone)]
pub enum DropOutcome {
    /// A participant won the drop; `refunded` is set when the winner
    /// retracted their claim before the drop expired
    Claimed {
        winner: Winner,
        new_balance: Points,
        refunded: bool,
    },
    /// The claim window elapsed with no winner
    Expired,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_text_embeds_toy_cost() {
        let asset = ContentAsset::new("bear.png", "/pool/bear.png");
        let drop = RewardDrop::toy(1, "g1", 7, asset, Duration::seconds(60));
        assert_eq!(drop.open_text(), "Claim prize now - 7 coins");
    }

    #[test]
    fn test_coin_drop_is_free_and_open() {
        let drop = RewardDrop::coin(2, "g1", Duration::seconds(60));
        assert_eq!(drop.cost, 0);
        assert_eq!(drop.state, DropState::Open);
        assert!(drop.expires_at > drop.opened_at);
    }
}
