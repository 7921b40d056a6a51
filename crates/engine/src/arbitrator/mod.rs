//! Claim arbitration for a single published drop
//!
//! One `ClaimArbitrator` exclusively owns one drop from Open to Closed.
//! Actions arrive as explicit messages from the offer's stream and are
//! processed strictly one at a time, so winner selection can never
//! interleave with another attempt on the same drop. The `DropState`
//! field is still checked before every side effect as the idempotence
//! backstop against duplicated or late notifications.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, error, info, warn};

use trove_core::{
    DropKind, DropOutcome, DropState, Error, ParticipantId, Points, RewardDrop, Winner,
};
use trove_gateway::{ActionEvent, ActionKind, OfferHandle};
use trove_persistence::{CollectionStore, PointLedger};

/// Per-drop arbitration settings
#[derive(Debug, Clone)]
pub struct ArbitratorSettings {
    /// Window during which repeated actions from one participant on
    /// this drop are coalesced
    pub debounce_interval: Duration,
    /// Whether the winner retracting their claim is refunded
    pub refund_on_retract: bool,
}

impl Default for ArbitratorSettings {
    fn default() -> Self {
        Self {
            debounce_interval: Duration::from_millis(5000),
            refund_on_retract: true,
        }
    }
}

/// Owns the lifecycle of one open drop under concurrent claim attempts
pub struct ClaimArbitrator {
    drop: RewardDrop,
    offer: Box<dyn OfferHandle>,
    ledger: Arc<PointLedger>,
    collections: Arc<CollectionStore>,
    settings: ArbitratorSettings,
    /// Last processed action per participant, for debouncing.
    /// Lives and dies with this drop.
    last_action: HashMap<ParticipantId, Instant>,
    winner: Option<Winner>,
    winner_balance: Points,
    refunded: bool,
}

impl ClaimArbitrator {
    pub fn new(
        drop: RewardDrop,
        offer: Box<dyn OfferHandle>,
        ledger: Arc<PointLedger>,
        collections: Arc<CollectionStore>,
        settings: ArbitratorSettings,
    ) -> Self {
        Self {
            drop,
            offer,
            ledger,
            collections,
            settings,
            last_action: HashMap::new(),
            winner: None,
            winner_balance: 0,
            refunded: false,
        }
    }

    /// Drive the drop until it expires or (with refunds disabled) until
    /// it is claimed, then retract the published message and report the
    /// outcome. With refunds enabled the arbitrator keeps consuming the
    /// action stream after a claim so a winner's retraction can still be
    /// observed within the claim window.
    pub async fn run(mut self) -> DropOutcome {
        let remaining = (self.drop.expires_at - Utc::now())
            .to_std()
            .unwrap_or_default();
        let deadline = tokio::time::Instant::now() + remaining;

        loop {
            // biased: drain actions already delivered before declaring
            // expiry; genuinely late attempts are discarded by the
            // wall-clock guard in handle_claim
            tokio::select! {
                biased;
                action = self.offer.next_action() => {
                    match action {
                        Some(action) => self.handle_action(action).await,
                        None => {
                            debug!("Action stream ended for drop {}", self.drop.id);
                            break;
                        }
                    }
                }
                _ = tokio::time::sleep_until(deadline) => {
                    debug!("Claim window elapsed for drop {}", self.drop.id);
                    break;
                }
            }

            if self.drop.state == DropState::Closed && !self.settings.refund_on_retract {
                break;
            }
        }

        self.finish().await
    }

    async fn handle_action(&mut self, action: ActionEvent) {
        match action.kind {
            ActionKind::Claim => self.handle_claim(action).await,
            ActionKind::Unclaim => self.handle_unclaim(action).await,
        }
    }

    /// True when this participant already acted on this drop within the
    /// debounce interval. Records the action time otherwise.
    fn debounced(&mut self, participant_id: &str) -> bool {
        let now = Instant::now();
        if let Some(last) = self.last_action.get(participant_id) {
            if now.duration_since(*last) < self.settings.debounce_interval {
                return true;
            }
        }
        self.last_action.insert(participant_id.to_string(), now);
        false
    }

    async fn handle_claim(&mut self, action: ActionEvent) {
        if self.debounced(&action.participant_id) {
            debug!(
                "Debounced claim from {} on drop {}",
                action.display_name, self.drop.id
            );
            return;
        }

        if self.drop.state != DropState::Open {
            debug!(
                "Discarding claim from {} on settled drop {}",
                action.display_name, self.drop.id
            );
            return;
        }

        // late attempts that slipped past the timer are still discarded
        if Utc::now() >= self.drop.expires_at {
            debug!(
                "Discarding claim from {} on expired drop {}",
                action.display_name, self.drop.id
            );
            return;
        }

        let community_id = self.drop.community_id.clone();
        let new_balance = match self.drop.kind {
            DropKind::Coin => {
                self.drop.state = DropState::Resolving;
                match self
                    .ledger
                    .apply(&community_id, &action.participant_id, 1, "Coin collection")
                    .await
                {
                    Ok(balance) => balance,
                    Err(e) => {
                        // award is authoritative even when the snapshot write failed
                        error!(
                            "Ledger save failed for drop {} (award stands): {}",
                            self.drop.id, e
                        );
                        self.ledger
                            .balance(&community_id, &action.participant_id)
                            .await
                    }
                }
            }
            DropKind::Toy => {
                let reason = format!("Claimed toy for {} coins", self.drop.cost);
                match self
                    .ledger
                    .try_debit(
                        &community_id,
                        &action.participant_id,
                        self.drop.cost,
                        &reason,
                    )
                    .await
                {
                    Ok(balance) => {
                        self.drop.state = DropState::Resolving;
                        balance
                    }
                    Err(Error::InsufficientBalance {
                        required,
                        available,
                    }) => {
                        // the drop stays open for better-funded claimants
                        info!(
                            "{} attempted toy claim on drop {} without enough points ({} < {})",
                            action.display_name, self.drop.id, available, required
                        );
                        return;
                    }
                    Err(e) => {
                        error!(
                            "Ledger save failed for drop {} (debit stands): {}",
                            self.drop.id, e
                        );
                        self.drop.state = DropState::Resolving;
                        self.ledger
                            .balance(&community_id, &action.participant_id)
                            .await
                    }
                }
            }
        };

        if self.drop.kind == DropKind::Toy {
            if let Some(asset) = self.drop.asset.clone() {
                if let Err(e) = self
                    .collections
                    .append(&community_id, &action.participant_id, &asset.id)
                    .await
                {
                    error!(
                        "Failed to record collection entry for {}: {}",
                        action.participant_id, e
                    );
                }
            }
        }

        // Rewrite the published message. The ledger mutation is
        // authoritative; a failed rewrite is reported, never rolled back.
        let text = self.drop.claimed_text(&action.display_name, new_balance);
        if let Err(e) = self.offer.edit(&text).await {
            warn!("Failed to rewrite claimed drop {}: {}", self.drop.id, e);
        }

        self.drop.state = DropState::Closed;
        self.winner = Some(Winner {
            participant_id: action.participant_id.clone(),
            display_name: action.display_name.clone(),
        });
        self.winner_balance = new_balance;
        info!(
            "{} claimed {} drop {} in {}",
            action.display_name, self.drop.kind, self.drop.id, community_id
        );
    }

    /// Reverse a resolved claim when the winner retracts their action.
    /// Fires at most once per drop.
    async fn handle_unclaim(&mut self, action: ActionEvent) {
        if !self.settings.refund_on_retract || self.drop.state != DropState::Closed {
            return;
        }
        let Some(winner) = self.winner.clone() else {
            return;
        };
        if winner.participant_id != action.participant_id {
            return;
        }
        if self.refunded {
            debug!("Refund already issued for drop {}", self.drop.id);
            return;
        }
        self.refunded = true;

        let community_id = self.drop.community_id.clone();
        let (delta, reason) = match self.drop.kind {
            DropKind::Coin => (-1, "Returned collected coin".to_string()),
            DropKind::Toy => (
                self.drop.cost,
                format!("Refunded toy claim for {} coins", self.drop.cost),
            ),
        };

        match self
            .ledger
            .apply(&community_id, &winner.participant_id, delta, &reason)
            .await
        {
            Ok(balance) => self.winner_balance = balance,
            Err(e) => {
                error!(
                    "Ledger save failed for drop {} refund (refund stands): {}",
                    self.drop.id, e
                );
                self.winner_balance = self
                    .ledger
                    .balance(&community_id, &winner.participant_id)
                    .await;
            }
        }

        if self.drop.kind == DropKind::Toy {
            if let Some(asset) = self.drop.asset.clone() {
                if let Err(e) = self
                    .collections
                    .remove_one(&community_id, &winner.participant_id, &asset.id)
                    .await
                {
                    error!(
                        "Failed to remove collection entry for {}: {}",
                        winner.participant_id, e
                    );
                }
            }
        }

        info!(
            "Refunded {} drop {} for {}",
            self.drop.kind, self.drop.id, winner.display_name
        );
    }

    async fn finish(mut self) -> DropOutcome {
        if let Err(e) = self.offer.retract().await {
            warn!("Failed to retract drop {} message: {}", self.drop.id, e);
        }
        self.drop.state = DropState::Closed;

        match self.winner {
            Some(winner) => DropOutcome::Claimed {
                winner,
                new_balance: self.winner_balance,
                refunded: self.refunded,
            },
            None => {
                info!("Drop {} expired unclaimed", self.drop.id);
                DropOutcome::Expired
            }
        }
    }
}
