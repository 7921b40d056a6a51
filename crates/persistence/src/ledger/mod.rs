//! Authoritative per-community point ledger
//!
//! Balances live in memory and every mutation rewrites the ledger
//! snapshot before the table lock is released, so snapshots on disk can
//! never be reordered against each other.

use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::{debug, info};

use trove_core::{BalanceTable, Error, ParticipantId, Points, Result};

use crate::snapshot;

/// Durable community -> participant -> balance table
pub struct PointLedger {
    path: PathBuf,
    table: Mutex<BalanceTable>,
}

impl PointLedger {
    /// Open the ledger at `path`, initializing an empty snapshot when the
    /// file is missing and resetting it when corrupt.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let table: BalanceTable = snapshot::load_or_init(&path).await?;
        info!(
            "Ledger loaded from {} ({} communities)",
            path.display(),
            table.len()
        );
        Ok(Self {
            path,
            table: Mutex::new(table),
        })
    }

    /// Add `delta` (signed) to a participant's balance, creating the
    /// entry at 0 when absent, and persist the new table.
    ///
    /// On a storage failure the in-memory mutation stands and
    /// [`Error::StorageError`] is returned for reporting; the next
    /// successful save rewrites the whole snapshot.
    pub async fn apply(
        &self,
        community_id: &str,
        participant_id: &str,
        delta: Points,
        reason: &str,
    ) -> Result<Points> {
        let mut table = self.table.lock().await;
        let entry = table
            .entry(community_id.to_string())
            .or_default()
            .entry(participant_id.to_string())
            .or_insert(0);
        let current = *entry;
        let updated = current + delta;
        *entry = updated;

        info!(
            "Points updated for {} in {}: {} -> {} ({})",
            participant_id, community_id, current, updated, reason
        );

        snapshot::save_atomic(&self.path, &*table).await?;
        Ok(updated)
    }

    /// Debit `cost` from a participant if and only if their balance
    /// covers it. Gate check and mutation happen under one lock
    /// acquisition, so a balance can never be driven negative by a
    /// concurrent drop resolution.
    ///
    /// Returns [`Error::InsufficientBalance`] without mutating when the
    /// balance is short. Storage failures behave as in [`Self::apply`].
    pub async fn try_debit(
        &self,
        community_id: &str,
        participant_id: &str,
        cost: Points,
        reason: &str,
    ) -> Result<Points> {
        let mut table = self.table.lock().await;
        let entry = table
            .entry(community_id.to_string())
            .or_default()
            .entry(participant_id.to_string())
            .or_insert(0);
        let current = *entry;

        if current < cost {
            return Err(Error::InsufficientBalance {
                required: cost,
                available: current,
            });
        }

        let updated = current - cost;
        *entry = updated;

        info!(
            "Points updated for {} in {}: {} -> {} ({})",
            participant_id, community_id, current, updated, reason
        );

        snapshot::save_atomic(&self.path, &*table).await?;
        Ok(updated)
    }

    /// Current balance, 0 when the participant is unknown
    pub async fn balance(&self, community_id: &str, participant_id: &str) -> Points {
        let table = self.table.lock().await;
        table
            .get(community_id)
            .and_then(|users| users.get(participant_id))
            .copied()
            .unwrap_or(0)
    }

    /// Create zero-balance entries for roster members missing from the
    /// ledger. Entries of participants who left are kept untouched.
    /// Returns how many entries were created.
    pub async fn reconcile(
        &self,
        community_id: &str,
        roster: &[ParticipantId],
    ) -> Result<usize> {
        let mut table = self.table.lock().await;
        let users = table.entry(community_id.to_string()).or_default();

        let mut created = 0;
        for member in roster {
            users.entry(member.clone()).or_insert_with(|| {
                created += 1;
                0
            });
        }

        if created > 0 {
            info!(
                "Reconciled roster for {}: {} new ledger entries",
                community_id, created
            );
            snapshot::save_atomic(&self.path, &*table).await?;
        } else {
            debug!("Roster for {} already reconciled", community_id);
        }

        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn open_ledger(dir: &tempfile::TempDir) -> PointLedger {
        PointLedger::open(dir.path().join("userPoints.json"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_apply_creates_entry_at_zero() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = open_ledger(&dir).await;

        assert_eq!(ledger.balance("g1", "u1").await, 0);
        let balance = ledger.apply("g1", "u1", 1, "Coin collection").await.unwrap();
        assert_eq!(balance, 1);
        assert_eq!(ledger.balance("g1", "u1").await, 1);
    }

    #[tokio::test]
    async fn test_balances_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("userPoints.json");

        {
            let ledger = PointLedger::open(&path).await.unwrap();
            ledger.apply("g1", "u1", 5, "test").await.unwrap();
        }

        let reopened = PointLedger::open(&path).await.unwrap();
        assert_eq!(reopened.balance("g1", "u1").await, 5);
    }

    #[tokio::test]
    async fn test_try_debit_rejects_short_balance_without_mutating() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = open_ledger(&dir).await;
        ledger.apply("g1", "u1", 5, "seed").await.unwrap();

        let err = ledger.try_debit("g1", "u1", 7, "toy claim").await.unwrap_err();
        assert!(matches!(
            err,
            Error::InsufficientBalance {
                required: 7,
                available: 5
            }
        ));
        assert_eq!(ledger.balance("g1", "u1").await, 5);
    }

    #[tokio::test]
    async fn test_try_debit_deducts_exact_cost() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = open_ledger(&dir).await;
        ledger.apply("g1", "u1", 10, "seed").await.unwrap();

        let balance = ledger.try_debit("g1", "u1", 7, "toy claim").await.unwrap();
        assert_eq!(balance, 3);
    }

    #[tokio::test]
    async fn test_reconcile_adds_missing_and_keeps_existing() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = open_ledger(&dir).await;
        ledger.apply("g1", "u1", 9, "seed").await.unwrap();

        let roster = vec!["u1".to_string(), "u2".to_string(), "u3".to_string()];
        let created = ledger.reconcile("g1", &roster).await.unwrap();
        assert_eq!(created, 2);
        assert_eq!(ledger.balance("g1", "u1").await, 9);
        assert_eq!(ledger.balance("g1", "u2").await, 0);

        // members who left stay in the ledger
        let smaller = vec!["u1".to_string()];
        ledger.reconcile("g1", &smaller).await.unwrap();
        assert_eq!(ledger.balance("g1", "u3").await, 0);
    }
}
