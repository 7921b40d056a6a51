//! Per-participant toy collections
//!
//! An append-only list of won asset ids per (community, participant).
//! Duplicates are permitted: winning the same toy twice records it twice.

use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::info;

use trove_core::{AssetId, CollectionTable, Result};

use crate::snapshot;

/// Durable record of the assets each participant has won
pub struct CollectionStore {
    path: PathBuf,
    table: Mutex<CollectionTable>,
}

impl CollectionStore {
    /// Open the collection store at `path`, initializing or resetting
    /// the snapshot as needed.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let table: CollectionTable = snapshot::load_or_init(&path).await?;
        Ok(Self {
            path,
            table: Mutex::new(table),
        })
    }

    /// Append a won asset to a participant's collection and persist
    pub async fn append(
        &self,
        community_id: &str,
        participant_id: &str,
        asset_id: &str,
    ) -> Result<()> {
        let mut table = self.table.lock().await;
        table
            .entry(community_id.to_string())
            .or_default()
            .entry(participant_id.to_string())
            .or_default()
            .push(asset_id.to_string());

        info!(
            "Collection updated for {} in {}: added {}",
            participant_id, community_id, asset_id
        );

        snapshot::save_atomic(&self.path, &*table).await
    }

    /// Remove the most recent occurrence of `asset_id` from a
    /// participant's collection. Returns false when no entry matched,
    /// which makes repeated refund attempts harmless.
    pub async fn remove_one(
        &self,
        community_id: &str,
        participant_id: &str,
        asset_id: &str,
    ) -> Result<bool> {
        let mut table = self.table.lock().await;
        let Some(assets) = table
            .get_mut(community_id)
            .and_then(|users| users.get_mut(participant_id))
        else {
            return Ok(false);
        };

        let Some(index) = assets.iter().rposition(|a| a == asset_id) else {
            return Ok(false);
        };
        assets.remove(index);

        info!(
            "Collection updated for {} in {}: removed {}",
            participant_id, community_id, asset_id
        );

        snapshot::save_atomic(&self.path, &*table).await?;
        Ok(true)
    }

    /// Ordered list of assets a participant has won, oldest first
    pub async fn assets_of(&self, community_id: &str, participant_id: &str) -> Vec<AssetId> {
        let table = self.table.lock().await;
        table
            .get(community_id)
            .and_then(|users| users.get(participant_id))
            .cloned()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn open_store(dir: &tempfile::TempDir) -> CollectionStore {
        CollectionStore::open(dir.path().join("userCollection.json"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_append_keeps_order_and_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;

        store.append("g1", "u1", "bear.png").await.unwrap();
        store.append("g1", "u1", "car.png").await.unwrap();
        store.append("g1", "u1", "bear.png").await.unwrap();

        assert_eq!(
            store.assets_of("g1", "u1").await,
            vec!["bear.png", "car.png", "bear.png"]
        );
    }

    #[tokio::test]
    async fn test_remove_one_takes_latest_occurrence_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;
        store.append("g1", "u1", "bear.png").await.unwrap();
        store.append("g1", "u1", "car.png").await.unwrap();
        store.append("g1", "u1", "bear.png").await.unwrap();

        assert!(store.remove_one("g1", "u1", "bear.png").await.unwrap());
        assert_eq!(store.assets_of("g1", "u1").await, vec!["bear.png", "car.png"]);

        assert!(store.remove_one("g1", "u1", "bear.png").await.unwrap());
        // nothing left to remove
        assert!(!store.remove_one("g1", "u1", "bear.png").await.unwrap());
        assert!(!store.remove_one("g1", "missing", "bear.png").await.unwrap());
    }

    #[tokio::test]
    async fn test_collections_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("userCollection.json");

        {
            let store = CollectionStore::open(&path).await.unwrap();
            store.append("g1", "u1", "bear.png").await.unwrap();
        }

        let reopened = CollectionStore::open(&path).await.unwrap();
        assert_eq!(reopened.assets_of("g1", "u1").await, vec!["bear.png"]);
    }
}
