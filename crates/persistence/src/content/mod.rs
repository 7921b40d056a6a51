//! Content pool scanning and per-community content policy

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{info, warn};

use trove_core::{AssetId, CommunityId, Result};

use crate::snapshot;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp"];

/// List the candidate asset ids (file names) in the pool directory.
///
/// The pool is plain file storage: anything with an image extension is a
/// candidate. A missing directory is created so a fresh deployment
/// starts with an empty pool instead of an error.
pub fn scan_pool(dir: &Path) -> Result<Vec<AssetId>> {
    if !dir.exists() {
        std::fs::create_dir_all(dir)?;
        warn!("Created missing pool directory: {}", dir.display());
        return Ok(Vec::new());
    }

    let mut assets = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if has_image_extension(&name) {
            assets.push(name);
        }
    }

    assets.sort();
    Ok(assets)
}

fn has_image_extension(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let lower = e.to_ascii_lowercase();
            IMAGE_EXTENSIONS.contains(&lower.as_str())
        })
        .unwrap_or(false)
}

/// Content rules for one community
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommunityPolicy {
    /// When non-empty, selection is restricted to these assets
    #[serde(default)]
    pub whitelisted: Vec<AssetId>,
    /// Assets never offered in this community
    #[serde(default)]
    pub hidden: Vec<AssetId>,
}

/// Durable per-community whitelist/hidden lists
pub struct ContentPolicyStore {
    path: PathBuf,
    table: Mutex<HashMap<CommunityId, CommunityPolicy>>,
}

impl ContentPolicyStore {
    /// Open the policy store at `path`, initializing or resetting the
    /// snapshot as needed.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let table: HashMap<CommunityId, CommunityPolicy> =
            snapshot::load_or_init(&path).await?;
        Ok(Self {
            path,
            table: Mutex::new(table),
        })
    }

    /// Policy for a community; a community with no stored policy gets
    /// the permissive default (no whitelist, nothing hidden).
    pub async fn policy_for(&self, community_id: &str) -> CommunityPolicy {
        let table = self.table.lock().await;
        table.get(community_id).cloned().unwrap_or_default()
    }

    /// Replace a community's whitelist and persist
    pub async fn set_whitelist(
        &self,
        community_id: &str,
        whitelisted: Vec<AssetId>,
    ) -> Result<()> {
        let mut table = self.table.lock().await;
        table
            .entry(community_id.to_string())
            .or_default()
            .whitelisted = whitelisted;
        info!("Whitelist updated for {}", community_id);
        snapshot::save_atomic(&self.path, &*table).await
    }

    /// Hide an asset from a community and persist. Hiding an already
    /// hidden asset is a no-op.
    pub async fn hide(&self, community_id: &str, asset_id: &str) -> Result<()> {
        let mut table = self.table.lock().await;
        let policy = table.entry(community_id.to_string()).or_default();
        if !policy.hidden.iter().any(|a| a == asset_id) {
            policy.hidden.push(asset_id.to_string());
            info!("Asset {} hidden in {}", asset_id, community_id);
            snapshot::save_atomic(&self.path, &*table).await?;
        }
        Ok(())
    }

    /// Remove an asset from a community's hidden list. Returns false
    /// when the asset was not hidden.
    pub async fn unhide(&self, community_id: &str, asset_id: &str) -> Result<bool> {
        let mut table = self.table.lock().await;
        let Some(policy) = table.get_mut(community_id) else {
            return Ok(false);
        };
        let Some(index) = policy.hidden.iter().position(|a| a == asset_id) else {
            return Ok(false);
        };
        policy.hidden.remove(index);
        snapshot::save_atomic(&self.path, &*table).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_pool_filters_non_images() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a.png", "b.JPG", "c.webp", "notes.txt", "d.gif.bak"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }

        let assets = scan_pool(dir.path()).unwrap();
        assert_eq!(assets, vec!["a.png", "b.JPG", "c.webp"]);
    }

    #[test]
    fn test_scan_pool_creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let pool = dir.path().join("downloads");

        let assets = scan_pool(&pool).unwrap();
        assert!(assets.is_empty());
        assert!(pool.is_dir());
    }

    #[tokio::test]
    async fn test_policy_defaults_and_mutations_persist() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("contentPolicy.json");

        {
            let store = ContentPolicyStore::open(&path).await.unwrap();
            let policy = store.policy_for("g1").await;
            assert!(policy.whitelisted.is_empty());
            assert!(policy.hidden.is_empty());

            store
                .set_whitelist("g1", vec!["a.png".to_string()])
                .await
                .unwrap();
            store.hide("g1", "b.png").await.unwrap();
            store.hide("g1", "b.png").await.unwrap(); // no duplicate
        }

        let reopened = ContentPolicyStore::open(&path).await.unwrap();
        let policy = reopened.policy_for("g1").await;
        assert_eq!(policy.whitelisted, vec!["a.png"]);
        assert_eq!(policy.hidden, vec!["b.png"]);

        assert!(reopened.unhide("g1", "b.png").await.unwrap());
        assert!(!reopened.unhide("g1", "b.png").await.unwrap());
    }
}
