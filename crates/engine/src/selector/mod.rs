//! Anti-repeat content selection
//!
//! Picks the next pool asset to offer, excluding anything selected in
//! the last `recent_limit` picks. The recency ring is shared across
//! communities; per-community whitelists and hidden lists narrow the
//! candidate set before the ring applies.

use rand::Rng;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

use trove_core::{AssetId, ContentAsset, Result};
use trove_persistence::content::{scan_pool, ContentPolicyStore};

/// Chooses which reward asset to offer next
pub struct ContentSelector {
    pool_dir: PathBuf,
    policies: Arc<ContentPolicyStore>,
    recent: VecDeque<AssetId>,
    recent_limit: usize,
}

impl ContentSelector {
    pub fn new(
        pool_dir: impl Into<PathBuf>,
        policies: Arc<ContentPolicyStore>,
        recent_limit: usize,
    ) -> Self {
        Self {
            pool_dir: pool_dir.into(),
            policies,
            recent: VecDeque::new(),
            recent_limit,
        }
    }

    /// Pick the next asset for a community.
    ///
    /// Returns `Ok(None)` when the community's eligible pool is empty;
    /// callers treat that as "nothing to offer this cycle". When every
    /// eligible asset sits in the recency ring, the ring is cleared and
    /// selection retries once against the full eligible pool.
    pub async fn next(&mut self, community_id: &str) -> Result<Option<ContentAsset>> {
        let policy = self.policies.policy_for(community_id).await;
        let pool = scan_pool(&self.pool_dir)?;

        let eligible: Vec<AssetId> = pool
            .into_iter()
            .filter(|asset| {
                policy.whitelisted.is_empty() || policy.whitelisted.contains(asset)
            })
            .filter(|asset| !policy.hidden.contains(asset))
            .collect();

        if eligible.is_empty() {
            debug!("No eligible assets for {}", community_id);
            return Ok(None);
        }

        let mut available: Vec<&AssetId> = eligible
            .iter()
            .filter(|asset| !self.recent.contains(*asset))
            .collect();

        if available.is_empty() {
            warn!("No unused assets available, resetting recently used ring");
            self.recent.clear();
            available = eligible.iter().collect();
        }

        let picked = available[rand::thread_rng().gen_range(0..available.len())].clone();
        self.record(picked.clone());
        debug!("Selected asset {} for {}", picked, community_id);

        let path = self.pool_dir.join(&picked);
        Ok(Some(ContentAsset::new(picked, path)))
    }

    /// Record a selection in the recency ring, evicting the oldest
    /// entries beyond the configured limit
    fn record(&mut self, asset: AssetId) {
        self.recent.push_back(asset);
        while self.recent.len() > self.recent_limit {
            self.recent.pop_front();
        }
    }
}
