//! Background drop scheduling loops
//!
//! One persistent task per (community, drop kind). Each loop sleeps a
//! uniformly random delay, publishes an offer when content is available,
//! and hands it to a `ClaimArbitrator`. The loop awaits the arbitrator
//! to completion before rescheduling, so at most one drop per
//! (community, kind) is ever open. A failed cycle is logged and the loop
//! reschedules; loops for other communities are unaffected.

use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use trove_core::{BotConfig, CommunityId, DropKind, DropOutcome, Points, Result, RewardDrop};
use trove_gateway::{ChatGateway, OfferContent};
use trove_persistence::{CollectionStore, PointLedger};

use crate::arbitrator::{ArbitratorSettings, ClaimArbitrator};
use crate::selector::ContentSelector;

/// Shared dependencies driving every drop loop
pub struct DropScheduler {
    gateway: Arc<dyn ChatGateway>,
    ledger: Arc<PointLedger>,
    collections: Arc<CollectionStore>,
    selector: Arc<Mutex<ContentSelector>>,
    config: BotConfig,
    next_drop_id: AtomicU64,
}

impl DropScheduler {
    pub fn new(
        gateway: Arc<dyn ChatGateway>,
        ledger: Arc<PointLedger>,
        collections: Arc<CollectionStore>,
        selector: Arc<Mutex<ContentSelector>>,
        config: BotConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            gateway,
            ledger,
            collections,
            selector,
            config,
            next_drop_id: AtomicU64::new(1),
        })
    }

    /// Sync ledger entries with the current community rosters, creating
    /// zero-balance entries for members the ledger has never seen.
    /// Nobody is removed. Returns how many entries were created.
    ///
    /// Runs at startup, before the drop loops spawn.
    pub async fn reconcile_rosters(&self) -> Result<usize> {
        let communities = self.gateway.communities().await?;
        let mut created = 0;
        for community_id in &communities {
            let roster = self.gateway.roster(community_id).await?;
            created += self.ledger.reconcile(community_id, &roster).await?;
        }
        info!(
            "Synchronized {} community rosters ({} new ledger entries)",
            communities.len(),
            created
        );
        Ok(created)
    }

    /// Spawn one drop loop per (community, kind). The returned handles
    /// complete once `cancel` fires and each loop has wound down.
    pub fn spawn_loops(
        self: &Arc<Self>,
        communities: &[CommunityId],
        cancel: &CancellationToken,
    ) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();
        for community_id in communities {
            for kind in [DropKind::Coin, DropKind::Toy] {
                handles.push(tokio::spawn(Self::drop_loop(
                    self.clone(),
                    community_id.clone(),
                    kind,
                    cancel.clone(),
                )));
            }
        }
        handles
    }

    async fn drop_loop(
        self: Arc<Self>,
        community_id: CommunityId,
        kind: DropKind,
        cancel: CancellationToken,
    ) {
        info!("Drop loop started for {} ({})", community_id, kind);

        loop {
            let delay = self.next_delay(kind);
            debug!(
                "Next {} drop in {} scheduled in {}s",
                kind,
                community_id,
                delay.as_secs()
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Drop loop cancelled for {} ({})", community_id, kind);
                    break;
                }
                _ = tokio::time::sleep(delay) => {}
            }

            match self.run_cycle(&community_id, kind).await {
                Ok(Some(DropOutcome::Claimed { winner, .. })) => {
                    debug!(
                        "{} drop cycle in {} resolved, winner {}",
                        kind, community_id, winner.display_name
                    );
                }
                Ok(Some(DropOutcome::Expired)) => {
                    debug!("{} drop cycle in {} expired unclaimed", kind, community_id);
                }
                Ok(None) => {}
                Err(e) => {
                    error!("{} drop cycle failed in {}: {}", kind, community_id, e);
                }
            }
        }
    }

    /// Uniformly random delay within the configured window for `kind`
    fn next_delay(&self, kind: DropKind) -> Duration {
        let timing = self.config.timing(kind);
        let low = timing.min_delay_secs.min(timing.max_delay_secs);
        let high = timing.min_delay_secs.max(timing.max_delay_secs);
        Duration::from_secs(rand::thread_rng().gen_range(low..=high))
    }

    /// Run one publish-and-arbitrate cycle. Returns `Ok(None)` when
    /// there was nothing to offer.
    async fn run_cycle(&self, community_id: &str, kind: DropKind) -> Result<Option<DropOutcome>> {
        let timing = self.config.timing(kind).clone();
        let claim_window = chrono::Duration::seconds(timing.claim_window_secs as i64);
        let id = self.next_drop_id.fetch_add(1, Ordering::Relaxed);

        let drop = match kind {
            DropKind::Coin => RewardDrop::coin(id, community_id, claim_window),
            DropKind::Toy => {
                let asset = self.selector.lock().await.next(community_id).await?;
                let Some(asset) = asset else {
                    warn!("No content available to offer in {}", community_id);
                    return Ok(None);
                };
                RewardDrop::toy(id, community_id, self.next_cost(), asset, claim_window)
            }
        };

        let content = match &drop.asset {
            Some(asset) => OfferContent::with_attachment(drop.open_text(), asset.path.clone()),
            None => OfferContent::text_only(drop.open_text()),
        };

        let offer = self
            .gateway
            .publish(community_id, &timing.channels, content)
            .await?;
        info!("Published {} drop {} in {}", kind, id, community_id);

        let settings = ArbitratorSettings {
            debounce_interval: self.config.debounce_interval(),
            refund_on_retract: self.config.refund_on_retract,
        };
        let outcome = ClaimArbitrator::new(
            drop,
            offer,
            self.ledger.clone(),
            self.collections.clone(),
            settings,
        )
        .run()
        .await;

        Ok(Some(outcome))
    }

    /// Random toy cost within the configured inclusive range
    fn next_cost(&self) -> Points {
        let low = self.config.toy_cost_min.min(self.config.toy_cost_max);
        let high = self.config.toy_cost_min.max(self.config.toy_cost_max);
        rand::thread_rng().gen_range(low..=high)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trove_gateway::{ActionEvent, MemoryGateway};
    use trove_persistence::content::ContentPolicyStore;

    struct Rig {
        scheduler: Arc<DropScheduler>,
        gateway: Arc<MemoryGateway>,
        ledger: Arc<PointLedger>,
        collections: Arc<CollectionStore>,
        _dir: tempfile::TempDir,
    }

    async fn rig(pool_files: &[&str], mut config: BotConfig) -> Rig {
        let dir = tempfile::tempdir().unwrap();
        config.data_dir = dir.path().to_path_buf();
        config.pool_dir = dir.path().join("downloads");

        std::fs::create_dir_all(&config.pool_dir).unwrap();
        for name in pool_files {
            std::fs::write(config.pool_dir.join(name), b"img").unwrap();
        }

        let gateway = Arc::new(MemoryGateway::new());
        let ledger = Arc::new(
            PointLedger::open(dir.path().join("userPoints.json"))
                .await
                .unwrap(),
        );
        let collections = Arc::new(
            CollectionStore::open(dir.path().join("userCollection.json"))
                .await
                .unwrap(),
        );
        let policies = Arc::new(
            ContentPolicyStore::open(dir.path().join("contentPolicy.json"))
                .await
                .unwrap(),
        );
        let selector = Arc::new(Mutex::new(ContentSelector::new(
            config.pool_dir.clone(),
            policies,
            config.recent_use_limit,
        )));

        let scheduler = DropScheduler::new(
            gateway.clone(),
            ledger.clone(),
            collections.clone(),
            selector,
            config,
        );

        Rig {
            scheduler,
            gateway,
            ledger,
            collections,
            _dir: dir,
        }
    }

    fn quick_config() -> BotConfig {
        let mut config = BotConfig::default();
        config.refund_on_retract = false;
        config.coin.claim_window_secs = 60;
        config.toy.claim_window_secs = 60;
        config
    }

    async fn wait_for_publish(gateway: &MemoryGateway, count: usize) {
        while gateway.published_count() < count {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_coin_cycle_publishes_and_awards_winner() {
        let rig = rig(&[], quick_config()).await;
        let scheduler = rig.scheduler.clone();

        let cycle = tokio::spawn(async move { scheduler.run_cycle("g1", DropKind::Coin).await });

        wait_for_publish(&rig.gateway, 1).await;
        let probe = rig.gateway.published()[0].clone();
        assert_eq!(probe.text(), "Coin available - react to collect 1 coin!");
        probe.send(ActionEvent::claim("u1", "Ana"));

        let outcome = cycle.await.unwrap().unwrap().unwrap();
        assert!(matches!(outcome, DropOutcome::Claimed { .. }));
        assert_eq!(rig.ledger.balance("g1", "u1").await, 1);
        assert!(probe.retracted());
    }

    #[tokio::test(start_paused = true)]
    async fn test_toy_cycle_attaches_asset_and_costs_points() {
        let rig = rig(&["bear.png"], quick_config()).await;
        rig.ledger.apply("g1", "u1", 50, "seed").await.unwrap();
        let scheduler = rig.scheduler.clone();

        let cycle = tokio::spawn(async move { scheduler.run_cycle("g1", DropKind::Toy).await });

        wait_for_publish(&rig.gateway, 1).await;
        let probe = rig.gateway.published()[0].clone();
        let record = probe.record();
        assert!(record.text.starts_with("Claim prize now - "));
        assert!(record
            .attachment
            .as_ref()
            .is_some_and(|p| p.ends_with("downloads/bear.png")));

        probe.send(ActionEvent::claim("u1", "Ana"));
        let outcome = cycle.await.unwrap().unwrap().unwrap();
        assert!(matches!(outcome, DropOutcome::Claimed { .. }));

        // cost stays within the configured 5..=10 range
        let balance = rig.ledger.balance("g1", "u1").await;
        assert!((40..=45).contains(&balance), "balance was {}", balance);
        assert_eq!(rig.collections.assets_of("g1", "u1").await, vec!["bear.png"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_toy_cycle_with_empty_pool_skips_publishing() {
        let rig = rig(&[], quick_config()).await;

        let outcome = rig.scheduler.run_cycle("g1", DropKind::Toy).await.unwrap();
        assert!(outcome.is_none());
        assert_eq!(rig.gateway.published_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconcile_rosters_creates_missing_entries() {
        let rig = rig(&[], quick_config()).await;
        rig.gateway
            .set_roster("g1", vec!["u1".to_string(), "u2".to_string()]);
        rig.ledger.apply("g1", "u1", 4, "seed").await.unwrap();

        let created = rig.scheduler.reconcile_rosters().await.unwrap();
        assert_eq!(created, 1);
        // existing balances are untouched
        assert_eq!(rig.ledger.balance("g1", "u1").await, 4);

        // a second pass finds nothing new
        assert_eq!(rig.scheduler.reconcile_rosters().await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_loops_exit_without_publishing() {
        let mut config = quick_config();
        config.coin.min_delay_secs = 3600;
        config.coin.max_delay_secs = 3600;
        config.toy.min_delay_secs = 3600;
        config.toy.max_delay_secs = 3600;
        let rig = rig(&["bear.png"], config).await;

        let cancel = CancellationToken::new();
        let handles = rig
            .scheduler
            .spawn_loops(&["g1".to_string(), "g2".to_string()], &cancel);
        assert_eq!(handles.len(), 4);

        cancel.cancel();
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(rig.gateway.published_count(), 0);
    }
}
