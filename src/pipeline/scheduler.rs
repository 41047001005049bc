//! Periodic maintenance jobs
//!
//! A single-writer loop drives price refresh, call-outcome measurement,
//! source snapshots and the retirement sweep at fixed periods. Every job is
//! also callable directly, which is what the tests do.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::cluster::{ClusterSnapshot, ClusteringEngine};
use crate::config::PipelineConfig;
use crate::market::MarketOracle;
use crate::persist::PersistenceSink;
use crate::sources::SourceTracker;

/// Clusters enter the outcome pass at this age (minutes)
const OUTCOME_MIN_AGE_MINUTES: i64 = 60;
/// ...and leave it at this age, so each cluster is measured once
const OUTCOME_MAX_AGE_MINUTES: i64 = 66;

/// Runs the periodic jobs until cancelled
pub struct Scheduler {
    config: PipelineConfig,
    clustering: Arc<ClusteringEngine>,
    tracker: Arc<SourceTracker>,
    market: Arc<dyn MarketOracle>,
    sink: Arc<dyn PersistenceSink>,
}

impl Scheduler {
    pub fn new(
        config: PipelineConfig,
        clustering: Arc<ClusteringEngine>,
        tracker: Arc<SourceTracker>,
        market: Arc<dyn MarketOracle>,
        sink: Arc<dyn PersistenceSink>,
    ) -> Self {
        Self {
            config,
            clustering,
            tracker,
            market,
            sink,
        }
    }

    /// Single-writer job loop; exits when the token is cancelled
    pub async fn run(&self, cancel: CancellationToken) {
        let mut price_tick =
            tokio::time::interval(Duration::from_secs(self.config.price_refresh_secs));
        let mut outcome_tick =
            tokio::time::interval(Duration::from_secs(self.config.outcome_check_secs));
        let mut snapshot_tick =
            tokio::time::interval(Duration::from_secs(self.config.snapshot_secs));
        let mut retire_tick =
            tokio::time::interval(Duration::from_secs(self.config.retirement_sweep_secs));

        // The first tick of an interval fires immediately; skip it
        price_tick.tick().await;
        outcome_tick.tick().await;
        snapshot_tick.tick().await;
        retire_tick.tick().await;

        info!("scheduler started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("scheduler stopping");
                    break;
                }
                _ = price_tick.tick() => {
                    self.refresh_prices().await;
                }
                _ = outcome_tick.tick() => {
                    self.track_outcomes_at(Utc::now());
                }
                _ = snapshot_tick.tick() => {
                    self.snapshot_sources().await;
                }
                _ = retire_tick.tick() => {
                    self.retire_expired().await;
                }
            }
        }
    }

    /// Refresh current prices for active clusters with known addresses
    pub async fn refresh_prices(&self) {
        let targets = self.clustering.clusters_with_addresses();
        if targets.is_empty() {
            return;
        }

        let addresses: Vec<String> = targets.iter().map(|(a, _)| a.clone()).collect();
        let prices = self.market.lookup_many(&addresses).await;

        let mut updated = 0;
        for (address, chain) in targets {
            if let Some(data) = prices.get(&address) {
                self.clustering.apply_price(&address, chain, data.price_usd);
                updated += 1;
            }
        }
        debug!(updated, "cluster prices refreshed");
    }

    /// Measure 1-hour outcomes for clusters just past the hour mark and feed
    /// them back into source reputation
    pub fn track_outcomes_at(&self, now: DateTime<Utc>) {
        let mut tracked = 0;
        for cluster in self.clustering.active_clusters() {
            let age_minutes = (now - cluster.first_seen).num_minutes();
            if !(OUTCOME_MIN_AGE_MINUTES..OUTCOME_MAX_AGE_MINUTES).contains(&age_minutes) {
                continue;
            }

            let Some(return_pct) = cluster.return_since_first_mention() else {
                continue;
            };

            let time_to_move = (now - cluster.first_seen).num_seconds() as f64;
            for source_id in &cluster.source_ids {
                self.tracker
                    .record_outcome(source_id, return_pct, Some(time_to_move));
                tracked += 1;
            }
        }
        if tracked > 0 {
            info!(tracked, "call outcomes recorded");
        }
    }

    /// Persist a snapshot of every tracked source
    pub async fn snapshot_sources(&self) {
        let mut stored = 0;
        for stats in self.tracker.all() {
            match self.sink.store_source(&stats).await {
                Ok(()) => stored += 1,
                Err(e) => {
                    error!(source_id = %stats.source_id, error = %e, "source snapshot failed")
                }
            }
        }
        debug!(stored, "source snapshots persisted");
    }

    /// Retire clusters that fell out of the window and hand them to the sink
    pub async fn retire_expired(&self) {
        self.retire_expired_at(Utc::now()).await
    }

    pub async fn retire_expired_at(&self, now: DateTime<Utc>) {
        let retired = self.clustering.retire_expired_at(now);
        for cluster in &retired {
            if let Err(e) = self
                .sink
                .store_cluster(&ClusterSnapshot::from(cluster))
                .await
            {
                error!(cluster_id = %cluster.id, error = %e, "failed to persist retired cluster");
            }
        }
        if !retired.is_empty() {
            info!(count = retired.len(), "retirement sweep complete");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::ClusteringEngine;
    use crate::config::Config;
    use crate::error::Result;
    use crate::extract::{Chain, Extractor, MatchSource, RawMessage, TokenRef};
    use crate::market::TokenMarketData;
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    struct FixedMarket {
        price: f64,
    }

    #[async_trait]
    impl MarketOracle for FixedMarket {
        async fn lookup(&self, _address: &str) -> Option<TokenMarketData> {
            Some(TokenMarketData {
                symbol: "FROG".into(),
                name: "Frog".into(),
                price_usd: self.price,
                market_cap: None,
                liquidity_usd: None,
                price_change_1h: None,
                price_change_24h: None,
                volume_24h: None,
                chain: "solana".into(),
                image_url: None,
                dex_url: String::new(),
            })
        }
    }

    struct NoMarket;

    #[async_trait]
    impl MarketOracle for NoMarket {
        async fn lookup(&self, _address: &str) -> Option<TokenMarketData> {
            None
        }

        async fn lookup_many(&self, _addresses: &[String]) -> HashMap<String, TokenMarketData> {
            HashMap::new()
        }
    }

    #[derive(Default)]
    struct CountingSink {
        clusters: AtomicU64,
        sources: AtomicU64,
        ids: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl PersistenceSink for CountingSink {
        async fn store_cluster(&self, snapshot: &ClusterSnapshot) -> Result<()> {
            self.clusters.fetch_add(1, Ordering::Relaxed);
            self.ids.lock().unwrap().push(snapshot.id.clone());
            Ok(())
        }
        async fn store_source(&self, _snapshot: &crate::sources::SourceStats) -> Result<()> {
            self.sources.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
    }

    fn setup(market: Arc<dyn MarketOracle>) -> (Scheduler, Arc<ClusteringEngine>, Arc<SourceTracker>, Arc<CountingSink>) {
        let config = Config::default();
        let clustering = Arc::new(ClusteringEngine::new(
            &config.clustering,
            config.scoring.clone(),
        ));
        let tracker = Arc::new(SourceTracker::new(config.reputation.clone()));
        let sink = Arc::new(CountingSink::default());
        let scheduler = Scheduler::new(
            config.pipeline.clone(),
            clustering.clone(),
            tracker.clone(),
            market,
            sink.clone(),
        );
        (scheduler, clustering, tracker, sink)
    }

    fn seed_cluster(clustering: &ClusteringEngine, at: DateTime<Utc>) {
        let msg = Extractor::new(Chain::Solana).process(&RawMessage {
            id: "m1".into(),
            source_id: "s1".into(),
            source_name: "chat".into(),
            timestamp: at,
            text: "aped $FROG".into(),
            reply_to_id: None,
        });
        let token = TokenRef {
            symbol: Some("FROG".into()),
            address: Some("FrogAddr".into()),
            chain: Chain::Solana,
            confidence: 0.95,
            match_source: MatchSource::CaPrefix,
        };
        clustering.add_message_at(&msg, &token, at);
    }

    #[tokio::test]
    async fn test_refresh_prices_applies_to_clusters() {
        let (scheduler, clustering, _, _) = setup(Arc::new(FixedMarket { price: 1.5 }));
        seed_cluster(&clustering, Utc::now());

        scheduler.refresh_prices().await;

        let c = clustering
            .get_by_token(Some("FrogAddr"), None, Chain::Solana)
            .unwrap();
        assert_eq!(c.price_current, Some(1.5));
        assert_eq!(c.price_at_first_mention, Some(1.5));
    }

    #[tokio::test]
    async fn test_refresh_prices_survives_oracle_outage() {
        let (scheduler, clustering, _, _) = setup(Arc::new(NoMarket));
        seed_cluster(&clustering, Utc::now());

        scheduler.refresh_prices().await;

        let c = clustering
            .get_by_token(Some("FrogAddr"), None, Chain::Solana)
            .unwrap();
        assert_eq!(c.price_current, None);
    }

    #[tokio::test]
    async fn test_outcomes_recorded_at_hour_mark() {
        let (scheduler, clustering, tracker, _) = setup(Arc::new(FixedMarket { price: 1.5 }));
        let start = Utc::now() - ChronoDuration::minutes(62);
        seed_cluster(&clustering, start);
        // One tracked call so the outcome lands somewhere
        tracker.record_call("s1", "chat", "channel", start);

        clustering.apply_price("FrogAddr", Chain::Solana, 1.0);
        clustering.apply_price("FrogAddr", Chain::Solana, 1.8);

        scheduler.track_outcomes_at(Utc::now());

        let stats = tracker.get("s1").unwrap();
        assert_eq!(stats.return_count, 1);
        assert_eq!(stats.successful_calls, 1);
        assert!((stats.avg_return - 0.8).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_outcomes_skip_young_and_old_clusters() {
        let (scheduler, clustering, tracker, _) = setup(Arc::new(FixedMarket { price: 1.5 }));
        tracker.record_call("s1", "chat", "channel", Utc::now());

        // Too young
        seed_cluster(&clustering, Utc::now() - ChronoDuration::minutes(10));
        clustering.apply_price("FrogAddr", Chain::Solana, 1.0);
        clustering.apply_price("FrogAddr", Chain::Solana, 2.0);

        scheduler.track_outcomes_at(Utc::now());
        assert_eq!(tracker.get("s1").unwrap().return_count, 0);
    }

    #[tokio::test]
    async fn test_snapshot_sources() {
        let (scheduler, _, tracker, sink) = setup(Arc::new(NoMarket));
        tracker.record_call("s1", "chat", "channel", Utc::now());
        tracker.record_call("s2", "chat2", "channel", Utc::now());

        scheduler.snapshot_sources().await;
        assert_eq!(sink.sources.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn test_retirement_sweep_persists_and_is_idempotent() {
        let (scheduler, clustering, _, sink) = setup(Arc::new(NoMarket));
        let start = Utc::now();
        seed_cluster(&clustering, start);

        let later = start + ChronoDuration::minutes(31);
        scheduler.retire_expired_at(later).await;
        assert_eq!(sink.clusters.load(Ordering::Relaxed), 1);
        assert!(clustering.is_empty());

        // Running the sweep again stores nothing new
        scheduler.retire_expired_at(later).await;
        assert_eq!(sink.clusters.load(Ordering::Relaxed), 1);
    }
}
