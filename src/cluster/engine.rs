//! Clustering engine - per-token rolling aggregates with velocity tracking
//!
//! The active-cluster map is keyed by `address:chain` (or `$symbol:chain`);
//! per-key entry locks serialize mutations, so readers see either the
//! pre-Add or post-Add state of a cluster, never a half-applied one.

use chrono::{DateTime, Duration, TimeZone, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, error, info};

use crate::cluster::types::{minute_key, Cluster};
use crate::config::{ClusteringConfig, ScoringConfig};
use crate::extract::{Chain, ProcessedMessage, Sentiment, TokenRef};

/// Trust assumed for sources the reputation tracker has not seen
pub const DEFAULT_TRUST: f64 = 50.0;

/// Priority score component breakdown
#[derive(Debug, Clone, Copy)]
pub struct ScoreBreakdown {
    pub source_diversity: f64,
    pub recency: f64,
    pub velocity: f64,
    pub wallet_activity: f64,
    pub source_quality: f64,
    pub spam_penalty: f64,
}

impl ScoreBreakdown {
    /// Composite priority, clamped to [0, 100]
    pub fn total(&self) -> f64 {
        let raw = self.source_diversity
            + self.recency
            + self.velocity
            + self.wallet_activity
            + self.source_quality
            + self.spam_penalty;
        raw.clamp(0.0, 100.0)
    }
}

/// Compute priority components for a cluster at a point in time.
/// `avg_trust` defaults to 50 when the tracker knows none of the sources;
/// `spam` is the spam detector output in [0, 1].
pub fn priority_components(
    cluster: &Cluster,
    now: DateTime<Utc>,
    avg_trust: f64,
    spam: f64,
    scoring: &ScoringConfig,
) -> ScoreBreakdown {
    let age_seconds = cluster.age_seconds(now);

    let source_diversity =
        (cluster.source_ids.len() as f64 / 5.0).min(1.0) * scoring.source_diversity_weight;
    let recency = (1.0 - age_seconds / 3600.0).max(0.0) * scoring.recency_weight;
    let velocity = (cluster.mentions_per_minute / 5.0).min(1.0) * scoring.velocity_weight;
    let wallet_activity =
        (cluster.wallet_addresses.len() as f64 / 3.0).min(1.0) * scoring.wallet_activity_weight;
    let source_quality = (avg_trust / 100.0) * scoring.source_quality_weight;
    let spam_penalty = spam * scoring.spam_penalty_weight;

    ScoreBreakdown {
        source_diversity,
        recency,
        velocity,
        wallet_activity,
        source_quality,
        spam_penalty,
    }
}

/// Result of adding one message to one token's cluster
#[derive(Debug)]
pub struct AddResult {
    /// Post-Add snapshot of the affected cluster
    pub cluster: Cluster,
    /// Clusters retired as a side effect (stale key hit or quarantine)
    pub retired: Vec<Cluster>,
}

/// Maintains the active cluster per token key
pub struct ClusteringEngine {
    window: Duration,
    scoring: ScoringConfig,
    clusters: DashMap<String, Cluster>,
}

impl ClusteringEngine {
    pub fn new(config: &ClusteringConfig, scoring: ScoringConfig) -> Self {
        Self {
            window: Duration::minutes(config.cluster_window_minutes as i64),
            scoring,
            clusters: DashMap::new(),
        }
    }

    /// Cluster key: prefer `address:chain`, else `$symbol:chain`, else a
    /// random key so unkeyable mentions never merge.
    pub fn cluster_key(address: Option<&str>, symbol: Option<&str>, chain: Chain) -> String {
        if let Some(address) = address {
            format!("{address}:{chain}")
        } else if let Some(symbol) = symbol {
            format!("${symbol}:{chain}")
        } else {
            format!("unknown:{chain}:{:08x}", rand::random::<u32>())
        }
    }

    /// Add a message to every token's cluster; one result per token ref
    pub fn process_message(&self, message: &ProcessedMessage) -> Vec<AddResult> {
        self.process_message_at(message, Utc::now())
    }

    pub fn process_message_at(
        &self,
        message: &ProcessedMessage,
        now: DateTime<Utc>,
    ) -> Vec<AddResult> {
        message
            .tokens
            .iter()
            .map(|token| self.add_message_at(message, token, now))
            .collect()
    }

    /// Add one message under one token reference
    pub fn add_message(&self, message: &ProcessedMessage, token: &TokenRef) -> AddResult {
        self.add_message_at(message, token, Utc::now())
    }

    pub fn add_message_at(
        &self,
        message: &ProcessedMessage,
        token: &TokenRef,
        now: DateTime<Utc>,
    ) -> AddResult {
        let key = Self::cluster_key(token.address.as_deref(), token.symbol.as_deref(), token.chain);
        let mut retired = Vec::new();

        let snapshot = {
            let mut entry = match self.clusters.entry(key.clone()) {
                Entry::Occupied(mut occupied) => {
                    if now - occupied.get().last_seen > self.window {
                        // Stale cluster under this key: retire it and start fresh
                        let fresh = Cluster::new(
                            token.address.clone(),
                            token.symbol.clone(),
                            token.chain,
                            now,
                        );
                        let old = std::mem::replace(occupied.get_mut(), fresh);
                        info!(
                            cluster_id = %old.id,
                            token = %old.token_display(),
                            "cluster retired on stale key hit"
                        );
                        retired.push(old);
                    }
                    occupied.into_ref()
                }
                Entry::Vacant(vacant) => {
                    let cluster = Cluster::new(
                        token.address.clone(),
                        token.symbol.clone(),
                        token.chain,
                        now,
                    );
                    info!(
                        cluster_id = %cluster.id,
                        token = %cluster.token_display(),
                        chain = %token.chain,
                        "cluster created"
                    );
                    vacant.insert(cluster)
                }
            };

            let cluster = entry.value_mut();
            // A symbol learned later fills in a symbol-less cluster
            if cluster.token_symbol.is_none() {
                cluster.token_symbol = token.symbol.clone();
            }
            self.update_cluster(cluster, message, now);
            cluster.clone()
        };

        if let Some(detail) = verify_invariants(&snapshot) {
            error!(
                cluster_id = %snapshot.id,
                detail = %detail,
                "cluster invariant violated, quarantining"
            );
            if let Some((_, quarantined)) = self.clusters.remove(&key) {
                retired.push(quarantined);
            }
        }

        AddResult {
            cluster: snapshot,
            retired,
        }
    }

    fn update_cluster(&self, cluster: &mut Cluster, message: &ProcessedMessage, now: DateTime<Utc>) {
        cluster.messages.push(message.clone());
        cluster.last_seen = now;
        cluster.total_mentions += 1;

        cluster.source_ids.insert(message.source_id.clone());
        if !message.source_name.is_empty() {
            cluster.source_names.insert(message.source_name.clone());
        }
        for wallet in &message.wallets {
            cluster.wallet_addresses.insert(wallet.address.clone());
        }

        match message.sentiment.polarity {
            Sentiment::Bullish => cluster.sentiment_bullish += 1,
            Sentiment::Bearish => cluster.sentiment_bearish += 1,
            Sentiment::Neutral => cluster.sentiment_neutral += 1,
        }

        // Velocity: bump the minute bucket, then track the peak minute
        let minute = minute_key(now);
        let minute_count = cluster.velocity.record(minute);
        cluster.mentions_per_minute = cluster.velocity.mentions_per_minute(minute);
        if f64::from(minute_count) > cluster.peak_mentions_per_minute {
            cluster.peak_mentions_per_minute = f64::from(minute_count);
            cluster.peak_activity_time = Utc.timestamp_opt(minute * 60, 0).single();
        }

        self.recompute_scores(cluster, now);

        debug!(
            cluster_id = %cluster.id,
            mentions = cluster.total_mentions,
            velocity = cluster.mentions_per_minute,
            priority = cluster.priority_score,
            "cluster updated"
        );
    }

    fn recompute_scores(&self, cluster: &mut Cluster, now: DateTime<Utc>) {
        let age_seconds = cluster.age_seconds(now);

        cluster.confidence_score = (cluster.source_ids.len() as f64 * 15.0).min(100.0);
        cluster.novelty_score = (100.0 - age_seconds / 60.0).max(0.0);

        let breakdown =
            priority_components(cluster, now, DEFAULT_TRUST, 0.0, &self.scoring);
        cluster.urgency_score = ((breakdown.velocity + breakdown.recency) * 1.5).min(100.0);
        // Provisional priority; ranking recomputes with live trust and spam
        cluster.priority_score = breakdown.total();
    }

    /// Refresh the time-decayed scores of every active cluster
    pub fn refresh_scores_at(&self, now: DateTime<Utc>) {
        for mut entry in self.clusters.iter_mut() {
            self.recompute_scores(entry.value_mut(), now);
        }
    }

    /// Snapshot all active clusters
    pub fn active_clusters(&self) -> Vec<Cluster> {
        self.clusters.iter().map(|e| e.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    /// Snapshot the cluster for a specific token, if active
    pub fn get_by_token(
        &self,
        address: Option<&str>,
        symbol: Option<&str>,
        chain: Chain,
    ) -> Option<Cluster> {
        let key = Self::cluster_key(address, symbol, chain);
        self.clusters.get(&key).map(|e| e.value().clone())
    }

    /// Addresses of active clusters, for batched price refresh
    pub fn clusters_with_addresses(&self) -> Vec<(String, Chain)> {
        self.clusters
            .iter()
            .filter_map(|e| {
                e.value()
                    .token_address
                    .as_ref()
                    .map(|a| (a.clone(), e.value().chain))
            })
            .collect()
    }

    /// Record a fresh price observation for a token's active cluster
    pub fn apply_price(&self, address: &str, chain: Chain, price: f64) {
        let key = Self::cluster_key(Some(address), None, chain);
        if let Some(mut entry) = self.clusters.get_mut(&key) {
            let cluster = entry.value_mut();
            cluster.price_current = Some(price);
            if cluster.price_at_first_mention.is_none() {
                cluster.price_at_first_mention = Some(price);
            }
            cluster.price_at_peak = Some(cluster.price_at_peak.map_or(price, |p| p.max(price)));
        }
    }

    /// Attach surrounding-context messages discovered by the scanner
    pub fn attach_context(
        &self,
        address: &str,
        chain: Chain,
        context: Vec<crate::cluster::types::ContextMessage>,
    ) {
        let key = Self::cluster_key(Some(address), None, chain);
        if let Some(mut entry) = self.clusters.get_mut(&key) {
            entry.value_mut().context_messages.extend(context);
        }
    }

    /// Retire every cluster whose last activity fell out of the window.
    /// Safe to run concurrently with Adds and idempotent per cluster.
    pub fn retire_expired(&self) -> Vec<Cluster> {
        self.retire_expired_at(Utc::now())
    }

    pub fn retire_expired_at(&self, now: DateTime<Utc>) -> Vec<Cluster> {
        let stale_keys: Vec<String> = self
            .clusters
            .iter()
            .filter(|e| now - e.value().last_seen > self.window)
            .map(|e| e.key().clone())
            .collect();

        let mut retired = Vec::new();
        for key in stale_keys {
            // Re-check under the entry lock; an Add may have revived the key
            if let Some((_, cluster)) = self
                .clusters
                .remove_if(&key, |_, c| now - c.last_seen > self.window)
            {
                info!(
                    cluster_id = %cluster.id,
                    token = %cluster.token_display(),
                    total_mentions = cluster.total_mentions,
                    unique_sources = cluster.source_ids.len(),
                    "cluster retired"
                );
                retired.push(cluster);
            }
        }
        retired
    }
}

/// Check the internal consistency of a cluster; Some(detail) on violation
fn verify_invariants(cluster: &Cluster) -> Option<String> {
    let triad = cluster.sentiment_bullish + cluster.sentiment_bearish + cluster.sentiment_neutral;
    if triad != cluster.total_mentions {
        return Some(format!(
            "sentiment counters {triad} drifted from total_mentions {}",
            cluster.total_mentions
        ));
    }
    if cluster.last_seen < cluster.first_seen {
        return Some("last_seen precedes first_seen".into());
    }
    for (name, score) in [
        ("urgency", cluster.urgency_score),
        ("novelty", cluster.novelty_score),
        ("confidence", cluster.confidence_score),
        ("priority", cluster.priority_score),
    ] {
        if !(0.0..=100.0).contains(&score) {
            return Some(format!("{name} score {score} out of range"));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{Chain, Extractor, RawMessage};

    fn engine() -> ClusteringEngine {
        ClusteringEngine::new(&ClusteringConfig::default(), ScoringConfig::default())
    }

    fn processed(text: &str, source_id: &str, ts: DateTime<Utc>) -> ProcessedMessage {
        Extractor::new(Chain::Solana).process(&RawMessage {
            id: uuid::Uuid::new_v4().to_string(),
            source_id: source_id.into(),
            source_name: format!("chat-{source_id}"),
            timestamp: ts,
            text: text.into(),
            reply_to_id: None,
        })
    }

    fn token(address: &str) -> TokenRef {
        TokenRef {
            symbol: None,
            address: Some(address.into()),
            chain: Chain::Solana,
            confidence: 0.95,
            match_source: crate::extract::MatchSource::CaPrefix,
        }
    }

    #[test]
    fn test_new_cluster_starts_with_full_novelty() {
        let e = engine();
        let now = Utc::now();
        let result = e.add_message_at(&processed("gm $FROG", "s1", now), &token("AddrOne"), now);
        assert_eq!(result.cluster.total_mentions, 1);
        assert!((result.cluster.novelty_score - 100.0).abs() < 1e-6);
        assert!(result.retired.is_empty());
    }

    #[test]
    fn test_sentiment_counter_identity() {
        let e = engine();
        let now = Utc::now();
        let texts = [
            "mooning hard, lfg",
            "this is a rug, avoid",
            "just watching for now",
            "gem alpha entry",
            "dev dumped everything",
        ];
        for (i, text) in texts.iter().enumerate() {
            let msg = processed(text, &format!("s{i}"), now);
            let result = e.add_message_at(&msg, &token("AddrOne"), now);
            let c = &result.cluster;
            assert_eq!(
                c.sentiment_bullish + c.sentiment_bearish + c.sentiment_neutral,
                c.total_mentions
            );
        }
    }

    #[test]
    fn test_stale_key_retires_and_restarts() {
        let e = engine();
        let t0 = Utc::now();
        let t1 = t0 + Duration::minutes(10);
        let t2 = t0 + Duration::minutes(45);

        e.add_message_at(&processed("msg one", "s1", t0), &token("AddrOne"), t0);
        let r1 = e.add_message_at(&processed("msg two", "s1", t1), &token("AddrOne"), t1);
        assert_eq!(r1.cluster.total_mentions, 2);
        let first_id = r1.cluster.id.clone();

        // 35 minutes after last_seen: the old cluster retires, a new one begins
        let r2 = e.add_message_at(&processed("msg three", "s1", t2), &token("AddrOne"), t2);
        assert_eq!(r2.retired.len(), 1);
        assert_eq!(r2.retired[0].id, first_id);
        assert_eq!(r2.retired[0].total_mentions, 2);
        assert_ne!(r2.cluster.id, first_id);
        assert_eq!(r2.cluster.total_mentions, 1);
        assert!((r2.cluster.novelty_score - 100.0).abs() < 1e-6);
    }

    #[test]
    fn test_velocity_window_and_peak() {
        let e = engine();
        let base = Utc::now();
        // Align to a minute start so all five adds land in distinct minutes
        let base = base - Duration::seconds(base.timestamp().rem_euclid(60));

        let mut last = base;
        for i in 0..5 {
            last = base + Duration::minutes(i);
            e.add_message_at(&processed(&format!("m{i}"), "s1", last), &token("AddrOne"), last);
        }
        let c = e.get_by_token(Some("AddrOne"), None, Chain::Solana).unwrap();
        assert!((c.mentions_per_minute - 1.0).abs() < 1e-9);
        assert!((c.peak_mentions_per_minute - 1.0).abs() < 1e-9);

        // A sixth add in the same final minute raises the peak to 2
        let r = e.add_message_at(&processed("m5", "s1", last), &token("AddrOne"), last);
        assert!(r.cluster.peak_mentions_per_minute >= 2.0);
        assert_eq!(
            minute_key(r.cluster.peak_activity_time.unwrap()),
            minute_key(last)
        );
    }

    #[test]
    fn test_novelty_non_increasing() {
        let e = engine();
        let t0 = Utc::now();
        e.add_message_at(&processed("gm", "s1", t0), &token("AddrOne"), t0);

        let mut last = f64::INFINITY;
        for mins in [0i64, 5, 20, 60, 120] {
            e.refresh_scores_at(t0 + Duration::minutes(mins));
            let c = e.get_by_token(Some("AddrOne"), None, Chain::Solana).unwrap();
            assert!(c.novelty_score <= last);
            assert!((0.0..=100.0).contains(&c.novelty_score));
            last = c.novelty_score;
        }
    }

    #[test]
    fn test_priority_bounds_under_load() {
        let e = engine();
        let now = Utc::now();
        for i in 0..50 {
            let msg = processed(
                "moon gem alpha 100x whale \u{1F680}",
                &format!("s{}", i % 7),
                now,
            );
            let r = e.add_message_at(&msg, &token("AddrOne"), now);
            assert!((0.0..=100.0).contains(&r.cluster.priority_score));
            assert!((0.0..=100.0).contains(&r.cluster.urgency_score));
            assert!((0.0..=100.0).contains(&r.cluster.confidence_score));
        }
    }

    #[test]
    fn test_symbol_and_address_key_separation() {
        let e = engine();
        let now = Utc::now();
        let sym_token = TokenRef {
            symbol: Some("FROG".into()),
            address: None,
            chain: Chain::Solana,
            confidence: 0.5,
            match_source: crate::extract::MatchSource::Symbol,
        };
        e.add_message_at(&processed("a", "s1", now), &sym_token, now);
        e.add_message_at(&processed("b", "s1", now), &token("AddrOne"), now);
        assert_eq!(e.len(), 2);
    }

    #[test]
    fn test_periodic_retirement_idempotent() {
        let e = engine();
        let t0 = Utc::now();
        e.add_message_at(&processed("gm", "s1", t0), &token("AddrOne"), t0);

        let later = t0 + Duration::minutes(31);
        let first = e.retire_expired_at(later);
        assert_eq!(first.len(), 1);
        let second = e.retire_expired_at(later);
        assert!(second.is_empty());
        assert!(e.is_empty());
    }

    #[test]
    fn test_apply_price_tracks_first_and_peak() {
        let e = engine();
        let now = Utc::now();
        e.add_message_at(&processed("gm", "s1", now), &token("AddrOne"), now);

        e.apply_price("AddrOne", Chain::Solana, 2.0);
        e.apply_price("AddrOne", Chain::Solana, 5.0);
        e.apply_price("AddrOne", Chain::Solana, 3.0);

        let c = e.get_by_token(Some("AddrOne"), None, Chain::Solana).unwrap();
        assert_eq!(c.price_at_first_mention, Some(2.0));
        assert_eq!(c.price_at_peak, Some(5.0));
        assert_eq!(c.price_current, Some(3.0));
        assert!((c.return_since_first_mention().unwrap() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_key_never_merges() {
        let a = ClusteringEngine::cluster_key(None, None, Chain::Solana);
        let b = ClusteringEngine::cluster_key(None, None, Chain::Solana);
        assert_ne!(a, b);
    }
}
