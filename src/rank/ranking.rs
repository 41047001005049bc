//! Ranking engine - composite priority, filtering and feed assembly

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::cluster::{priority_components, Cluster};
use crate::config::{RankingConfig, ScoringConfig};
use crate::extract::{Chain, Sentiment};
use crate::rank::feed::{
    FeedEntry, FeedMetrics, FeedSentiment, FeedTiming, FeedToken, TopSignal,
};
use crate::rank::spam::spam_score;
use crate::sources::SourceTracker;

/// Opinion keywords marking a message as actual discussion
const OPINION_WORDS: &[&str] = &[
    "bullish", "bearish", "ape", "buy", "sell", "moon", "pump", "dev", "team", "looks", "think",
    "feel", "entry", "target", "whale", "gem", "alpha", "early", "legit", "rug", "scam", "careful",
    "safe", "based",
];

/// URL fragments identifying bot/scan posts rather than discussion
const PLATFORM_URLS: &[&str] = &["pump.fun/", "dexscreener.com", "birdeye.so"];

/// Cluster filter criteria; defaults come from `RankingConfig`
#[derive(Debug, Clone)]
pub struct FilterCriteria {
    pub max_age_minutes: i64,
    pub min_score: f64,
    pub min_sources: usize,
    pub min_mentions: u64,
    pub chains: Option<Vec<Chain>>,
    pub exclude_flagged_sources: bool,
}

impl From<&RankingConfig> for FilterCriteria {
    fn from(config: &RankingConfig) -> Self {
        Self {
            max_age_minutes: config.max_age_minutes,
            min_score: config.min_score,
            min_sources: config.min_sources,
            min_mentions: config.min_mentions,
            chains: None,
            exclude_flagged_sources: config.exclude_flagged_sources,
        }
    }
}

/// Computes composite priority, filters, sorts, and assembles feed entries
pub struct RankingEngine {
    scoring: ScoringConfig,
    config: RankingConfig,
}

impl RankingEngine {
    pub fn new(scoring: ScoringConfig, config: RankingConfig) -> Self {
        Self { scoring, config }
    }

    pub fn default_criteria(&self) -> FilterCriteria {
        FilterCriteria::from(&self.config)
    }

    /// Composite priority for a cluster, with live trust and spam inputs
    pub fn priority_score(
        &self,
        cluster: &Cluster,
        tracker: &SourceTracker,
        now: DateTime<Utc>,
    ) -> f64 {
        let avg_trust = tracker.average_trust(cluster.source_ids.iter());
        let spam = spam_score(cluster);
        let breakdown = priority_components(cluster, now, avg_trust, spam, &self.scoring);
        let score = breakdown.total();

        debug!(
            cluster_id = %cluster.id,
            score,
            diversity = breakdown.source_diversity,
            recency = breakdown.recency,
            velocity = breakdown.velocity,
            wallets = breakdown.wallet_activity,
            quality = breakdown.source_quality,
            spam_penalty = breakdown.spam_penalty,
            "priority calculated"
        );

        score
    }

    /// Recompute priorities and sort descending. The sort is stable, so
    /// equal-priority clusters keep their input order.
    pub fn rank(
        &self,
        mut clusters: Vec<Cluster>,
        tracker: &SourceTracker,
        now: DateTime<Utc>,
    ) -> Vec<Cluster> {
        for cluster in &mut clusters {
            cluster.priority_score = self.priority_score(cluster, tracker, now);
        }
        clusters.sort_by(|a, b| {
            b.priority_score
                .partial_cmp(&a.priority_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        clusters
    }

    /// Apply the filter chain: age, score, sources, mentions, chains, and
    /// flagged sources. A multi-source cluster is kept even when one of its
    /// sources is flagged; a single-source cluster from a flagged source is
    /// dropped.
    pub fn filter(
        &self,
        clusters: Vec<Cluster>,
        criteria: &FilterCriteria,
        tracker: &SourceTracker,
        now: DateTime<Utc>,
    ) -> Vec<Cluster> {
        let max_age = Duration::minutes(criteria.max_age_minutes);

        clusters
            .into_iter()
            .filter(|c| now - c.first_seen <= max_age)
            .filter(|c| c.priority_score >= criteria.min_score)
            .filter(|c| c.source_ids.len() >= criteria.min_sources)
            .filter(|c| c.total_mentions >= criteria.min_mentions)
            .filter(|c| {
                criteria
                    .chains
                    .as_ref()
                    .map_or(true, |chains| chains.contains(&c.chain))
            })
            .filter(|c| {
                if !criteria.exclude_flagged_sources || c.source_ids.len() != 1 {
                    return true;
                }
                !c.source_ids.iter().all(|id| tracker.is_flagged(id))
            })
            .collect()
    }

    /// Rank, filter and assemble the top feed entries
    pub fn top_signals(
        &self,
        clusters: Vec<Cluster>,
        criteria: &FilterCriteria,
        tracker: &SourceTracker,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Vec<FeedEntry> {
        let ranked = self.rank(clusters, tracker, now);
        let filtered = self.filter(ranked, criteria, tracker, now);

        filtered
            .iter()
            .take(limit)
            .map(|c| self.feed_entry(c, now))
            .collect()
    }

    /// Build the feed payload for one cluster
    pub fn feed_entry(&self, cluster: &Cluster, now: DateTime<Utc>) -> FeedEntry {
        FeedEntry {
            cluster_id: cluster.id.clone(),
            token: FeedToken {
                address: cluster.token_address.clone(),
                symbol: cluster.token_symbol.clone(),
                chain: cluster.chain,
            },
            score: cluster.priority_score,
            metrics: FeedMetrics {
                unique_sources: cluster.source_ids.len(),
                total_mentions: cluster.total_mentions,
                unique_wallets: cluster.wallet_addresses.len(),
                velocity: cluster.mentions_per_minute,
            },
            sentiment: FeedSentiment {
                bullish: cluster.sentiment_bullish,
                bearish: cluster.sentiment_bearish,
                neutral: cluster.sentiment_neutral,
                overall: overall_sentiment(cluster).to_string(),
                percent_bullish: percent_bullish(cluster),
            },
            timing: FeedTiming {
                first_seen_iso: cluster.first_seen.to_rfc3339(),
                age_minutes: (now - cluster.first_seen).num_seconds().max(0) as f64 / 60.0,
            },
            top_signal: representative_message(cluster),
            sources: cluster.source_names.iter().take(5).cloned().collect(),
            wallets: cluster.wallet_addresses.iter().take(3).cloned().collect(),
        }
    }
}

fn count_opinion_words(text_lower: &str) -> usize {
    OPINION_WORDS
        .iter()
        .filter(|w| text_lower.contains(*w))
        .count()
}

fn has_platform_url(text_lower: &str) -> bool {
    PLATFORM_URLS.iter().any(|u| text_lower.contains(u))
}

/// Pick the best message to show as a cluster's top signal. Surrounding
/// context beats in-cluster messages, discussion beats bot scans, and the
/// last message is the fallback of last resort.
pub fn representative_message(cluster: &Cluster) -> TopSignal {
    // Contextual discussion first
    let mut best: Option<(&crate::cluster::ContextMessage, f64)> = None;
    for ctx in &cluster.context_messages {
        if ctx.text.len() < 20 {
            continue;
        }
        let lower = ctx.text.to_lowercase();
        if has_platform_url(&lower) || lower.contains("http") {
            continue;
        }
        if ctx.text.matches('/').count() > 3 {
            continue;
        }

        let mut score = (ctx.text.chars().count() as f64).min(300.0);
        score += 40.0 * count_opinion_words(&lower) as f64;
        if matches!(ctx.sentiment, Some(Sentiment::Bullish) | Some(Sentiment::Bearish)) {
            score += 50.0;
        }

        if best.map_or(true, |(_, s)| score > s) {
            best = Some((ctx, score));
        }
    }

    if let Some((ctx, score)) = best {
        if score > 80.0 {
            return TopSignal {
                text: truncate(&ctx.text, 500),
                source: ctx.source_name.clone(),
                is_discussion: true,
            };
        }
    }

    // Most recent of the last 10 in-cluster messages that reads like
    // discussion: no platform link, and opinionated or long enough
    for msg in cluster.messages.iter().rev().take(10) {
        let text = &msg.original_text;
        if text.is_empty() {
            continue;
        }
        let lower = text.to_lowercase();
        if has_platform_url(&lower) {
            continue;
        }
        let has_opinion = count_opinion_words(&lower) > 0;
        if has_opinion || text.chars().count() > 100 {
            return TopSignal {
                text: truncate(text, 500),
                source: msg.source_name.clone(),
                is_discussion: has_opinion,
            };
        }
    }

    // Last resort
    if let Some(msg) = cluster.messages.last() {
        return TopSignal {
            text: truncate(&msg.original_text, 500),
            source: msg.source_name.clone(),
            is_discussion: false,
        };
    }

    TopSignal {
        text: String::new(),
        source: "Unknown".into(),
        is_discussion: false,
    }
}

/// Overall polarity: one side must outnumber the other two-to-one
pub fn overall_sentiment(cluster: &Cluster) -> Sentiment {
    let total = cluster.sentiment_bullish + cluster.sentiment_bearish + cluster.sentiment_neutral;
    if total == 0 {
        return Sentiment::Neutral;
    }
    if cluster.sentiment_bullish > cluster.sentiment_bearish * 2 {
        Sentiment::Bullish
    } else if cluster.sentiment_bearish > cluster.sentiment_bullish * 2 {
        Sentiment::Bearish
    } else {
        Sentiment::Neutral
    }
}

/// Bullish share of all counted sentiment, in percent; 50 when empty
pub fn percent_bullish(cluster: &Cluster) -> f64 {
    let total = cluster.sentiment_bullish + cluster.sentiment_bearish + cluster.sentiment_neutral;
    if total == 0 {
        50.0
    } else {
        cluster.sentiment_bullish as f64 / total as f64 * 100.0
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        text.chars().take(max).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{priority_components, ClusteringEngine, ContextMessage};
    use crate::config::{ClusteringConfig, ReputationConfig};
    use crate::extract::{Extractor, MatchSource, RawMessage, TokenRef};

    fn make_cluster(
        texts: &[(&str, &str)], // (text, source_id)
        address: &str,
        now: DateTime<Utc>,
    ) -> Cluster {
        let engine = ClusteringEngine::new(&ClusteringConfig::default(), ScoringConfig::default());
        let extractor = Extractor::new(Chain::Solana);
        let token = TokenRef {
            symbol: Some("FROG".into()),
            address: Some(address.into()),
            chain: Chain::Solana,
            confidence: 0.95,
            match_source: MatchSource::CaPrefix,
        };
        let mut last = None;
        for (i, (text, source)) in texts.iter().enumerate() {
            let msg = extractor.process(&RawMessage {
                id: format!("m{i}"),
                source_id: (*source).into(),
                source_name: format!("chat-{source}"),
                timestamp: now,
                text: (*text).into(),
                reply_to_id: None,
            });
            last = Some(engine.add_message_at(&msg, &token, now).cluster);
        }
        last.unwrap()
    }

    fn ranking() -> RankingEngine {
        RankingEngine::new(ScoringConfig::default(), RankingConfig::default())
    }

    fn tracker() -> SourceTracker {
        SourceTracker::new(ReputationConfig::default())
    }

    #[test]
    fn test_saturated_components_reach_one_hundred() {
        // S=5, V=5, W=3, age=0, trust=100, spam=0 saturates every component
        let now = Utc::now();
        let mut cluster = make_cluster(
            &[
                ("a", "s1"),
                ("b", "s2"),
                ("c", "s3"),
                ("d", "s4"),
                ("e", "s5"),
            ],
            "AddrE",
            now,
        );
        cluster.mentions_per_minute = 5.0;
        cluster.wallet_addresses = ["w1", "w2", "w3"].iter().map(|s| s.to_string()).collect();

        let breakdown = priority_components(&cluster, now, 100.0, 0.0, &ScoringConfig::default());
        assert!((breakdown.total() - 100.0).abs() < 1e-9);

        // Full spam penalty clamps at 70
        let spammy = priority_components(&cluster, now, 100.0, 1.0, &ScoringConfig::default());
        assert!((spammy.total() - 70.0).abs() < 1e-9);
    }

    #[test]
    fn test_priority_never_negative() {
        let now = Utc::now();
        let mut cluster = make_cluster(&[("giveaway verify wallet airdrop", "s1")], "AddrN", now);
        cluster.first_seen = now - Duration::hours(3);

        let breakdown = priority_components(&cluster, now, 0.0, 1.0, &ScoringConfig::default());
        assert_eq!(breakdown.total(), 0.0);
    }

    #[test]
    fn test_rank_sorts_descending() {
        let now = Utc::now();
        let busy = make_cluster(
            &[("a", "s1"), ("b", "s2"), ("c", "s3"), ("d", "s4")],
            "AddrBusy",
            now,
        );
        let quiet = make_cluster(&[("a", "s1")], "AddrQuiet", now);

        let ranked = ranking().rank(vec![quiet, busy], &tracker(), now);
        assert_eq!(ranked[0].token_address.as_deref(), Some("AddrBusy"));
        assert!(ranked[0].priority_score >= ranked[1].priority_score);
    }

    #[test]
    fn test_filter_by_age_and_mentions() {
        let now = Utc::now();
        let mut old = make_cluster(&[("a", "s1")], "AddrOld", now);
        old.first_seen = now - Duration::minutes(90);
        let fresh = make_cluster(&[("a", "s1"), ("b", "s1")], "AddrFresh", now);

        let criteria = FilterCriteria {
            max_age_minutes: 60,
            min_score: 0.0,
            min_sources: 1,
            min_mentions: 2,
            chains: None,
            exclude_flagged_sources: false,
        };
        let kept = ranking().filter(vec![old, fresh], &criteria, &tracker(), now);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].token_address.as_deref(), Some("AddrFresh"));
    }

    #[test]
    fn test_filter_chain_set() {
        let now = Utc::now();
        let cluster = make_cluster(&[("a", "s1")], "AddrC", now);

        let mut criteria = ranking().default_criteria();
        criteria.chains = Some(vec![Chain::Base]);
        let kept = ranking().filter(vec![cluster.clone()], &criteria, &tracker(), now);
        assert!(kept.is_empty());

        criteria.chains = Some(vec![Chain::Solana, Chain::Base]);
        let kept = ranking().filter(vec![cluster], &criteria, &tracker(), now);
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn test_flagged_single_source_dropped_multi_source_kept() {
        let now = Utc::now();
        let t = tracker();
        for _ in 0..10 {
            t.record_call("bad", "Bad Chat", "channel", now);
            t.record_outcome("bad", -0.5, None);
        }
        assert!(t.is_flagged("bad"));

        let solo = make_cluster(&[("a", "bad")], "AddrSolo", now);
        let mixed = make_cluster(&[("a", "bad"), ("b", "good")], "AddrMixed", now);

        let criteria = ranking().default_criteria();
        let kept = ranking().filter(vec![solo, mixed], &criteria, &t, now);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].token_address.as_deref(), Some("AddrMixed"));
    }

    #[test]
    fn test_representative_prefers_context_discussion() {
        let now = Utc::now();
        let mut cluster = make_cluster(
            &[("https://pump.fun/coin/7GCihgDB8fe6KNjn2MYtkzZcRjQy3t9GHdC8uHYmW2hr", "s1")],
            "AddrR",
            now,
        );
        cluster.context_messages.push(ContextMessage {
            text: "honestly this dev has shipped before, team looks legit and entry here \
                   feels early, thinking about a starter bag"
                .into(),
            source_name: "chat-s1".into(),
            timestamp: now,
            sentiment: Some(Sentiment::Bullish),
        });

        let signal = representative_message(&cluster);
        assert!(signal.is_discussion);
        assert!(signal.text.contains("dev has shipped"));
    }

    #[test]
    fn test_representative_falls_back_to_opinionated_message() {
        let now = Utc::now();
        let cluster = make_cluster(
            &[
                ("https://pump.fun/coin/7GCihgDB8fe6KNjn2MYtkzZcRjQy3t9GHdC8uHYmW2hr", "s1"),
                ("this looks like a gem, thinking of an entry", "s2"),
            ],
            "AddrR2",
            now,
        );

        let signal = representative_message(&cluster);
        assert!(signal.is_discussion);
        assert!(signal.text.contains("looks like a gem"));
        assert_eq!(signal.source, "chat-s2");
    }

    #[test]
    fn test_representative_last_resort() {
        let now = Utc::now();
        let cluster = make_cluster(&[("ok", "s1")], "AddrR3", now);
        let signal = representative_message(&cluster);
        assert_eq!(signal.text, "ok");
        assert!(!signal.is_discussion);
    }

    #[test]
    fn test_feed_entry_shape() {
        let now = Utc::now();
        let cluster = make_cluster(
            &[
                ("mooning hard, lfg", "s1"),
                ("rug vibes, careful", "s2"),
                ("just watching this", "s3"),
            ],
            "AddrF",
            now,
        );

        let entry = ranking().feed_entry(&cluster, now);
        assert_eq!(entry.metrics.unique_sources, 3);
        assert_eq!(entry.metrics.total_mentions, 3);
        assert_eq!(
            entry.sentiment.bullish + entry.sentiment.bearish + entry.sentiment.neutral,
            3
        );
        assert!((entry.sentiment.percent_bullish - 100.0 / 3.0).abs() < 1e-9);
        assert!(entry.sources.len() <= 5);
        assert!(entry.wallets.len() <= 3);
        assert!(entry.timing.age_minutes >= 0.0);

        let json = serde_json::to_value(&entry).unwrap();
        assert!(json.get("cluster_id").is_some());
        assert!(json["token"]["chain"].as_str() == Some("solana"));
    }

    #[test]
    fn test_overall_sentiment_requires_two_to_one() {
        let now = Utc::now();
        let mut cluster = make_cluster(&[("a", "s1")], "AddrS", now);
        cluster.sentiment_bullish = 5;
        cluster.sentiment_bearish = 2;
        cluster.sentiment_neutral = 0;
        assert_eq!(overall_sentiment(&cluster), Sentiment::Bullish);

        cluster.sentiment_bullish = 3;
        cluster.sentiment_bearish = 2;
        assert_eq!(overall_sentiment(&cluster), Sentiment::Neutral);
    }
}
