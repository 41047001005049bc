//! Cluster data types and the per-minute velocity window

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::extract::{Chain, ProcessedMessage, Sentiment};

/// Number of minute buckets considered for live velocity
pub const VELOCITY_WINDOW_MINUTES: i64 = 5;

/// Compact per-minute mention counter: a ring of 5 slots indexed by
/// `minute mod 5`. Slots outside the live window read as zero.
#[derive(Debug, Clone, Default)]
pub struct VelocityWindow {
    // (minute key, count); minute key 0 marks an empty slot
    slots: [(i64, u32); VELOCITY_WINDOW_MINUTES as usize],
}

impl VelocityWindow {
    /// Count a mention at the given minute; returns that minute's new total
    pub fn record(&mut self, minute_key: i64) -> u32 {
        let idx = (minute_key.rem_euclid(VELOCITY_WINDOW_MINUTES)) as usize;
        let (key, count) = &mut self.slots[idx];
        if *key == minute_key {
            *count += 1;
        } else {
            *key = minute_key;
            *count = 1;
        }
        self.slots[idx].1
    }

    /// Average mentions per minute over the last 5 minutes, zeros included
    pub fn mentions_per_minute(&self, now_minute: i64) -> f64 {
        let total: u32 = self
            .slots
            .iter()
            .filter(|(key, _)| *key > now_minute - VELOCITY_WINDOW_MINUTES && *key <= now_minute)
            .map(|(_, count)| *count)
            .sum();
        f64::from(total) / VELOCITY_WINDOW_MINUTES as f64
    }
}

/// Minute key for a timestamp: unix seconds / 60
pub fn minute_key(ts: DateTime<Utc>) -> i64 {
    ts.timestamp().div_euclid(60)
}

/// A surrounding-context message attached to a cluster by the contextual
/// scanner; preferred source for the feed's representative message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextMessage {
    pub text: String,
    pub source_name: String,
    pub timestamp: DateTime<Utc>,
    pub sentiment: Option<Sentiment>,
}

/// In-memory rolling aggregate of recent messages about one token on one
/// chain. Mutated only by the clustering engine.
#[derive(Debug, Clone)]
pub struct Cluster {
    pub id: String,
    pub token_address: Option<String>,
    pub token_symbol: Option<String>,
    pub chain: Chain,

    // Timing
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub peak_activity_time: Option<DateTime<Utc>>,

    // Collections
    pub messages: Vec<ProcessedMessage>,
    pub context_messages: Vec<ContextMessage>,
    pub source_ids: BTreeSet<String>,
    pub source_names: BTreeSet<String>,
    pub wallet_addresses: BTreeSet<String>,

    // Metrics
    pub total_mentions: u64,
    pub mentions_per_minute: f64,
    pub peak_mentions_per_minute: f64,

    // Sentiment counters; their sum must equal total_mentions
    pub sentiment_bullish: u64,
    pub sentiment_bearish: u64,
    pub sentiment_neutral: u64,

    // Scores, clamped to [0, 100]
    pub urgency_score: f64,
    pub novelty_score: f64,
    pub confidence_score: f64,
    pub priority_score: f64,

    // Price data
    pub price_at_first_mention: Option<f64>,
    pub price_at_peak: Option<f64>,
    pub price_current: Option<f64>,

    pub velocity: VelocityWindow,
}

impl Cluster {
    pub fn new(
        token_address: Option<String>,
        token_symbol: Option<String>,
        chain: Chain,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            token_address,
            token_symbol,
            chain,
            first_seen: timestamp,
            last_seen: timestamp,
            peak_activity_time: None,
            messages: Vec::new(),
            context_messages: Vec::new(),
            source_ids: BTreeSet::new(),
            source_names: BTreeSet::new(),
            wallet_addresses: BTreeSet::new(),
            total_mentions: 0,
            mentions_per_minute: 0.0,
            peak_mentions_per_minute: 0.0,
            sentiment_bullish: 0,
            sentiment_bearish: 0,
            sentiment_neutral: 0,
            urgency_score: 0.0,
            // New clusters start with maximum novelty
            novelty_score: 100.0,
            confidence_score: 0.0,
            priority_score: 0.0,
            price_at_first_mention: None,
            price_at_peak: None,
            price_current: None,
            velocity: VelocityWindow::default(),
        }
    }

    /// Age in whole seconds relative to `now`, never negative
    pub fn age_seconds(&self, now: DateTime<Utc>) -> f64 {
        (now - self.first_seen).num_milliseconds().max(0) as f64 / 1000.0
    }

    pub fn token_display(&self) -> &str {
        self.token_address
            .as_deref()
            .or(self.token_symbol.as_deref())
            .unwrap_or("unknown")
    }

    /// 1-hour return relative to the first-mention price, when both ends are
    /// known and the basis is non-zero
    pub fn return_since_first_mention(&self) -> Option<f64> {
        let first = self.price_at_first_mention?;
        let current = self.price_current?;
        if first == 0.0 {
            return None;
        }
        Some((current - first) / first)
    }
}

/// Immutable snapshot of a cluster for the persistence sink
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterSnapshot {
    pub id: String,
    pub token_address: Option<String>,
    pub token_symbol: Option<String>,
    pub chain: Chain,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub peak_activity_time: Option<DateTime<Utc>>,
    pub unique_sources: usize,
    pub total_mentions: u64,
    pub unique_wallets: usize,
    pub mentions_per_minute: f64,
    pub peak_mentions_per_minute: f64,
    pub priority_score: f64,
    pub urgency_score: f64,
    pub novelty_score: f64,
    pub confidence_score: f64,
    pub sentiment_bullish: u64,
    pub sentiment_bearish: u64,
    pub sentiment_neutral: u64,
    pub source_ids: Vec<String>,
    pub source_names: Vec<String>,
    pub wallet_addresses: Vec<String>,
    pub price_at_first_mention: Option<f64>,
    pub price_at_peak: Option<f64>,
    pub price_current: Option<f64>,
}

impl From<&Cluster> for ClusterSnapshot {
    fn from(c: &Cluster) -> Self {
        Self {
            id: c.id.clone(),
            token_address: c.token_address.clone(),
            token_symbol: c.token_symbol.clone(),
            chain: c.chain,
            first_seen: c.first_seen,
            last_seen: c.last_seen,
            peak_activity_time: c.peak_activity_time,
            unique_sources: c.source_ids.len(),
            total_mentions: c.total_mentions,
            unique_wallets: c.wallet_addresses.len(),
            mentions_per_minute: c.mentions_per_minute,
            peak_mentions_per_minute: c.peak_mentions_per_minute,
            priority_score: c.priority_score,
            urgency_score: c.urgency_score,
            novelty_score: c.novelty_score,
            confidence_score: c.confidence_score,
            sentiment_bullish: c.sentiment_bullish,
            sentiment_bearish: c.sentiment_bearish,
            sentiment_neutral: c.sentiment_neutral,
            source_ids: c.source_ids.iter().cloned().collect(),
            source_names: c.source_names.iter().cloned().collect(),
            wallet_addresses: c.wallet_addresses.iter().cloned().collect(),
            price_at_first_mention: c.price_at_first_mention,
            price_at_peak: c.price_at_peak,
            price_current: c.price_current,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_velocity_single_minute() {
        let mut w = VelocityWindow::default();
        let m = 1_000_000;
        w.record(m);
        w.record(m);
        w.record(m);
        assert!((w.mentions_per_minute(m) - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_velocity_five_distinct_minutes() {
        let mut w = VelocityWindow::default();
        let base = 1_000_000;
        for i in 0..5 {
            w.record(base + i);
        }
        assert!((w.mentions_per_minute(base + 4) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_velocity_old_slots_read_zero() {
        let mut w = VelocityWindow::default();
        w.record(100);
        // Ten minutes later the old bucket is out of the window
        assert_eq!(w.mentions_per_minute(110), 0.0);
    }

    #[test]
    fn test_velocity_slot_reuse() {
        let mut w = VelocityWindow::default();
        w.record(100);
        // Minute 105 maps to the same ring slot as 100
        let count = w.record(105);
        assert_eq!(count, 1);
        assert!((w.mentions_per_minute(105) - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_minute_key() {
        let ts = Utc.timestamp_opt(120, 0).unwrap();
        assert_eq!(minute_key(ts), 2);
    }

    #[test]
    fn test_return_since_first_mention() {
        let mut c = Cluster::new(Some("addr".into()), None, Chain::Solana, Utc::now());
        assert_eq!(c.return_since_first_mention(), None);

        c.price_at_first_mention = Some(2.0);
        c.price_current = Some(3.0);
        assert!((c.return_since_first_mention().unwrap() - 0.5).abs() < 1e-9);

        c.price_at_first_mention = Some(0.0);
        assert_eq!(c.return_since_first_mention(), None);
    }
}
