//! Source reputation tracking
//!
//! Per-source counters and derived scores. Returns and time-to-move are kept
//! as rolling means (count + mean) so long streams never accumulate error in
//! a single running float; a capped recent-returns list rides along for
//! snapshots.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{debug, info};

use crate::config::ReputationConfig;

/// Recent returns kept per source for snapshots
const RECENT_RETURNS_CAP: usize = 500;

/// Per-source statistics. Created on first observed call, never destroyed
/// within the process lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceStats {
    pub source_id: String,
    pub name: String,
    pub source_type: String,

    // Performance
    pub total_calls: u64,
    pub successful_calls: u64,
    pub failed_calls: u64,

    // Returns (rolling mean + capped recent list)
    pub return_count: u64,
    pub recent_returns: VecDeque<f64>,

    // Timing
    pub first_tracked: DateTime<Utc>,
    pub last_call: Option<DateTime<Utc>>,
    pub time_to_move_count: u64,
    pub mean_time_to_move: f64,

    // Computed scores
    pub hit_rate: f64,
    pub avg_return: f64,
    pub speed_score: f64,
    pub trust_score: f64,

    // Flags
    pub is_flagged: bool,
    pub flag_reason: Option<String>,
}

impl SourceStats {
    fn new(source_id: String, name: String, source_type: String, now: DateTime<Utc>) -> Self {
        Self {
            source_id,
            name,
            source_type,
            total_calls: 0,
            successful_calls: 0,
            failed_calls: 0,
            return_count: 0,
            recent_returns: VecDeque::new(),
            first_tracked: now,
            last_call: None,
            time_to_move_count: 0,
            mean_time_to_move: 0.0,
            hit_rate: 0.5,
            avg_return: 0.0,
            speed_score: 50.0,
            trust_score: 50.0,
            is_flagged: false,
            flag_reason: None,
        }
    }
}

/// Tracks calling accuracy and trust per source
pub struct SourceTracker {
    config: ReputationConfig,
    sources: DashMap<String, SourceStats>,
}

impl SourceTracker {
    pub fn new(config: ReputationConfig) -> Self {
        Self {
            config,
            sources: DashMap::new(),
        }
    }

    /// Record a new call from a source
    pub fn record_call(
        &self,
        source_id: &str,
        name: &str,
        source_type: &str,
        timestamp: DateTime<Utc>,
    ) {
        let mut entry = self
            .sources
            .entry(source_id.to_string())
            .or_insert_with(|| {
                SourceStats::new(
                    source_id.to_string(),
                    name.to_string(),
                    source_type.to_string(),
                    Utc::now(),
                )
            });

        let stats = entry.value_mut();
        stats.total_calls += 1;
        stats.last_call = Some(timestamp);

        debug!(
            source_id,
            name, total_calls = stats.total_calls, "source call recorded"
        );
    }

    /// Record the outcome of a call. Unknown sources are ignored.
    pub fn record_outcome(
        &self,
        source_id: &str,
        return_pct: f64,
        time_to_move_seconds: Option<f64>,
    ) {
        let Some(mut entry) = self.sources.get_mut(source_id) else {
            return;
        };
        let stats = entry.value_mut();

        // Rolling mean over returns
        stats.return_count += 1;
        stats.avg_return += (return_pct - stats.avg_return) / stats.return_count as f64;
        stats.recent_returns.push_back(return_pct);
        while stats.recent_returns.len() > RECENT_RETURNS_CAP {
            stats.recent_returns.pop_front();
        }

        if let Some(secs) = time_to_move_seconds {
            stats.time_to_move_count += 1;
            stats.mean_time_to_move +=
                (secs - stats.mean_time_to_move) / stats.time_to_move_count as f64;
        }

        if return_pct >= self.config.success_threshold {
            stats.successful_calls += 1;
        } else if return_pct <= self.config.failure_threshold {
            stats.failed_calls += 1;
        }

        self.recalculate(stats);

        debug!(
            source_id,
            return_pct,
            hit_rate = stats.hit_rate,
            trust = stats.trust_score,
            "source outcome recorded"
        );
    }

    fn recalculate(&self, stats: &mut SourceStats) {
        if stats.total_calls > 0 {
            stats.hit_rate = stats.successful_calls as f64 / stats.total_calls as f64;
        }

        if stats.time_to_move_count > 0 {
            // <= 60s reads ~100, >= 3600s reads 0
            stats.speed_score = (100.0 - stats.mean_time_to_move / 36.0).clamp(0.0, 100.0);
        }

        if stats.total_calls >= self.config.min_calls_for_trust {
            let hit_component = stats.hit_rate * 40.0;
            let return_component = (stats.avg_return / 5.0).min(1.0) * 30.0;
            let speed_component = stats.speed_score * 0.2;
            let volume_component = (stats.total_calls as f64 / 50.0).min(1.0) * 10.0;
            stats.trust_score =
                (hit_component + return_component + speed_component + volume_component)
                    .clamp(0.0, 100.0);
        } else {
            stats.trust_score = 50.0;
        }

        self.check_flags(stats);
    }

    fn check_flags(&self, stats: &mut SourceStats) {
        let was_flagged = stats.is_flagged;

        if stats.failed_calls >= 5
            && stats.failed_calls as f64 / stats.total_calls.max(1) as f64 > 0.5
        {
            stats.is_flagged = true;
            stats.flag_reason = Some(format!(
                "High failure rate: {} failures",
                stats.failed_calls
            ));
        } else if stats.total_calls >= 10 && stats.hit_rate < 0.15 {
            stats.is_flagged = true;
            stats.flag_reason = Some(format!("Very low hit rate: {:.0}%", stats.hit_rate * 100.0));
        } else if stats.total_calls >= 5 && stats.avg_return < -0.2 {
            stats.is_flagged = true;
            stats.flag_reason = Some(format!(
                "Negative average return: {:.0}%",
                stats.avg_return * 100.0
            ));
        } else {
            stats.is_flagged = false;
            stats.flag_reason = None;
        }

        if stats.is_flagged && !was_flagged {
            info!(
                source_id = %stats.source_id,
                reason = stats.flag_reason.as_deref().unwrap_or(""),
                "source flagged"
            );
        }
    }

    /// Snapshot a single source
    pub fn get(&self, source_id: &str) -> Option<SourceStats> {
        self.sources.get(source_id).map(|e| e.value().clone())
    }

    pub fn is_flagged(&self, source_id: &str) -> bool {
        self.sources
            .get(source_id)
            .map(|e| e.value().is_flagged)
            .unwrap_or(false)
    }

    /// Average trust over the given sources; unknown sources read as 50
    pub fn average_trust<'a>(&self, source_ids: impl IntoIterator<Item = &'a String>) -> f64 {
        let mut sum = 0.0;
        let mut n = 0usize;
        for id in source_ids {
            if let Some(stats) = self.sources.get(id.as_str()) {
                sum += stats.trust_score;
                n += 1;
            }
        }
        if n == 0 {
            50.0
        } else {
            sum / n as f64
        }
    }

    /// Leaderboard sorted by trust, descending
    pub fn leaderboard(
        &self,
        min_calls: u64,
        limit: usize,
        include_flagged: bool,
    ) -> Vec<SourceStats> {
        let mut sources: Vec<SourceStats> = self
            .sources
            .iter()
            .filter(|e| e.value().total_calls >= min_calls)
            .filter(|e| include_flagged || !e.value().is_flagged)
            .map(|e| e.value().clone())
            .collect();

        sources.sort_by(|a, b| {
            b.trust_score
                .partial_cmp(&a.trust_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        sources.truncate(limit);
        sources
    }

    pub fn flagged_sources(&self) -> Vec<SourceStats> {
        self.sources
            .iter()
            .filter(|e| e.value().is_flagged)
            .map(|e| e.value().clone())
            .collect()
    }

    /// Snapshot every tracked source, for the periodic persistence job
    pub fn all(&self) -> Vec<SourceStats> {
        self.sources.iter().map(|e| e.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}
