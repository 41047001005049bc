//! Configuration loading and validation

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub dedup: DedupConfig,
    #[serde(default)]
    pub clustering: ClusteringConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub reputation: ReputationConfig,
    #[serde(default)]
    pub ranking: RankingConfig,
    #[serde(default)]
    pub scanner: ScannerConfig,
    #[serde(default)]
    pub oracles: OracleConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

/// Ingest queue and backpressure settings
#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    /// Above this fill level producers are expected to drop or buffer
    #[serde(default = "default_high_water_mark")]
    pub high_water_mark: usize,
}

/// Hot-path batching and worker settings
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_batch_interval_seconds")]
    pub batch_interval_seconds: f64,
    #[serde(default = "default_price_refresh_secs")]
    pub price_refresh_secs: u64,
    #[serde(default = "default_outcome_check_secs")]
    pub outcome_check_secs: u64,
    #[serde(default = "default_snapshot_secs")]
    pub snapshot_secs: u64,
    #[serde(default = "default_retirement_sweep_secs")]
    pub retirement_sweep_secs: u64,
    /// Per-subscriber push channel buffer; slow subscribers are dropped
    #[serde(default = "default_subscriber_buffer")]
    pub subscriber_buffer: usize,
}

/// Deduplication window settings
#[derive(Debug, Clone, Deserialize)]
pub struct DedupConfig {
    #[serde(default = "default_dedup_window_minutes")]
    pub dedup_window_minutes: u64,
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
    #[serde(default = "default_max_embeddings")]
    pub max_embeddings: usize,
    /// Texts at or below this length skip the semantic path
    #[serde(default = "default_min_semantic_len")]
    pub min_semantic_len: usize,
}

/// Clustering window settings
#[derive(Debug, Clone, Deserialize)]
pub struct ClusteringConfig {
    #[serde(default = "default_cluster_window_minutes")]
    pub cluster_window_minutes: u64,
    #[serde(default = "default_chain")]
    pub default_chain: String,
}

/// Priority score component weights
#[derive(Debug, Clone, Deserialize)]
pub struct ScoringConfig {
    #[serde(default = "default_source_diversity_weight")]
    pub source_diversity_weight: f64,
    #[serde(default = "default_recency_weight")]
    pub recency_weight: f64,
    #[serde(default = "default_velocity_weight")]
    pub velocity_weight: f64,
    #[serde(default = "default_wallet_activity_weight")]
    pub wallet_activity_weight: f64,
    #[serde(default = "default_source_quality_weight")]
    pub source_quality_weight: f64,
    /// Applied as `spam_score * weight`; negative by convention
    #[serde(default = "default_spam_penalty_weight")]
    pub spam_penalty_weight: f64,
}

/// Source reputation thresholds
#[derive(Debug, Clone, Deserialize)]
pub struct ReputationConfig {
    /// 1-hour return at or above this is a successful call
    #[serde(default = "default_success_threshold")]
    pub success_threshold: f64,
    /// 1-hour return at or below this is a failed call
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: f64,
    #[serde(default = "default_min_calls_for_trust")]
    pub min_calls_for_trust: u64,
}

/// Feed filter defaults
#[derive(Debug, Clone, Deserialize)]
pub struct RankingConfig {
    #[serde(default = "default_max_age_minutes")]
    pub max_age_minutes: i64,
    #[serde(default)]
    pub min_score: f64,
    #[serde(default = "default_min_sources")]
    pub min_sources: usize,
    #[serde(default = "default_min_mentions")]
    pub min_mentions: u64,
    #[serde(default = "default_true")]
    pub exclude_flagged_sources: bool,
    #[serde(default = "default_feed_limit")]
    pub feed_limit: usize,
}

/// Contextual scanner settings
#[derive(Debug, Clone, Deserialize)]
pub struct ScannerConfig {
    #[serde(default = "default_context_window_minutes")]
    pub context_window_minutes: i64,
    #[serde(default = "default_scan_limit")]
    pub scan_limit: usize,
    #[serde(default = "default_summary_max_chars")]
    pub summary_max_chars: usize,
    #[serde(default = "default_summary_sample")]
    pub summary_sample: usize,
}

/// External oracle endpoints and deadlines
#[derive(Debug, Clone, Deserialize)]
pub struct OracleConfig {
    #[serde(default = "default_market_timeout_secs")]
    pub market_timeout_secs: u64,
    #[serde(default = "default_embedding_timeout_secs")]
    pub embedding_timeout_secs: u64,
    #[serde(default = "default_summarizer_timeout_secs")]
    pub summarizer_timeout_secs: u64,
    #[serde(default = "default_embedding_dimension")]
    pub embedding_dimension: usize,
    /// Embedding service endpoint; empty disables semantic dedup
    #[serde(default)]
    pub embedding_endpoint: String,
    /// OpenAI-compatible chat completions endpoint; empty disables LLM summaries
    #[serde(default)]
    pub summarizer_endpoint: String,
    #[serde(default)]
    pub summarizer_api_key: String,
    #[serde(default = "default_summarizer_model")]
    pub summarizer_model: String,
}

/// Persistence sink settings
#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// Retired clusters held in memory when the sink fails, oldest dropped beyond this
    #[serde(default = "default_buffer_cap")]
    pub buffer_cap: usize,
}

// Default value functions
fn default_channel_capacity() -> usize {
    10000
}

fn default_high_water_mark() -> usize {
    8000
}

fn default_batch_size() -> usize {
    100
}

fn default_batch_interval_seconds() -> f64 {
    2.0
}

fn default_price_refresh_secs() -> u64 {
    60
}

fn default_outcome_check_secs() -> u64 {
    300
}

fn default_snapshot_secs() -> u64 {
    900
}

fn default_retirement_sweep_secs() -> u64 {
    3600
}

fn default_subscriber_buffer() -> usize {
    64
}

fn default_dedup_window_minutes() -> u64 {
    5
}

fn default_similarity_threshold() -> f64 {
    0.85
}

fn default_max_embeddings() -> usize {
    1000
}

fn default_min_semantic_len() -> usize {
    20
}

fn default_cluster_window_minutes() -> u64 {
    30
}

fn default_chain() -> String {
    "solana".to_string()
}

fn default_source_diversity_weight() -> f64 {
    25.0
}

fn default_recency_weight() -> f64 {
    20.0
}

fn default_velocity_weight() -> f64 {
    20.0
}

fn default_wallet_activity_weight() -> f64 {
    15.0
}

fn default_source_quality_weight() -> f64 {
    20.0
}

fn default_spam_penalty_weight() -> f64 {
    -30.0
}

fn default_success_threshold() -> f64 {
    0.5
}

fn default_failure_threshold() -> f64 {
    -0.3
}

fn default_min_calls_for_trust() -> u64 {
    3
}

fn default_max_age_minutes() -> i64 {
    60
}

fn default_min_sources() -> usize {
    1
}

fn default_min_mentions() -> u64 {
    1
}

fn default_feed_limit() -> usize {
    10
}

fn default_context_window_minutes() -> i64 {
    10
}

fn default_scan_limit() -> usize {
    50
}

fn default_summary_max_chars() -> usize {
    500
}

fn default_summary_sample() -> usize {
    15
}

fn default_market_timeout_secs() -> u64 {
    30
}

fn default_embedding_timeout_secs() -> u64 {
    10
}

fn default_summarizer_timeout_secs() -> u64 {
    20
}

fn default_embedding_dimension() -> usize {
    384
}

fn default_summarizer_model() -> String {
    "llama-3.1-8b-instant".to_string()
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_buffer_cap() -> usize {
    500
}

fn default_true() -> bool {
    true
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
            high_water_mark: default_high_water_mark(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            batch_interval_seconds: default_batch_interval_seconds(),
            price_refresh_secs: default_price_refresh_secs(),
            outcome_check_secs: default_outcome_check_secs(),
            snapshot_secs: default_snapshot_secs(),
            retirement_sweep_secs: default_retirement_sweep_secs(),
            subscriber_buffer: default_subscriber_buffer(),
        }
    }
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            dedup_window_minutes: default_dedup_window_minutes(),
            similarity_threshold: default_similarity_threshold(),
            max_embeddings: default_max_embeddings(),
            min_semantic_len: default_min_semantic_len(),
        }
    }
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            cluster_window_minutes: default_cluster_window_minutes(),
            default_chain: default_chain(),
        }
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            source_diversity_weight: default_source_diversity_weight(),
            recency_weight: default_recency_weight(),
            velocity_weight: default_velocity_weight(),
            wallet_activity_weight: default_wallet_activity_weight(),
            source_quality_weight: default_source_quality_weight(),
            spam_penalty_weight: default_spam_penalty_weight(),
        }
    }
}

impl Default for ReputationConfig {
    fn default() -> Self {
        Self {
            success_threshold: default_success_threshold(),
            failure_threshold: default_failure_threshold(),
            min_calls_for_trust: default_min_calls_for_trust(),
        }
    }
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            max_age_minutes: default_max_age_minutes(),
            min_score: 0.0,
            min_sources: default_min_sources(),
            min_mentions: default_min_mentions(),
            exclude_flagged_sources: true,
            feed_limit: default_feed_limit(),
        }
    }
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            context_window_minutes: default_context_window_minutes(),
            scan_limit: default_scan_limit(),
            summary_max_chars: default_summary_max_chars(),
            summary_sample: default_summary_sample(),
        }
    }
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            market_timeout_secs: default_market_timeout_secs(),
            embedding_timeout_secs: default_embedding_timeout_secs(),
            summarizer_timeout_secs: default_summarizer_timeout_secs(),
            embedding_dimension: default_embedding_dimension(),
            embedding_endpoint: String::new(),
            summarizer_endpoint: String::new(),
            summarizer_api_key: String::new(),
            summarizer_model: default_summarizer_model(),
        }
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            buffer_cap: default_buffer_cap(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ingest: IngestConfig::default(),
            pipeline: PipelineConfig::default(),
            dedup: DedupConfig::default(),
            clustering: ClusteringConfig::default(),
            scoring: ScoringConfig::default(),
            reputation: ReputationConfig::default(),
            ranking: RankingConfig::default(),
            scanner: ScannerConfig::default(),
            oracles: OracleConfig::default(),
            persistence: PersistenceConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            // Load from file if exists
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (prefix RADAR_)
            .add_source(
                config::Environment::with_prefix("RADAR")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if self.pipeline.batch_size == 0 {
            anyhow::bail!("batch_size must be positive");
        }

        if self.pipeline.batch_interval_seconds <= 0.0 {
            anyhow::bail!("batch_interval_seconds must be positive");
        }

        if !(0.0..=1.0).contains(&self.dedup.similarity_threshold) {
            anyhow::bail!(
                "similarity_threshold must be within [0, 1], got {}",
                self.dedup.similarity_threshold
            );
        }

        if self.dedup.dedup_window_minutes == 0 {
            anyhow::bail!("dedup_window_minutes must be positive");
        }

        if self.clustering.cluster_window_minutes == 0 {
            anyhow::bail!("cluster_window_minutes must be positive");
        }

        if self.reputation.success_threshold <= self.reputation.failure_threshold {
            anyhow::bail!("success_threshold must exceed failure_threshold");
        }

        if self.scoring.spam_penalty_weight > 0.0 {
            anyhow::bail!("spam_penalty_weight must be zero or negative");
        }

        if self.ingest.high_water_mark > self.ingest.channel_capacity {
            anyhow::bail!("high_water_mark cannot exceed channel_capacity");
        }

        Ok(())
    }

    /// Get masked configuration for display (hide secrets)
    pub fn masked_display(&self) -> String {
        format!(
            r#"Configuration:
  Ingest:
    channel_capacity: {}
    high_water_mark: {}
  Pipeline:
    batch_size: {}
    batch_interval: {}s
    price_refresh: {}s
  Dedup:
    window: {}min
    similarity_threshold: {}
  Clustering:
    window: {}min
    default_chain: {}
  Ranking:
    max_age: {}min
    min_score: {}
    feed_limit: {}
  Oracles:
    embedding_endpoint: {}
    summarizer_endpoint: {}
    summarizer_api_key: {}
  Persistence:
    data_dir: {}
"#,
            self.ingest.channel_capacity,
            self.ingest.high_water_mark,
            self.pipeline.batch_size,
            self.pipeline.batch_interval_seconds,
            self.pipeline.price_refresh_secs,
            self.dedup.dedup_window_minutes,
            self.dedup.similarity_threshold,
            self.clustering.cluster_window_minutes,
            self.clustering.default_chain,
            self.ranking.max_age_minutes,
            self.ranking.min_score,
            self.ranking.feed_limit,
            if self.oracles.embedding_endpoint.is_empty() {
                "(not set)"
            } else {
                &self.oracles.embedding_endpoint
            },
            if self.oracles.summarizer_endpoint.is_empty() {
                "(not set)"
            } else {
                &self.oracles.summarizer_endpoint
            },
            if self.oracles.summarizer_api_key.is_empty() {
                "(not set)"
            } else {
                "***"
            },
            self.persistence.data_dir,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.clustering.cluster_window_minutes, 30);
        assert_eq!(config.dedup.dedup_window_minutes, 5);
        assert_eq!(config.dedup.similarity_threshold, 0.85);
        assert_eq!(config.pipeline.batch_size, 100);
        assert_eq!(config.oracles.embedding_dimension, 384);
        assert_eq!(config.scoring.spam_penalty_weight, -30.0);
    }

    #[test]
    fn test_validate_rejects_bad_threshold() {
        let mut config = Config::default();
        config.dedup.similarity_threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_inverted_reputation_thresholds() {
        let mut config = Config::default();
        config.reputation.success_threshold = -0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_masked_display_hides_api_key() {
        let mut config = Config::default();
        config.oracles.summarizer_api_key = "secret".into();
        let display = config.masked_display();
        assert!(!display.contains("secret"));
        assert!(display.contains("***"));
    }
}
