//! Consumer-facing feed entry payloads
//!
//! The only place where cluster state crosses into an open, serialized shape;
//! everything upstream stays typed.

use serde::{Deserialize, Serialize};

use crate::extract::Chain;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedToken {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    pub chain: Chain,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedMetrics {
    pub unique_sources: usize,
    pub total_mentions: u64,
    pub unique_wallets: usize,
    pub velocity: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedSentiment {
    pub bullish: u64,
    pub bearish: u64,
    pub neutral: u64,
    pub overall: String,
    pub percent_bullish: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedTiming {
    pub first_seen_iso: String,
    pub age_minutes: f64,
}

/// The representative message chosen for a cluster
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopSignal {
    pub text: String,
    pub source: String,
    pub is_discussion: bool,
}

/// One entry of the ranked feed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedEntry {
    pub cluster_id: String,
    pub token: FeedToken,
    pub score: f64,
    pub metrics: FeedMetrics,
    pub sentiment: FeedSentiment,
    pub timing: FeedTiming,
    pub top_signal: TopSignal,
    /// Source names, at most 5
    pub sources: Vec<String>,
    /// Wallet addresses, at most 3
    pub wallets: Vec<String>,
}
