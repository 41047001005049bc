//! Core message and entity types shared across the pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A raw chat message as delivered by a source. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawMessage {
    pub id: String,
    pub source_id: String,
    pub source_name: String,
    pub timestamp: DateTime<Utc>,
    pub text: String,
    #[serde(default)]
    pub reply_to_id: Option<String>,
}

/// Supported chains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    Solana,
    Base,
    Bsc,
    Ethereum,
}

impl Chain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Chain::Solana => "solana",
            Chain::Base => "base",
            Chain::Bsc => "bsc",
            Chain::Ethereum => "ethereum",
        }
    }

    pub fn is_evm(&self) -> bool {
        !matches!(self, Chain::Solana)
    }

    /// Parse a chain tag as used in platform URLs; None for unknown segments
    pub fn parse(s: &str) -> Option<Chain> {
        match s.to_ascii_lowercase().as_str() {
            "solana" => Some(Chain::Solana),
            "base" => Some(Chain::Base),
            "bsc" => Some(Chain::Bsc),
            "ethereum" | "eth" => Some(Chain::Ethereum),
            _ => None,
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a token reference was recognized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchSource {
    Symbol,
    PumpLink,
    PumpAddress,
    DexLink,
    Address,
    CaPrefix,
}

/// A token mention extracted from text. At least one of symbol/address is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRef {
    pub symbol: Option<String>,
    pub address: Option<String>,
    pub chain: Chain,
    pub confidence: f64,
    pub match_source: MatchSource,
}

/// Notable-wallet labels recognized from surrounding text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalletLabel {
    Whale,
    Dev,
    Sniper,
    Fresh,
    Insider,
    Kol,
}

/// A wallet mention extracted from text
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletRef {
    pub address: String,
    pub chain: Chain,
    pub label: Option<WalletLabel>,
}

/// Unit of a price mention
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceUnit {
    Usd,
    Sol,
    Eth,
    Bnb,
    Multiplier,
    MarketCap,
}

/// A numeric price/multiplier/market-cap literal found in text
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceMention {
    pub value: f64,
    pub unit: PriceUnit,
}

/// Message polarity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Bullish,
    Bearish,
    Neutral,
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Sentiment::Bullish => "bullish",
            Sentiment::Bearish => "bearish",
            Sentiment::Neutral => "neutral",
        };
        f.write_str(s)
    }
}

/// Result of sentiment, risk and quality analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentimentVerdict {
    pub polarity: Sentiment,
    /// Net score in [-1, 1]
    pub score: f64,
    /// Confidence in [0, 1]
    pub confidence: f64,
    /// 0-100, higher = more risky
    pub risk_score: f64,
    /// 0-100, higher = better quality alpha
    pub quality_score: f64,
    /// Matched signal labels, capped at 10
    pub signals: Vec<String>,
    /// Top risk factors, capped at 5
    pub risk_factors: Vec<String>,
    /// Top quality factors, capped at 5
    pub quality_factors: Vec<String>,
}

/// Message classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageClass {
    Call,
    Alert,
    Discussion,
    Spam,
}

impl fmt::Display for MessageClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MessageClass::Call => "call",
            MessageClass::Alert => "alert",
            MessageClass::Discussion => "discussion",
            MessageClass::Spam => "spam",
        };
        f.write_str(s)
    }
}

/// A message with all entities extracted. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedMessage {
    pub id: String,
    pub source_id: String,
    pub source_name: String,
    pub timestamp: DateTime<Utc>,
    /// Original text, truncated to 2000 chars
    pub original_text: String,
    /// SHA-256 over normalized text, hex-encoded
    pub content_fingerprint: String,
    pub tokens: Vec<TokenRef>,
    pub wallets: Vec<WalletRef>,
    pub prices: Vec<PriceMention>,
    pub sentiment: SentimentVerdict,
    pub classification: MessageClass,
    pub classification_confidence: f64,
}
