//! Entity extraction - deterministic text to structured facts
//!
//! Pattern matching for tokens, wallets and prices, sentiment/risk/quality
//! scoring, and message classification, composed into `ProcessedMessage`.

pub mod extractor;
pub mod patterns;
pub mod sentiment;
pub mod types;

pub use extractor::{fingerprint, Extractor};
pub use sentiment::SentimentAnalyzer;
pub use types::{
    Chain, MatchSource, MessageClass, PriceMention, PriceUnit, ProcessedMessage, RawMessage,
    Sentiment, SentimentVerdict, TokenRef, WalletLabel, WalletRef,
};
