//! Entity extraction: raw message text to a `ProcessedMessage`
//!
//! Pure and total: any text produces a ProcessedMessage, even with zero
//! tokens; downstream decides whether to discard it.

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::extract::patterns::{extract_prices, extract_tokens, extract_wallets};
use crate::extract::sentiment::SentimentAnalyzer;
use crate::extract::types::{Chain, ProcessedMessage, RawMessage};

/// Stored message text is truncated to this many chars
const MAX_TEXT_LEN: usize = 2000;

/// Compute the content fingerprint: lower-case, collapse whitespace runs to a
/// single space, trim, then SHA-256 hex.
pub fn fingerprint(text: &str) -> String {
    let normalized = text
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    hex::encode(hasher.finalize())
}

/// Composes pattern matching and sentiment analysis into processed messages
#[derive(Debug, Clone)]
pub struct Extractor {
    analyzer: SentimentAnalyzer,
    default_chain: Chain,
}

impl Extractor {
    pub fn new(default_chain: Chain) -> Self {
        Self {
            analyzer: SentimentAnalyzer::new(),
            default_chain,
        }
    }

    /// Process a raw message and extract all entities
    pub fn process(&self, raw: &RawMessage) -> ProcessedMessage {
        let text = &raw.text;

        let tokens = extract_tokens(text, self.default_chain);

        // Addresses captured as tokens are not wallet candidates
        let mut wallets = extract_wallets(text, self.default_chain);
        wallets.retain(|w| {
            !tokens
                .iter()
                .any(|t| t.address.as_deref() == Some(w.address.as_str()))
        });

        let prices = extract_prices(text);
        let sentiment = self.analyzer.analyze(text);
        let (classification, classification_confidence) = self.analyzer.classify(text);

        let original_text = truncate_chars(text, MAX_TEXT_LEN);

        let processed = ProcessedMessage {
            id: raw.id.clone(),
            source_id: raw.source_id.clone(),
            source_name: raw.source_name.clone(),
            timestamp: raw.timestamp,
            original_text,
            content_fingerprint: fingerprint(text),
            tokens,
            wallets,
            prices,
            sentiment,
            classification,
            classification_confidence,
        };

        debug!(
            message_id = %processed.id,
            tokens = processed.tokens.len(),
            wallets = processed.wallets.len(),
            sentiment = %processed.sentiment.polarity,
            classification = %processed.classification,
            "message processed"
        );

        processed
    }

    /// Process a batch, in input order
    pub fn process_batch(&self, messages: &[RawMessage]) -> Vec<ProcessedMessage> {
        messages.iter().map(|m| self.process(m)).collect()
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        text.chars().take(max).collect()
    }
}
