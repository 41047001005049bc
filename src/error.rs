//! Error types for the signal engine

use thiserror::Error;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the signal engine
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    // Ingest errors
    #[error("Ingest queue closed")]
    QueueClosed,

    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    // Oracle errors (embedding / market data / summarizer)
    #[error("Embedding oracle unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("Market data unavailable: {0}")]
    MarketDataUnavailable(String),

    #[error("Summarizer unavailable: {0}")]
    SummarizerUnavailable(String),

    #[error("Oracle timeout after {0}s")]
    OracleTimeout(u64),

    // Clustering errors
    #[error("Cluster invariant violated for {cluster_id}: {detail}")]
    ClusterInvariant { cluster_id: String, detail: String },

    #[error("Cluster not found: {0}")]
    ClusterNotFound(String),

    // Persistence errors
    #[error("Persistence sink failed: {0}")]
    Persistence(String),

    // Push channel errors
    #[error("Subscriber gone: {0}")]
    SubscriberGone(String),

    #[error("Invalid regex pattern: {0}")]
    InvalidRegex(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Check if this error only degrades enrichment (the hot path continues
    /// without it) rather than signaling broken core state.
    pub fn is_degradable(&self) -> bool {
        matches!(
            self,
            Error::EmbeddingUnavailable(_)
                | Error::MarketDataUnavailable(_)
                | Error::SummarizerUnavailable(_)
                | Error::OracleTimeout(_)
                | Error::Persistence(_)
                | Error::SubscriberGone(_)
        )
    }

    /// Check if this error should be dropped silently with a counter bump
    pub fn is_malformed_input(&self) -> bool {
        matches!(self, Error::MalformedMessage(_))
    }
}

// Conversion from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

// Conversion from I/O errors
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

// Conversion from reqwest errors: timeouts are reported as such so callers
// can degrade without retrying inline.
impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::OracleTimeout(0)
        } else {
            Error::Internal(e.to_string())
        }
    }
}
