//! Embedding oracle contract
//!
//! The engine never computes embeddings itself; it calls out to an oracle
//! with a fixed deadline and computes cosine similarity caller-side. When the
//! oracle is missing or failing, dedup degrades to fingerprint-only.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::error::{Error, Result};

/// Maps text to a fixed-dimension vector
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Fixed output dimension (e.g. 384)
    fn dimension(&self) -> usize;
}

/// Cosine similarity between two vectors; 0.0 when either norm is zero
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += f64::from(*x) * f64::from(*y);
        norm_a += f64::from(*x) * f64::from(*x);
        norm_b += f64::from(*y) * f64::from(*y);
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

/// HTTP-backed embedding oracle
pub struct HttpEmbedder {
    client: reqwest::Client,
    endpoint: String,
    dimension: usize,
}

impl HttpEmbedder {
    pub fn new(endpoint: String, dimension: usize, timeout_secs: u64) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(timeout_secs))
                .build()
                .unwrap_or_default(),
            endpoint,
            dimension,
        }
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::OracleTimeout(0)
                } else {
                    Error::EmbeddingUnavailable(e.to_string())
                }
            })?;

        if !resp.status().is_success() {
            return Err(Error::EmbeddingUnavailable(format!(
                "status {}",
                resp.status()
            )));
        }

        let body: EmbedResponse = resp
            .json()
            .await
            .map_err(|e| Error::EmbeddingUnavailable(e.to_string()))?;

        if body.embedding.len() != self.dimension {
            return Err(Error::EmbeddingUnavailable(format!(
                "expected dimension {}, got {}",
                self.dimension,
                body.embedding.len()
            )));
        }

        Ok(body.embedding)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
