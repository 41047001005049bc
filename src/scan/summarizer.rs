//! Summarizer oracle - LLM-backed discussion summaries with a rule fallback

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::error::{Error, Result};

/// Sentiment of a token discussion as a whole
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscussionSentiment {
    Bullish,
    Bearish,
    Mixed,
    Neutral,
}

/// Free-text summarization oracle. May be absent; callers fall back to
/// rule-based summaries.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Summarize discussion messages for a token into plain prose
    async fn summarize(&self, token_symbol: &str, messages: &[String]) -> Result<String>;
}

lazy_static! {
    static ref MD_BOLD: Regex = Regex::new(r"\*\*([^*]+)\*\*").unwrap();
    static ref MD_ITALIC: Regex = Regex::new(r"\*([^*]+)\*").unwrap();
    static ref MD_HEADER: Regex = Regex::new(r"(?m)^#+\s*").unwrap();
    static ref MD_NUMBERED: Regex = Regex::new(r"(?m)^\d+\.\s*").unwrap();
    static ref MD_BULLET: Regex = Regex::new(r"(?m)^[-\u{2022}]\s*").unwrap();
    static ref MULTI_NEWLINE: Regex = Regex::new(r"\n+").unwrap();
    static ref MULTI_SPACE: Regex = Regex::new(r"\s+").unwrap();
}

/// Strip markdown artifacts and collapse the reply into plain prose
pub fn strip_markdown(text: &str) -> String {
    let text = MD_BOLD.replace_all(text.trim(), "$1");
    let text = MD_ITALIC.replace_all(&text, "$1");
    let text = MD_HEADER.replace_all(&text, "");
    let text = MD_NUMBERED.replace_all(&text, "");
    let text = MD_BULLET.replace_all(&text, "");
    let text = MULTI_NEWLINE.replace_all(&text, " ");
    MULTI_SPACE.replace_all(&text, " ").trim().to_string()
}

/// Derive discussion sentiment from summary keywords
pub fn sentiment_from_summary(summary: &str) -> DiscussionSentiment {
    let lower = summary.to_lowercase();
    if lower.contains("bullish") || lower.contains("optimistic") || lower.contains("positive") {
        DiscussionSentiment::Bullish
    } else if lower.contains("bearish")
        || lower.contains("cautious")
        || lower.contains("warning")
        || lower.contains("scam")
    {
        DiscussionSentiment::Bearish
    } else if lower.contains("mixed") {
        DiscussionSentiment::Mixed
    } else {
        DiscussionSentiment::Neutral
    }
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

/// OpenAI-compatible chat completions summarizer
pub struct ChatCompletionSummarizer {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl ChatCompletionSummarizer {
    pub fn new(endpoint: String, api_key: String, model: String, timeout_secs: u64) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(timeout_secs))
                .build()
                .unwrap_or_default(),
            endpoint,
            api_key,
            model,
        }
    }

    fn build_prompt(token_symbol: &str, messages: &[String]) -> String {
        let listed = messages
            .iter()
            .map(|m| format!("- {m}"))
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            "You are analyzing crypto chat messages about ${token_symbol}.\n\n\
             Messages:\n{listed}\n\n\
             Write a 2-3 sentence summary of what traders are saying. Include:\n\
             - The overall vibe (bullish/bearish/cautious)\n\
             - Any specific price targets, warnings, or calls mentioned\n\
             - Key opinions or concerns\n\n\
             IMPORTANT: Write in plain text only. No markdown, no bullet points, \
             no headers. Just 2-3 natural sentences summarizing the discussion."
        )
    }
}

#[async_trait]
impl Summarizer for ChatCompletionSummarizer {
    async fn summarize(&self, token_symbol: &str, messages: &[String]) -> Result<String> {
        let prompt = Self::build_prompt(token_symbol, messages);

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "model": self.model,
                "messages": [{ "role": "user", "content": prompt }],
                "max_tokens": 300,
                "temperature": 0.3,
            }))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::OracleTimeout(0)
                } else {
                    Error::SummarizerUnavailable(e.to_string())
                }
            })?;

        if !resp.status().is_success() {
            return Err(Error::SummarizerUnavailable(format!(
                "status {}",
                resp.status()
            )));
        }

        let body: ChatResponse = resp
            .json()
            .await
            .map_err(|e| Error::SummarizerUnavailable(e.to_string()))?;

        let content = body
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();

        if content.is_empty() {
            return Err(Error::SummarizerUnavailable("empty completion".into()));
        }

        debug!(token = token_symbol, "summary generated");
        Ok(content)
    }
}
