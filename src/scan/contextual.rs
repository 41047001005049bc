//! Contextual token scanner (batch discovery)
//!
//! When someone posts a token, the conversation about it happens in the
//! messages around that post, not just in the post itself. The scanner finds
//! token addresses, joins them to market data, captures surrounding
//! discussion windows per chat, and summarizes them.

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::ScannerConfig;
use crate::extract::Chain;
use crate::market::{MarketOracle, TokenMarketData};
use crate::scan::summarizer::{
    sentiment_from_summary, strip_markdown, DiscussionSentiment, Summarizer,
};

// Well-known mints that are never the subject of a discovery
const SKIP_ADDRESSES: &[&str] = &[
    "So11111111111111111111111111111111111111112",  // wrapped SOL
    "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v", // USDC
];

lazy_static! {
    // URL patterns carry the strongest token signal
    static ref TOKEN_URL_PATTERNS: Vec<(Regex, Chain)> = vec![
        (
            Regex::new(r"(?i)pump\.fun/(?:coin/)?([1-9A-HJ-NP-Za-km-z]{32,44})").unwrap(),
            Chain::Solana,
        ),
        (
            Regex::new(r"(?i)dexscreener\.com/solana/([1-9A-HJ-NP-Za-km-z]{32,44})").unwrap(),
            Chain::Solana,
        ),
        (
            Regex::new(r"(?i)dexscreener\.com/base/(0x[a-fA-F0-9]{40})").unwrap(),
            Chain::Base,
        ),
        (
            Regex::new(r"(?i)birdeye\.so/token/([1-9A-HJ-NP-Za-km-z]{32,44})").unwrap(),
            Chain::Solana,
        ),
        (
            Regex::new(r"(?i)solscan\.io/token/([1-9A-HJ-NP-Za-km-z]{32,44})").unwrap(),
            Chain::Solana,
        ),
        (
            Regex::new(r"(?i)photon-sol\.tinyastro\.io/[^/]+/([1-9A-HJ-NP-Za-km-z]{32,44})")
                .unwrap(),
            Chain::Solana,
        ),
    ];
    static ref RAW_SOLANA: Regex = Regex::new(r"[1-9A-HJ-NP-Za-km-z]{32,44}").unwrap();
    static ref RAW_EVM: Regex = Regex::new(r"0x[a-fA-F0-9]{40}").unwrap();
    static ref URL: Regex = Regex::new(r"https?://\S+").unwrap();
    static ref BOT_PREFIXES: Vec<Regex> = vec![
        Regex::new(r"^CA[:\s]").unwrap(),
        Regex::new(r"^Contract[:\s]").unwrap(),
        // "0.42K | 120" price-pipe-holders bot format
        Regex::new(r"^\d+\.\d+[KMB]?\s*\|\s*\d+").unwrap(),
        Regex::new(r"^(?:\u{1F52B}|\u{1F3AF}|\u{1F4CA})").unwrap(),
    ];
}

/// One message fed into a batch scan; timestamps arrive as opaque strings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanMessage {
    pub text: String,
    pub source_name: String,
    pub timestamp: String,
}

/// A discussion window around one token mention
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscussionWindow {
    pub chat: String,
    pub time: DateTime<Utc>,
    pub messages: Vec<WindowMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowMessage {
    pub text: String,
    pub time: DateTime<Utc>,
}

/// A discovered token with market data and its surrounding discussion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenDiscussion {
    pub address: String,
    pub chain: String,
    pub market: TokenMarketData,
    pub mention_count: usize,
    pub chats: BTreeSet<String>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub discussions: Vec<DiscussionWindow>,
    pub summary: String,
    pub sentiment: DiscussionSentiment,
}

struct Mention {
    chat: String,
    time: DateTime<Utc>,
    chain: Chain,
}

/// Scans message batches for tokens with live market data
pub struct ContextualScanner {
    config: ScannerConfig,
    market: Arc<dyn MarketOracle>,
    summarizer: Option<Arc<dyn Summarizer>>,
}

impl ContextualScanner {
    pub fn new(
        config: ScannerConfig,
        market: Arc<dyn MarketOracle>,
        summarizer: Option<Arc<dyn Summarizer>>,
    ) -> Self {
        Self {
            config,
            market,
            summarizer,
        }
    }

    /// Extract at most one token address from a message
    pub fn extract_token(text: &str) -> Option<(String, Chain)> {
        for (pattern, chain) in TOKEN_URL_PATTERNS.iter() {
            if let Some(cap) = pattern.captures(text) {
                let addr = cap.get(1).unwrap().as_str();
                if !SKIP_ADDRESSES.contains(&addr) {
                    return Some((addr.to_string(), *chain));
                }
            }
        }

        // Raw base58 runs, unless the message reads like a transaction report
        if let Some(m) = RAW_SOLANA.find(text) {
            let addr = m.as_str();
            if !SKIP_ADDRESSES.contains(&addr) {
                let lower = text.to_lowercase();
                let tx_cued = ["tx:", "transaction:", "sig:"]
                    .iter()
                    .any(|cue| lower.contains(cue));
                if !tx_cued {
                    return Some((addr.to_string(), Chain::Solana));
                }
            }
        }

        if let Some(m) = RAW_EVM.find(text) {
            return Some((m.as_str().to_string(), Chain::Ethereum));
        }

        None
    }

    /// True when a message reads like human discussion rather than a bot scan
    pub fn is_discussion_message(text: &str) -> bool {
        let lower = text.to_lowercase();

        // A bare link with no commentary is a scan post
        if text.len() < 50
            && ["pump.fun/", "dexscreener.com/", "birdeye.so/"]
                .iter()
                .any(|u| lower.contains(u))
        {
            let without_urls = URL.replace_all(text, "");
            if without_urls.trim().len() < 20 {
                return false;
            }
        }

        for pattern in BOT_PREFIXES.iter() {
            if pattern.is_match(text) {
                return false;
            }
        }

        true
    }

    /// Run a batch scan and return the discovery feed, most recent first
    pub async fn scan(&self, messages: &[ScanMessage]) -> Vec<TokenDiscussion> {
        self.scan_at(messages, Utc::now()).await
    }

    pub async fn scan_at(
        &self,
        messages: &[ScanMessage],
        now: DateTime<Utc>,
    ) -> Vec<TokenDiscussion> {
        info!(message_count = messages.len(), "contextual scan start");

        // 1. Parse timestamps onto a uniform UTC clock
        let parsed: Vec<(&ScanMessage, DateTime<Utc>)> = messages
            .iter()
            .map(|m| (m, parse_timestamp(&m.timestamp).unwrap_or(now)))
            .collect();

        // 2. Collect mentions per address
        let mut mentions: HashMap<String, Vec<Mention>> = HashMap::new();
        for (msg, time) in &parsed {
            if msg.text.is_empty() {
                continue;
            }
            if let Some((address, chain)) = Self::extract_token(&msg.text) {
                mentions.entry(address).or_default().push(Mention {
                    chat: msg.source_name.clone(),
                    time: *time,
                    chain,
                });
            }
        }

        info!(tokens_found = mentions.len(), "token mentions collected");

        // 3. Join to market data; tokens the oracle doesn't know are dropped
        let mut discoveries = Vec::new();
        for (address, mention_list) in mentions {
            let Some(market) = self.market.lookup(&address).await else {
                debug!(address = %&address[..address.len().min(16)], "skipping, no market data");
                continue;
            };

            let chain = if market.chain.is_empty() {
                mention_list[0].chain.as_str().to_string()
            } else {
                market.chain.clone()
            };

            let first_seen = mention_list.iter().map(|m| m.time).min().unwrap_or(now);
            let last_seen = mention_list.iter().map(|m| m.time).max().unwrap_or(now);
            let chats: BTreeSet<String> =
                mention_list.iter().map(|m| m.chat.clone()).collect();

            // 4. Gather surrounding context, deduped by (chat, minute)
            let mut discussions = Vec::new();
            let mut seen_contexts: BTreeSet<(String, i64)> = BTreeSet::new();
            for mention in &mention_list {
                let context_key = (mention.chat.clone(), mention.time.timestamp() / 60);
                if !seen_contexts.insert(context_key) {
                    continue;
                }

                let window = self.context_window(&parsed, &mention.chat, mention.time);
                if !window.is_empty() {
                    discussions.push(DiscussionWindow {
                        chat: mention.chat.clone(),
                        time: mention.time,
                        messages: window,
                    });
                }
            }

            let mut token = TokenDiscussion {
                address,
                chain,
                market,
                mention_count: mention_list.len(),
                chats,
                first_seen,
                last_seen,
                discussions,
                summary: String::new(),
                sentiment: DiscussionSentiment::Neutral,
            };

            self.summarize_discussion(&mut token).await;
            discoveries.push(token);
        }

        // 5. Most recent first, capped
        discoveries.sort_by(|a, b| b.last_seen.cmp(&a.last_seen));
        discoveries.truncate(self.config.scan_limit);

        info!(returned = discoveries.len(), "contextual scan complete");
        discoveries
    }

    /// Messages from the same chat within the context window of a mention
    fn context_window(
        &self,
        parsed: &[(&ScanMessage, DateTime<Utc>)],
        chat: &str,
        around: DateTime<Utc>,
    ) -> Vec<WindowMessage> {
        let window = Duration::minutes(self.config.context_window_minutes);
        let mut context: Vec<WindowMessage> = parsed
            .iter()
            .filter(|(msg, _)| msg.source_name == chat)
            .filter(|(_, time)| (*time - around).abs() <= window)
            .map(|(msg, time)| WindowMessage {
                text: msg.text.clone(),
                time: *time,
            })
            .collect();
        context.sort_by_key(|m| m.time);
        context
    }

    /// Fill in summary and sentiment, via the LLM oracle when available
    async fn summarize_discussion(&self, token: &mut TokenDiscussion) {
        let discussion_texts: Vec<String> = token
            .discussions
            .iter()
            .flat_map(|d| d.messages.iter())
            .filter(|m| Self::is_discussion_message(&m.text))
            .map(|m| {
                let cleaned = URL.replace_all(&m.text, "[link]");
                let cleaned = RAW_SOLANA.replace_all(&cleaned, "[address]");
                truncate(cleaned.trim(), 300)
            })
            .filter(|t| t.len() > 20)
            .collect();

        let Some(summarizer) = &self.summarizer else {
            token.summary = self.fallback_summary(token, discussion_texts.len());
            return;
        };

        if discussion_texts.is_empty() {
            token.summary = format!(
                "Token shared {} times but no detailed discussion found.",
                token.mention_count
            );
            return;
        }

        let sample: Vec<String> = discussion_texts
            .iter()
            .rev()
            .take(self.config.summary_sample)
            .rev()
            .cloned()
            .collect();

        match summarizer.summarize(&token.market.symbol, &sample).await {
            Ok(reply) => {
                token.summary = truncate(&strip_markdown(&reply), self.config.summary_max_chars);
                token.sentiment = sentiment_from_summary(&reply);
            }
            Err(e) => {
                warn!(symbol = %token.market.symbol, error = %e, "summary failed");
                token.summary = format!(
                    "Discussed in {} chats with {} messages.",
                    token.chats.len(),
                    discussion_texts.len()
                );
            }
        }
    }

    fn fallback_summary(&self, token: &TokenDiscussion, discussion_count: usize) -> String {
        if discussion_count == 0 {
            format!(
                "Mentioned {} times across {} chats.",
                token.mention_count,
                token.chats.len()
            )
        } else {
            format!(
                "Mentioned {} times across {} chats with {} discussion messages.",
                token.mention_count,
                token.chats.len(),
                discussion_count
            )
        }
    }
}

/// Parse an RFC 3339 / ISO-8601-ish timestamp onto the UTC clock
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    // Naive "YYYY-MM-DDTHH:MM:SS" without an offset is treated as UTC
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S"))
        .ok()
        .map(|naive| naive.and_utc())
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        text.chars().take(max).collect()
    }
}
