// DexScreener API client for token market data
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{debug, warn};

use crate::market::{MarketOracle, TokenMarketData};

const DEXSCREENER_BASE: &str = "https://api.dexscreener.com";

/// Responses are cached this long, negative results included
const CACHE_TTL_MINUTES: i64 = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceChange {
    pub m5: Option<f64>,
    pub h1: Option<f64>,
    pub h6: Option<f64>,
    pub h24: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Liquidity {
    pub usd: Option<f64>,
    pub base: Option<f64>,
    pub quote: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Volume {
    pub m5: Option<f64>,
    pub h1: Option<f64>,
    pub h6: Option<f64>,
    pub h24: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairToken {
    pub address: String,
    pub name: Option<String>,
    pub symbol: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairInfo {
    #[serde(rename = "imageUrl")]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DexPair {
    #[serde(rename = "chainId")]
    pub chain_id: String,
    #[serde(rename = "dexId")]
    pub dex_id: String,
    pub url: Option<String>,
    #[serde(rename = "baseToken")]
    pub base_token: PairToken,
    #[serde(rename = "quoteToken")]
    pub quote_token: Option<PairToken>,
    #[serde(rename = "priceUsd")]
    pub price_usd: Option<String>,
    #[serde(rename = "priceChange")]
    pub price_change: Option<PriceChange>,
    pub volume: Option<Volume>,
    pub liquidity: Option<Liquidity>,
    #[serde(rename = "marketCap")]
    pub market_cap: Option<f64>,
    pub fdv: Option<f64>,
    pub info: Option<PairInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPairsResponse {
    pub pairs: Option<Vec<DexPair>>,
}

pub struct DexScreenerClient {
    client: reqwest::Client,
    cache: Mutex<HashMap<String, (Option<TokenMarketData>, DateTime<Utc>)>>,
}

impl DexScreenerClient {
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(timeout_secs))
                .build()
                .unwrap_or_default(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Fetch token pairs and pick the best one (highest liquidity)
    async fn get_token_pairs(&self, address: &str) -> anyhow::Result<Option<DexPair>> {
        let url = format!("{}/latest/dex/tokens/{}", DEXSCREENER_BASE, address);
        let resp = self.client.get(&url).send().await?;
        let data: TokenPairsResponse = resp.json().await?;

        if let Some(mut pairs) = data.pairs {
            pairs.sort_by(|a, b| {
                let la = a.liquidity.as_ref().and_then(|l| l.usd).unwrap_or(0.0);
                let lb = b.liquidity.as_ref().and_then(|l| l.usd).unwrap_or(0.0);
                lb.partial_cmp(&la).unwrap_or(std::cmp::Ordering::Equal)
            });
            return Ok(pairs.into_iter().next());
        }
        Ok(None)
    }

    /// Convert the best pair into the oracle's market data shape
    fn pair_to_market_data(&self, address: &str, pair: &DexPair) -> Option<TokenMarketData> {
        // The queried token may sit on either side of the pair
        let mut token = &pair.base_token;
        if !token.address.eq_ignore_ascii_case(address) {
            token = pair.quote_token.as_ref()?;
        }

        let symbol = token.symbol.clone().unwrap_or_default();
        if symbol.is_empty() {
            return None;
        }

        let price_usd = pair
            .price_usd
            .as_ref()
            .and_then(|p| p.parse::<f64>().ok())
            .unwrap_or(0.0);

        Some(TokenMarketData {
            symbol,
            name: token.name.clone().unwrap_or_default(),
            price_usd,
            market_cap: pair.market_cap.or(pair.fdv),
            liquidity_usd: pair.liquidity.as_ref().and_then(|l| l.usd),
            price_change_1h: pair.price_change.as_ref().and_then(|pc| pc.h1),
            price_change_24h: pair.price_change.as_ref().and_then(|pc| pc.h24),
            volume_24h: pair.volume.as_ref().and_then(|v| v.h24),
            chain: pair.chain_id.clone(),
            image_url: pair.info.as_ref().and_then(|i| i.image_url.clone()),
            dex_url: pair
                .url
                .clone()
                .unwrap_or_else(|| format!("https://dexscreener.com/search?q={address}")),
        })
    }

    fn cached(&self, key: &str) -> Option<Option<TokenMarketData>> {
        let cache = self.cache.lock().expect("dex cache poisoned");
        cache.get(key).and_then(|(data, at)| {
            if Utc::now() - *at < Duration::minutes(CACHE_TTL_MINUTES) {
                Some(data.clone())
            } else {
                None
            }
        })
    }

    fn store(&self, key: String, data: Option<TokenMarketData>) {
        let mut cache = self.cache.lock().expect("dex cache poisoned");
        cache.insert(key, (data, Utc::now()));
    }
}

impl Default for DexScreenerClient {
    fn default() -> Self {
        Self::new(30)
    }
}

#[async_trait]
impl MarketOracle for DexScreenerClient {
    async fn lookup(&self, address: &str) -> Option<TokenMarketData> {
        let cache_key = address.to_lowercase();
        if let Some(cached) = self.cached(&cache_key) {
            return cached;
        }

        let result = match self.get_token_pairs(address).await {
            Ok(Some(pair)) => self.pair_to_market_data(address, &pair),
            Ok(None) => {
                debug!(address, "no dexscreener pairs");
                None
            }
            Err(e) => {
                warn!(address, error = %e, "dexscreener fetch failed");
                // Transient failure: don't poison the cache with a negative
                return None;
            }
        };

        self.store(cache_key, result.clone());
        result
    }
}
