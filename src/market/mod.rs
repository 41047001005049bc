//! Market data - oracle contract and the DexScreener client

pub mod dexscreener;

pub use dexscreener::DexScreenerClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Market data for one token, assumed at most ~5 minutes stale
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenMarketData {
    pub symbol: String,
    pub name: String,
    pub price_usd: f64,
    pub market_cap: Option<f64>,
    pub liquidity_usd: Option<f64>,
    pub price_change_1h: Option<f64>,
    pub price_change_24h: Option<f64>,
    pub volume_24h: Option<f64>,
    pub chain: String,
    pub image_url: Option<String>,
    pub dex_url: String,
}

/// Price/pair lookup oracle. Failures surface as `None`: consumers drop the
/// token or continue without the enrichment, never abort the scan.
#[async_trait]
pub trait MarketOracle: Send + Sync {
    async fn lookup(&self, address: &str) -> Option<TokenMarketData>;

    /// Batched lookup; the default implementation loops
    async fn lookup_many(&self, addresses: &[String]) -> HashMap<String, TokenMarketData> {
        let mut out = HashMap::new();
        for address in addresses {
            if let Some(data) = self.lookup(address).await {
                out.insert(address.clone(), data);
            }
        }
        out
    }
}
