//! Pattern matching for entity extraction
//!
//! All regexes are compiled once and shared across workers; these functions
//! are pure and run on every inbound message.

use lazy_static::lazy_static;
use regex::Regex;

use crate::extract::types::{
    Chain, MatchSource, PriceMention, PriceUnit, TokenRef, WalletLabel, WalletRef,
};

/// Max distance (chars) between a `$SYMBOL` and an address for association
const SYMBOL_ASSOCIATION_RANGE: usize = 100;

lazy_static! {
    // $SYMBOL pattern - most common
    static ref SYMBOL: Regex = Regex::new(r"\$([A-Za-z]{2,10})\b").unwrap();

    // CA: address pattern
    static ref CA_PREFIX: Regex =
        Regex::new(r"(?i)(?:CA|Contract|Address)[\s:]+([A-Za-z0-9]{32,44})\b").unwrap();

    // Solana pump.fun patterns
    static ref PUMP_ADDRESS: Regex =
        Regex::new(r"([1-9A-HJ-NP-Za-km-z]{32,44})pump\b").unwrap();
    static ref PUMP_LINK: Regex =
        Regex::new(r"(?i)pump\.fun/(?:coin/)?([A-Za-z0-9]+)").unwrap();

    // DEX / explorer links
    static ref DEXSCREENER: Regex =
        Regex::new(r"(?i)dexscreener\.com/(\w+)/([A-Za-z0-9]+)").unwrap();
    static ref BIRDEYE: Regex = Regex::new(r"(?i)birdeye\.so/token/([A-Za-z0-9]+)").unwrap();
    static ref JUPITER: Regex = Regex::new(r"(?i)jup\.ag/swap/\w+-([A-Za-z0-9]+)").unwrap();
    static ref PHOTON: Regex =
        Regex::new(r"(?i)photon-sol\.tinyastro\.io/\w+/([A-Za-z0-9]+)").unwrap();

    // Raw addresses
    static ref SOLANA_ADDR: Regex = Regex::new(r"\b([1-9A-HJ-NP-Za-km-z]{32,44})\b").unwrap();
    static ref EVM_ADDR: Regex = Regex::new(r"\b(0x[a-fA-F0-9]{40})\b").unwrap();
    static ref SOLANA_ADDR_FULL: Regex =
        Regex::new(r"^[1-9A-HJ-NP-Za-km-z]{32,44}$").unwrap();
    static ref EVM_ADDR_FULL: Regex = Regex::new(r"^0x[a-fA-F0-9]{40}$").unwrap();

    // Price patterns
    static ref PRICE_DOLLAR: Regex = Regex::new(r"\$([\d,]+(?:\.\d+)?)").unwrap();
    static ref PRICE_USD_SUFFIX: Regex =
        Regex::new(r"(?i)\b([\d,]+(?:\.\d+)?)\s*(?:USD|USDT|USDC)\b").unwrap();
    static ref PRICE_SOL: Regex = Regex::new(r"(?i)\b([\d,]+(?:\.\d+)?)\s*SOL\b").unwrap();
    static ref PRICE_ETH: Regex = Regex::new(r"(?i)\b([\d,]+(?:\.\d+)?)\s*ETH\b").unwrap();
    static ref PRICE_BNB: Regex = Regex::new(r"(?i)\b([\d,]+(?:\.\d+)?)\s*BNB\b").unwrap();
    static ref PRICE_MULTIPLIER: Regex = Regex::new(r"\b(\d+(?:\.\d+)?)\s*[xX]\b").unwrap();
    static ref PRICE_MCAP: Regex =
        Regex::new(r"(?i)(?:MC|mcap|market\s*cap)[\s:]*\$?([\d,]+(?:\.\d+)?)\s*([KMBkmb])?")
            .unwrap();

    // Whale/notable wallet labels
    static ref WALLET_LABELS: Vec<(Regex, WalletLabel)> = vec![
        (Regex::new(r"(?i)\bwhale\b").unwrap(), WalletLabel::Whale),
        (Regex::new(r"(?i)\bdev\s*wallet\b").unwrap(), WalletLabel::Dev),
        (Regex::new(r"(?i)\bsniper\b").unwrap(), WalletLabel::Sniper),
        (Regex::new(r"(?i)\bfresh\s*wallet\b").unwrap(), WalletLabel::Fresh),
        (Regex::new(r"(?i)\binsider\b").unwrap(), WalletLabel::Insider),
        (Regex::new(r"(?i)\bkol\b").unwrap(), WalletLabel::Kol),
    ];

    // Chain keywords, word-boundary matched
    static ref CHAIN_KEYWORDS: Vec<(Regex, Chain)> = vec![
        (
            Regex::new(r"(?i)\b(?:solana|sol|raydium|jupiter|photon)\b|(?i)pump\.fun").unwrap(),
            Chain::Solana,
        ),
        (
            Regex::new(r"(?i)\b(?:base|aerodrome|basechain)\b").unwrap(),
            Chain::Base,
        ),
        (
            Regex::new(r"(?i)\b(?:bsc|bnb|binance|pancakeswap)\b").unwrap(),
            Chain::Bsc,
        ),
        (
            Regex::new(r"(?i)\b(?:eth|ethereum|uniswap|mainnet)\b").unwrap(),
            Chain::Ethereum,
        ),
    ];
}

/// Check if address is valid Solana format (base58 run, 32-44 chars)
pub fn is_valid_solana_address(address: &str) -> bool {
    SOLANA_ADDR_FULL.is_match(address)
}

/// Check if address is valid EVM format
pub fn is_valid_evm_address(address: &str) -> bool {
    EVM_ADDR_FULL.is_match(address)
}

/// Detect chain from text context; first matching chain wins
pub fn detect_chain_from_context(text: &str) -> Option<Chain> {
    CHAIN_KEYWORDS
        .iter()
        .find(|(re, _)| re.is_match(text))
        .map(|(_, chain)| *chain)
}

/// Resolve the chain of a captured address using its shape plus text context.
/// EVM addresses default to `base` unless the context names another EVM chain.
fn resolve_address_chain(address: &str, context_chain: Option<Chain>, fallback: Chain) -> Chain {
    if is_valid_evm_address(address) {
        match context_chain {
            Some(c) if c.is_evm() => c,
            _ => Chain::Base,
        }
    } else if is_valid_solana_address(address) {
        Chain::Solana
    } else {
        context_chain.unwrap_or(fallback)
    }
}

/// Tracks `$SYMBOL` captures so each is associated with at most one address
struct SymbolPool {
    // (symbol, byte offset of the match, consumed)
    entries: Vec<(String, usize, bool)>,
}

impl SymbolPool {
    fn collect(text: &str) -> Self {
        let mut entries: Vec<(String, usize, bool)> = Vec::new();
        for cap in SYMBOL.captures_iter(text) {
            let m = cap.get(1).unwrap();
            let symbol = m.as_str().to_uppercase();
            if !entries.iter().any(|(s, _, _)| *s == symbol) {
                entries.push((symbol, m.start(), false));
            }
        }
        Self { entries }
    }

    /// Take the closest unconsumed symbol within the association range
    fn take_nearby(&mut self, address_pos: usize) -> Option<String> {
        let mut best: Option<(usize, usize)> = None; // (index, distance)
        for (i, (_, pos, consumed)) in self.entries.iter().enumerate() {
            if *consumed {
                continue;
            }
            let distance = pos.abs_diff(address_pos);
            if distance <= SYMBOL_ASSOCIATION_RANGE
                && best.map_or(true, |(_, d)| distance < d)
            {
                best = Some((i, distance));
            }
        }
        best.map(|(i, _)| {
            self.entries[i].2 = true;
            self.entries[i].0.clone()
        })
    }

    fn remaining(self) -> Vec<String> {
        self.entries
            .into_iter()
            .filter(|(_, _, consumed)| !consumed)
            .map(|(s, _, _)| s)
            .collect()
    }
}

/// True when the ±10-char neighborhood of a match mentions "pump"; such
/// base58 runs are pump.fun mints, not wallets.
fn near_pump(text: &str, start: usize, end: usize) -> bool {
    let lo = start.saturating_sub(10);
    let hi = (end + 10).min(text.len());
    // Offsets come from regex matches; widen to char boundaries if needed
    let lo = (0..=lo).rev().find(|&i| text.is_char_boundary(i)).unwrap_or(0);
    let hi = (hi..=text.len())
        .find(|&i| text.is_char_boundary(i))
        .unwrap_or(text.len());
    text[lo..hi].to_lowercase().contains("pump")
}

/// Extract token mentions from text
pub fn extract_tokens(text: &str, default_chain: Chain) -> Vec<TokenRef> {
    let mut tokens = Vec::new();
    let mut seen_addresses: Vec<String> = Vec::new();
    let mut symbols = SymbolPool::collect(text);

    let context_chain = detect_chain_from_context(text);
    let detected = context_chain.unwrap_or(default_chain);

    let push_token = |tokens: &mut Vec<TokenRef>,
                      seen: &mut Vec<String>,
                      symbol: Option<String>,
                      address: String,
                      chain: Chain,
                      confidence: f64,
                      match_source: MatchSource| {
        if seen.iter().any(|a| *a == address) {
            return;
        }
        seen.push(address.clone());
        tokens.push(TokenRef {
            symbol,
            address: Some(address),
            chain,
            confidence,
            match_source,
        });
    };

    // CA:/Contract:/Address: prefixed addresses, with symbol association
    for cap in CA_PREFIX.captures_iter(text) {
        let m = cap.get(1).unwrap();
        let address = m.as_str().to_string();
        let chain = resolve_address_chain(&address, context_chain, detected);
        let symbol = symbols.take_nearby(m.start());
        push_token(
            &mut tokens,
            &mut seen_addresses,
            symbol,
            address,
            chain,
            0.95,
            MatchSource::CaPrefix,
        );
    }

    // Raw base58 runs ending in "pump" are pump.fun mints
    for cap in PUMP_ADDRESS.captures_iter(text) {
        let address = cap.get(1).unwrap().as_str().to_string();
        push_token(
            &mut tokens,
            &mut seen_addresses,
            None,
            address,
            Chain::Solana,
            0.9,
            MatchSource::PumpAddress,
        );
    }

    // pump.fun links
    for cap in PUMP_LINK.captures_iter(text) {
        let address = cap.get(1).unwrap().as_str().to_string();
        if address.len() > 10 {
            push_token(
                &mut tokens,
                &mut seen_addresses,
                None,
                address,
                Chain::Solana,
                0.95,
                MatchSource::PumpLink,
            );
        }
    }

    // dexscreener links carry their own chain segment
    for cap in DEXSCREENER.captures_iter(text) {
        let chain = Chain::parse(cap.get(1).unwrap().as_str()).unwrap_or(detected);
        let address = cap.get(2).unwrap().as_str().to_string();
        push_token(
            &mut tokens,
            &mut seen_addresses,
            None,
            address,
            chain,
            0.95,
            MatchSource::DexLink,
        );
    }

    for cap in BIRDEYE.captures_iter(text) {
        let address = cap.get(1).unwrap().as_str().to_string();
        push_token(
            &mut tokens,
            &mut seen_addresses,
            None,
            address,
            Chain::Solana,
            0.95,
            MatchSource::DexLink,
        );
    }

    for cap in JUPITER.captures_iter(text) {
        let address = cap.get(1).unwrap().as_str().to_string();
        push_token(
            &mut tokens,
            &mut seen_addresses,
            None,
            address,
            Chain::Solana,
            0.9,
            MatchSource::DexLink,
        );
    }

    for cap in PHOTON.captures_iter(text) {
        let address = cap.get(1).unwrap().as_str().to_string();
        push_token(
            &mut tokens,
            &mut seen_addresses,
            None,
            address,
            Chain::Solana,
            0.9,
            MatchSource::DexLink,
        );
    }

    // Bare addresses count as token mentions only when a $SYMBOL sits close
    // enough to claim them; everything else stays a wallet candidate.
    for re in [&*SOLANA_ADDR, &*EVM_ADDR] {
        for cap in re.captures_iter(text) {
            let m = cap.get(1).unwrap();
            let address = m.as_str().to_string();
            if seen_addresses.iter().any(|a| *a == address) {
                continue;
            }
            if near_pump(text, m.start(), m.end()) {
                continue;
            }
            if let Some(symbol) = symbols.take_nearby(m.start()) {
                let chain = resolve_address_chain(&address, context_chain, detected);
                push_token(
                    &mut tokens,
                    &mut seen_addresses,
                    Some(symbol),
                    address,
                    chain,
                    0.7,
                    MatchSource::Address,
                );
            }
        }
    }

    // Leftover symbols become symbol-only references
    for symbol in symbols.remaining() {
        tokens.push(TokenRef {
            symbol: Some(symbol),
            address: None,
            chain: detected,
            confidence: 0.5,
            match_source: MatchSource::Symbol,
        });
    }

    tokens
}

/// Extract wallet addresses from text. A notable-wallet cue anywhere in the
/// message labels every wallet captured from it.
pub fn extract_wallets(text: &str, default_chain: Chain) -> Vec<WalletRef> {
    let mut wallets = Vec::new();
    let mut seen: Vec<String> = Vec::new();

    let label = WALLET_LABELS
        .iter()
        .find(|(re, _)| re.is_match(text))
        .map(|(_, l)| *l);

    let context_chain = detect_chain_from_context(text);
    let detected = context_chain.unwrap_or(default_chain);

    // Solana addresses only make sense as wallets in a solana context
    if detected == Chain::Solana {
        for cap in SOLANA_ADDR.captures_iter(text) {
            let m = cap.get(1).unwrap();
            let address = m.as_str().to_string();
            if seen.iter().any(|a| *a == address) || near_pump(text, m.start(), m.end()) {
                continue;
            }
            seen.push(address.clone());
            wallets.push(WalletRef {
                address,
                chain: Chain::Solana,
                label,
            });
        }
    }

    for cap in EVM_ADDR.captures_iter(text) {
        let address = cap.get(1).unwrap().as_str().to_string();
        if seen.iter().any(|a| *a == address) {
            continue;
        }
        seen.push(address.clone());
        let chain = match context_chain {
            Some(c) if c.is_evm() => c,
            _ => Chain::Base,
        };
        wallets.push(WalletRef {
            address,
            chain,
            label,
        });
    }

    wallets
}

fn parse_amount(raw: &str) -> Option<f64> {
    raw.replace(',', "").parse::<f64>().ok()
}

/// Extract price mentions from text
pub fn extract_prices(text: &str) -> Vec<PriceMention> {
    let mut prices = Vec::new();

    for (re, unit) in [
        (&*PRICE_DOLLAR, PriceUnit::Usd),
        (&*PRICE_USD_SUFFIX, PriceUnit::Usd),
        (&*PRICE_SOL, PriceUnit::Sol),
        (&*PRICE_ETH, PriceUnit::Eth),
        (&*PRICE_BNB, PriceUnit::Bnb),
        (&*PRICE_MULTIPLIER, PriceUnit::Multiplier),
    ] {
        for cap in re.captures_iter(text) {
            if let Some(value) = parse_amount(cap.get(1).unwrap().as_str()) {
                prices.push(PriceMention { value, unit });
            }
        }
    }

    for cap in PRICE_MCAP.captures_iter(text) {
        if let Some(mut value) = parse_amount(cap.get(1).unwrap().as_str()) {
            if let Some(suffix) = cap.get(2) {
                value *= match suffix.as_str().to_ascii_uppercase().as_str() {
                    "K" => 1_000.0,
                    "M" => 1_000_000.0,
                    "B" => 1_000_000_000.0,
                    _ => 1.0,
                };
            }
            prices.push(PriceMention {
                value,
                unit: PriceUnit::MarketCap,
            });
        }
    }

    prices
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_and_ca_prefix_association() {
        let text = "Aped $PEPE hard - CA: 0x6982508145454Ce325dDbE47a25d4ec3d2311933";
        let tokens = extract_tokens(text, Chain::Solana);

        assert_eq!(tokens.len(), 1);
        let t = &tokens[0];
        assert_eq!(t.symbol.as_deref(), Some("PEPE"));
        assert_eq!(
            t.address.as_deref(),
            Some("0x6982508145454Ce325dDbE47a25d4ec3d2311933")
        );
        assert_eq!(t.chain, Chain::Base);
        assert_eq!(t.match_source, MatchSource::CaPrefix);
        assert!((t.confidence - 0.95).abs() < f64::EPSILON);
    }

    #[test]
    fn test_symbol_consumed_once() {
        let text = "$FOO first CA: 0x1111111111111111111111111111111111111111 \
                    then CA: 0x2222222222222222222222222222222222222222";
        let tokens = extract_tokens(text, Chain::Solana);

        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].symbol.as_deref(), Some("FOO"));
        assert_eq!(tokens[1].symbol, None);
    }

    #[test]
    fn test_symbol_out_of_range_not_associated() {
        let padding = "x".repeat(120);
        let text = format!(
            "$FAR {padding} CA: 0x1111111111111111111111111111111111111111"
        );
        let tokens = extract_tokens(&text, Chain::Solana);

        let with_addr = tokens.iter().find(|t| t.address.is_some()).unwrap();
        assert_eq!(with_addr.symbol, None);
        // The stranded symbol still surfaces on its own
        assert!(tokens
            .iter()
            .any(|t| t.symbol.as_deref() == Some("FAR") && t.address.is_none()));
    }

    #[test]
    fn test_pump_link() {
        let text = "https://pump.fun/coin/7GCihgDB8fe6KNjn2MYtkzZcRjQy3t9GHdC8uHYmW2hr";
        let tokens = extract_tokens(text, Chain::Solana);

        assert_eq!(tokens.len(), 1);
        assert_eq!(
            tokens[0].address.as_deref(),
            Some("7GCihgDB8fe6KNjn2MYtkzZcRjQy3t9GHdC8uHYmW2hr")
        );
        assert_eq!(tokens[0].chain, Chain::Solana);
        assert!(tokens[0].confidence >= 0.9);
    }

    #[test]
    fn test_dexscreener_chain_segment() {
        let text = "check dexscreener.com/base/0xAbCdEf1234567890aBcDeF1234567890AbCdEf12";
        let tokens = extract_tokens(text, Chain::Solana);
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].chain, Chain::Base);
        assert_eq!(tokens[0].match_source, MatchSource::DexLink);
    }

    #[test]
    fn test_symbol_only_token() {
        let tokens = extract_tokens("gm $FROG looking strong today", Chain::Solana);
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].symbol.as_deref(), Some("FROG"));
        assert_eq!(tokens[0].address, None);
        assert_eq!(tokens[0].match_source, MatchSource::Symbol);
    }

    #[test]
    fn test_chain_keywords_word_bounded() {
        assert_eq!(
            detect_chain_from_context("buying on raydium today"),
            Some(Chain::Solana)
        );
        assert_eq!(
            detect_chain_from_context("absolutely massive move"),
            None
        );
        assert_eq!(
            detect_chain_from_context("pancakeswap listing soon"),
            Some(Chain::Bsc)
        );
    }

    #[test]
    fn test_whale_label_attaches_to_wallets() {
        let text = "whale 7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU just loaded";
        let wallets = extract_wallets(text, Chain::Solana);
        assert_eq!(wallets.len(), 1);
        assert_eq!(wallets[0].label, Some(WalletLabel::Whale));
    }

    #[test]
    fn test_prices_and_mcap() {
        let prices = extract_prices("entry at $0.0042, mcap 1.5M, easy 10x");
        assert!(prices
            .iter()
            .any(|p| p.unit == PriceUnit::Usd && (p.value - 0.0042).abs() < 1e-9));
        assert!(prices
            .iter()
            .any(|p| p.unit == PriceUnit::MarketCap && (p.value - 1_500_000.0).abs() < 1e-3));
        assert!(prices
            .iter()
            .any(|p| p.unit == PriceUnit::Multiplier && (p.value - 10.0).abs() < 1e-9));
    }

    #[test]
    fn test_address_validators() {
        assert!(is_valid_solana_address(
            "7GCihgDB8fe6KNjn2MYtkzZcRjQy3t9GHdC8uHYmW2hr"
        ));
        assert!(!is_valid_solana_address("0OIl"));
        assert!(is_valid_evm_address(
            "0x6982508145454Ce325dDbE47a25d4ec3d2311933"
        ));
        assert!(!is_valid_evm_address("0x123"));
    }
}
