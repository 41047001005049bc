//! Sentiment, risk and quality analysis for crypto chat messages
//!
//! Three weighted lexicons (bullish / bearish / neutral) produce an additive
//! net score; separate lexicons score risk and quality. Classification into
//! call / alert / discussion / spam runs over pre-compiled pattern tables.

use lazy_static::lazy_static;
use regex::Regex;

use crate::extract::types::{MessageClass, Sentiment, SentimentVerdict};

/// Quality starts from this baseline before lexicon adjustments
const QUALITY_BASELINE: f64 = 50.0;
/// Risk above this level starts pulling quality down
const RISK_QUALITY_KNEE: f64 = 50.0;

// Signal tables keep insertion order so matched-signal lists are stable.
static BULLISH_SIGNALS: &[(&str, f64)] = &[
    // Emojis (high weight)
    ("\u{1F680}", 0.3),        // rocket
    ("\u{1F525}", 0.25),       // fire
    ("\u{1F48E}", 0.2),        // gem stone
    ("\u{1F319}", 0.25),       // crescent moon
    ("\u{1F4C8}", 0.2),        // chart increasing
    ("\u{1F4B0}", 0.15),       // money bag
    ("\u{1F3AF}", 0.15),       // direct hit
    ("\u{2B06}\u{FE0F}", 0.15), // up arrow
    ("\u{2705}", 0.1),         // check mark
    ("\u{1F4AA}", 0.1),        // flexed biceps
    ("\u{1F402}", 0.2),        // ox
    ("\u{1F98D}", 0.15),       // gorilla
    // Phrases (various weights)
    ("mooning", 0.35),
    ("moon", 0.3),
    ("lfg", 0.3),
    ("let's go", 0.2),
    ("send it", 0.3),
    ("aping", 0.3),
    ("ape", 0.25),
    ("buying", 0.15),
    ("bought", 0.15),
    ("buy", 0.15),
    ("bullish", 0.3),
    ("pumping", 0.25),
    ("pump", 0.2),
    ("100x", 0.35),
    ("10x", 0.25),
    ("gem", 0.2),
    ("alpha", 0.2),
    ("early", 0.15),
    ("potential", 0.1),
    ("undervalued", 0.2),
    ("accumulating", 0.2),
    ("accumulate", 0.2),
    ("loading", 0.2),
    ("loaded", 0.15),
    ("bags", 0.1),
    ("holding", 0.1),
    ("hodl", 0.15),
    ("diamond hands", 0.2),
    ("strong", 0.1),
    ("breaking out", 0.25),
    ("breakout", 0.2),
    ("all time high", 0.2),
    ("ath", 0.15),
    ("parabolic", 0.3),
    ("explosive", 0.2),
    ("insane", 0.15),
    ("massive", 0.15),
    ("huge", 0.1),
    ("whale", 0.15),
    ("smart money", 0.2),
    ("insider", 0.15),
    ("don't miss", 0.2),
    ("dont miss", 0.2),
    ("easy money", 0.2),
    ("free money", 0.2),
    ("guaranteed", 0.15),
    ("next", 0.1),
    ("based", 0.15),
    ("chad", 0.1),
    ("fomo", 0.15),
];

static BEARISH_SIGNALS: &[(&str, f64)] = &[
    // Emojis
    ("\u{1F4C9}", 0.25),        // chart decreasing
    ("\u{1F480}", 0.3),         // skull
    ("\u{1F534}", 0.2),         // red circle
    ("\u{26A0}\u{FE0F}", 0.2),  // warning
    ("\u{1F6A8}", 0.2),         // rotating light
    ("\u{2B07}\u{FE0F}", 0.15), // down arrow
    ("\u{274C}", 0.15),         // cross mark
    ("\u{1F43B}", 0.2),         // bear
    ("\u{1F62D}", 0.1),         // loudly crying
    ("\u{1F4A9}", 0.2),         // pile of poo
    // Phrases
    ("rugged", 0.45),
    ("rugpull", 0.45),
    ("rug pull", 0.45),
    ("rug", 0.4),
    ("scammer", 0.4),
    ("scam", 0.4),
    ("honeypot", 0.45),
    ("honey pot", 0.45),
    ("dumping", 0.35),
    ("dumped", 0.3),
    ("dump", 0.3),
    ("selling", 0.15),
    ("sell", 0.15),
    ("sold", 0.15),
    ("bearish", 0.3),
    ("dead", 0.3),
    ("dying", 0.25),
    ("rip", 0.25),
    ("over", 0.15),
    ("finished", 0.2),
    ("done", 0.15),
    ("avoid", 0.3),
    ("stay away", 0.35),
    ("red flags", 0.3),
    ("red flag", 0.3),
    ("warning", 0.25),
    ("careful", 0.15),
    ("caution", 0.15),
    ("fake", 0.3),
    ("fraud", 0.35),
    ("dev sold", 0.4),
    ("dev dumped", 0.4),
    ("dev wallet", 0.2),
    ("exit scam", 0.45),
    ("ponzi", 0.4),
    ("crashing", 0.35),
    ("crash", 0.3),
    ("tanking", 0.3),
    ("plummeting", 0.35),
    ("bleeding", 0.25),
    ("rekt", 0.3),
    ("wrecked", 0.25),
    ("loss", 0.2),
    ("lost", 0.15),
    ("no liquidity", 0.35),
    ("locked", 0.15),
    ("mint", 0.2),
    ("unlocked", 0.2),
    ("jeets", 0.25),
    ("jeet", 0.25),
    ("paper hands", 0.15),
    ("ngmi", 0.2),
    ("not gonna make it", 0.2),
];

static NEUTRAL_SIGNALS: &[(&str, f64)] = &[
    ("watching", 0.1),
    ("interesting", 0.1),
    ("new", 0.05),
    ("launched", 0.1),
    ("launching", 0.1),
    ("update", 0.05),
    ("news", 0.05),
    ("announcement", 0.05),
    ("information", 0.05),
    ("info", 0.05),
    ("analysis", 0.05),
    ("review", 0.05),
    ("looking at", 0.1),
    ("checking", 0.05),
    ("monitor", 0.05),
    ("tracking", 0.05),
];

// Risk signals: speculative language, warning signs, scam/rug cues
static RISK_SIGNALS: &[(&str, f64)] = &[
    ("gambling", 25.0),
    ("gamble", 25.0),
    ("casino", 20.0),
    ("lottery", 20.0),
    ("risky", 20.0),
    ("high risk", 25.0),
    ("degen play", 20.0),
    ("degen", 15.0),
    ("yolo", 15.0),
    ("punt", 15.0),
    ("quick flip", 15.0),
    ("flip", 10.0),
    ("be careful", 20.0),
    ("careful", 15.0),
    ("nfa", 10.0),
    ("dyor", 10.0),
    ("not financial advice", 10.0),
    ("proceed with caution", 20.0),
    ("at your own risk", 25.0),
    ("rugged", 45.0),
    ("rug", 40.0),
    ("scam", 40.0),
    ("honeypot", 45.0),
    ("dev sold", 40.0),
    ("dev dumped", 40.0),
    ("no audit", 25.0),
    ("unaudited", 20.0),
    ("anonymous", 15.0),
    ("anon dev", 20.0),
    ("no doxx", 15.0),
    ("no utility", 20.0),
    ("meme only", 15.0),
    ("just vibes", 10.0),
    ("pure speculation", 25.0),
    ("no roadmap", 15.0),
    ("dead project", 30.0),
    ("abandoned", 30.0),
    ("already pumped", 20.0),
    ("late entry", 15.0),
    ("top is in", 25.0),
    ("overbought", 15.0),
    ("overextended", 15.0),
    ("fading", 20.0),
];

// Quality signals: conviction, research, team quality, value, catalysts
static QUALITY_SIGNALS: &[(&str, f64)] = &[
    ("alpha", 15.0),
    ("high conviction", 25.0),
    ("strong conviction", 25.0),
    ("conviction", 20.0),
    ("thesis", 20.0),
    ("fundamentals", 15.0),
    ("fundamental", 15.0),
    ("solid", 10.0),
    ("legitimate", 15.0),
    ("legit", 10.0),
    ("researched", 15.0),
    ("due diligence", 20.0),
    ("dd", 10.0),
    ("analysis", 10.0),
    ("analyzed", 10.0),
    ("deep dive", 20.0),
    ("looked into", 10.0),
    ("doxxed team", 20.0),
    ("doxxed", 15.0),
    ("audited", 20.0),
    ("audit", 15.0),
    ("verified", 15.0),
    ("kyc", 15.0),
    ("established", 15.0),
    ("experienced team", 20.0),
    ("undervalued", 20.0),
    ("underrated", 15.0),
    ("hidden gem", 20.0),
    ("under the radar", 15.0),
    ("early", 15.0),
    ("ground floor", 20.0),
    ("asymmetric bet", 25.0),
    ("asymmetric", 20.0),
    ("risk reward", 15.0),
    ("good r/r", 20.0),
    ("catalyst", 15.0),
    ("upcoming", 10.0),
    ("partnership", 15.0),
    ("cex listing", 20.0),
    ("listing", 15.0),
    ("binance", 20.0),
    ("coinbase", 20.0),
    ("smart money", 20.0),
    ("whales buying", 20.0),
    ("institutions", 15.0),
    ("vc backed", 20.0),
];

lazy_static! {
    static ref CALL_PATTERNS: Vec<Regex> = vec![
        Regex::new(r"(?i)\bcall\b").unwrap(),
        Regex::new(r"(?i)\balpha\b").unwrap(),
        Regex::new(r"(?i)\bgem\b").unwrap(),
        Regex::new(r"(?i)\bentry\b").unwrap(),
        Regex::new(r"(?i)\bbuy\s+now\b").unwrap(),
        Regex::new(r"(?i)\bload\s+up\b").unwrap(),
        Regex::new(r"(?i)\bape(?:d|s|ing)?\b").unwrap(),
    ];
    static ref ALERT_PATTERNS: Vec<Regex> = vec![
        Regex::new(r"(?i)\balert\b").unwrap(),
        Regex::new(r"(?i)\bwhale\b").unwrap(),
        Regex::new(r"(?i)\bsmart\s+money\b").unwrap(),
        Regex::new(r"(?i)\bvolume\s+spike\b").unwrap(),
        Regex::new(r"(?i)\bbreaking\b").unwrap(),
        Regex::new(r"(?i)\burgent\b").unwrap(),
    ];
    static ref SPAM_PATTERNS: Vec<Regex> = vec![
        Regex::new(r"(?i)\bgiveaway\b").unwrap(),
        Regex::new(r"(?i)\bairdrop\b").unwrap(),
        Regex::new(r"(?i)\bfree\s+(?:tokens|coins|crypto)\b").unwrap(),
        Regex::new(r"(?i)\bclick\s+(?:here|link)\b").unwrap(),
        Regex::new(r"(?i)\bjoin\s+(?:now|us)\b").unwrap(),
        Regex::new(r"(?i)\blimited\s+time\b").unwrap(),
        Regex::new(r"(?i)\bverify\s+wallet\b").unwrap(),
        Regex::new(r"(?i)\bconnect\s+wallet\b").unwrap(),
        Regex::new(r"(?i)\bdm\s+(?:me|us)\b").unwrap(),
    ];
}

/// Analyze sentiment of crypto messages. Stateless; cheap to share.
#[derive(Debug, Clone, Default)]
pub struct SentimentAnalyzer;

impl SentimentAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Analyze sentiment of text with risk and quality assessment
    pub fn analyze(&self, text: &str) -> SentimentVerdict {
        let text_lower = text.to_lowercase();

        let mut bullish_score = 0.0;
        let mut bearish_score = 0.0;
        let mut neutral_score = 0.0;
        let mut risk_score = 0.0;
        let mut quality_score = 0.0;
        let mut matched_signals = Vec::new();
        let mut risk_factors = Vec::new();
        let mut quality_factors = Vec::new();

        // Emojis don't lowercase, so check the raw text too
        for (signal, weight) in BULLISH_SIGNALS {
            if text_lower.contains(signal) || text.contains(signal) {
                bullish_score += weight;
                matched_signals.push(format!("+{signal}"));
            }
        }

        for (signal, weight) in BEARISH_SIGNALS {
            if text_lower.contains(signal) || text.contains(signal) {
                bearish_score += weight;
                matched_signals.push(format!("-{signal}"));
            }
        }

        for (signal, weight) in NEUTRAL_SIGNALS {
            if text_lower.contains(signal) {
                neutral_score += weight;
                matched_signals.push(format!("~{signal}"));
            }
        }

        for (signal, weight) in RISK_SIGNALS {
            if text_lower.contains(signal) {
                risk_score += weight;
                risk_factors.push(signal.to_string());
            }
        }

        for (signal, weight) in QUALITY_SIGNALS {
            if text_lower.contains(signal) {
                quality_score += weight;
                quality_factors.push(signal.to_string());
            }
        }

        risk_factors.truncate(5);
        quality_factors.truncate(5);

        let final_risk = risk_score.min(100.0);
        let mut final_quality = (quality_score + QUALITY_BASELINE).min(100.0);
        if final_risk > RISK_QUALITY_KNEE {
            final_quality = (final_quality - (final_risk - RISK_QUALITY_KNEE) * 0.5).max(10.0);
        }

        let total_score = bullish_score + bearish_score + neutral_score;
        if total_score == 0.0 {
            return SentimentVerdict {
                polarity: Sentiment::Neutral,
                score: 0.0,
                confidence: 0.3,
                risk_score: final_risk,
                quality_score: final_quality,
                signals: Vec::new(),
                risk_factors,
                quality_factors,
            };
        }

        // Normalize net score to [-1, 1]
        let net_score = (bullish_score - bearish_score) / (bullish_score + bearish_score).max(1.0);

        let polarity = if net_score > 0.2 {
            Sentiment::Bullish
        } else if net_score < -0.2 {
            Sentiment::Bearish
        } else {
            Sentiment::Neutral
        };

        let confidence = (total_score / 2.0).min(1.0);

        matched_signals.truncate(10);

        SentimentVerdict {
            polarity,
            score: net_score,
            confidence,
            risk_score: final_risk,
            quality_score: final_quality,
            signals: matched_signals,
            risk_factors,
            quality_factors,
        }
    }

    /// Classify message type: spam is checked first, then call, then alert
    pub fn classify(&self, text: &str) -> (MessageClass, f64) {
        let spam_matches = SPAM_PATTERNS.iter().filter(|p| p.is_match(text)).count();
        if spam_matches >= 2 {
            return (MessageClass::Spam, 0.9);
        }

        let call_matches = CALL_PATTERNS.iter().filter(|p| p.is_match(text)).count();
        if call_matches >= 1 {
            let confidence = (0.5 + call_matches as f64 * 0.15).min(0.95);
            return (MessageClass::Call, confidence);
        }

        let alert_matches = ALERT_PATTERNS.iter().filter(|p| p.is_match(text)).count();
        if alert_matches >= 1 {
            let confidence = (0.5 + alert_matches as f64 * 0.15).min(0.95);
            return (MessageClass::Alert, confidence);
        }

        (MessageClass::Discussion, 0.5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bullish_text() {
        let analyzer = SentimentAnalyzer::new();
        let verdict = analyzer.analyze("this gem is mooning, lfg \u{1F680}");
        assert_eq!(verdict.polarity, Sentiment::Bullish);
        assert!(verdict.score > 0.2);
        assert!(!verdict.signals.is_empty());
    }

    #[test]
    fn test_bearish_text() {
        let analyzer = SentimentAnalyzer::new();
        let verdict = analyzer.analyze("total rug, dev sold and dumped, avoid");
        assert_eq!(verdict.polarity, Sentiment::Bearish);
        assert!(verdict.score < -0.2);
    }

    #[test]
    fn test_empty_text_is_neutral() {
        let analyzer = SentimentAnalyzer::new();
        let verdict = analyzer.analyze("zzz qqq");
        assert_eq!(verdict.polarity, Sentiment::Neutral);
        assert_eq!(verdict.score, 0.0);
        assert!((verdict.confidence - 0.3).abs() < f64::EPSILON);
        assert!((verdict.quality_score - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_score_bounds_on_arbitrary_text() {
        let analyzer = SentimentAnalyzer::new();
        let texts = [
            "moon moon moon 100x gem alpha lfg send it parabolic",
            "rug scam honeypot dump crash dead rekt fraud ponzi avoid",
            "gamble yolo degen risky casino lottery at your own risk rug scam honeypot",
            "",
        ];
        for text in texts {
            let v = analyzer.analyze(text);
            assert!((-1.0..=1.0).contains(&v.score), "score out of range: {text}");
            assert!((0.0..=100.0).contains(&v.risk_score));
            assert!((0.0..=100.0).contains(&v.quality_score));
            assert!((0.0..=1.0).contains(&v.confidence));
            assert!(v.signals.len() <= 10);
            assert!(v.risk_factors.len() <= 5);
            assert!(v.quality_factors.len() <= 5);
        }
    }

    #[test]
    fn test_high_risk_drags_quality() {
        let analyzer = SentimentAnalyzer::new();
        let v = analyzer.analyze("rug scam honeypot gamble yolo at your own risk");
        assert!(v.risk_score > 50.0);
        let ceiling = 100.0 - (v.risk_score - 50.0) * 0.5;
        assert!(v.quality_score <= ceiling + f64::EPSILON);
    }

    #[test]
    fn test_classify_spam_needs_two_hits() {
        let analyzer = SentimentAnalyzer::new();
        let (class, conf) = analyzer.classify("giveaway! verify wallet to claim");
        assert_eq!(class, MessageClass::Spam);
        assert!((conf - 0.9).abs() < f64::EPSILON);

        // A single spam cue alone is not enough
        let (class, _) = analyzer.classify("big giveaway soon");
        assert_ne!(class, MessageClass::Spam);
    }

    #[test]
    fn test_classify_call() {
        let analyzer = SentimentAnalyzer::new();
        let (class, conf) = analyzer.classify("aped this at open");
        assert_eq!(class, MessageClass::Call);
        assert!((conf - 0.65).abs() < 1e-9);

        let (class, conf) = analyzer.classify("alpha call, gem entry here");
        assert_eq!(class, MessageClass::Call);
        assert!((conf - 0.95).abs() < 1e-9);
    }

    #[test]
    fn test_classify_alert_and_discussion() {
        let analyzer = SentimentAnalyzer::new();
        let (class, _) = analyzer.classify("whale moved 500 sol");
        assert_eq!(class, MessageClass::Alert);

        let (class, conf) = analyzer.classify("what do you all make of this chart");
        assert_eq!(class, MessageClass::Discussion);
        assert!((conf - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_determinism() {
        let analyzer = SentimentAnalyzer::new();
        let a = analyzer.analyze("moon gem $FROG \u{1F680} careful though");
        let b = analyzer.analyze("moon gem $FROG \u{1F680} careful though");
        assert_eq!(a.score, b.score);
        assert_eq!(a.signals, b.signals);
        assert_eq!(a.risk_score, b.risk_score);
    }
}
