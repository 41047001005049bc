//! Spam detection over cluster message sets

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;

use crate::cluster::Cluster;

lazy_static! {
    // pattern -> weight
    static ref SPAM_TABLE: Vec<(Regex, f64)> = vec![
        (Regex::new(r"(?i)\bgiveaway\b").unwrap(), 0.3),
        (Regex::new(r"(?i)\bairdrop\b").unwrap(), 0.2),
        (Regex::new(r"(?i)\bfree\s+(?:tokens|coins|money)\b").unwrap(), 0.3),
        (Regex::new(r"(?i)\bclick\s+(?:here|link)\b").unwrap(), 0.2),
        (Regex::new(r"(?i)\bjoin\s+(?:now|us|today)\b").unwrap(), 0.1),
        (Regex::new(r"(?i)\blimited\s+time\b").unwrap(), 0.2),
        (Regex::new(r"(?i)\bverify\s+wallet\b").unwrap(), 0.4),
        (Regex::new(r"(?i)\bconnect\s+wallet\b").unwrap(), 0.3),
        (Regex::new(r"(?i)\bdm\s+(?:me|us)\b").unwrap(), 0.2),
        (Regex::new(r"(?i)\b(?:100|1000)x\s+guaranteed\b").unwrap(), 0.4),
        (Regex::new(r"(?i)\bpresale\b").unwrap(), 0.15),
        (Regex::new(r"(?i)\bwhitelist\b").unwrap(), 0.1),
    ];
}

/// Score a cluster's spam likelihood in [0, 1]
pub fn spam_score(cluster: &Cluster) -> f64 {
    let mut score = 0.0;

    let texts: Vec<&str> = cluster
        .messages
        .iter()
        .map(|m| m.original_text.as_str())
        .collect();
    let combined = texts.join(" ");

    for (pattern, weight) in SPAM_TABLE.iter() {
        if pattern.is_match(&combined) {
            score += weight;
        }
    }

    // Repeated identical texts point at bot behavior
    let total = texts.len();
    if total > 3 {
        let unique = texts.iter().collect::<HashSet<_>>().len();
        if (unique as f64) / (total as f64) < 0.5 {
            score += 0.3;
        }
    }

    // One source hammering the same token
    if cluster.source_ids.len() == 1 && cluster.total_mentions > 10 {
        score += 0.2;
    }

    score.min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::ClusteringEngine;
    use crate::config::{ClusteringConfig, ScoringConfig};
    use crate::extract::{Chain, Extractor, MatchSource, RawMessage, TokenRef};
    use chrono::Utc;

    fn cluster_from(texts: &[&str], source_ids: &[&str]) -> Cluster {
        let engine = ClusteringEngine::new(&ClusteringConfig::default(), ScoringConfig::default());
        let extractor = Extractor::new(Chain::Solana);
        let token = TokenRef {
            symbol: None,
            address: Some("SpamTokenAddr".into()),
            chain: Chain::Solana,
            confidence: 0.95,
            match_source: MatchSource::CaPrefix,
        };
        let now = Utc::now();
        let mut last = None;
        for (i, text) in texts.iter().enumerate() {
            let source = source_ids[i % source_ids.len()];
            let msg = extractor.process(&RawMessage {
                id: format!("m{i}"),
                source_id: source.into(),
                source_name: format!("chat-{source}"),
                timestamp: now,
                text: (*text).into(),
                reply_to_id: None,
            });
            last = Some(engine.add_message_at(&msg, &token, now).cluster);
        }
        last.unwrap()
    }

    #[test]
    fn test_clean_cluster_scores_zero() {
        let c = cluster_from(
            &["thoughts on this one?", "chart looks decent"],
            &["s1", "s2"],
        );
        assert_eq!(spam_score(&c), 0.0);
    }

    #[test]
    fn test_pattern_weights_accumulate() {
        let c = cluster_from(
            &["massive giveaway, verify wallet to claim your airdrop"],
            &["s1"],
        );
        // giveaway 0.3 + verify wallet 0.4 + airdrop 0.2
        assert!((spam_score(&c) - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_repeated_texts_add_bot_penalty() {
        let texts = vec!["same shill text"; 6];
        let c = cluster_from(&texts, &["s1", "s2"]);
        assert!((spam_score(&c) - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_single_source_spam_penalty() {
        let texts: Vec<String> = (0..12).map(|i| format!("unique message {i}")).collect();
        let refs: Vec<&str> = texts.iter().map(|s| s.as_str()).collect();
        let c = cluster_from(&refs, &["s1"]);
        assert!((spam_score(&c) - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_score_capped_at_one() {
        let mut texts = vec![
            "giveaway airdrop free tokens click here join now limited time \
             verify wallet connect wallet dm me presale whitelist 100x guaranteed",
        ];
        texts.extend(vec!["repeat"; 11]);
        let c = cluster_from(&texts, &["s1"]);
        assert_eq!(spam_score(&c), 1.0);
    }
}
