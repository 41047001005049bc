//! Message deduplication over a sliding window
//!
//! Exact suppression via content fingerprints plus semantic suppression via
//! embedding cosine similarity. The window is a single concurrent structure:
//! the exact-hash path is O(1), the embedding list sits behind one mutex.

pub mod embedding;

pub use embedding::{cosine_similarity, Embedder, HttpEmbedder};

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::config::DedupConfig;
use crate::extract::{fingerprint, ProcessedMessage};

struct DedupState {
    // fingerprint -> time last seen
    hashes: HashMap<String, DateTime<Utc>>,
    // (fingerprint, embedding, time seen), oldest first
    embeddings: VecDeque<(String, Vec<f32>, DateTime<Utc>)>,
}

/// Sliding-window deduplicator
pub struct Deduplicator {
    config: DedupConfig,
    embedder: Option<Arc<dyn Embedder>>,
    state: Mutex<DedupState>,
    // unix seconds of the last embed-failure warning, for rate limiting
    last_embed_warn: AtomicI64,
}

impl Deduplicator {
    pub fn new(config: DedupConfig, embedder: Option<Arc<dyn Embedder>>) -> Self {
        Self {
            config,
            embedder,
            state: Mutex::new(DedupState {
                hashes: HashMap::new(),
                embeddings: VecDeque::new(),
            }),
            last_embed_warn: AtomicI64::new(0),
        }
    }

    fn window(&self) -> Duration {
        Duration::minutes(self.config.dedup_window_minutes as i64)
    }

    /// Check whether text duplicates something inside the window. Returns the
    /// matched fingerprint when it does. Does not mark the text as seen.
    pub async fn is_duplicate(&self, text: &str) -> (bool, Option<String>) {
        self.is_duplicate_at(text, Utc::now()).await
    }

    async fn is_duplicate_at(&self, text: &str, now: DateTime<Utc>) -> (bool, Option<String>) {
        let text_hash = fingerprint(text);

        // Exact path, and snapshot stored vectors for the semantic path
        let stored: Vec<(String, Vec<f32>)> = {
            let mut state = self.state.lock().expect("dedup state poisoned");
            prune(&mut state, now - self.window());

            if state.hashes.contains_key(&text_hash) {
                debug!(hash = %&text_hash[..16], "exact duplicate");
                return (true, Some(text_hash));
            }

            if self.embedder.is_none()
                || text.chars().count() <= self.config.min_semantic_len
                || state.embeddings.is_empty()
            {
                return (false, None);
            }

            state
                .embeddings
                .iter()
                .map(|(h, e, _)| (h.clone(), e.clone()))
                .collect()
        };

        // Semantic path runs outside the lock; the oracle call can suspend
        let embedder = self.embedder.as_ref().unwrap();
        let query = match embedder.embed(text).await {
            Ok(v) => v,
            Err(e) => {
                self.warn_embed_failure(&e, now);
                return (false, None);
            }
        };

        for (stored_hash, stored_vec) in &stored {
            let similarity = cosine_similarity(&query, stored_vec);
            if similarity >= self.config.similarity_threshold {
                debug!(
                    similar_hash = %&stored_hash[..16],
                    similarity,
                    "semantic duplicate"
                );
                return (true, Some(stored_hash.clone()));
            }
        }

        (false, None)
    }

    /// Record text into the window, optionally storing its embedding
    pub async fn mark_seen(&self, text: &str) {
        self.mark_seen_at(text, Utc::now()).await
    }

    async fn mark_seen_at(&self, text: &str, now: DateTime<Utc>) {
        let text_hash = fingerprint(text);

        let embedding = if self.embedder.is_some()
            && text.chars().count() > self.config.min_semantic_len
        {
            match self.embedder.as_ref().unwrap().embed(text).await {
                Ok(v) => Some(v),
                Err(e) => {
                    self.warn_embed_failure(&e, now);
                    None
                }
            }
        } else {
            None
        };

        let mut state = self.state.lock().expect("dedup state poisoned");
        prune(&mut state, now - self.window());
        state.hashes.insert(text_hash.clone(), now);

        if let Some(embedding) = embedding {
            state.embeddings.push_back((text_hash, embedding, now));
            while state.embeddings.len() > self.config.max_embeddings {
                state.embeddings.pop_front();
            }
        }
    }

    /// Keep the first occurrence per fingerprint, preserving input order
    pub fn deduplicate_batch(&self, messages: Vec<ProcessedMessage>) -> Vec<ProcessedMessage> {
        let mut seen: HashMap<String, ()> = HashMap::new();
        let before = messages.len();

        let unique: Vec<ProcessedMessage> = messages
            .into_iter()
            .filter(|m| seen.insert(m.content_fingerprint.clone(), ()).is_none())
            .collect();

        debug!(
            original = before,
            unique = unique.len(),
            "batch deduplicated"
        );

        unique
    }

    /// Partition texts into semantic groups. Greedy single pass: a text joins
    /// the first group whose representative clears the threshold, else opens
    /// a new group. Returns index groups; fingerprint-identical texts always
    /// group together even without an embedder.
    pub async fn group_similar(&self, texts: &[String]) -> Vec<Vec<usize>> {
        let mut groups: Vec<Vec<usize>> = Vec::new();
        // (representative fingerprint, representative embedding)
        let mut reps: Vec<(String, Option<Vec<f32>>)> = Vec::new();

        for (i, text) in texts.iter().enumerate() {
            let text_hash = fingerprint(text);

            let embedding = match &self.embedder {
                Some(embedder) if text.chars().count() > self.config.min_semantic_len => {
                    match embedder.embed(text).await {
                        Ok(v) => Some(v),
                        Err(e) => {
                            self.warn_embed_failure(&e, Utc::now());
                            None
                        }
                    }
                }
                _ => None,
            };

            let mut joined = false;
            for (g, (rep_hash, rep_vec)) in reps.iter().enumerate() {
                let matches = *rep_hash == text_hash
                    || match (&embedding, rep_vec) {
                        (Some(a), Some(b)) => {
                            cosine_similarity(a, b) >= self.config.similarity_threshold
                        }
                        _ => false,
                    };
                if matches {
                    groups[g].push(i);
                    joined = true;
                    break;
                }
            }

            if !joined {
                groups.push(vec![i]);
                reps.push((text_hash, embedding));
            }
        }

        groups
    }

    fn warn_embed_failure(&self, err: &crate::error::Error, now: DateTime<Utc>) {
        let now_secs = now.timestamp();
        let last = self.last_embed_warn.load(Ordering::Relaxed);
        if now_secs - last >= 60
            && self
                .last_embed_warn
                .compare_exchange(last, now_secs, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
        {
            warn!(error = %err, "embedding oracle unavailable, falling back to fingerprint-only dedup");
        }
    }
}

fn prune(state: &mut DedupState, cutoff: DateTime<Utc>) {
    state.hashes.retain(|_, t| *t > cutoff);
    while state
        .embeddings
        .front()
        .map_or(false, |(_, _, t)| *t <= cutoff)
    {
        state.embeddings.pop_front();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use async_trait::async_trait;

    /// Deterministic test embedder: returns canned vectors per keyword
    struct StubEmbedder;

    #[async_trait]
    impl Embedder for StubEmbedder {
        async fn embed(&self, text: &str) -> crate::error::Result<Vec<f32>> {
            // Vectors chosen so "frog" texts are near-identical and the
            // "dog" text is clearly distinct.
            if text.contains("frog") {
                if text.contains("variant") {
                    Ok(vec![0.95, 0.3122, 0.0])
                } else {
                    Ok(vec![1.0, 0.0, 0.0])
                }
            } else if text.contains("dog") {
                Ok(vec![0.0, 1.0, 0.0])
            } else {
                Ok(vec![0.5, 0.5, 0.7071])
            }
        }

        fn dimension(&self) -> usize {
            3
        }
    }

    /// Embedder that always fails, for fallback tests
    struct BrokenEmbedder;

    #[async_trait]
    impl Embedder for BrokenEmbedder {
        async fn embed(&self, _text: &str) -> crate::error::Result<Vec<f32>> {
            Err(Error::EmbeddingUnavailable("down".into()))
        }

        fn dimension(&self) -> usize {
            3
        }
    }

    fn dedup(embedder: Option<Arc<dyn Embedder>>) -> Deduplicator {
        Deduplicator::new(DedupConfig::default(), embedder)
    }

    #[tokio::test]
    async fn test_mark_seen_then_duplicate() {
        let d = dedup(None);
        let text = "gm $FROG looking strong today";

        let (dup, _) = d.is_duplicate(text).await;
        assert!(!dup);

        d.mark_seen(text).await;
        let (dup, matched) = d.is_duplicate(text).await;
        assert!(dup);
        assert_eq!(matched, Some(fingerprint(text)));
    }

    #[tokio::test]
    async fn test_case_and_spacing_variants_deduplicate() {
        let d = dedup(None);
        d.mark_seen("gm $FROG looking strong today").await;
        let (dup, _) = d.is_duplicate("GM  $FROG  looking strong today").await;
        assert!(dup);
    }

    #[tokio::test]
    async fn test_window_expiry() {
        let d = dedup(None);
        d.mark_seen("old news about $FROG").await;

        // Backdate the entry past the window
        {
            let mut state = d.state.lock().unwrap();
            let stale = Utc::now() - Duration::minutes(6);
            for t in state.hashes.values_mut() {
                *t = stale;
            }
        }

        let (dup, _) = d.is_duplicate("old news about $FROG").await;
        assert!(!dup);
    }

    #[tokio::test]
    async fn test_semantic_duplicate_above_threshold() {
        let d = dedup(Some(Arc::new(StubEmbedder)));
        d.mark_seen("the frog token is going to run hard today").await;

        // cosine([1,0,0],[0.95,0.3122,0]) ~= 0.95 >= 0.85
        let (dup, matched) = d
            .is_duplicate("the frog token variant is going to run hard")
            .await;
        assert!(dup);
        assert!(matched.is_some());
    }

    #[tokio::test]
    async fn test_dissimilar_not_deduplicated() {
        let d = dedup(Some(Arc::new(StubEmbedder)));
        d.mark_seen("the frog token is going to run hard today").await;

        // cosine([1,0,0],[0,1,0]) = 0 <= 0.80
        let (dup, _) = d.is_duplicate("completely unrelated dog coin chatter").await;
        assert!(!dup);
    }

    #[tokio::test]
    async fn test_short_text_skips_semantic_path() {
        let d = dedup(Some(Arc::new(StubEmbedder)));
        d.mark_seen("the frog token is going to run hard today").await;

        // 20 chars or fewer: only the exact path applies
        let (dup, _) = d.is_duplicate("frog frog frog").await;
        assert!(!dup);
    }

    #[tokio::test]
    async fn test_broken_embedder_falls_back_to_exact() {
        let d = dedup(Some(Arc::new(BrokenEmbedder)));
        let text = "the frog token is going to run hard today";
        d.mark_seen(text).await;

        let (dup, _) = d.is_duplicate(text).await;
        assert!(dup, "exact path must still work when the oracle is down");

        let (dup, _) = d
            .is_duplicate("the frog token variant is going to run hard")
            .await;
        assert!(!dup, "semantic path silently degrades");
    }

    #[tokio::test]
    async fn test_embedding_cap_evicts_oldest() {
        let config = DedupConfig {
            max_embeddings: 3,
            ..DedupConfig::default()
        };
        let d = Deduplicator::new(config, Some(Arc::new(StubEmbedder)));

        for i in 0..5 {
            d.mark_seen(&format!("unique message number {i} about something"))
                .await;
        }

        let state = d.state.lock().unwrap();
        assert_eq!(state.embeddings.len(), 3);
    }

    #[tokio::test]
    async fn test_batch_dedup_keeps_first_occurrence() {
        use crate::extract::{Chain, Extractor, RawMessage};
        use chrono::Utc;

        let extractor = Extractor::new(Chain::Solana);
        let make = |id: &str, text: &str| {
            extractor.process(&RawMessage {
                id: id.into(),
                source_id: "s".into(),
                source_name: "chat".into(),
                timestamp: Utc::now(),
                text: text.into(),
                reply_to_id: None,
            })
        };

        let batch = vec![
            make("1", "first unique"),
            make("2", "second unique"),
            make("3", "FIRST   unique"), // normalizes to the same fingerprint
        ];

        let d = dedup(None);
        let unique = d.deduplicate_batch(batch);
        assert_eq!(unique.len(), 2);
        assert_eq!(unique[0].id, "1");
        assert_eq!(unique[1].id, "2");
    }

    #[tokio::test]
    async fn test_group_similar() {
        let d = dedup(Some(Arc::new(StubEmbedder)));
        let texts = vec![
            "the frog token is going to run hard today".to_string(),
            "the frog token variant is going to run hard".to_string(),
            "completely unrelated dog coin chatter here".to_string(),
        ];

        let groups = d.group_similar(&texts).await;
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0], vec![0, 1]);
        assert_eq!(groups[1], vec![2]);
    }
}
