//! Hot-path batch processor: dedup, extract, cluster, track, publish
//!
//! No I/O apart from the embedding oracle inside dedup and the persistence
//! sink for retired clusters; remote failures never propagate into
//! clustering state.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info};

use crate::cluster::{ClusterSnapshot, ClusteringEngine};
use crate::dedup::Deduplicator;
use crate::extract::{Extractor, MessageClass, RawMessage};
use crate::persist::PersistenceSink;
use crate::pipeline::publisher::Publisher;
use crate::rank::RankingEngine;
use crate::sources::SourceTracker;

/// Recent raw messages retained for batch scans
const RECENT_MESSAGES_CAP: usize = 2000;

/// Hot-path counters
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    pub malformed_dropped: AtomicU64,
    pub duplicates_suppressed: AtomicU64,
    pub messages_processed: AtomicU64,
    pub clusters_updated: AtomicU64,
    pub clusters_retired: AtomicU64,
}

impl PipelineMetrics {
    pub fn summary(&self) -> String {
        format!(
            "processed={} duplicates={} malformed={} cluster_updates={} retired={}",
            self.messages_processed.load(Ordering::Relaxed),
            self.duplicates_suppressed.load(Ordering::Relaxed),
            self.malformed_dropped.load(Ordering::Relaxed),
            self.clusters_updated.load(Ordering::Relaxed),
            self.clusters_retired.load(Ordering::Relaxed),
        )
    }
}

/// Runs batches through the extraction, dedup and clustering stages
pub struct Processor {
    extractor: Extractor,
    dedup: Arc<Deduplicator>,
    clustering: Arc<ClusteringEngine>,
    tracker: Arc<SourceTracker>,
    ranking: Arc<RankingEngine>,
    publisher: Arc<Publisher>,
    sink: Arc<dyn PersistenceSink>,
    pub metrics: Arc<PipelineMetrics>,
    recent: Mutex<VecDeque<RawMessage>>,
}

impl Processor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        extractor: Extractor,
        dedup: Arc<Deduplicator>,
        clustering: Arc<ClusteringEngine>,
        tracker: Arc<SourceTracker>,
        ranking: Arc<RankingEngine>,
        publisher: Arc<Publisher>,
        sink: Arc<dyn PersistenceSink>,
    ) -> Self {
        Self {
            extractor,
            dedup,
            clustering,
            tracker,
            ranking,
            publisher,
            sink,
            metrics: Arc::new(PipelineMetrics::default()),
            recent: Mutex::new(VecDeque::new()),
        }
    }

    /// Process one batch; returns how many messages made it through dedup
    pub async fn process_batch(&self, batch: Vec<RawMessage>) -> usize {
        self.process_batch_at(batch, Utc::now()).await
    }

    pub async fn process_batch_at(&self, batch: Vec<RawMessage>, now: DateTime<Utc>) -> usize {
        if batch.is_empty() {
            return 0;
        }
        info!(count = batch.len(), "processing message batch");

        let mut processed_count = 0;
        for raw in batch {
            if raw.text.trim().is_empty() {
                self.metrics.malformed_dropped.fetch_add(1, Ordering::Relaxed);
                continue;
            }

            self.remember(raw.clone());

            let (is_dup, _) = self.dedup.is_duplicate(&raw.text).await;
            if is_dup {
                self.metrics
                    .duplicates_suppressed
                    .fetch_add(1, Ordering::Relaxed);
                continue;
            }
            self.dedup.mark_seen(&raw.text).await;

            let processed = self.extractor.process(&raw);
            let is_call = processed.classification == MessageClass::Call;

            for result in self.clustering.process_message_at(&processed, now) {
                self.metrics.clusters_updated.fetch_add(1, Ordering::Relaxed);

                for retired in &result.retired {
                    self.metrics.clusters_retired.fetch_add(1, Ordering::Relaxed);
                    if let Err(e) = self
                        .sink
                        .store_cluster(&ClusterSnapshot::from(retired))
                        .await
                    {
                        error!(cluster_id = %retired.id, error = %e, "failed to persist retired cluster");
                    }
                }

                // Publish the update with the full-precision priority
                let mut cluster = result.cluster;
                cluster.priority_score =
                    self.ranking.priority_score(&cluster, &self.tracker, now);
                self.publisher.publish(&self.ranking.feed_entry(&cluster, now));
            }

            if is_call {
                self.tracker.record_call(
                    &processed.source_id,
                    &processed.source_name,
                    "channel",
                    processed.timestamp,
                );
            }

            self.metrics.messages_processed.fetch_add(1, Ordering::Relaxed);
            processed_count += 1;
        }

        debug!(processed = processed_count, "batch complete");
        processed_count
    }

    fn remember(&self, raw: RawMessage) {
        let mut recent = self.recent.lock().expect("recent buffer poisoned");
        recent.push_back(raw);
        while recent.len() > RECENT_MESSAGES_CAP {
            recent.pop_front();
        }
    }

    /// Snapshot of recently ingested raw messages, oldest first
    pub fn recent_messages(&self) -> Vec<RawMessage> {
        self.recent
            .lock()
            .expect("recent buffer poisoned")
            .iter()
            .cloned()
            .collect()
    }
}
