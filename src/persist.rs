//! Persistence sink - append-only storage for retired clusters and source
//! reputation snapshots
//!
//! The hot path never blocks on the sink: a buffering wrapper absorbs sink
//! failures up to a cap, dropping oldest entries beyond it and surfacing the
//! drops through a counter.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::cluster::ClusterSnapshot;
use crate::error::{Error, Result};
use crate::sources::SourceStats;

/// Append-only storage for retired clusters and source snapshots
#[async_trait]
pub trait PersistenceSink: Send + Sync {
    async fn store_cluster(&self, snapshot: &ClusterSnapshot) -> Result<()>;
    async fn store_source(&self, snapshot: &SourceStats) -> Result<()>;
}

/// JSON-lines sink: one file per record kind under a data directory
pub struct JsonlSink {
    clusters_path: PathBuf,
    sources_path: PathBuf,
    // Serializes appends so concurrent jobs don't interleave lines
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonlSink {
    pub fn new<P: AsRef<Path>>(data_dir: P) -> std::io::Result<Self> {
        let dir = data_dir.as_ref();
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            clusters_path: dir.join("clusters.jsonl"),
            sources_path: dir.join("sources.jsonl"),
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    async fn append_line(&self, path: &Path, line: String) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(|e| Error::Persistence(e.to_string()))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| Error::Persistence(e.to_string()))?;
        file.write_all(b"\n")
            .await
            .map_err(|e| Error::Persistence(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl PersistenceSink for JsonlSink {
    async fn store_cluster(&self, snapshot: &ClusterSnapshot) -> Result<()> {
        let line = serde_json::to_string(snapshot)?;
        self.append_line(&self.clusters_path, line).await?;
        debug!(cluster_id = %snapshot.id, "cluster persisted");
        Ok(())
    }

    async fn store_source(&self, snapshot: &SourceStats) -> Result<()> {
        let line = serde_json::to_string(snapshot)?;
        self.append_line(&self.sources_path, line).await?;
        debug!(source_id = %snapshot.source_id, "source snapshot persisted");
        Ok(())
    }
}

enum Buffered {
    Cluster(ClusterSnapshot),
    Source(SourceStats),
}

/// Wraps a sink with an in-memory retry buffer. Failed writes are buffered
/// up to `cap`; beyond that the oldest entries are dropped and counted.
pub struct BufferedSink {
    inner: Arc<dyn PersistenceSink>,
    buffer: Mutex<VecDeque<Buffered>>,
    cap: usize,
    dropped: AtomicU64,
}

impl BufferedSink {
    pub fn new(inner: Arc<dyn PersistenceSink>, cap: usize) -> Self {
        Self {
            inner,
            buffer: Mutex::new(VecDeque::new()),
            cap,
            dropped: AtomicU64::new(0),
        }
    }

    pub fn buffered_len(&self) -> usize {
        self.buffer.lock().expect("persist buffer poisoned").len()
    }

    /// Number of records dropped because the buffer overflowed
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn push_buffered(&self, item: Buffered) {
        let mut buffer = self.buffer.lock().expect("persist buffer poisoned");
        buffer.push_back(item);
        while buffer.len() > self.cap {
            buffer.pop_front();
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Retry everything buffered; stops at the first failure
    pub async fn flush(&self) -> Result<usize> {
        let mut flushed = 0;
        loop {
            let item = {
                let mut buffer = self.buffer.lock().expect("persist buffer poisoned");
                match buffer.pop_front() {
                    Some(item) => item,
                    None => return Ok(flushed),
                }
            };

            let result = match &item {
                Buffered::Cluster(s) => self.inner.store_cluster(s).await,
                Buffered::Source(s) => self.inner.store_source(s).await,
            };

            match result {
                Ok(()) => flushed += 1,
                Err(e) => {
                    // Put it back at the front and give up for now
                    let mut buffer = self.buffer.lock().expect("persist buffer poisoned");
                    buffer.push_front(item);
                    return Err(e);
                }
            }
        }
    }
}

#[async_trait]
impl PersistenceSink for BufferedSink {
    async fn store_cluster(&self, snapshot: &ClusterSnapshot) -> Result<()> {
        if let Err(e) = self.inner.store_cluster(snapshot).await {
            warn!(cluster_id = %snapshot.id, error = %e, "sink failed, buffering cluster");
            self.push_buffered(Buffered::Cluster(snapshot.clone()));
        }
        Ok(())
    }

    async fn store_source(&self, snapshot: &SourceStats) -> Result<()> {
        if let Err(e) = self.inner.store_source(snapshot).await {
            warn!(source_id = %snapshot.source_id, error = %e, "sink failed, buffering source");
            self.push_buffered(Buffered::Source(snapshot.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::Cluster;
    use crate::extract::Chain;
    use chrono::Utc;
    use std::sync::atomic::AtomicBool;

    fn snapshot(id: &str) -> ClusterSnapshot {
        let mut cluster = Cluster::new(Some("Addr".into()), None, Chain::Solana, Utc::now());
        cluster.id = id.to_string();
        ClusterSnapshot::from(&cluster)
    }

    #[tokio::test]
    async fn test_jsonl_sink_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonlSink::new(dir.path()).unwrap();

        sink.store_cluster(&snapshot("c1")).await.unwrap();
        sink.store_cluster(&snapshot("c2")).await.unwrap();

        let content = std::fs::read_to_string(dir.path().join("clusters.jsonl")).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let parsed: ClusterSnapshot = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed.id, "c1");
    }

    struct FlakySink {
        fail: AtomicBool,
        stored: AtomicU64,
    }

    #[async_trait]
    impl PersistenceSink for FlakySink {
        async fn store_cluster(&self, _snapshot: &ClusterSnapshot) -> Result<()> {
            if self.fail.load(Ordering::Relaxed) {
                Err(Error::Persistence("disk on fire".into()))
            } else {
                self.stored.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
        }

        async fn store_source(&self, _snapshot: &SourceStats) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_buffered_sink_absorbs_failures() {
        let flaky = Arc::new(FlakySink {
            fail: AtomicBool::new(true),
            stored: AtomicU64::new(0),
        });
        let buffered = BufferedSink::new(flaky.clone(), 10);

        for i in 0..3 {
            // Failures must not propagate to the caller
            buffered
                .store_cluster(&snapshot(&format!("c{i}")))
                .await
                .unwrap();
        }
        assert_eq!(buffered.buffered_len(), 3);
        assert_eq!(buffered.dropped_count(), 0);

        // Sink recovers; flush drains the backlog
        flaky.fail.store(false, Ordering::Relaxed);
        let flushed = buffered.flush().await.unwrap();
        assert_eq!(flushed, 3);
        assert_eq!(flaky.stored.load(Ordering::Relaxed), 3);
        assert_eq!(buffered.buffered_len(), 0);
    }

    #[tokio::test]
    async fn test_buffered_sink_drops_oldest_beyond_cap() {
        let flaky = Arc::new(FlakySink {
            fail: AtomicBool::new(true),
            stored: AtomicU64::new(0),
        });
        let buffered = BufferedSink::new(flaky, 2);

        for i in 0..5 {
            buffered
                .store_cluster(&snapshot(&format!("c{i}")))
                .await
                .unwrap();
        }
        assert_eq!(buffered.buffered_len(), 2);
        assert_eq!(buffered.dropped_count(), 3);
    }
}
