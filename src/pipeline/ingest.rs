//! Ingest fan-in with backpressure
//!
//! Producers push raw messages into bounded queues, one per priority class.
//! When a queue is full the incoming message is dropped and counted; latency
//! from unbounded queues is worse than occasional drops on this workload.

use async_channel::{Receiver, Sender, TryRecvError, TrySendError};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

use crate::config::IngestConfig;
use crate::extract::RawMessage;

/// Bounded two-class ingest queue
pub struct IngestQueue {
    priority_tx: Sender<RawMessage>,
    priority_rx: Receiver<RawMessage>,
    normal_tx: Sender<RawMessage>,
    normal_rx: Receiver<RawMessage>,
    high_water_mark: usize,
    dropped: AtomicU64,
}

impl IngestQueue {
    pub fn new(config: &IngestConfig) -> Self {
        let (priority_tx, priority_rx) = async_channel::bounded(config.channel_capacity);
        let (normal_tx, normal_rx) = async_channel::bounded(config.channel_capacity);
        Self {
            priority_tx,
            priority_rx,
            normal_tx,
            normal_rx,
            high_water_mark: config.high_water_mark,
            dropped: AtomicU64::new(0),
        }
    }

    /// Push a message; returns false when it was dropped. Never blocks.
    pub fn push(&self, message: RawMessage, is_priority: bool) -> bool {
        let (tx, class) = if is_priority {
            (&self.priority_tx, "priority")
        } else {
            (&self.normal_tx, "normal")
        };

        if tx.len() >= self.high_water_mark {
            warn!(
                class,
                len = tx.len(),
                "ingest queue above high-water mark"
            );
        }

        match tx.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                debug!(class, "ingest queue full, message dropped");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Pop up to `max` messages, priority class first. Waits until at least
    /// one message is available; returns an empty batch only once the queue
    /// is closed and drained, which signals shutdown to workers.
    pub async fn pop_batch(&self, max: usize) -> Vec<RawMessage> {
        let mut batch = Vec::new();

        // Wait for the first message from either class
        let first = tokio::select! {
            biased;
            msg = self.priority_rx.recv() => msg,
            msg = self.normal_rx.recv() => msg,
        };
        match first {
            Ok(msg) => batch.push(msg),
            Err(_) => {
                // Channel closed; drain whatever is left
            }
        }

        while batch.len() < max {
            match self.priority_rx.try_recv() {
                Ok(msg) => {
                    batch.push(msg);
                    continue;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => {}
            }
            match self.normal_rx.try_recv() {
                Ok(msg) => batch.push(msg),
                Err(_) => break,
            }
        }

        batch
    }

    /// Close the queue; producers fail fast, workers drain and exit
    pub fn close(&self) {
        self.priority_tx.close();
        self.normal_tx.close();
    }

    pub fn is_closed(&self) -> bool {
        self.priority_tx.is_closed()
    }

    pub fn len(&self) -> usize {
        self.priority_rx.len() + self.normal_rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Messages dropped because a queue was full
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
