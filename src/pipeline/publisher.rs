//! Push-channel fan-out
//!
//! Each subscriber gets its own bounded channel. Sends never block the core:
//! a subscriber that is gone or can't keep up is unsubscribed on the spot.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::rank::FeedEntry;

/// A live subscription handle; dropping the receiver unsubscribes implicitly
pub struct Subscription {
    pub id: u64,
    pub rx: mpsc::Receiver<FeedEntry>,
}

/// Fan-out of feed entries to push subscribers
pub struct Publisher {
    subscribers: DashMap<u64, mpsc::Sender<FeedEntry>>,
    next_id: AtomicU64,
    buffer: usize,
}

impl Publisher {
    pub fn new(buffer: usize) -> Self {
        Self {
            subscribers: DashMap::new(),
            next_id: AtomicU64::new(1),
            buffer,
        }
    }

    pub fn subscribe(&self) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.buffer);
        self.subscribers.insert(id, tx);
        info!(subscriber = id, "feed subscriber added");
        Subscription { id, rx }
    }

    pub fn unsubscribe(&self, id: u64) {
        if self.subscribers.remove(&id).is_some() {
            info!(subscriber = id, "feed subscriber removed");
        }
    }

    /// Deliver an entry to every subscriber. Full or closed channels drop
    /// their subscriber; the core is unaffected.
    pub fn publish(&self, entry: &FeedEntry) {
        let mut stale = Vec::new();
        for sub in self.subscribers.iter() {
            match sub.value().try_send(entry.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    debug!(subscriber = sub.key(), "subscriber lagging, dropping");
                    stale.push(*sub.key());
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    stale.push(*sub.key());
                }
            }
        }
        for id in stale {
            self.unsubscribe(id);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}
