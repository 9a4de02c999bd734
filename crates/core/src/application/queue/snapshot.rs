// Persisted queue snapshot (single key holding a JSON array of items)

use crate::domain::QueueItem;
use crate::error::Result;
use crate::port::KeyValueStore;
use std::sync::Arc;
use tracing::{debug, error, warn};

pub(crate) struct SnapshotStore {
    store: Arc<dyn KeyValueStore>,
    key: String,
    capacity: usize,
}

impl SnapshotStore {
    pub(crate) fn new(store: Arc<dyn KeyValueStore>, key: impl Into<String>, capacity: usize) -> Self {
        Self {
            store,
            key: key.into(),
            capacity,
        }
    }

    /// Read the persisted queue
    ///
    /// Never fails: unreadable storage or corrupted JSON yields an empty
    /// queue, and individual malformed records are skipped.
    pub(crate) async fn load(&self) -> Vec<QueueItem> {
        let raw = match self.store.get(&self.key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                error!(key = %self.key, error = %e, "Failed to read persisted queue, starting empty");
                return Vec::new();
            }
        };

        let records: Vec<serde_json::Value> = match serde_json::from_str(&raw) {
            Ok(records) => records,
            Err(e) => {
                warn!(key = %self.key, error = %e, "Persisted queue is corrupted, starting empty");
                return Vec::new();
            }
        };

        let mut items: Vec<QueueItem> = Vec::with_capacity(records.len());
        for record in records {
            match serde_json::from_value::<QueueItem>(record) {
                Ok(item) if item.max_attempts > 0 && item.operation.validate().is_ok() => {
                    items.push(item)
                }
                Ok(item) => warn!(item_id = %item.id, "Skipping invalid persisted queue item"),
                Err(e) => warn!(error = %e, "Skipping malformed persisted queue item"),
            }
        }

        if items.len() > self.capacity {
            let excess = items.len() - self.capacity;
            items.drain(..excess);
        }

        debug!(key = %self.key, items = items.len(), "Loaded persisted queue");
        items
    }

    /// Rewrite the persisted queue with (at most `capacity` of the newest) `items`
    pub(crate) async fn save(&self, items: &[QueueItem]) -> Result<()> {
        let start = items.len().saturating_sub(self.capacity);
        let json = serde_json::to_string(&items[start..])?;
        self.store.set(&self.key, &json).await
    }
}
