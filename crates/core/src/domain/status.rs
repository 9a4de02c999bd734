// Queue Status Snapshot

use serde::{Deserialize, Serialize};

/// Read-only view of the queue, handed to subscribers after every mutation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatus {
    pub size: usize,
    pub oldest_item_timestamp: Option<i64>, // epoch ms
    pub is_processing: bool,
}

impl QueueStatus {
    /// True while anything is still waiting to be synced
    pub fn has_pending(&self) -> bool {
        self.size > 0
    }
}
