// Dead Letter Domain Model

use crate::domain::{ItemId, OperationDescriptor, QueueItem};
use serde::{Deserialize, Serialize};

/// Record of an item the queue gave up on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetter {
    pub item_id: ItemId,
    pub operation: OperationDescriptor,
    pub attempts: u32,
    pub max_attempts: u32,
    pub enqueued_at: i64, // epoch ms
    pub failed_at: i64,   // epoch ms
    pub reason: String,
}

impl DeadLetter {
    /// Build a dead letter from an item that has just been dropped
    pub fn from_item(item: QueueItem, failed_at: i64, reason: impl Into<String>) -> Self {
        Self {
            item_id: item.id,
            operation: item.operation,
            attempts: item.attempts,
            max_attempts: item.max_attempts,
            enqueued_at: item.enqueued_at,
            failed_at,
            reason: reason.into(),
        }
    }
}
