//! RPC Request/Response Types
//!
//! JSON-RPC method parameters and results.

use serde::{Deserialize, Serialize};
use syncq_core::domain::{DeadLetter, QueueStatus};

/// queue.enqueue.v1 - Defer an operation
#[derive(Debug, Deserialize)]
pub struct EnqueueRequest {
    pub kind: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnqueueResponse {
    pub item_id: String,
    pub status: QueueStatus,
}

/// queue.dead_letters.v1 - Recently abandoned items
#[derive(Debug, Deserialize)]
pub struct DeadLettersRequest {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

impl Default for DeadLettersRequest {
    fn default() -> Self {
        Self {
            limit: default_limit(),
        }
    }
}

fn default_limit() -> usize {
    20
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLettersResponse {
    pub dead_letters: Vec<DeadLetter>,
}

/// admin.stats.v1 - Queue and storage statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    pub queue_size: usize,
    pub oldest_item_timestamp: Option<i64>,
    pub is_processing: bool,
    pub online: bool,
    pub handlers: Vec<String>,
    pub dead_letters: i64,
    pub snapshot_bytes: i64,
    pub db_size_bytes: i64,
    pub uptime_seconds: u64,
}

/// admin.maintenance.v1 - Run manual maintenance
#[derive(Debug, Default, Deserialize)]
pub struct MaintenanceRequest {
    #[serde(default)]
    pub force_vacuum: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceResponse {
    pub vacuum_run: bool,
    pub dead_letters_deleted: i64,
    pub db_size_before: i64,
    pub db_size_after: i64,
}
