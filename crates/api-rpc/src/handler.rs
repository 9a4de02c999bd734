//! RPC Method Handlers
//!
//! Implements the logic behind each JSON-RPC method.

use crate::error::{throttled, to_rpc_error};
use crate::rate_limiter::RateLimiter;
use crate::types::{
    DeadLettersRequest, DeadLettersResponse, EnqueueRequest, EnqueueResponse, MaintenanceRequest,
    MaintenanceResponse, StatsResponse,
};
use jsonrpsee::types::ErrorObjectOwned;
use std::sync::Arc;
use std::time::Instant;
use syncq_core::application::{MaintenanceScheduler, OfflineQueue};
use syncq_core::domain::{OperationDescriptor, QueueStatus};
use syncq_core::port::{DeadLetterStore, Maintenance};
use tracing::info;

/// Everything the handlers need, built by the daemon
pub struct RpcDeps {
    pub queue: OfflineQueue,
    pub dead_letters: Arc<dyn DeadLetterStore>,
    pub maintenance: Arc<dyn Maintenance>,
    pub scheduler: Arc<MaintenanceScheduler>,
    pub rate_limiter: RateLimiter,
}

/// RPC Handler with injected dependencies
pub struct RpcHandler {
    deps: RpcDeps,
    start_time: Instant,
}

impl RpcHandler {
    pub fn new(deps: RpcDeps) -> Self {
        Self {
            deps,
            start_time: Instant::now(),
        }
    }

    /// queue.enqueue.v1
    pub async fn enqueue(
        &self,
        params: EnqueueRequest,
    ) -> Result<EnqueueResponse, ErrorObjectOwned> {
        if !self.deps.rate_limiter.try_acquire() {
            return Err(throttled());
        }

        let queue = &self.deps.queue;
        let operation = OperationDescriptor::new(params.kind, params.payload);
        queue.validate(&operation).map_err(to_rpc_error)?;

        let item_id = match params.max_attempts {
            Some(max_attempts) => queue.enqueue_with_max_attempts(operation, max_attempts).await,
            None => queue.enqueue(operation).await,
        }
        .map_err(to_rpc_error)?;

        Ok(EnqueueResponse {
            item_id,
            status: queue.get_status(),
        })
    }

    /// queue.status.v1
    pub fn status(&self) -> Result<QueueStatus, ErrorObjectOwned> {
        Ok(self.deps.queue.get_status())
    }

    /// queue.process.v1
    pub async fn process(&self) -> Result<QueueStatus, ErrorObjectOwned> {
        self.deps.queue.process_queue().await;
        Ok(self.deps.queue.get_status())
    }

    /// queue.clear.v1
    pub async fn clear(&self) -> Result<QueueStatus, ErrorObjectOwned> {
        info!("Queue cleared over RPC");
        self.deps.queue.clear().await;
        Ok(self.deps.queue.get_status())
    }

    /// queue.dead_letters.v1
    pub async fn dead_letters(
        &self,
        params: DeadLettersRequest,
    ) -> Result<DeadLettersResponse, ErrorObjectOwned> {
        let dead_letters = self
            .deps
            .dead_letters
            .list(params.limit)
            .await
            .map_err(to_rpc_error)?;
        Ok(DeadLettersResponse { dead_letters })
    }

    /// admin.stats.v1
    pub async fn stats(&self) -> Result<StatsResponse, ErrorObjectOwned> {
        let status = self.deps.queue.get_status();
        let stats = self.deps.maintenance.get_stats().await.map_err(to_rpc_error)?;

        Ok(StatsResponse {
            queue_size: status.size,
            oldest_item_timestamp: status.oldest_item_timestamp,
            is_processing: status.is_processing,
            online: self.deps.queue.is_online(),
            handlers: self.deps.queue.handler_kinds(),
            dead_letters: stats.dead_letter_count,
            snapshot_bytes: stats.snapshot_bytes,
            db_size_bytes: stats.db_size_bytes,
            uptime_seconds: self.start_time.elapsed().as_secs(),
        })
    }

    /// admin.maintenance.v1
    pub async fn maintenance(
        &self,
        params: MaintenanceRequest,
    ) -> Result<MaintenanceResponse, ErrorObjectOwned> {
        let report = self
            .deps
            .scheduler
            .run_now(params.force_vacuum)
            .await
            .map_err(to_rpc_error)?;

        Ok(MaintenanceResponse {
            vacuum_run: report.vacuum_run,
            dead_letters_deleted: report.dead_letters_deleted,
            db_size_before: report.before.db_size_bytes,
            db_size_after: report.after.db_size_bytes,
        })
    }
}
