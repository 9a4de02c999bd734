// Offline Queue - persisted FIFO of deferred operations

pub mod constants;
mod snapshot;

use constants::*;
use snapshot::SnapshotStore;

use crate::application::observers::{Observers, Subscription};
use crate::application::panic_guard::panic_message;
use crate::application::retry::{RetryDecision, RetryPolicy};
use crate::domain::{DeadLetter, DomainError, ItemId, OperationDescriptor, QueueItem, QueueStatus};
use crate::error::Result;
use crate::port::{
    ConnectivityMonitor, DeadLetterStore, HandlerRegistry, IdProvider, KeyValueStore,
    OperationError, TimeProvider,
};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Queue configuration
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Maximum number of items kept (oldest evicted first)
    pub capacity: usize,
    /// Default max attempts for new items
    pub max_attempts: u32,
    /// Key the snapshot is persisted under
    pub storage_key: String,
    /// Per-operation timeout (None: an operation may run forever)
    pub operation_timeout: Option<Duration>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            operation_timeout: None,
        }
    }
}

impl QueueConfig {
    pub fn validate(&self) -> std::result::Result<(), DomainError> {
        if self.capacity == 0 {
            return Err(DomainError::InvalidCapacity(self.capacity));
        }
        if self.max_attempts == 0 {
            return Err(DomainError::InvalidMaxAttempts(self.max_attempts));
        }
        Ok(())
    }
}

/// Everything the queue talks to, injected by the composition root
pub struct QueuePorts {
    pub store: Arc<dyn KeyValueStore>,
    pub registry: HandlerRegistry,
    pub connectivity: Arc<dyn ConnectivityMonitor>,
    pub time_provider: Arc<dyn TimeProvider>,
    pub id_provider: Arc<dyn IdProvider>,
    pub dead_letters: Option<Arc<dyn DeadLetterStore>>,
}

struct Inner {
    config: QueueConfig,
    items: Mutex<VecDeque<QueueItem>>,
    processing: AtomicBool,
    snapshot: SnapshotStore,
    // Serializes snapshot writes so the last write always carries the latest state
    persist_lock: tokio::sync::Mutex<()>,
    registry: HandlerRegistry,
    connectivity: Arc<dyn ConnectivityMonitor>,
    time_provider: Arc<dyn TimeProvider>,
    id_provider: Arc<dyn IdProvider>,
    dead_letters: Option<Arc<dyn DeadLetterStore>>,
    retry_policy: RetryPolicy,
    status_observers: Observers<QueueStatus>,
    exhausted_observers: Observers<DeadLetter>,
}

/// Persisted FIFO queue of deferred operations
///
/// Items are retried when connectivity returns, dropped after
/// `max_attempts` failures, and evicted oldest-first beyond `capacity`.
/// Cloning is cheap; clones share the same queue.
#[derive(Clone)]
pub struct OfflineQueue {
    inner: Arc<Inner>,
}

/// Resets the single-flight flag when a pass ends, however it ends
struct ProcessingGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> ProcessingGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

#[derive(Default)]
struct PassSummary {
    succeeded: usize,
    retrying: usize,
    exhausted: usize,
}

impl OfflineQueue {
    /// Restore the queue from storage
    ///
    /// Unreadable or corrupted storage starts an empty queue. Only an
    /// invalid `config` is an error.
    pub async fn load(config: QueueConfig, ports: QueuePorts) -> Result<Self> {
        config.validate()?;

        let snapshot = SnapshotStore::new(ports.store, config.storage_key.clone(), config.capacity);
        let items: VecDeque<QueueItem> = snapshot.load().await.into();

        info!(
            restored_items = items.len(),
            capacity = config.capacity,
            handlers = ?ports.registry.kinds(),
            "Offline queue loaded"
        );

        let retry_policy = RetryPolicy::new(config.operation_timeout);

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                items: Mutex::new(items),
                processing: AtomicBool::new(false),
                snapshot,
                persist_lock: tokio::sync::Mutex::new(()),
                registry: ports.registry,
                connectivity: ports.connectivity,
                time_provider: ports.time_provider,
                id_provider: ports.id_provider,
                dead_letters: ports.dead_letters,
                retry_policy,
                status_observers: Observers::new(),
                exhausted_observers: Observers::new(),
            }),
        })
    }

    pub fn config(&self) -> &QueueConfig {
        &self.inner.config
    }

    /// Check that `operation` is well-formed and has a registered handler
    pub fn validate(&self, operation: &OperationDescriptor) -> Result<()> {
        operation.validate()?;
        self.inner.registry.ensure_registered(&operation.kind)?;
        Ok(())
    }

    /// Defer `operation` using the configured max attempts
    pub async fn enqueue(&self, operation: OperationDescriptor) -> Result<ItemId> {
        let max_attempts = self.inner.config.max_attempts;
        self.enqueue_with_max_attempts(operation, max_attempts).await
    }

    /// Defer `operation`
    ///
    /// Appends, evicts the oldest items beyond capacity, persists and
    /// notifies subscribers. When online, a processing pass is started in
    /// the background. Only a malformed descriptor or a zero
    /// `max_attempts` is an error; storage failures are logged.
    pub async fn enqueue_with_max_attempts(
        &self,
        operation: OperationDescriptor,
        max_attempts: u32,
    ) -> Result<ItemId> {
        let id = self.inner.id_provider.generate_id();
        let enqueued_at = self.inner.time_provider.now_millis();
        let item = QueueItem::new(id.clone(), enqueued_at, operation, max_attempts)?;
        let kind = item.kind().clone();

        let (evicted, size) = {
            let mut items = self.lock_items();
            items.push_back(item);
            let evicted = self.enforce_capacity(&mut items);
            (evicted, items.len())
        };

        if !evicted.is_empty() {
            warn!(
                evicted = evicted.len(),
                capacity = self.inner.config.capacity,
                "Offline queue full, evicted oldest items"
            );
        }
        info!(item_id = %id, kind = %kind, size = size, "Operation enqueued");

        self.persist().await;
        self.notify_status();

        if self.inner.connectivity.is_online() {
            let queue = self.clone();
            tokio::spawn(async move {
                queue.process_queue().await;
            });
        }

        Ok(id)
    }

    /// Run one pass over the items currently queued
    ///
    /// No-op while offline, while another pass is running, or when empty.
    /// Items are executed one at a time in FIFO order; failures are counted
    /// and either kept for the next pass or dropped as dead letters. Items
    /// enqueued during the pass are kept after the pass's remaining items.
    pub async fn process_queue(&self) {
        if !self.inner.connectivity.is_online() {
            debug!("Offline, deferring queue processing");
            return;
        }

        let Some(guard) = ProcessingGuard::acquire(&self.inner.processing) else {
            debug!("Queue pass already running, skipping");
            return;
        };

        let batch: Vec<QueueItem> = self.lock_items().iter().cloned().collect();
        if batch.is_empty() {
            return;
        }

        info!(items = batch.len(), "Processing offline queue");
        self.notify_status();

        let batch_ids: HashSet<ItemId> = batch.iter().map(|item| item.id.clone()).collect();
        let mut remaining: Vec<QueueItem> = Vec::new();
        let mut dead: Vec<DeadLetter> = Vec::new();
        let mut summary = PassSummary::default();

        for mut item in batch {
            match self.execute(&item).await {
                Ok(()) => {
                    debug!(item_id = %item.id, kind = %item.kind(), "Queued operation succeeded");
                    summary.succeeded += 1;
                }
                Err(err) => match self.inner.retry_policy.on_failure(&mut item, &err) {
                    RetryDecision::Retry { .. } => {
                        summary.retrying += 1;
                        remaining.push(item);
                    }
                    RetryDecision::Exhausted { .. } => {
                        summary.exhausted += 1;
                        let failed_at = self.inner.time_provider.now_millis();
                        dead.push(DeadLetter::from_item(item, failed_at, err.to_string()));
                    }
                },
            }
        }

        {
            let mut items = self.lock_items();
            // Items cleared or evicted during the pass stay gone
            let live_ids: HashSet<ItemId> = items.iter().map(|item| item.id.clone()).collect();
            let arrived: Vec<QueueItem> = items
                .iter()
                .filter(|item| !batch_ids.contains(&item.id))
                .cloned()
                .collect();

            *items = remaining
                .into_iter()
                .filter(|item| live_ids.contains(&item.id))
                .chain(arrived)
                .collect();
            self.enforce_capacity(&mut items);
        }

        self.persist().await;
        drop(guard);

        for letter in dead {
            self.report_dead_letter(letter).await;
        }

        info!(
            succeeded = summary.succeeded,
            retrying = summary.retrying,
            exhausted = summary.exhausted,
            "Queue pass completed"
        );
        self.notify_status();
    }

    /// Drop every queued item
    pub async fn clear(&self) {
        let removed = {
            let mut items = self.lock_items();
            let removed = items.len();
            items.clear();
            removed
        };

        info!(removed = removed, "Offline queue cleared");
        self.persist().await;
        self.notify_status();
    }

    /// Snapshot of size, oldest item timestamp and processing flag
    pub fn get_status(&self) -> QueueStatus {
        let items = self.lock_items();
        QueueStatus {
            size: items.len(),
            oldest_item_timestamp: items.front().map(|item| item.enqueued_at),
            is_processing: self.inner.processing.load(Ordering::Acquire),
        }
    }

    /// Current reachability as seen by the queue
    pub fn is_online(&self) -> bool {
        self.inner.connectivity.is_online()
    }

    /// Operation kinds with a registered handler
    pub fn handler_kinds(&self) -> Vec<String> {
        self.inner.registry.kinds()
    }

    /// Copy of the queued items, oldest first
    pub fn items(&self) -> Vec<QueueItem> {
        self.lock_items().iter().cloned().collect()
    }

    /// Be told the current status after every mutation
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&QueueStatus) + Send + Sync + 'static,
    {
        self.inner.status_observers.register(listener)
    }

    /// Be told about every item dropped as terminally failed
    pub fn subscribe_exhausted<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&DeadLetter) + Send + Sync + 'static,
    {
        self.inner.exhausted_observers.register(listener)
    }

    async fn execute(&self, item: &QueueItem) -> std::result::Result<(), OperationError> {
        let Some(handler) = self.inner.registry.get(item.kind()) else {
            return Err(OperationError::Permanent(format!(
                "no handler registered for operation kind '{}'",
                item.kind()
            )));
        };

        // Run the handler on its own task so a panic surfaces as a JoinError
        let payload = item.operation.payload.clone();
        let mut task = tokio::spawn(async move { handler.execute(&payload).await });

        let joined = match self.inner.retry_policy.operation_timeout() {
            Some(limit) => match tokio::time::timeout(limit, &mut task).await {
                Ok(joined) => joined,
                Err(_) => {
                    task.abort();
                    let timeout_ms = limit.as_millis() as u64;
                    warn!(item_id = %item.id, timeout_ms = timeout_ms, "Queued operation timed out");
                    return Err(OperationError::Timeout(timeout_ms));
                }
            },
            None => task.await,
        };

        match joined {
            Ok(result) => result,
            Err(join_err) if join_err.is_panic() => {
                let msg = panic_message(join_err.into_panic().as_ref());
                error!(item_id = %item.id, panic_msg = %msg, "Operation handler panicked");
                Err(OperationError::Permanent(format!("handler panicked: {}", msg)))
            }
            Err(join_err) => Err(OperationError::Transient(format!(
                "handler task cancelled: {}",
                join_err
            ))),
        }
    }

    async fn report_dead_letter(&self, letter: DeadLetter) {
        error!(
            item_id = %letter.item_id,
            kind = %letter.operation.kind,
            attempts = letter.attempts,
            reason = %letter.reason,
            "Queued operation abandoned"
        );

        if let Some(store) = &self.inner.dead_letters {
            if let Err(e) = store.record(&letter).await {
                error!(item_id = %letter.item_id, error = %e, "Failed to record dead letter");
            }
        }

        self.inner.exhausted_observers.notify(&letter);
    }

    async fn persist(&self) {
        let _write = self.inner.persist_lock.lock().await;
        let items: Vec<QueueItem> = self.lock_items().iter().cloned().collect();
        if let Err(e) = self.inner.snapshot.save(&items).await {
            error!(error = %e, "Failed to persist offline queue, continuing in memory");
        }
    }

    fn notify_status(&self) {
        let status = self.get_status();
        self.inner.status_observers.notify(&status);
    }

    fn enforce_capacity(&self, items: &mut VecDeque<QueueItem>) -> Vec<QueueItem> {
        let mut evicted = Vec::new();
        while items.len() > self.inner.config.capacity {
            if let Some(item) = items.pop_front() {
                debug!(item_id = %item.id, "Evicted oldest queue item");
                evicted.push(item);
            }
        }
        evicted
    }

    fn lock_items(&self) -> MutexGuard<'_, VecDeque<QueueItem>> {
        self.inner
            .items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests;
