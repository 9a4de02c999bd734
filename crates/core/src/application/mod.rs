// Application Layer - Use Cases and Business Logic

pub mod maintenance;
pub mod observers;
pub mod panic_guard;
pub mod queue;
pub mod retry;
pub mod sync_worker;

// Re-exports
pub use maintenance::{MaintenanceReport, MaintenanceScheduler};
pub use observers::{Observers, Subscription};
pub use queue::{OfflineQueue, QueueConfig, QueuePorts};
pub use retry::{RetryDecision, RetryPolicy};
pub use sync_worker::{shutdown_channel, ShutdownSender, ShutdownToken, SyncWorker};
