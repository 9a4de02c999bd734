// Queue defaults (no magic values)

/// Maximum number of items kept; the oldest are evicted beyond this
pub const DEFAULT_CAPACITY: usize = 50;

/// Failed executions allowed per item before it is dropped
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Key the queue snapshot is stored under
pub const DEFAULT_STORAGE_KEY: &str = "offline_queue";
