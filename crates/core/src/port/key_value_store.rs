// Key-Value Store Port (durable storage surface)

use crate::error::Result;
use async_trait::async_trait;

/// Durable string-keyed storage
///
/// The queue keeps its whole state under a single key and always rewrites
/// it in full, so implementations only need atomic single-key get/set.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Replace the value stored under `key`
    async fn set(&self, key: &str, value: &str) -> Result<()>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// In-memory store with switchable write failures
    #[derive(Default)]
    pub struct InMemoryKeyValueStore {
        entries: Mutex<HashMap<String, String>>,
        fail_writes: AtomicBool,
    }

    impl InMemoryKeyValueStore {
        pub fn new() -> Self {
            Self::default()
        }

        /// Seed a raw value (e.g. corrupted JSON) without going through `set`
        pub fn insert_raw(&self, key: &str, value: &str) {
            self.entries
                .lock()
                .unwrap()
                .insert(key.to_string(), value.to_string());
        }

        pub fn raw(&self, key: &str) -> Option<String> {
            self.entries.lock().unwrap().get(key).cloned()
        }

        /// Simulate quota exceeded / storage disabled
        pub fn set_fail_writes(&self, fail: bool) {
            self.fail_writes.store(fail, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl KeyValueStore for InMemoryKeyValueStore {
        async fn get(&self, key: &str) -> Result<Option<String>> {
            Ok(self.raw(key))
        }

        async fn set(&self, key: &str, value: &str) -> Result<()> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(AppError::Storage("storage quota exceeded".to_string()));
            }
            self.insert_raw(key, value);
            Ok(())
        }
    }
}
