// Dead Letter Store Port

use crate::domain::DeadLetter;
use crate::error::Result;
use async_trait::async_trait;

/// Persistence for items the queue gave up on
#[async_trait]
pub trait DeadLetterStore: Send + Sync {
    /// Record a terminally failed item
    async fn record(&self, letter: &DeadLetter) -> Result<()>;

    /// Most recent dead letters first
    async fn list(&self, limit: usize) -> Result<Vec<DeadLetter>>;

    /// Delete every dead letter, returning how many were removed
    async fn purge(&self) -> Result<u64>;
}

pub mod mocks {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct InMemoryDeadLetterStore {
        letters: Mutex<Vec<DeadLetter>>,
    }

    impl InMemoryDeadLetterStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn len(&self) -> usize {
            self.letters.lock().unwrap().len()
        }

        pub fn is_empty(&self) -> bool {
            self.len() == 0
        }
    }

    #[async_trait]
    impl DeadLetterStore for InMemoryDeadLetterStore {
        async fn record(&self, letter: &DeadLetter) -> Result<()> {
            self.letters.lock().unwrap().push(letter.clone());
            Ok(())
        }

        async fn list(&self, limit: usize) -> Result<Vec<DeadLetter>> {
            let letters = self.letters.lock().unwrap();
            Ok(letters.iter().rev().take(limit).cloned().collect())
        }

        async fn purge(&self) -> Result<u64> {
            let mut letters = self.letters.lock().unwrap();
            let count = letters.len() as u64;
            letters.clear();
            Ok(count)
        }
    }
}
