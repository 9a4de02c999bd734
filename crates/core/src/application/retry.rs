// Retry logic for failed queue items
use crate::domain::{ItemOutcome, QueueItem};
use crate::port::OperationError;
use std::time::Duration;
use tracing::{info, warn};

/// Retry decision result
#[derive(Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Keep the item, it will run again on the next pass
    Retry { attempts: u32 },
    /// Drop the item, it has failed permanently
    Exhausted { attempts: u32 },
}

/// Retry policy
///
/// Determines what happens to an item whose operation failed, based on:
/// - Current attempt count against the item's max attempts
/// - Failure classification (permanent failures are never retried)
///
/// Also carries the optional per-operation timeout the queue applies while
/// executing handlers.
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    operation_timeout: Option<Duration>,
}

impl RetryPolicy {
    /// Create a new retry policy
    ///
    /// # Arguments
    /// * `operation_timeout` - Abandon an attempt after this long (None: wait indefinitely)
    pub fn new(operation_timeout: Option<Duration>) -> Self {
        Self { operation_timeout }
    }

    pub fn operation_timeout(&self) -> Option<Duration> {
        self.operation_timeout
    }

    /// Count the failure against `item` and decide whether it stays queued
    pub fn on_failure(&self, item: &mut QueueItem, error: &OperationError) -> RetryDecision {
        let outcome = if error.is_permanent() {
            item.exhaust()
        } else {
            item.record_failure()
        };

        let attempts = match outcome {
            ItemOutcome::Retrying { attempts } => {
                info!(
                    item_id = %item.id,
                    kind = %item.kind(),
                    attempt = attempts,
                    max_attempts = item.max_attempts,
                    error = %error,
                    "Operation failed, will retry on next pass"
                );
                return RetryDecision::Retry { attempts };
            }
            ItemOutcome::Exhausted { attempts } => attempts,
        };

        warn!(
            item_id = %item.id,
            kind = %item.kind(),
            attempts = attempts,
            max_attempts = item.max_attempts,
            permanent = error.is_permanent(),
            error = %error,
            "Operation failed permanently, dropping item"
        );
        RetryDecision::Exhausted { attempts }
    }
}
