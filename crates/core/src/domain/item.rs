// Queue Item Domain Model

use crate::domain::error::{DomainError, Result};
use serde::{Deserialize, Serialize};

/// Queue item ID (UUID v4 in production)
pub type ItemId = String;

/// Operation kind, the key a handler is registered under (e.g. "http")
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationKind(String);

impl OperationKind {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Serializable description of a deferred unit of work.
///
/// The queue never stores closures. A descriptor names a handler kind and
/// carries the JSON payload that handler needs, so a persisted queue can be
/// replayed after a restart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationDescriptor {
    pub kind: OperationKind,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl OperationDescriptor {
    pub fn new(kind: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            kind: OperationKind::new(kind),
            payload,
        }
    }

    /// Check the descriptor is well-formed (handler lookup happens elsewhere)
    pub fn validate(&self) -> Result<()> {
        if self.kind.as_str().trim().is_empty() {
            return Err(DomainError::EmptyOperationKind);
        }
        Ok(())
    }
}

/// Where an item goes after a failed execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Operation failed, item goes back to pending with the new attempt count
    Retrying { attempts: u32 },
    /// Operation failed for the last time, item leaves the queue
    Exhausted { attempts: u32 },
}

/// Queue Item Entity
///
/// Serialized field names match the persisted snapshot layout
/// (`id`, `enqueuedAt`, `operation`, `attempts`, `maxAttempts`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    pub id: ItemId,
    pub enqueued_at: i64, // epoch ms
    pub operation: OperationDescriptor,
    pub attempts: u32,
    pub max_attempts: u32,
}

impl QueueItem {
    /// Create a new pending item
    ///
    /// # Arguments
    ///
    /// * `id` - Unique item ID (injected, not generated)
    /// * `enqueued_at` - Creation timestamp in epoch ms (injected, not system time)
    /// * `operation` - What to run when the item is processed
    /// * `max_attempts` - Failed executions allowed before the item is dropped
    pub fn new(
        id: impl Into<String>,
        enqueued_at: i64,
        operation: OperationDescriptor,
        max_attempts: u32,
    ) -> Result<Self> {
        if max_attempts == 0 {
            return Err(DomainError::InvalidMaxAttempts(max_attempts));
        }
        operation.validate()?;

        Ok(Self {
            id: id.into(),
            enqueued_at,
            operation,
            attempts: 0,
            max_attempts,
        })
    }

    /// Count a failed execution and report where the item goes next
    pub fn record_failure(&mut self) -> ItemOutcome {
        self.attempts = self.attempts.saturating_add(1);
        if self.is_exhausted() {
            ItemOutcome::Exhausted {
                attempts: self.attempts,
            }
        } else {
            ItemOutcome::Retrying {
                attempts: self.attempts,
            }
        }
    }

    /// Count a failed execution that must not be retried, whatever budget is left
    pub fn exhaust(&mut self) -> ItemOutcome {
        self.attempts = self.attempts.saturating_add(1);
        ItemOutcome::Exhausted {
            attempts: self.attempts,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }

    pub fn kind(&self) -> &OperationKind {
        &self.operation.kind
    }
}
