// Operation Handler Port
// Executes the deferred work an OperationDescriptor names

use crate::domain::{DomainError, OperationKind};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Operation failures, classified for the retry policy
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OperationError {
    /// Worth retrying (network error, server 5xx, ...)
    #[error("Transient failure: {0}")]
    Transient(String),

    /// Will never succeed (bad input, rejected by server, ...)
    #[error("Permanent failure: {0}")]
    Permanent(String),

    #[error("Operation timed out after {0}ms")]
    Timeout(u64),
}

impl OperationError {
    pub fn is_permanent(&self) -> bool {
        matches!(self, OperationError::Permanent(_))
    }
}

/// Handler for one operation kind
///
/// Implementations:
/// - HttpOperationHandler (infra-system): replays deferred HTTP writes
/// - MockOperationHandler: scripted outcomes for tests
#[async_trait]
pub trait OperationHandler: Send + Sync {
    /// Perform the operation described by `payload`
    ///
    /// # Errors
    /// - OperationError::Transient if a later attempt may succeed
    /// - OperationError::Permanent if retrying is pointless
    async fn execute(&self, payload: &serde_json::Value) -> Result<(), OperationError>;
}

/// Maps operation kinds to their handlers
///
/// Built once at the composition root, before the queue loads its
/// persisted items.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<OperationKind, Arc<dyn OperationHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the handler for `kind`
    pub fn register(&mut self, kind: impl Into<String>, handler: Arc<dyn OperationHandler>) {
        let kind = OperationKind::new(kind);
        if self.handlers.insert(kind.clone(), handler).is_some() {
            tracing::warn!(kind = %kind, "Replacing previously registered operation handler");
        }
    }

    /// Builder-style registration
    pub fn with(mut self, kind: impl Into<String>, handler: Arc<dyn OperationHandler>) -> Self {
        self.register(kind, handler);
        self
    }

    pub fn get(&self, kind: &OperationKind) -> Option<Arc<dyn OperationHandler>> {
        self.handlers.get(kind).cloned()
    }

    /// Fail with `UnknownOperationKind` unless `kind` has a handler
    pub fn ensure_registered(&self, kind: &OperationKind) -> Result<(), DomainError> {
        if self.handlers.contains_key(kind) {
            Ok(())
        } else {
            Err(DomainError::UnknownOperationKind(kind.to_string()))
        }
    }

    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.handlers.keys().map(|k| k.to_string()).collect();
        kinds.sort();
        kinds
    }
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Mock handler behavior
    #[derive(Debug, Clone)]
    pub enum MockBehavior {
        /// Always succeed
        Success,
        /// Always fail transiently
        Fail(String),
        /// Fail transiently for the first N calls, then succeed
        FailTimes(usize),
        /// Always fail permanently
        Permanent(String),
        /// Panic with message (for panic isolation testing)
        Panic(String),
        /// Sleep before succeeding (for timeout and single-flight testing)
        Delay(Duration),
    }

    /// Mock Operation Handler for testing
    pub struct MockOperationHandler {
        behavior: Mutex<MockBehavior>,
        calls: Mutex<Vec<serde_json::Value>>,
    }

    impl MockOperationHandler {
        pub fn new(behavior: MockBehavior) -> Self {
            Self {
                behavior: Mutex::new(behavior),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn new_success() -> Self {
            Self::new(MockBehavior::Success)
        }

        pub fn new_fail(message: impl Into<String>) -> Self {
            Self::new(MockBehavior::Fail(message.into()))
        }

        pub fn set_behavior(&self, behavior: MockBehavior) {
            *self.behavior.lock().unwrap() = behavior;
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        /// Payloads in the order they were executed
        pub fn calls(&self) -> Vec<serde_json::Value> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl OperationHandler for MockOperationHandler {
        async fn execute(&self, payload: &serde_json::Value) -> Result<(), OperationError> {
            let call_number = {
                let mut calls = self.calls.lock().unwrap();
                calls.push(payload.clone());
                calls.len()
            };

            let behavior = self.behavior.lock().unwrap().clone();

            match behavior {
                MockBehavior::Success => Ok(()),
                MockBehavior::Fail(msg) => Err(OperationError::Transient(msg)),
                MockBehavior::FailTimes(n) => {
                    if call_number <= n {
                        Err(OperationError::Transient(format!("failure {}", call_number)))
                    } else {
                        Ok(())
                    }
                }
                MockBehavior::Permanent(msg) => Err(OperationError::Permanent(msg)),
                MockBehavior::Panic(msg) => {
                    panic!("{}", msg);
                }
                MockBehavior::Delay(duration) => {
                    tokio::time::sleep(duration).await;
                    Ok(())
                }
            }
        }
    }
}
