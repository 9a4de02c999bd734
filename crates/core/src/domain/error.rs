// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Operation kind must not be empty")]
    EmptyOperationKind,

    #[error("Invalid max attempts: {0} (must be at least 1)")]
    InvalidMaxAttempts(u32),

    #[error("Invalid queue capacity: {0} (must be at least 1)")]
    InvalidCapacity(usize),

    #[error("No handler registered for operation kind: {0}")]
    UnknownOperationKind(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
