// Domain Layer - Pure business logic and entities

pub mod dead_letter;
pub mod error;
pub mod item;
pub mod status;

// Re-exports
pub use dead_letter::DeadLetter;
pub use error::DomainError;
pub use item::{ItemId, ItemOutcome, OperationDescriptor, OperationKind, QueueItem};
pub use status::QueueStatus;
