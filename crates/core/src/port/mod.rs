// Port Layer - Interfaces for external dependencies

pub mod connectivity;
pub mod dead_letter_store;
pub mod id_provider; // For deterministic testing
pub mod key_value_store;
pub mod maintenance;
pub mod operation_handler;
pub mod time_provider;

// Re-exports
pub use connectivity::{ConnectivityMonitor, ConnectivitySignal, ConnectivityWatch};
pub use dead_letter_store::DeadLetterStore;
pub use id_provider::IdProvider;
pub use key_value_store::KeyValueStore;
pub use maintenance::{Maintenance, MaintenanceConfig, MaintenanceStats};
pub use operation_handler::{HandlerRegistry, OperationError, OperationHandler};
pub use time_provider::TimeProvider;
