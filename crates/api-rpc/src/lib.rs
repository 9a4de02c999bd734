//! JSON-RPC API Layer
//!
//! JSON-RPC 2.0 server exposing the offline queue to local clients.

pub mod error;
pub mod handler;
pub mod rate_limiter;
pub mod server;
pub mod types;

pub use handler::{RpcDeps, RpcHandler};
pub use rate_limiter::RateLimiter;
pub use server::{RpcServer, RpcServerConfig, DEFAULT_RPC_PORT};
