//! JSON-RPC Server
//!
//! Serves JSON-RPC 2.0 over HTTP on localhost.

use crate::handler::{RpcDeps, RpcHandler};
use crate::types::{DeadLettersRequest, EnqueueRequest, MaintenanceRequest};
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::RpcModule;
use std::net::SocketAddr;
use std::sync::Arc;
use syncq_core::error::{AppError, Result};
use tracing::info;

const DEFAULT_RPC_HOST: &str = "127.0.0.1";
pub const DEFAULT_RPC_PORT: u16 = 9633;

/// RPC Server Configuration
#[derive(Debug, Clone)]
pub struct RpcServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for RpcServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_RPC_HOST.to_string(),
            port: DEFAULT_RPC_PORT,
        }
    }
}

/// RPC Server
pub struct RpcServer {
    config: RpcServerConfig,
    handler: Arc<RpcHandler>,
}

impl RpcServer {
    pub fn new(config: RpcServerConfig, deps: RpcDeps) -> Self {
        Self {
            config,
            handler: Arc::new(RpcHandler::new(deps)),
        }
    }

    /// Start the JSON-RPC server
    ///
    /// Returns the bound address (useful with port 0) and the server handle.
    /// Only binds to the configured host, 127.0.0.1 by default.
    pub async fn start(self) -> Result<(SocketAddr, ServerHandle)> {
        let addr = format!("{}:{}", self.config.host, self.config.port);

        info!(
            host = %self.config.host,
            port = self.config.port,
            "Starting JSON-RPC server"
        );

        let server = Server::builder()
            .build(&addr)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to build server on {}: {}", addr, e)))?;
        let local_addr = server
            .local_addr()
            .map_err(|e| AppError::Internal(format!("Failed to read bound address: {}", e)))?;

        let module = self.build_module()?;

        info!(addr = %local_addr, "JSON-RPC server started");
        Ok((local_addr, server.start(module)))
    }

    fn build_module(&self) -> Result<RpcModule<()>> {
        let mut module = RpcModule::new(());

        let handler = self.handler.clone();
        module
            .register_async_method("queue.enqueue.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: EnqueueRequest = params.parse()?;
                    handler.enqueue(req).await
                }
            })
            .map_err(register_error)?;

        let handler = self.handler.clone();
        module
            .register_method("queue.status.v1", move |_, _, _| handler.status())
            .map_err(register_error)?;

        let handler = self.handler.clone();
        module
            .register_async_method("queue.process.v1", move |_, _, _| {
                let handler = handler.clone();
                async move { handler.process().await }
            })
            .map_err(register_error)?;

        let handler = self.handler.clone();
        module
            .register_async_method("queue.clear.v1", move |_, _, _| {
                let handler = handler.clone();
                async move { handler.clear().await }
            })
            .map_err(register_error)?;

        let handler = self.handler.clone();
        module
            .register_async_method("queue.dead_letters.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: Option<DeadLettersRequest> = params.parse()?;
                    handler.dead_letters(req.unwrap_or_default()).await
                }
            })
            .map_err(register_error)?;

        // Admin APIs
        let handler = self.handler.clone();
        module
            .register_async_method("admin.stats.v1", move |_, _, _| {
                let handler = handler.clone();
                async move { handler.stats().await }
            })
            .map_err(register_error)?;

        let handler = self.handler.clone();
        module
            .register_async_method("admin.maintenance.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: Option<MaintenanceRequest> = params.parse()?;
                    handler.maintenance(req.unwrap_or_default()).await
                }
            })
            .map_err(register_error)?;

        Ok(module)
    }
}

fn register_error(e: impl std::fmt::Display) -> AppError {
    AppError::Internal(format!("Failed to register RPC method: {}", e))
}
