//! syncq daemon - Main Entry Point
//! Hosts the offline queue, its connectivity probe and the JSON-RPC server

mod config;

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use config::{DaemonConfig, LogFormat};
use syncq_api_rpc::{RateLimiter, RpcDeps, RpcServer, RpcServerConfig};
use syncq_core::application::{
    shutdown_channel, MaintenanceScheduler, OfflineQueue, QueuePorts, SyncWorker,
};
use syncq_core::port::id_provider::UuidProvider;
use syncq_core::port::time_provider::SystemTimeProvider;
use syncq_core::port::{ConnectivityMonitor, HandlerRegistry};
use syncq_infra_sqlite::{
    create_pool, run_migrations, SqliteDeadLetterStore, SqliteKeyValueStore, SqliteMaintenance,
};
use syncq_infra_system::{HttpOperationHandler, TcpConnectivityProbe, HTTP_OPERATION_KIND};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const MAINTENANCE_INTERVAL_HOURS: u64 = 24;
const PROBE_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

fn init_logging(format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("syncq=info"))
        .context("Failed to create env filter")?;

    match format {
        // Production: JSON structured logging
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json())
            .init(),
        // Development: Pretty formatting with colors
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().pretty())
            .init(),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Configuration and logging
    let config = DaemonConfig::from_env().context("Invalid configuration")?;
    init_logging(config.log_format)?;

    info!("syncq daemon v{} starting...", VERSION);

    // 2. Database
    if let Some(parent) = Path::new(&config.db_path).parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    info!(db_path = %config.db_path, "Initializing database...");

    let pool = create_pool(&config.db_path)
        .await
        .context("DB pool creation failed")?;
    run_migrations(&pool).await.context("Migration failed")?;

    // 3. Adapters (DI wiring)
    let time_provider = Arc::new(SystemTimeProvider);
    let store = Arc::new(SqliteKeyValueStore::new(pool.clone(), time_provider.clone()));
    let dead_letters = Arc::new(SqliteDeadLetterStore::new(pool.clone()));
    let maintenance = Arc::new(SqliteMaintenance::new(pool.clone(), time_provider.clone()));

    let http_handler = HttpOperationHandler::new(config.http_timeout)
        .context("Failed to create HTTP handler")?;
    let registry = HandlerRegistry::new().with(HTTP_OPERATION_KIND, Arc::new(http_handler));

    let probe = Arc::new(TcpConnectivityProbe::new(
        config.probe_targets.clone(),
        config.probe_interval,
        PROBE_CONNECT_TIMEOUT,
    ));
    let online = probe.check().await;
    info!(online = online, "Initial connectivity check");

    // 4. Queue (restores persisted items)
    let connectivity: Arc<dyn ConnectivityMonitor> = probe.clone();
    let queue = OfflineQueue::load(
        config.queue.clone(),
        QueuePorts {
            store,
            registry,
            connectivity: connectivity.clone(),
            time_provider,
            id_provider: Arc::new(UuidProvider),
            dead_letters: Some(dead_letters.clone()),
        },
    )
    .await
    .context("Failed to load offline queue")?;

    let _status_log = queue.subscribe(|status| {
        debug!(
            size = status.size,
            oldest_item_timestamp = ?status.oldest_item_timestamp,
            is_processing = status.is_processing,
            "Queue status changed"
        );
    });

    // 5. Background tasks
    let (shutdown_tx, shutdown_rx) = shutdown_channel();

    let probe_task = {
        let probe = probe.clone();
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move { probe.run(shutdown).await })
    };

    let worker = SyncWorker::new(queue.clone(), connectivity, config.retry_interval);
    let worker_task = {
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = worker.run(shutdown).await {
                error!(error = ?e, "Sync worker failed");
            }
        })
    };

    info!("Starting maintenance scheduler...");
    let scheduler = Arc::new(MaintenanceScheduler::new(
        maintenance.clone(),
        config.maintenance.clone(),
        MAINTENANCE_INTERVAL_HOURS,
    ));
    let maintenance_task = {
        let scheduler = scheduler.clone();
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move { scheduler.run(shutdown).await })
    };

    // 6. JSON-RPC server
    let rpc_config = RpcServerConfig {
        port: config.rpc_port,
        ..Default::default()
    };
    let rpc_server = RpcServer::new(
        rpc_config,
        RpcDeps {
            queue: queue.clone(),
            dead_letters,
            maintenance,
            scheduler,
            rate_limiter: RateLimiter::new(config.rate_limit_burst, config.rate_limit_rate),
        },
    );
    let (rpc_addr, rpc_handle) = rpc_server
        .start()
        .await
        .context("RPC server start failed")?;

    info!(rpc_addr = %rpc_addr, queued = queue.get_status().size, "syncq ready");
    info!("Press Ctrl+C to shutdown");

    // 7. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received. Exiting gracefully...");

    // 8. Graceful shutdown
    shutdown_tx.shutdown();
    if let Err(e) = rpc_handle.stop() {
        error!(error = %e, "RPC server stop failed");
    }
    for (name, task) in [
        ("connectivity probe", probe_task),
        ("sync worker", worker_task),
        ("maintenance scheduler", maintenance_task),
    ] {
        match tokio::time::timeout(SHUTDOWN_GRACE, task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(task = name, error = %e, "Background task failed"),
            Err(_) => error!(task = name, "Background task did not stop in time"),
        }
    }

    info!("Shutdown complete.");
    Ok(())
}
