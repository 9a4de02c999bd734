// Sync Worker - drives queue passes from connectivity changes

pub mod constants;
mod shutdown;

use constants::MIN_RETRY_INTERVAL;
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};

use crate::application::queue::OfflineQueue;
use crate::error::Result;
use crate::port::ConnectivityMonitor;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Background loop that processes the queue whenever connectivity returns
///
/// With a retry interval, it also runs a pass on every tick so items that
/// failed while the network stayed up are retried without waiting for the
/// next offline/online flip.
pub struct SyncWorker {
    queue: OfflineQueue,
    connectivity: Arc<dyn ConnectivityMonitor>,
    retry_interval: Option<Duration>,
}

impl SyncWorker {
    pub fn new(
        queue: OfflineQueue,
        connectivity: Arc<dyn ConnectivityMonitor>,
        retry_interval: Option<Duration>,
    ) -> Self {
        Self {
            queue,
            connectivity,
            retry_interval: retry_interval.map(|d| d.max(MIN_RETRY_INTERVAL)),
        }
    }

    /// Run until `shutdown` fires
    ///
    /// Items left over from a previous run are processed right away if the
    /// network is already up.
    pub async fn run(&self, mut shutdown: ShutdownToken) -> Result<()> {
        info!(
            retry_interval_secs = self.retry_interval.map(|d| d.as_secs()),
            "Sync worker started"
        );

        let mut watch = self.connectivity.watch();
        let mut watch_open = true;
        let mut ticker = self.retry_interval.map(|period| {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.reset();
            ticker
        });

        if self.connectivity.is_online() && !shutdown.is_shutdown() {
            self.queue.process_queue().await;
        }

        loop {
            tokio::select! {
                _ = shutdown.wait() => {
                    info!("Sync worker shutting down");
                    break;
                }
                restored = watch.restored(), if watch_open => {
                    if restored {
                        info!("Connectivity restored, processing offline queue");
                        self.queue.process_queue().await;
                    } else {
                        warn!("Connectivity source closed, relying on periodic retries");
                        watch_open = false;
                    }
                }
                _ = next_tick(&mut ticker) => {
                    debug!("Periodic retry tick");
                    self.queue.process_queue().await;
                }
            }
        }

        info!("Sync worker stopped");
        Ok(())
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
