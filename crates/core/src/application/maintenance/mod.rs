// Maintenance Service
// Periodic dead-letter GC and VACUUM for the queue database

use crate::application::sync_worker::ShutdownToken;
use crate::error::Result;
use crate::port::{Maintenance, MaintenanceConfig, MaintenanceStats};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

/// Free-page share above which a manual run also vacuums
pub const FRAGMENTATION_VACUUM_PERCENT: f64 = 10.0;

/// Outcome of one maintenance run
#[derive(Debug, Clone)]
pub struct MaintenanceReport {
    pub vacuum_run: bool,
    pub dead_letters_deleted: i64,
    pub before: MaintenanceStats,
    pub after: MaintenanceStats,
}

/// Maintenance scheduler
///
/// Runs dead-letter GC and, when worthwhile, VACUUM on a fixed period
pub struct MaintenanceScheduler {
    maintenance: Arc<dyn Maintenance>,
    config: MaintenanceConfig,
    period: Duration,
}

impl MaintenanceScheduler {
    /// Create a new maintenance scheduler
    ///
    /// # Arguments
    /// * `maintenance` - Maintenance implementation
    /// * `config` - Retention and size thresholds
    /// * `interval_hours` - How often to run maintenance (hours, at least 1)
    pub fn new(
        maintenance: Arc<dyn Maintenance>,
        config: MaintenanceConfig,
        interval_hours: u64,
    ) -> Self {
        Self {
            maintenance,
            config,
            period: Duration::from_secs(interval_hours.max(1) * 3600),
        }
    }

    /// Run the maintenance loop until `shutdown` fires
    ///
    /// The first run happens one period after start.
    pub async fn run(&self, mut shutdown: ShutdownToken) {
        info!(
            interval_secs = self.period.as_secs(),
            retention_days = self.config.dead_letter_retention_days,
            "Maintenance scheduler started"
        );

        let mut tick = interval(self.period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tick.reset();

        loop {
            tokio::select! {
                _ = shutdown.wait() => {
                    info!("Maintenance scheduler stopped");
                    break;
                }
                _ = tick.tick() => {
                    if let Err(e) = self.run_now(false).await {
                        error!(error = ?e, "Scheduled maintenance failed");
                    }
                }
            }
        }
    }

    /// Run maintenance immediately
    ///
    /// Used by both the periodic loop and the admin RPC. VACUUM runs when forced, when the DB is over the size threshold, or
    /// when free pages exceed `FRAGMENTATION_VACUUM_PERCENT`.
    pub async fn run_now(&self, force_vacuum: bool) -> Result<MaintenanceReport> {
        info!(force_vacuum = force_vacuum, "Running maintenance...");

        let before = self.maintenance.get_stats().await?;
        let dead_letters_deleted = self
            .maintenance
            .gc_dead_letters(self.config.dead_letter_retention_days)
            .await?;

        let vacuum_run = force_vacuum
            || before.db_size_mb > self.config.max_db_size_mb
            || before.fragmentation_percent > FRAGMENTATION_VACUUM_PERCENT;
        if vacuum_run {
            let reclaimed_mb = self.maintenance.vacuum().await?;
            info!(reclaimed_mb = reclaimed_mb, "VACUUM completed");
        }

        let after = self.maintenance.get_stats().await?;
        log_stats("Maintenance completed", &after);

        Ok(MaintenanceReport {
            vacuum_run,
            dead_letters_deleted,
            before,
            after,
        })
    }
}

fn log_stats(message: &'static str, stats: &MaintenanceStats) {
    info!(
        db_size_mb = stats.db_size_mb,
        dead_letters = stats.dead_letter_count,
        snapshot_bytes = stats.snapshot_bytes,
        fragmentation_percent = stats.fragmentation_percent,
        "{}",
        message
    );
}
