// Storage maintenance port
use crate::error::Result;
use async_trait::async_trait;

/// Storage maintenance statistics
#[derive(Debug, Clone)]
pub struct MaintenanceStats {
    pub db_size_mb: f64,
    pub db_size_bytes: i64,
    pub dead_letter_count: i64,
    pub snapshot_bytes: i64,
    pub fragmentation_percent: f64,
}

/// Maintenance configuration
#[derive(Debug, Clone)]
pub struct MaintenanceConfig {
    /// Retention period for dead letters (days)
    pub dead_letter_retention_days: i64,

    /// Maximum DB size before forcing VACUUM (MB)
    pub max_db_size_mb: f64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            dead_letter_retention_days: 14,
            max_db_size_mb: 100.0,
        }
    }
}

/// Storage maintenance operations
#[async_trait]
pub trait Maintenance: Send + Sync {
    /// Run VACUUM to reclaim space
    ///
    /// # Returns
    /// Space reclaimed in MB
    async fn vacuum(&self) -> Result<f64>;

    /// Delete dead letters older than the retention period
    ///
    /// # Returns
    /// Number of dead letters deleted
    async fn gc_dead_letters(&self, retention_days: i64) -> Result<i64>;

    /// Get maintenance statistics
    async fn get_stats(&self) -> Result<MaintenanceStats>;
}
