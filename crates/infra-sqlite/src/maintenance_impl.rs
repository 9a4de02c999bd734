// SQLite Maintenance Implementation
use crate::error::map_sqlx_error;
use async_trait::async_trait;
use sqlx::SqlitePool;
use std::sync::Arc;
use syncq_core::error::Result;
use syncq_core::port::{Maintenance, MaintenanceStats, TimeProvider};
use tracing::info;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;
const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// SQLite maintenance implementation
pub struct SqliteMaintenance {
    pool: SqlitePool,
    time_provider: Arc<dyn TimeProvider>,
}

impl SqliteMaintenance {
    pub fn new(pool: SqlitePool, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            pool,
            time_provider,
        }
    }

    async fn pragma(&self, name: &str) -> Result<i64> {
        let sql = format!("PRAGMA {}", name);
        sqlx::query_scalar(&sql)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)
    }

    /// DB size in bytes (page_count * page_size)
    async fn get_db_size_bytes(&self) -> Result<i64> {
        let page_count = self.pragma("page_count").await?;
        let page_size = self.pragma("page_size").await?;
        Ok(page_count * page_size)
    }
}

#[async_trait]
impl Maintenance for SqliteMaintenance {
    async fn vacuum(&self) -> Result<f64> {
        info!("Running VACUUM to optimize database...");

        let size_before = self.get_db_size_bytes().await? as f64 / BYTES_PER_MB;

        sqlx::query("VACUUM")
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        let size_after = self.get_db_size_bytes().await? as f64 / BYTES_PER_MB;
        let reclaimed = (size_before - size_after).max(0.0);

        info!(
            size_before_mb = size_before,
            size_after_mb = size_after,
            reclaimed_mb = reclaimed,
            "VACUUM completed"
        );

        Ok(reclaimed)
    }

    async fn gc_dead_letters(&self, retention_days: i64) -> Result<i64> {
        let cutoff_time = self.time_provider.now_millis() - retention_days * MILLIS_PER_DAY;

        info!(
            retention_days = retention_days,
            cutoff_time = cutoff_time,
            "Running dead letter GC"
        );

        let result = sqlx::query("DELETE FROM dead_letters WHERE failed_at < ?")
            .bind(cutoff_time)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        let deleted = i64::try_from(result.rows_affected()).unwrap_or(i64::MAX);
        info!(deleted_dead_letters = deleted, "Dead letter GC completed");

        Ok(deleted)
    }

    async fn get_stats(&self) -> Result<MaintenanceStats> {
        let db_size_bytes = self.get_db_size_bytes().await?;
        let page_count = self.pragma("page_count").await?;
        let freelist_count = self.pragma("freelist_count").await?;

        let dead_letter_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM dead_letters")
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        let snapshot_bytes: i64 =
            sqlx::query_scalar("SELECT COALESCE(SUM(LENGTH(value)), 0) FROM kv_store")
                .fetch_one(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        let fragmentation_percent = if page_count > 0 {
            (freelist_count as f64 / page_count as f64) * 100.0
        } else {
            0.0
        };

        Ok(MaintenanceStats {
            db_size_mb: db_size_bytes as f64 / BYTES_PER_MB,
            db_size_bytes,
            dead_letter_count,
            snapshot_bytes,
            fragmentation_percent,
        })
    }
}
