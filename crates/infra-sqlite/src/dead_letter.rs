// SQLite DeadLetterStore Implementation

use crate::error::map_sqlx_error;
use async_trait::async_trait;
use sqlx::SqlitePool;
use syncq_core::domain::{DeadLetter, OperationDescriptor};
use syncq_core::error::Result;
use syncq_core::port::DeadLetterStore;
use tracing::{info, warn};

pub struct SqliteDeadLetterStore {
    pool: SqlitePool,
}

impl SqliteDeadLetterStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DeadLetterStore for SqliteDeadLetterStore {
    async fn record(&self, letter: &DeadLetter) -> Result<()> {
        let payload = serde_json::to_string(&letter.operation.payload)?;

        sqlx::query(
            r#"
            INSERT INTO dead_letters (
                item_id, kind, payload, attempts, max_attempts,
                enqueued_at, failed_at, reason
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&letter.item_id)
        .bind(letter.operation.kind.as_str())
        .bind(payload)
        .bind(i64::from(letter.attempts))
        .bind(i64::from(letter.max_attempts))
        .bind(letter.enqueued_at)
        .bind(letter.failed_at)
        .bind(&letter.reason)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn list(&self, limit: usize) -> Result<Vec<DeadLetter>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query_as::<_, DeadLetterRow>(
            r#"
            SELECT item_id, kind, payload, attempts, max_attempts,
                   enqueued_at, failed_at, reason
            FROM dead_letters
            ORDER BY failed_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(DeadLetterRow::into_dead_letter).collect())
    }

    async fn purge(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM dead_letters")
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        let deleted = result.rows_affected();
        info!(deleted = deleted, "Dead letters purged");
        Ok(deleted)
    }
}

#[derive(sqlx::FromRow)]
struct DeadLetterRow {
    item_id: String,
    kind: String,
    payload: String,
    attempts: i64,
    max_attempts: i64,
    enqueued_at: i64,
    failed_at: i64,
    reason: String,
}

impl DeadLetterRow {
    fn into_dead_letter(self) -> DeadLetter {
        let payload = serde_json::from_str(&self.payload).unwrap_or_else(|e| {
            warn!(item_id = %self.item_id, error = %e, "Unreadable dead letter payload");
            serde_json::Value::Null
        });

        DeadLetter {
            item_id: self.item_id,
            operation: OperationDescriptor::new(self.kind, payload),
            attempts: u32::try_from(self.attempts).unwrap_or(0),
            max_attempts: u32::try_from(self.max_attempts).unwrap_or(0),
            enqueued_at: self.enqueued_at,
            failed_at: self.failed_at,
            reason: self.reason,
        }
    }
}
