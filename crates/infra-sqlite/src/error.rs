// sqlx::Error -> AppError mapping

use syncq_core::error::AppError;

/// Convert sqlx::Error to AppError::Storage with SQLite-aware messages
pub(crate) fn map_sqlx_error(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) => {
            let Some(code) = db_err.code() else {
                return AppError::Storage(format!("Database error: {}", db_err.message()));
            };
            let code_str = code.as_ref();

            // SQLite result codes: https://www.sqlite.org/rescode.html
            match code_str {
                "2067" | "1555" => AppError::Storage(format!(
                    "Unique constraint violation: {} ({})",
                    db_err.message(),
                    code_str
                )),
                "5" => AppError::Storage(format!(
                    "Database locked (SQLITE_BUSY): {}",
                    db_err.message()
                )),
                "13" => AppError::Storage(format!("Database full: {}", db_err.message())),
                "8" => AppError::Storage(format!(
                    "Database is read-only: {}",
                    db_err.message()
                )),
                _ => AppError::Storage(format!(
                    "Database error [{}]: {}",
                    code_str,
                    db_err.message()
                )),
            }
        }
        sqlx::Error::RowNotFound => AppError::Storage("Row not found".to_string()),
        sqlx::Error::ColumnNotFound(col) => {
            AppError::Storage(format!("Column not found: {}", col))
        }
        sqlx::Error::PoolTimedOut => {
            AppError::Storage("Timed out waiting for a database connection".to_string())
        }
        // Connection, pool, protocol errors
        _ => AppError::Storage(err.to_string()),
    }
}
