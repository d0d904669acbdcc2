// sqlx::Error -> AppError
//
// The orphan rule forbids `From<sqlx::Error> for AppError` here, so every
// query maps through `map_sqlx_error`.

use entitlement_core::error::AppError;

pub(crate) fn map_sqlx_error(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) => match db_err.code() {
            // SQLite result codes: https://www.sqlite.org/rescode.html
            Some(code) => match code.as_ref() {
                "2067" | "1555" => AppError::Database(format!(
                    "Unique constraint violation: {}",
                    db_err.message()
                )),
                "5" | "517" => AppError::Database(format!(
                    "Database locked (SQLITE_BUSY): {}",
                    db_err.message()
                )),
                "13" => AppError::Database(format!("Database full: {}", db_err.message())),
                other => AppError::Database(format!(
                    "Database error [{}]: {}",
                    other,
                    db_err.message()
                )),
            },
            None => AppError::Database(format!("Database error: {}", db_err.message())),
        },
        sqlx::Error::RowNotFound => AppError::Database("Row not found".to_string()),
        sqlx::Error::ColumnNotFound(col) => AppError::Database(format!("Column not found: {}", col)),
        // Connection, pool and protocol errors
        _ => AppError::Database(err.to_string()),
    }
}

/// Failures of the queue store surface as transport errors, outside the
/// per-notification retry taxonomy
pub(crate) fn map_queue_error(err: sqlx::Error) -> AppError {
    AppError::Queue(map_sqlx_error(err).to_string())
}

/// Stored identifiers are TEXT columns
pub(crate) fn parse_uuid(column: &str, value: &str) -> Result<uuid::Uuid, AppError> {
    uuid::Uuid::parse_str(value)
        .map_err(|e| AppError::Database(format!("Invalid UUID in {}: {} ({})", column, value, e)))
}

pub(crate) fn from_millis(column: &str, millis: i64) -> Result<chrono::DateTime<chrono::Utc>, AppError> {
    chrono::DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| AppError::Database(format!("Timestamp out of range in {}: {}", column, millis)))
}
