// ⚠️ Error types - one enum per subsystem
// Storage, configuration and forecasting failures are typed; use cases and
// the binary wrap them with anyhow context.

use thiserror::Error;

// ============================================================================
// STORAGE
// ============================================================================

#[derive(Error, Debug)]
pub enum StorageError {
    /// A constraint (CHECK, NOT NULL, UNIQUE, FK) rejected the write.
    #[error("Integrity violation: {message}")]
    IntegrityViolation { message: String },

    #[error("SQLite error: {0}")]
    Sqlite(rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored value could not be decoded back into a domain value.
    #[error("Invalid row in {table}: {message}")]
    InvalidRow { table: String, message: String },
}

impl StorageError {
    pub fn is_integrity_violation(&self) -> bool {
        matches!(self, StorageError::IntegrityViolation { .. })
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(ref code, ref msg)
                if code.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StorageError::IntegrityViolation {
                    message: msg.clone().unwrap_or_else(|| code.to_string()),
                }
            }
            other => StorageError::Sqlite(other),
        }
    }
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid TOML in {path}: {message}")]
    Parse { path: String, message: String },

    #[error("Invalid value for {field}: {message}")]
    ValidationFailed { field: String, message: String },
}

// ============================================================================
// FORECAST
// ============================================================================

#[derive(Error, Debug, PartialEq)]
pub enum ForecastError {
    #[error("Series length mismatch: {periods} periods, {counts} counts, {revenues} revenues")]
    LengthMismatch {
        periods: usize,
        counts: usize,
        revenues: usize,
    },

    #[error("Invalid period key: {0}")]
    InvalidPeriod(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constraint_violation_maps_to_integrity() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (v REAL NOT NULL CHECK (v > 0))")
            .unwrap();

        let err: StorageError = conn
            .execute("INSERT INTO t (v) VALUES (-1)", [])
            .unwrap_err()
            .into();

        assert!(err.is_integrity_violation());
    }

    #[test]
    fn test_other_sqlite_errors_stay_sqlite() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let err: StorageError = conn
            .execute("SELECT * FROM missing_table", [])
            .unwrap_err()
            .into();

        assert!(matches!(err, StorageError::Sqlite(_)));
    }
}
