use thiserror::Error;

/// Errors surfaced by the data-access core.
///
/// Storage-engine details never leave this type: driver messages are logged
/// where the error is classified and replaced with a neutral category.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataError {
    /// Exactly one row was expected and none matched.
    #[error("record not found: {0}")]
    NotFound(String),
    /// A unique constraint was violated or a record already exists.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Caller-supplied data was rejected before reaching storage.
    #[error("validation error: {0}")]
    Validation(String),
    /// A query could not be assembled from the supplied processors.
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    /// A write was attempted through a read-only transaction scope.
    #[error("write attempted through a read-only transaction scope")]
    ReadOnlyScope,
    /// Connectivity, pool exhaustion, unclassified constraint failures.
    #[error("storage error: {0}")]
    Storage(String),
    #[error("configuration error: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, DataError>;

impl DataError {
    pub fn not_found(table: &str, detail: impl std::fmt::Display) -> Self {
        DataError::NotFound(format!("{table}: {detail}"))
    }

    pub fn invalid_query(message: impl Into<String>) -> Self {
        DataError::InvalidQuery(message.into())
    }

    pub fn unknown_relation(table: &str, relation: &str) -> Self {
        DataError::InvalidQuery(format!("{table} has no relation named '{relation}'"))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, DataError::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, DataError::Conflict(_))
    }
}

impl From<sqlx::Error> for DataError {
    fn from(error: sqlx::Error) -> Self {
        match error {
            sqlx::Error::RowNotFound => DataError::NotFound("no matching row".to_string()),
            sqlx::Error::PoolTimedOut => {
                tracing::warn!("connection pool timed out while acquiring a connection");
                DataError::Storage("connection pool exhausted".to_string())
            }
            sqlx::Error::PoolClosed => DataError::Storage("connection pool closed".to_string()),
            sqlx::Error::Database(db_error) => {
                tracing::warn!(
                    code = db_error.code().as_deref().unwrap_or("unknown"),
                    message = %db_error.message(),
                    "database rejected statement"
                );
                if is_read_only_violation(db_error.code().as_deref()) {
                    DataError::ReadOnlyScope
                } else if db_error.is_unique_violation() {
                    DataError::Conflict("a record with the same unique key already exists".to_string())
                } else if db_error.is_foreign_key_violation() {
                    DataError::Storage("referenced record is missing".to_string())
                } else if db_error.is_check_violation() {
                    DataError::Storage("record failed a storage constraint".to_string())
                } else {
                    DataError::Storage("statement rejected by storage".to_string())
                }
            }
            sqlx::Error::Io(io_error) => {
                tracing::warn!(error = %io_error, "storage i/o failure");
                DataError::Storage("storage unreachable".to_string())
            }
            sqlx::Error::ColumnDecode { index, source } => {
                tracing::warn!(column = %index, error = %source, "failed to decode column");
                DataError::Storage(format!("failed to decode column {index}"))
            }
            sqlx::Error::ColumnNotFound(column) => {
                DataError::Storage(format!("result set is missing column {column}"))
            }
            other => {
                tracing::warn!(error = %other, "storage operation failed");
                DataError::Storage("storage operation failed".to_string())
            }
        }
    }
}

/// SQLite reports `query_only` and read-only files as `SQLITE_READONLY` (8),
/// possibly carried in an extended code.
fn is_read_only_violation(code: Option<&str>) -> bool {
    code.and_then(|code| code.parse::<i32>().ok())
        .is_some_and(|code| code & 0xff == 8)
}

impl From<config::ConfigError> for DataError {
    fn from(error: config::ConfigError) -> Self {
        DataError::Configuration(error.to_string())
    }
}
