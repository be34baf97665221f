//! Error types for dbutils.
//!
//! This module defines all error types using `thiserror` for ergonomic error handling.
//! Lifecycle precondition violations get their own variants so callers can match on
//! them and retry the prerequisite step; backend failures are passed through as-is.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    #[error("Configuration file error: {message} (path: {path})")]
    ConfigFile { path: String, message: String },

    #[error("Cannot attach new engine without closing the existing one")]
    AlreadyConnected,

    #[error("Session factory already created")]
    AlreadyFactory,

    #[error("Cannot attach new session without releasing the existing one")]
    SessionAlreadyActive,

    #[error("Operation requires an engine; call create_engine or connect first")]
    NoEngine,

    #[error("Session factory must be created before a session can be acquired")]
    NoFactory,

    #[error("Operation requires an active session")]
    NoActiveSession,

    #[error("Cannot bootstrap database without a schema descriptor")]
    NoSchema,

    #[error("The only connection is held by the open transaction of session {holder}")]
    ConnectionBusy { holder: String },

    #[error("Invalid value: {message}")]
    InvalidValue { message: String },

    #[error("Schema error: {message} (object: {object})")]
    Schema { message: String, object: String },

    #[error("Backend error: {message}")]
    Backend {
        message: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
        suggestion: String,
    },

    #[error("Timeout: {operation} exceeded {elapsed_secs}s")]
    Timeout {
        operation: String,
        elapsed_secs: u32,
    },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    /// Create an invalid configuration error.
    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            message: message.into(),
        }
    }

    /// Create a configuration file error.
    pub fn config_file(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigFile {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn connection_busy(holder: impl Into<String>) -> Self {
        Self::ConnectionBusy {
            holder: holder.into(),
        }
    }

    pub fn invalid_value(message: impl Into<String>) -> Self {
        Self::InvalidValue {
            message: message.into(),
        }
    }

    /// Create a schema error.
    pub fn schema(message: impl Into<String>, object: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
            object: object.into(),
        }
    }

    /// Create a backend error with optional SQL state.
    pub fn backend(
        message: impl Into<String>,
        sql_state: Option<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Backend {
            message: message.into(),
            sql_state,
            suggestion: suggestion.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, elapsed_secs: u32) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_secs,
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Backend { suggestion, .. } => Some(suggestion),
            Self::AlreadyConnected => Some("Call close_engine before creating a new engine"),
            Self::SessionAlreadyActive => Some("Call release_session before acquiring a new one"),
            Self::NoEngine => Some("Call create_engine or connect first"),
            Self::NoFactory => Some("Call create_session_factory or connect first"),
            Self::NoActiveSession => Some("Call acquire_session with persist enabled first"),
            Self::NoSchema => Some("Attach a schema descriptor with with_schema"),
            Self::ConnectionBusy { .. } => Some(
                "Commit or roll back the other session first, or use a file-backed SQLite \
                 database for concurrent sessions",
            ),
            _ => None,
        }
    }

    /// Check if this error is a lifecycle precondition violation.
    ///
    /// These are programmer errors: the manager state is unchanged and the caller
    /// is expected to run the prerequisite step rather than retry the operation.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::AlreadyConnected
                | Self::AlreadyFactory
                | Self::SessionAlreadyActive
                | Self::NoEngine
                | Self::NoFactory
                | Self::NoActiveSession
                | Self::NoSchema
        )
    }
}

/// Convert sqlx errors to DbError.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::backend(
                msg.to_string(),
                None,
                "Check the connection string format and credentials",
            ),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                DbError::backend(
                    db_err.message(),
                    code,
                    "Check the SQL statement and referenced objects",
                )
            }
            sqlx::Error::RowNotFound => DbError::backend(
                "No rows returned",
                None,
                "Verify the query conditions match existing data",
            ),
            sqlx::Error::PoolTimedOut => DbError::timeout("connection pool acquire", 30),
            sqlx::Error::PoolClosed => {
                DbError::backend("Connection pool is closed", None, "Recreate the engine")
            }
            sqlx::Error::Io(io_err) => DbError::backend(
                format!("I/O error: {}", io_err),
                None,
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DbError::backend(
                format!("TLS error: {}", tls_err),
                None,
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => DbError::backend(
                format!("Protocol error: {}", msg),
                None,
                "Check database server compatibility",
            ),
            sqlx::Error::ColumnNotFound(col) => {
                DbError::schema(format!("Column not found: {}", col), col.to_string())
            }
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => DbError::internal(format!("Decode error: {}", source)),
            sqlx::Error::WorkerCrashed => DbError::internal("Database worker crashed"),
            _ => DbError::backend(
                format!("Unknown database error: {}", err),
                None,
                "Inspect the backend logs",
            ),
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DbError::invalid_configuration("bad port");
        assert!(err.to_string().contains("Invalid configuration"));
        assert!(err.to_string().contains("bad port"));
    }

    #[test]
    fn test_backend_suggestion() {
        let err = DbError::backend(
            "Syntax error",
            Some("42601".to_string()),
            "Check SQL syntax",
        );
        assert_eq!(err.suggestion(), Some("Check SQL syntax"));
    }

    #[test]
    fn test_precondition_classification() {
        assert!(DbError::AlreadyConnected.is_precondition());
        assert!(DbError::NoActiveSession.is_precondition());
        assert!(DbError::NoSchema.is_precondition());
        assert!(!DbError::timeout("query", 30).is_precondition());
        assert!(!DbError::backend("refused", None, "retry").is_precondition());
    }

    #[test]
    fn test_lifecycle_errors_have_suggestions() {
        assert!(DbError::NoEngine.suggestion().is_some());
        assert!(DbError::NoFactory.suggestion().is_some());
        assert!(DbError::internal("x").suggestion().is_none());
    }

    #[test]
    fn test_pool_closed_maps_to_backend() {
        let err: DbError = sqlx::Error::PoolClosed.into();
        assert!(matches!(err, DbError::Backend { .. }));
    }

    #[test]
    fn test_pool_timeout_maps_to_timeout() {
        let err: DbError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, DbError::Timeout { .. }));
    }
}
