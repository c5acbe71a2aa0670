//! Error types for the connection registry and handles.
//!
//! Two failure modes coexist in this layer, on purpose:
//!
//! - [`DbError`] is the hard failure: connecting, registry lookups and the
//!   metadata/transaction operations propagate it with `?`.
//! - [`StatementError`] is the soft failure of `prepare`/`execute`/`query`.
//!   A failed statement is an ordinary `Err` value the caller checks; the
//!   handle additionally caches the code and message for later inspection.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Connection failed: {message}")]
    Connect { message: String, suggestion: String },

    #[error("No database connection registered under '{connection}'")]
    NotFound { connection: String },

    #[error("Connection '{connection}' is closed")]
    Closed { connection: String },

    #[error("Unsupported driver type: {driver}")]
    UnsupportedDriver { driver: String },

    #[error("Driver error: {message}")]
    Driver {
        message: String,
        /// e.g. "42S02" for an unknown table
        sqlstate: Option<String>,
    },
}

impl DbError {
    /// Create a connect error with a helpful suggestion.
    pub fn connect(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connect {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a lookup-miss error for an unregistered connection name.
    pub fn not_found(connection: impl Into<String>) -> Self {
        Self::NotFound {
            connection: connection.into(),
        }
    }

    /// Create an error for an operation on a closed handle.
    pub fn closed(connection: impl Into<String>) -> Self {
        Self::Closed {
            connection: connection.into(),
        }
    }

    /// Create a driver error.
    pub fn driver(message: impl Into<String>, sqlstate: Option<String>) -> Self {
        Self::Driver {
            message: message.into(),
            sqlstate,
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connect { suggestion, .. } => Some(suggestion),
            _ => None,
        }
    }
}

/// Convert sqlx errors to DbError.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::connect(
                msg.to_string(),
                "Check the connection settings and credentials",
            ),
            sqlx::Error::Io(io_err) => DbError::connect(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DbError::connect(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => DbError::connect(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::Database(db_err) => {
                let sqlstate = db_err.code().map(|c| c.to_string());
                DbError::driver(db_err.message(), sqlstate)
            }
            other => DbError::driver(other.to_string(), None),
        }
    }
}

impl From<StatementError> for DbError {
    fn from(err: StatementError) -> Self {
        DbError::Driver {
            message: err.message,
            sqlstate: err.sqlstate,
        }
    }
}

/// Result type alias for registry and handle operations.
pub type DbResult<T> = Result<T, DbError>;

/// Soft failure of a `prepare`, `execute` or `query` call.
///
/// Never raised as a hard error by this layer; the caller checks the returned
/// `Result` and can afterwards read the same state back from the handle via
/// `last_error_code` / `last_error_message`.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Statement failed: {message}")]
pub struct StatementError {
    /// Five-character SQLSTATE, when the driver reported one.
    pub sqlstate: Option<String>,
    /// Driver-specific numeric code (e.g. 1064 for a MySQL syntax error).
    pub code: Option<i64>,
    pub message: String,
}

impl StatementError {
    /// Statement attempted on a handle whose connection was closed.
    pub(crate) fn closed(connection: &str) -> Self {
        Self {
            sqlstate: None,
            code: None,
            message: format!("connection '{}' is closed", connection),
        }
    }

    /// Parameter binding failure. HY093 is the SQLSTATE the drivers report
    /// for an invalid parameter number or name.
    pub(crate) fn bind(message: impl Into<String>) -> Self {
        Self {
            sqlstate: Some("HY093".to_string()),
            code: None,
            message: message.into(),
        }
    }

    /// Statement exceeded the handle's query timeout attribute.
    pub(crate) fn timeout(secs: u64) -> Self {
        Self {
            sqlstate: Some("HYT00".to_string()),
            code: None,
            message: format!("statement timed out after {}s", secs),
        }
    }

    pub(crate) fn from_info(info: &ErrorInfo) -> Self {
        Self {
            sqlstate: if info.sqlstate == SQLSTATE_SUCCESS {
                None
            } else {
                Some(info.sqlstate.clone())
            },
            code: info.code,
            message: info.message.clone().unwrap_or_default(),
        }
    }
}

/// SQLSTATE reported when the last operation on a handle succeeded.
pub const SQLSTATE_SUCCESS: &str = "00000";

/// Error state of the most recent driver round trip on a handle.
///
/// Unlike the cached last-error fields, this reflects every operation and is
/// reset to the success state (`00000`, no code, no message) whenever a round
/// trip completes without error.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ErrorInfo {
    pub sqlstate: String,
    pub code: Option<i64>,
    pub message: Option<String>,
}

impl Default for ErrorInfo {
    fn default() -> Self {
        Self {
            sqlstate: SQLSTATE_SUCCESS.to_string(),
            code: None,
            message: None,
        }
    }
}

impl ErrorInfo {
    /// True when the last round trip succeeded.
    pub fn is_success(&self) -> bool {
        self.sqlstate == SQLSTATE_SUCCESS
    }

    /// The present fields joined with `" - "`.
    pub fn summary(&self) -> String {
        let mut parts = vec![self.sqlstate.clone()];
        if let Some(code) = self.code {
            parts.push(code.to_string());
        }
        if let Some(message) = &self.message {
            parts.push(message.clone());
        }
        parts.join(" - ")
    }

    /// Extract SQLSTATE, driver code and message from an sqlx error.
    ///
    /// MySQL reports a SQLSTATE plus a numeric error; SQLite only has its
    /// result code, which lands in `code` under the generic HY000 state.
    /// Errors that never reached the server (I/O, protocol) carry only their
    /// display string.
    pub(crate) fn from_sqlx(err: &sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = err {
            if let Some(mysql) = db_err.try_downcast_ref::<sqlx::mysql::MySqlDatabaseError>() {
                return Self {
                    sqlstate: db_err
                        .code()
                        .map(|c| c.into_owned())
                        .unwrap_or_else(|| "HY000".to_string()),
                    code: Some(i64::from(mysql.number())),
                    message: Some(db_err.message().to_string()),
                };
            }
            return Self {
                sqlstate: "HY000".to_string(),
                code: db_err.code().and_then(|c| c.parse().ok()),
                message: Some(db_err.message().to_string()),
            };
        }
        Self {
            sqlstate: "HY000".to_string(),
            code: None,
            message: Some(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DbError::connect("Failed to connect", "Check credentials");
        assert!(err.to_string().contains("Connection failed"));
    }

    #[test]
    fn test_error_suggestion() {
        let err = DbError::connect("Failed to connect", "Check credentials");
        assert_eq!(err.suggestion(), Some("Check credentials"));
        assert_eq!(DbError::not_found("x").suggestion(), None);
    }

    #[test]
    fn test_error_info_default_is_success() {
        let info = ErrorInfo::default();
        assert!(info.is_success());
        assert_eq!(info.summary(), "00000");
    }

    #[test]
    fn test_error_info_summary_joins_fields() {
        let info = ErrorInfo {
            sqlstate: "42S02".to_string(),
            code: Some(1146),
            message: Some("Table 'test.t' doesn't exist".to_string()),
        };
        assert_eq!(info.summary(), "42S02 - 1146 - Table 'test.t' doesn't exist");
    }

    #[test]
    fn test_statement_error_from_info_drops_success_state() {
        let err = StatementError::from_info(&ErrorInfo {
            sqlstate: SQLSTATE_SUCCESS.to_string(),
            code: None,
            message: Some("odd".to_string()),
        });
        assert_eq!(err.sqlstate, None);
        assert_eq!(err.message, "odd");
    }

    #[test]
    fn test_bind_error_uses_hy093() {
        let err = StatementError::bind("no parameter named :id");
        assert_eq!(err.sqlstate.as_deref(), Some("HY093"));
    }

    #[test]
    fn test_statement_error_converts_to_driver_error() {
        let err = StatementError::timeout(5);
        let db: DbError = err.into();
        assert!(matches!(db, DbError::Driver { .. }));
    }
}
