//! Error types for the data source layer.
//!
//! Every failure carries a stable category string so callers can render
//! guidance without parsing messages. Raw driver errors are classified here
//! and never surface as the primary message.

use serde::Serialize;
use thiserror::Error;

/// Why a connectivity probe failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionFailureCause {
    Refused,
    HostNotFound,
    Timeout,
    AuthFailed,
    DatabaseMissing,
    TlsMismatch,
    Other,
}

impl ConnectionFailureCause {
    /// Classify a driver message into a failure cause.
    pub fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();

        if lower.contains("connection refused") || lower.contains("refused") {
            Self::Refused
        } else if lower.contains("failed to lookup address")
            || lower.contains("name or service not known")
            || lower.contains("no such host")
            || lower.contains("nodename nor servname")
            || lower.contains("dns")
        {
            Self::HostNotFound
        } else if lower.contains("timed out") || lower.contains("timeout") {
            Self::Timeout
        } else if lower.contains("password")
            || lower.contains("authentication")
            || lower.contains("access denied")
            || lower.contains("auth failed")
        {
            Self::AuthFailed
        } else if lower.contains("does not exist")
            || lower.contains("unknown database")
            || lower.contains("unable to open database")
        {
            Self::DatabaseMissing
        } else if lower.contains("tls") || lower.contains("ssl") || lower.contains("certificate") {
            Self::TlsMismatch
        } else {
            Self::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Refused => "refused",
            Self::HostNotFound => "host_not_found",
            Self::Timeout => "timeout",
            Self::AuthFailed => "auth_failed",
            Self::DatabaseMissing => "database_missing",
            Self::TlsMismatch => "tls_mismatch",
            Self::Other => "other",
        }
    }

    /// Human-readable next step for this cause.
    pub fn suggestion(&self) -> &'static str {
        match self {
            Self::Refused => "Check that the database server is running and accepting connections on this port",
            Self::HostNotFound => "Check the host name; it could not be resolved",
            Self::Timeout => "The server did not answer in time; check network reachability and firewalls",
            Self::AuthFailed => "Verify the username and password",
            Self::DatabaseMissing => "Check that the database (or database file) exists",
            Self::TlsMismatch => "Check the TLS setting; the server and client disagree on encryption",
            Self::Other => "Verify the connection parameters",
        }
    }
}

impl std::fmt::Display for ConnectionFailureCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category of a statement the engine rejected or failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionErrorKind {
    Syntax,
    MissingObject,
    Permission,
    Timeout,
    Other,
}

impl ExecutionErrorKind {
    /// Classify from an SQLSTATE / vendor code and the driver message.
    pub fn classify(code: Option<&str>, message: &str) -> Self {
        match code {
            // PostgreSQL SQLSTATE
            Some("42601") => return Self::Syntax,
            Some("42P01") | Some("42703") | Some("42883") | Some("3F000") => {
                return Self::MissingObject;
            }
            Some("42501") => return Self::Permission,
            Some("57014") => return Self::Timeout,
            // MySQL vendor codes / SQLSTATE
            Some("1064") | Some("42000") if message.to_lowercase().contains("syntax") => {
                return Self::Syntax;
            }
            Some("1146") | Some("1054") | Some("1049") | Some("42S02") | Some("42S22") => {
                return Self::MissingObject;
            }
            Some("1142") | Some("1143") | Some("1044") | Some("1045") => return Self::Permission,
            _ => {}
        }

        let lower = message.to_lowercase();
        if lower.contains("syntax error") || lower.contains("incomplete input") {
            Self::Syntax
        } else if lower.contains("no such table")
            || lower.contains("no such column")
            || lower.contains("does not exist")
            || lower.contains("doesn't exist")
            || lower.contains("unknown column")
        {
            Self::MissingObject
        } else if lower.contains("permission denied")
            || lower.contains("not authorized")
            || lower.contains("command denied")
            || lower.contains("readonly database")
            || lower.contains("read-only")
        {
            Self::Permission
        } else if lower.contains("timeout") || lower.contains("timed out") {
            Self::Timeout
        } else {
            Self::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Syntax => "syntax",
            Self::MissingObject => "missing_object",
            Self::Permission => "permission",
            Self::Timeout => "timeout",
            Self::Other => "other",
        }
    }

    pub fn suggestion(&self) -> &'static str {
        match self {
            Self::Syntax => "Check the SQL syntax for this database dialect",
            Self::MissingObject => "Check table and column names against the discovered schema",
            Self::Permission => "The database user lacks privileges for this statement",
            Self::Timeout => "Narrow the query or add a row limit",
            Self::Other => "Check the statement and the database server logs",
        }
    }
}

impl std::fmt::Display for ExecutionErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Invalid connection profile: {message}")]
    Validation { message: String },

    #[error("Connection test failed ({cause}): {message}")]
    ConnectionTest {
        cause: ConnectionFailureCause,
        message: String,
    },

    #[error("Schema discovery failed: {message}")]
    Discovery { message: String },

    #[error("Query rejected: {reason}")]
    SecurityValidation {
        /// Leading keyword or rule that triggered the rejection.
        rule: String,
        reason: String,
    },

    #[error("Query failed ({kind}): {message}")]
    Execution {
        kind: ExecutionErrorKind,
        message: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
    },

    #[error("Connection not found: {connection_id}")]
    NotFound { connection_id: String },

    #[error("{engine} does not support {operation}")]
    UnsupportedEngine { engine: String, operation: String },

    #[error("Not configured: {message}")]
    NotConfigured { message: String },

    #[error("Connection store error: {message}")]
    Storage { message: String },

    #[error("Timeout: {operation} exceeded {elapsed_secs}s")]
    Timeout {
        operation: String,
        elapsed_secs: u64,
    },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn connection_test(cause: ConnectionFailureCause, message: impl Into<String>) -> Self {
        Self::ConnectionTest {
            cause,
            message: message.into(),
        }
    }

    pub fn discovery(message: impl Into<String>) -> Self {
        Self::Discovery {
            message: message.into(),
        }
    }

    pub fn security(rule: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SecurityValidation {
            rule: rule.into(),
            reason: reason.into(),
        }
    }

    pub fn execution(
        kind: ExecutionErrorKind,
        message: impl Into<String>,
        sql_state: Option<String>,
    ) -> Self {
        Self::Execution {
            kind,
            message: message.into(),
            sql_state,
        }
    }

    pub fn not_found(connection_id: impl Into<String>) -> Self {
        Self::NotFound {
            connection_id: connection_id.into(),
        }
    }

    pub fn unsupported(engine: impl std::fmt::Display, operation: impl Into<String>) -> Self {
        Self::UnsupportedEngine {
            engine: engine.to_string(),
            operation: operation.into(),
        }
    }

    pub fn not_configured(message: impl Into<String>) -> Self {
        Self::NotConfigured {
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>, elapsed_secs: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_secs,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Stable category identifier for this error.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation_error",
            Self::ConnectionTest { .. } => "connection_test_error",
            Self::Discovery { .. } => "discovery_error",
            Self::SecurityValidation { .. } => "security_validation_error",
            Self::Execution { .. } => "execution_error",
            Self::NotFound { .. } => "not_found_error",
            Self::UnsupportedEngine { .. } => "unsupported_engine_error",
            Self::NotConfigured { .. } => "not_configured",
            Self::Storage { .. } => "storage_error",
            Self::Timeout { .. } => "timeout",
            Self::Internal { .. } => "internal_error",
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::ConnectionTest { cause, .. } => Some(cause.suggestion()),
            Self::Execution { kind, .. } => Some(kind.suggestion()),
            Self::SecurityValidation { .. } => {
                Some("Only single read-only statements (SELECT, WITH, SHOW, EXPLAIN, DESCRIBE) are accepted")
            }
            Self::NotFound { .. } => Some("List the stored connections to find a valid id"),
            Self::Timeout { .. } => Some("Consider increasing the timeout or narrowing the query"),
            _ => None,
        }
    }

    /// Serialisable form for the component boundary.
    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            category: self.category(),
            message: self.to_string(),
            suggestion: self.suggestion(),
        }
    }
}

/// Category, message and suggestion of a failed operation.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorReport {
    pub category: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<&'static str>,
}

/// Convert sqlx errors to DbError.
///
/// Driver failures while running a statement become `Execution` errors;
/// transport-level failures become `ConnectionTest` with a classified cause.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                let kind = ExecutionErrorKind::classify(code.as_deref(), db_err.message());
                DbError::execution(kind, db_err.message(), code)
            }
            sqlx::Error::PoolTimedOut => {
                DbError::connection_test(ConnectionFailureCause::Timeout, "Timed out acquiring a pooled connection")
            }
            sqlx::Error::PoolClosed => DbError::connection_test(
                ConnectionFailureCause::Other,
                "Connection pool is closed",
            ),
            sqlx::Error::Io(io_err) => {
                let message = format!("I/O error: {}", io_err);
                let cause = match io_err.kind() {
                    std::io::ErrorKind::ConnectionRefused => ConnectionFailureCause::Refused,
                    std::io::ErrorKind::TimedOut => ConnectionFailureCause::Timeout,
                    _ => ConnectionFailureCause::classify(&message),
                };
                DbError::connection_test(cause, message)
            }
            sqlx::Error::Tls(tls_err) => DbError::connection_test(
                ConnectionFailureCause::TlsMismatch,
                format!("TLS error: {}", tls_err),
            ),
            sqlx::Error::Configuration(msg) => {
                DbError::validation(format!("Invalid driver configuration: {}", msg))
            }
            sqlx::Error::Protocol(msg) => DbError::connection_test(
                ConnectionFailureCause::classify(&msg),
                format!("Protocol error: {}", msg),
            ),
            sqlx::Error::ColumnNotFound(col) => DbError::execution(
                ExecutionErrorKind::MissingObject,
                format!("Column not found: {}", col),
                None,
            ),
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => DbError::internal(format!("Decode error: {}", source)),
            other => DbError::internal(format!("Database driver error: {}", other)),
        }
    }
}

impl From<mongodb::error::Error> for DbError {
    fn from(err: mongodb::error::Error) -> Self {
        use mongodb::error::ErrorKind;

        let message = err.to_string();
        match err.kind.as_ref() {
            ErrorKind::Authentication { .. } => {
                DbError::connection_test(ConnectionFailureCause::AuthFailed, message)
            }
            ErrorKind::ServerSelection { .. } | ErrorKind::Io(_) | ErrorKind::DnsResolve { .. } => {
                DbError::connection_test(ConnectionFailureCause::classify(&message), message)
            }
            ErrorKind::InvalidArgument { .. } => DbError::validation(message),
            ErrorKind::Command(command_err) => {
                let kind = match command_err.code {
                    13 => ExecutionErrorKind::Permission,
                    26 => ExecutionErrorKind::MissingObject,
                    50 => ExecutionErrorKind::Timeout,
                    _ => ExecutionErrorKind::Other,
                };
                DbError::execution(kind, message, Some(command_err.code.to_string()))
            }
            _ => DbError::internal(message),
        }
    }
}

impl From<std::io::Error> for DbError {
    fn from(err: std::io::Error) -> Self {
        DbError::storage(err.to_string())
    }
}

impl From<serde_json::Error> for DbError {
    fn from(err: serde_json::Error) -> Self {
        DbError::storage(format!("Malformed connection document: {}", err))
    }
}

/// Result type alias for data source operations.
pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DbError::connection_test(ConnectionFailureCause::Refused, "no listener");
        assert!(err.to_string().contains("refused"));
        assert_eq!(err.category(), "connection_test_error");
    }

    #[test]
    fn test_classify_connection_causes() {
        assert_eq!(
            ConnectionFailureCause::classify("Connection refused (os error 111)"),
            ConnectionFailureCause::Refused
        );
        assert_eq!(
            ConnectionFailureCause::classify("failed to lookup address information: Name or service not known"),
            ConnectionFailureCause::HostNotFound
        );
        assert_eq!(
            ConnectionFailureCause::classify("password authentication failed for user \"bob\""),
            ConnectionFailureCause::AuthFailed
        );
        assert_eq!(
            ConnectionFailureCause::classify("database \"nope\" does not exist"),
            ConnectionFailureCause::DatabaseMissing
        );
        assert_eq!(
            ConnectionFailureCause::classify("server does not support SSL"),
            ConnectionFailureCause::TlsMismatch
        );
        assert_eq!(
            ConnectionFailureCause::classify("something odd"),
            ConnectionFailureCause::Other
        );
    }

    #[test]
    fn test_classify_execution_kinds() {
        assert_eq!(
            ExecutionErrorKind::classify(Some("42601"), "syntax error at or near"),
            ExecutionErrorKind::Syntax
        );
        assert_eq!(
            ExecutionErrorKind::classify(Some("42P01"), "relation \"x\" does not exist"),
            ExecutionErrorKind::MissingObject
        );
        assert_eq!(
            ExecutionErrorKind::classify(None, "no such table: users"),
            ExecutionErrorKind::MissingObject
        );
        assert_eq!(
            ExecutionErrorKind::classify(Some("1"), "near \"SELEC\": syntax error"),
            ExecutionErrorKind::Syntax
        );
        assert_eq!(
            ExecutionErrorKind::classify(Some("42501"), "permission denied for table t"),
            ExecutionErrorKind::Permission
        );
        assert_eq!(
            ExecutionErrorKind::classify(None, "disk I/O error"),
            ExecutionErrorKind::Other
        );
    }

    #[test]
    fn test_report_carries_category_and_suggestion() {
        let err = DbError::execution(ExecutionErrorKind::Syntax, "bad", None);
        let report = err.report();
        assert_eq!(report.category, "execution_error");
        assert_eq!(report.suggestion, Some(ExecutionErrorKind::Syntax.suggestion()));

        let json = serde_json::to_value(DbError::validation("x").report()).unwrap();
        assert_eq!(json["category"], "validation_error");
        assert!(json.get("suggestion").is_none());
    }

    #[test]
    fn test_io_error_maps_to_storage() {
        let err: DbError = std::io::Error::other("disk full").into();
        assert!(matches!(err, DbError::Storage { .. }));
    }
}
