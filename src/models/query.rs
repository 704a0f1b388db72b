//! Query execution and probe result models.

use crate::error::{ConnectionFailureCause, DbError, ExecutionErrorKind};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Default row cap for query results.
pub const DEFAULT_ROW_LIMIT: u32 = 1000;

/// Maximum allowed row cap.
pub const MAX_ROW_LIMIT: u32 = 10000;

/// Default statement timeout in seconds.
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;

/// Maximum statement timeout in seconds.
pub const MAX_QUERY_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColumnMetadata {
    pub name: String,
    /// Engine-native type (e.g., "INT8", "VARCHAR", "TEXT")
    pub type_name: String,
}

impl ColumnMetadata {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }
}

/// Structured description of a statement the engine failed.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionFailure {
    pub kind: ExecutionErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql_state: Option<String>,
    pub suggestion: &'static str,
}

impl ExecutionFailure {
    /// Build from any error raised while running an accepted statement.
    pub fn from_error(err: &DbError) -> Self {
        match err {
            DbError::Execution {
                kind,
                message,
                sql_state,
            } => Self {
                kind: *kind,
                message: message.clone(),
                sql_state: sql_state.clone(),
                suggestion: kind.suggestion(),
            },
            DbError::Timeout { .. } => Self {
                kind: ExecutionErrorKind::Timeout,
                message: err.to_string(),
                sql_state: None,
                suggestion: ExecutionErrorKind::Timeout.suggestion(),
            },
            other => Self {
                kind: ExecutionErrorKind::Other,
                message: other.to_string(),
                sql_state: None,
                suggestion: other
                    .suggestion()
                    .unwrap_or(ExecutionErrorKind::Other.suggestion()),
            },
        }
    }
}

impl std::fmt::Display for ExecutionFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} error: {}", self.kind, self.message)
    }
}

/// Normalized outcome of running one read-only statement.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub columns: Vec<ColumnMetadata>,
    pub rows: Vec<serde_json::Map<String, JsonValue>>,
    pub row_count: usize,
    /// True when the row cap cut the result short.
    pub truncated: bool,
    pub execution_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ExecutionFailure>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub hints: Vec<String>,
}

impl ExecutionResult {
    pub fn success(
        columns: Vec<ColumnMetadata>,
        rows: Vec<serde_json::Map<String, JsonValue>>,
        truncated: bool,
        execution_time_ms: u64,
    ) -> Self {
        Self {
            row_count: rows.len(),
            columns,
            rows,
            truncated,
            execution_time_ms,
            error: None,
            hints: Vec::new(),
        }
    }

    pub fn failed(failure: ExecutionFailure, execution_time_ms: u64) -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
            row_count: 0,
            truncated: false,
            execution_time_ms,
            error: Some(failure),
            hints: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Convert a failed result into an `Execution` error.
    pub fn into_result(self) -> Result<Self, DbError> {
        match self.error {
            Some(failure) => Err(DbError::execution(
                failure.kind,
                failure.message,
                failure.sql_state,
            )),
            None => Ok(self),
        }
    }
}

/// Result of a liveness probe. Never an error for expected failure modes.
#[derive(Debug, Clone, Serialize)]
pub struct ProbeOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<ConnectionFailureCause>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub latency_ms: u64,
}

impl ProbeOutcome {
    pub fn ok(latency_ms: u64) -> Self {
        Self {
            success: true,
            cause: None,
            message: None,
            latency_ms,
        }
    }

    pub fn failed(cause: ConnectionFailureCause, message: impl Into<String>, latency_ms: u64) -> Self {
        Self {
            success: false,
            cause: Some(cause),
            message: Some(message.into()),
            latency_ms,
        }
    }

    /// Build a failed outcome from whatever error interrupted the probe.
    pub fn from_error(err: &DbError, latency_ms: u64) -> Self {
        let cause = match err {
            DbError::ConnectionTest { cause, .. } => *cause,
            DbError::Timeout { .. } => ConnectionFailureCause::Timeout,
            other => ConnectionFailureCause::classify(&other.to_string()),
        };
        Self::failed(cause, err.to_string(), latency_ms)
    }

    /// Turn a failed probe into a `ConnectionTest` error.
    pub fn into_error(self) -> Option<DbError> {
        if self.success {
            return None;
        }
        Some(DbError::connection_test(
            self.cause.unwrap_or(ConnectionFailureCause::Other),
            self.message.unwrap_or_else(|| "Probe failed".to_string()),
        ))
    }
}
