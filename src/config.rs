//! Configuration handling.
//!
//! `Config` is a clap parser so an embedding application can flatten it into
//! its own command line; every field can also come from a `DATASOURCE_*`
//! environment variable.

use crate::error::{DbError, DbResult};
use crate::models::{
    DEFAULT_QUERY_TIMEOUT_SECS, DEFAULT_ROW_LIMIT, MAX_QUERY_TIMEOUT_SECS, MAX_ROW_LIMIT,
};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_STORE_PATH: &str = "connections.json";
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 10;

// Pool configuration defaults
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_MAX_CONNECTIONS_SQLITE: u32 = 1;
pub const DEFAULT_MIN_CONNECTIONS: u32 = 1;
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 30;
/// Upper bound on any single pool.
pub const MAX_POOL_CONNECTIONS: u32 = 100;

/// Connection pool sizing and timeouts applied to every pool the manager builds.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct PoolOptions {
    /// Maximum connections in pool (default: 10 for network engines, 1 for SQLite)
    pub max_connections: Option<u32>,
    /// Minimum connections in pool (default: 1)
    pub min_connections: Option<u32>,
    /// Idle timeout in seconds (default: 600)
    pub idle_timeout_secs: Option<u64>,
    /// Connection acquire timeout in seconds (default: 30)
    pub acquire_timeout_secs: Option<u64>,
    /// Whether to test connections before use (default: true)
    pub test_before_acquire: Option<bool>,
}

impl PoolOptions {
    /// Get max_connections, capped at [`MAX_POOL_CONNECTIONS`].
    pub fn max_connections_or_default(&self, is_sqlite: bool) -> u32 {
        self.max_connections
            .unwrap_or(if is_sqlite {
                DEFAULT_MAX_CONNECTIONS_SQLITE
            } else {
                DEFAULT_MAX_CONNECTIONS
            })
            .min(MAX_POOL_CONNECTIONS)
    }

    /// Never exceeds the effective maximum.
    pub fn min_connections_or_default(&self, is_sqlite: bool) -> u32 {
        self.min_connections
            .unwrap_or(DEFAULT_MIN_CONNECTIONS)
            .min(self.max_connections_or_default(is_sqlite))
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs.unwrap_or(DEFAULT_IDLE_TIMEOUT_SECS))
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(
            self.acquire_timeout_secs
                .unwrap_or(DEFAULT_ACQUIRE_TIMEOUT_SECS),
        )
    }

    pub fn test_before_acquire_or_default(&self) -> bool {
        self.test_before_acquire.unwrap_or(true)
    }

    /// Validate pool options and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(max) = self.max_connections {
            if max == 0 {
                return Err("max_connections must be greater than 0".to_string());
            }
            if max > MAX_POOL_CONNECTIONS {
                return Err(format!(
                    "max_connections ({}) cannot exceed {}",
                    max, MAX_POOL_CONNECTIONS
                ));
            }
        }
        if let Some(min) = self.min_connections {
            if min == 0 {
                return Err("min_connections must be greater than 0".to_string());
            }
            if let Some(max) = self.max_connections {
                if min > max {
                    return Err(format!(
                        "min_connections ({}) cannot exceed max_connections ({})",
                        min, max
                    ));
                }
            }
        }
        if self.acquire_timeout_secs == Some(0) {
            return Err("acquire_timeout_secs must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Data source layer configuration.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "db-datasource",
    about = "Connection registry, pooling and schema discovery for SQL and document databases",
    version
)]
pub struct Config {
    /// Path of the JSON document holding connection profiles
    #[arg(long, default_value = DEFAULT_STORE_PATH, env = "DATASOURCE_STORE_PATH")]
    pub store_path: PathBuf,

    /// Maximum connections per pool (SQLite pools default to 1)
    #[arg(long, env = "DATASOURCE_MAX_CONNECTIONS")]
    pub max_connections: Option<u32>,

    /// Minimum idle connections per pool
    #[arg(long, env = "DATASOURCE_MIN_CONNECTIONS")]
    pub min_connections: Option<u32>,

    /// Seconds to wait for a pooled connection
    #[arg(
        long,
        default_value_t = DEFAULT_ACQUIRE_TIMEOUT_SECS,
        env = "DATASOURCE_ACQUIRE_TIMEOUT"
    )]
    pub acquire_timeout: u64,

    /// Seconds an idle pooled connection is kept
    #[arg(
        long,
        default_value_t = DEFAULT_IDLE_TIMEOUT_SECS,
        env = "DATASOURCE_IDLE_TIMEOUT"
    )]
    pub idle_timeout: u64,

    /// Seconds a connectivity probe may take
    #[arg(
        long,
        default_value_t = DEFAULT_PROBE_TIMEOUT_SECS,
        env = "DATASOURCE_PROBE_TIMEOUT"
    )]
    pub probe_timeout: u64,

    /// Statement timeout in seconds
    #[arg(
        long,
        default_value_t = DEFAULT_QUERY_TIMEOUT_SECS,
        env = "DATASOURCE_QUERY_TIMEOUT"
    )]
    pub query_timeout: u64,

    /// Maximum rows returned by one query
    #[arg(long, default_value_t = DEFAULT_ROW_LIMIT, env = "DATASOURCE_ROW_LIMIT")]
    pub row_limit: u32,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "DATASOURCE_LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "DATASOURCE_JSON_LOGS")]
    pub json_logs: bool,
}

impl Config {
    /// Configuration with every default, storing profiles at `store_path`.
    pub fn with_store_path(store_path: impl Into<PathBuf>) -> Self {
        Self {
            store_path: store_path.into(),
            ..Self::default()
        }
    }

    pub fn pool_options(&self) -> PoolOptions {
        PoolOptions {
            max_connections: self.max_connections,
            min_connections: self.min_connections,
            idle_timeout_secs: Some(self.idle_timeout),
            acquire_timeout_secs: Some(self.acquire_timeout),
            test_before_acquire: None,
        }
    }

    pub fn query_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.query_timeout)
    }

    pub fn probe_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.probe_timeout)
    }

    /// Reject out-of-range values before any component is built.
    pub fn validate(&self) -> DbResult<()> {
        self.pool_options().validate().map_err(DbError::validation)?;
        if self.query_timeout == 0 || self.query_timeout > MAX_QUERY_TIMEOUT_SECS {
            return Err(DbError::validation(format!(
                "query_timeout must be between 1 and {} seconds",
                MAX_QUERY_TIMEOUT_SECS
            )));
        }
        if self.probe_timeout == 0 {
            return Err(DbError::validation("probe_timeout must be greater than 0"));
        }
        if self.row_limit == 0 || self.row_limit > MAX_ROW_LIMIT {
            return Err(DbError::validation(format!(
                "row_limit must be between 1 and {}",
                MAX_ROW_LIMIT
            )));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from(DEFAULT_STORE_PATH),
            max_connections: None,
            min_connections: None,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT_SECS,
            idle_timeout: DEFAULT_IDLE_TIMEOUT_SECS,
            probe_timeout: DEFAULT_PROBE_TIMEOUT_SECS,
            query_timeout: DEFAULT_QUERY_TIMEOUT_SECS,
            row_limit: DEFAULT_ROW_LIMIT,
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}
