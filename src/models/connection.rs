//! Connection profile models.
//!
//! A [`ConnectionProfile`] is what the registry persists. A
//! [`ConnectionSummary`] is what leaves the component boundary: it never
//! carries the password.

use crate::error::{DbError, DbResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// Supported database engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineType {
    PostgreSQL,
    /// Includes MariaDB
    MySQL,
    SQLite,
    MsSql,
    Oracle,
    Snowflake,
    BigQuery,
    ClickHouse,
    MongoDB,
}

impl EngineType {
    pub const ALL: [EngineType; 9] = [
        Self::PostgreSQL,
        Self::MySQL,
        Self::SQLite,
        Self::MsSql,
        Self::Oracle,
        Self::Snowflake,
        Self::BigQuery,
        Self::ClickHouse,
        Self::MongoDB,
    ];

    /// Get the display name for this engine.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::PostgreSQL => "PostgreSQL",
            Self::MySQL => "MySQL",
            Self::SQLite => "SQLite",
            Self::MsSql => "SQL Server",
            Self::Oracle => "Oracle",
            Self::Snowflake => "Snowflake",
            Self::BigQuery => "BigQuery",
            Self::ClickHouse => "ClickHouse",
            Self::MongoDB => "MongoDB",
        }
    }

    /// Get the default port for this engine.
    pub fn default_port(&self) -> Option<u16> {
        match self {
            Self::PostgreSQL => Some(5432),
            Self::MySQL => Some(3306),
            Self::MsSql => Some(1433),
            Self::Oracle => Some(1521),
            Self::ClickHouse => Some(8123),
            Self::MongoDB => Some(27017),
            Self::SQLite | Self::Snowflake | Self::BigQuery => None,
        }
    }

    pub fn is_file_based(&self) -> bool {
        matches!(self, Self::SQLite)
    }

    pub fn is_document_store(&self) -> bool {
        matches!(self, Self::MongoDB)
    }

    /// Leading keywords the read-only gate accepts for this engine.
    pub fn accepted_leading_keywords(&self) -> &'static [&'static str] {
        match self {
            Self::SQLite => &["SELECT", "WITH", "EXPLAIN"],
            Self::PostgreSQL => &["SELECT", "WITH", "SHOW", "EXPLAIN"],
            _ => &["SELECT", "WITH", "SHOW", "EXPLAIN", "DESCRIBE", "DESC"],
        }
    }
}

impl std::fmt::Display for EngineType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl FromStr for EngineType {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "postgresql" | "postgres" | "pg" => Ok(Self::PostgreSQL),
            "mysql" | "mariadb" => Ok(Self::MySQL),
            "sqlite" | "sqlite3" => Ok(Self::SQLite),
            "mssql" | "sqlserver" | "sql server" => Ok(Self::MsSql),
            "oracle" => Ok(Self::Oracle),
            "snowflake" => Ok(Self::Snowflake),
            "bigquery" => Ok(Self::BigQuery),
            "clickhouse" => Ok(Self::ClickHouse),
            "mongodb" | "mongo" => Ok(Self::MongoDB),
            other => Err(DbError::validation(format!("Unknown engine type: {other}"))),
        }
    }
}

/// Engine-specific connection fields. Which ones are required depends on
/// the engine; see [`ConnectionParams::validate_for`].
#[derive(Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectionParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Contains sensitive data - never log
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Embedded engines only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warehouse: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset: Option<String>,
    #[serde(default)]
    pub ssl: bool,
}

impl std::fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionParams")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "****"))
            .field("file_path", &self.file_path)
            .field("account", &self.account)
            .field("warehouse", &self.warehouse)
            .field("project", &self.project)
            .field("dataset", &self.dataset)
            .field("ssl", &self.ssl)
            .finish()
    }
}

fn present(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

impl ConnectionParams {
    /// Check that every field the engine needs is present.
    pub fn validate_for(&self, engine: EngineType) -> DbResult<()> {
        let mut missing: Vec<&'static str> = Vec::new();
        let mut require = |name: &'static str, ok: bool| {
            if !ok {
                missing.push(name);
            }
        };

        match engine {
            EngineType::SQLite => require(
                "file_path",
                self.file_path
                    .as_ref()
                    .is_some_and(|p| !p.as_os_str().is_empty()),
            ),
            EngineType::PostgreSQL | EngineType::MySQL | EngineType::MsSql | EngineType::Oracle => {
                require("host", present(&self.host));
                require("database", present(&self.database));
                require("username", present(&self.username));
            }
            EngineType::ClickHouse => require("host", present(&self.host)),
            EngineType::Snowflake => {
                require("account", present(&self.account));
                require("warehouse", present(&self.warehouse));
                require("username", present(&self.username));
            }
            EngineType::BigQuery => {
                require("project", present(&self.project));
                require("dataset", present(&self.dataset));
            }
            EngineType::MongoDB => {
                require("host", present(&self.host));
                require("database", present(&self.database));
            }
        }

        if !missing.is_empty() {
            return Err(DbError::validation(format!(
                "{} connections require: {}",
                engine,
                missing.join(", ")
            )));
        }
        if self.port == Some(0) {
            return Err(DbError::validation("Port must be between 1 and 65535"));
        }
        Ok(())
    }

    /// Port to connect to, falling back to the engine default.
    pub fn port_or_default(&self, engine: EngineType) -> Option<u16> {
        self.port.or(engine.default_port())
    }
}

/// Input for creating or testing a connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionDraft {
    pub name: String,
    pub engine: EngineType,
    #[serde(flatten)]
    pub params: ConnectionParams,
    #[serde(default)]
    pub is_default: bool,
}

impl ConnectionDraft {
    pub fn new(name: impl Into<String>, engine: EngineType) -> Self {
        Self {
            name: name.into(),
            engine,
            params: ConnectionParams::default(),
            is_default: false,
        }
    }

    /// Draft for an embedded, file-based database.
    pub fn sqlite(name: impl Into<String>, file_path: impl Into<PathBuf>) -> Self {
        let mut draft = Self::new(name, EngineType::SQLite);
        draft.params.file_path = Some(file_path.into());
        draft
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.params.host = Some(host.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.params.port = Some(port);
        self
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.params.database = Some(database.into());
        self
    }

    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.params.username = Some(username.into());
        self.params.password = Some(password.into());
        self
    }

    pub fn with_ssl(mut self, ssl: bool) -> Self {
        self.params.ssl = ssl;
        self
    }

    pub fn with_default(mut self, is_default: bool) -> Self {
        self.is_default = is_default;
        self
    }

    /// Validate name and engine-specific required fields.
    pub fn validate(&self) -> DbResult<()> {
        if self.name.trim().is_empty() {
            return Err(DbError::validation("Connection name cannot be empty"));
        }
        self.params.validate_for(self.engine)
    }

    /// Materialise a profile with a fresh id and timestamps.
    pub fn into_profile(self) -> ConnectionProfile {
        let now = Utc::now();
        ConnectionProfile {
            id: uuid::Uuid::new_v4().to_string(),
            name: self.name,
            engine: self.engine,
            params: self.params,
            is_default: self.is_default,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A persisted description of how to reach one database instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionProfile {
    pub id: String,
    pub name: String,
    pub engine: EngineType,
    #[serde(flatten)]
    pub params: ConnectionParams,
    #[serde(default)]
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConnectionProfile {
    /// Redacted view for the component boundary.
    pub fn summary(&self) -> ConnectionSummary {
        ConnectionSummary::from(self)
    }
}

/// Connection information returned across the boundary (no secrets exposed).
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionSummary {
    pub id: String,
    pub name: String,
    pub engine: EngineType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warehouse: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dataset: Option<String>,
    pub ssl: bool,
    pub has_password: bool,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&ConnectionProfile> for ConnectionSummary {
    fn from(profile: &ConnectionProfile) -> Self {
        let p = &profile.params;
        Self {
            id: profile.id.clone(),
            name: profile.name.clone(),
            engine: profile.engine,
            host: p.host.clone(),
            port: p.port,
            database: p.database.clone(),
            username: p.username.clone(),
            file_path: p.file_path.clone(),
            account: p.account.clone(),
            warehouse: p.warehouse.clone(),
            project: p.project.clone(),
            dataset: p.dataset.clone(),
            ssl: p.ssl,
            has_password: p.password.is_some(),
            is_default: profile.is_default,
            created_at: profile.created_at,
            updated_at: profile.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_type_from_str() {
        assert_eq!("postgres".parse::<EngineType>().unwrap(), EngineType::PostgreSQL);
        assert_eq!("MariaDB".parse::<EngineType>().unwrap(), EngineType::MySQL);
        assert_eq!("sqlserver".parse::<EngineType>().unwrap(), EngineType::MsSql);
        assert_eq!("mongo".parse::<EngineType>().unwrap(), EngineType::MongoDB);
        assert!(matches!(
            "cassandra".parse::<EngineType>(),
            Err(DbError::Validation { .. })
        ));
    }

    #[test]
    fn test_engine_type_serde_lowercase() {
        let json = serde_json::to_string(&EngineType::ClickHouse).unwrap();
        assert_eq!(json, "\"clickhouse\"");
        let parsed: EngineType = serde_json::from_str("\"bigquery\"").unwrap();
        assert_eq!(parsed, EngineType::BigQuery);
    }

    #[test]
    fn test_sqlite_requires_file_path() {
        let draft = ConnectionDraft::new("local", EngineType::SQLite);
        let err = draft.validate().unwrap_err();
        assert!(matches!(err, DbError::Validation { .. }));
        assert!(err.to_string().contains("file_path"));
    }

    #[test]
    fn test_snowflake_requires_account_and_warehouse() {
        let mut draft = ConnectionDraft::new("wh", EngineType::Snowflake);
        draft.params.username = Some("analyst".into());
        let err = draft.validate().unwrap_err();
        let message = err.to_string();
        assert!(message.contains("account"));
        assert!(message.contains("warehouse"));

        draft.params.account = Some("acme-xy123".into());
        draft.params.warehouse = Some("COMPUTE_WH".into());
        assert!(draft.validate().is_ok());
    }

    #[test]
    fn test_postgres_requires_host_database_user() {
        let draft = ConnectionDraft::new("pg", EngineType::PostgreSQL).with_host("db.internal");
        let err = draft.validate().unwrap_err();
        assert!(err.to_string().contains("database"));
        assert!(err.to_string().contains("username"));
    }

    #[test]
    fn test_empty_name_rejected() {
        let draft = ConnectionDraft::sqlite("   ", "/tmp/x.db");
        assert!(matches!(draft.validate(), Err(DbError::Validation { .. })));
    }

    #[test]
    fn test_zero_port_rejected() {
        let draft = ConnectionDraft::new("pg", EngineType::PostgreSQL)
            .with_host("h")
            .with_database("d")
            .with_credentials("u", "p")
            .with_port(0);
        assert!(matches!(draft.validate(), Err(DbError::Validation { .. })));
    }

    #[test]
    fn test_summary_never_contains_password() {
        let profile = ConnectionDraft::new("pg", EngineType::PostgreSQL)
            .with_host("localhost")
            .with_database("app")
            .with_credentials("app", "hunter2")
            .into_profile();

        let json = serde_json::to_string(&profile.summary()).unwrap();
        assert!(!json.contains("hunter2"));
        assert!(json.contains("\"has_password\":true"));
    }

    #[test]
    fn test_params_debug_redacts_password() {
        let mut params = ConnectionParams::default();
        params.password = Some("hunter2".into());
        let debug = format!("{:?}", params);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("****"));
    }

    #[test]
    fn test_profile_roundtrip_keeps_flattened_params() {
        let profile = ConnectionDraft::sqlite("local", "/data/app.db")
            .with_default(true)
            .into_profile();
        let json = serde_json::to_value(&profile).unwrap();
        assert_eq!(json["file_path"], "/data/app.db");
        assert_eq!(json["engine"], "sqlite");

        let back: ConnectionProfile = serde_json::from_value(json).unwrap();
        assert_eq!(back.id, profile.id);
        assert!(back.is_default);
        assert_eq!(back.params, profile.params);
    }
}
