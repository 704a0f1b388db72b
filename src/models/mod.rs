//! Data models for the data source layer.
//!
//! This module re-exports all model types used throughout the crate.

pub mod connection;
pub mod query;
pub mod schema;

pub use connection::{
    ConnectionDraft, ConnectionParams, ConnectionProfile, ConnectionSummary, EngineType,
};
pub use query::{
    ColumnMetadata, DEFAULT_QUERY_TIMEOUT_SECS, DEFAULT_ROW_LIMIT, ExecutionFailure,
    ExecutionResult, MAX_QUERY_TIMEOUT_SECS, MAX_ROW_LIMIT, ProbeOutcome,
};
pub use schema::{
    ColumnDefinition, ForeignKey, ForeignKeyAction, IndexInfo, Relationship, SchemaInfo,
    TableSchema, ViewInfo,
};
