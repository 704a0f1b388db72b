//! Database connection and schema abstraction layer.
//!
//! Stores connection profiles, caches one pool per profile, introspects
//! schemas into one normalized shape and runs validated read-only SQL
//! against PostgreSQL, MySQL and SQLite. MongoDB is supported for probing
//! and schema discovery.

pub mod config;
pub mod db;
pub mod dialect;
pub mod error;
pub mod models;
pub mod registry;
pub mod service;
pub mod telemetry;

pub use config::Config;
pub use error::{DbError, DbResult};
pub use service::DataSourceService;
