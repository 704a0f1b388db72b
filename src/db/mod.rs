//! Database abstraction layer.
//!
//! This module provides database access functionality:
//! - Connection pool management
//! - Read-only statement validation
//! - Query execution
//! - Schema introspection
//! - Type mappings
//! - Database dispatch macros for reducing code duplication

pub mod executor;
#[macro_use]
pub mod macros;
pub mod pool;
pub mod schema;
pub mod types;
pub mod validator;

pub use executor::QueryExecutor;
pub use pool::{DbPool, ManagedPool, MongoPool, PoolManager};
pub use schema::SchemaIntrospector;
pub use validator::{ValidatedQuery, validate_readonly};
