//! Boundary facade consumed by the embedding application.
//!
//! Everything returned from here is safe to serialize outward: profiles are
//! reduced to [`ConnectionSummary`] so passwords never cross the boundary.

use crate::config::Config;
use crate::db::pool::{ManagedPool, PoolManager};
use crate::db::schema::SchemaIntrospector;
use crate::db::executor::QueryExecutor;
use crate::db::validator::validate_readonly;
use crate::dialect::{Dialect, dialect_for};
use crate::error::DbResult;
use crate::models::{
    ConnectionDraft, ConnectionProfile, ConnectionSummary, EngineType, ExecutionResult,
    ProbeOutcome, SchemaInfo,
};
use crate::registry::{ConnectionRegistry, ProfileStore};
use std::sync::Arc;
use tracing::{debug, info};

/// Owns the registry, the pool cache and the executor for one application.
#[derive(Debug)]
pub struct DataSourceService {
    config: Config,
    registry: ConnectionRegistry,
    pools: Arc<PoolManager>,
    executor: QueryExecutor,
}

impl DataSourceService {
    /// Validate `config`, load the profile store and build an empty pool cache.
    pub async fn open(config: Config) -> DbResult<Self> {
        config.validate()?;

        let pools = Arc::new(PoolManager::new(config.pool_options()));
        let registry = ConnectionRegistry::open(
            ProfileStore::new(&config.store_path),
            Arc::clone(&pools),
            config.probe_timeout_duration(),
        )
        .await?;
        let executor = QueryExecutor::with_defaults(config.query_timeout, config.row_limit);

        info!(
            store = %config.store_path.display(),
            row_limit = executor.row_limit(),
            "Data source service ready"
        );
        Ok(Self {
            config,
            registry,
            pools,
            executor,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn pools(&self) -> &PoolManager {
        &self.pools
    }

    pub async fn list_connections(&self) -> Vec<ConnectionSummary> {
        self.registry.list().await.iter().map(|p| p.summary()).collect()
    }

    pub async fn get_default_connection(&self) -> Option<ConnectionSummary> {
        self.registry.get_default().await.map(|p| p.summary())
    }

    /// Create a connection; it is stored only if it answers a probe.
    pub async fn create_connection(&self, draft: ConnectionDraft) -> DbResult<ConnectionSummary> {
        self.registry.create(draft).await.map(|p| p.summary())
    }

    pub async fn delete_connection(&self, id: &str) -> DbResult<()> {
        self.registry.delete(id).await
    }

    pub async fn set_default_connection(&self, id: &str) -> DbResult<ConnectionSummary> {
        self.registry.set_default(id).await.map(|p| p.summary())
    }

    /// Probe a draft without persisting it.
    pub async fn test_connection(&self, draft: ConnectionDraft) -> DbResult<ProbeOutcome> {
        self.registry.test(draft).await
    }

    /// Introspect the database behind connection `id`. Rebuilt on every call.
    pub async fn discover_schema(&self, id: &str) -> DbResult<SchemaInfo> {
        let profile = self.registry.get(id).await?;
        let managed = self.pool_for(&profile).await?;
        SchemaIntrospector::discover(&managed.pool, profile.engine).await
    }

    pub fn get_dialect(&self, engine: EngineType) -> &'static Dialect {
        dialect_for(engine)
    }

    /// Validate and run a read-only statement on connection `id`.
    ///
    /// The statement is checked before any pool is acquired, so a rejected
    /// statement never opens a connection.
    pub async fn execute_query(&self, id: &str, sql: &str) -> DbResult<ExecutionResult> {
        let profile = self.registry.get(id).await?;
        let query = validate_readonly(sql, profile.engine)?;

        let managed = self.pool_for(&profile).await?;
        debug!(connection_id = %id, keyword = %query.keyword, "Running validated query");
        self.executor
            .execute_validated(&managed.pool, profile.engine, &query)
            .await
    }

    /// Acquire the pool for `profile`, evicting it again if the profile was
    /// deleted while the pool was being acquired.
    async fn pool_for(&self, profile: &ConnectionProfile) -> DbResult<Arc<ManagedPool>> {
        let managed = self.pools.acquire(profile).await?;
        if let Err(e) = self.registry.get(&profile.id).await {
            debug!(connection_id = %profile.id, "Connection deleted during acquire");
            self.pools.release(&profile.id).await;
            return Err(e);
        }
        Ok(managed)
    }

    /// Close every cached pool.
    pub async fn shutdown(&self) {
        self.pools.close_all().await;
        info!("Data source service shut down");
    }
}
