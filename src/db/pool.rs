//! Connection pool management.
//!
//! Pools are engine-specific (`PgPool`, `MySqlPool`, `SqlitePool`, a MongoDB
//! client) so every engine keeps full type support. The [`PoolManager`]
//! caches one pool per connection profile id and builds it at most once,
//! even when many callers race for the same uncached profile.

use crate::config::PoolOptions;
use crate::error::{ConnectionFailureCause, DbError, DbResult};
use crate::models::{ConnectionProfile, EngineType, ProbeOutcome};
use mongodb::bson::doc;
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions, MySqlSslMode};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{MySqlPool, PgPool, SqlitePool};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{OnceCell, RwLock};
use tokio::time::timeout;
use tracing::{debug, info, warn};

const APPLICATION_NAME: &str = "db-datasource";

/// MongoDB client bound to one database.
#[derive(Debug, Clone)]
pub struct MongoPool {
    client: mongodb::Client,
    database: String,
    closed: Arc<AtomicBool>,
}

impl MongoPool {
    pub fn client(&self) -> &mongodb::Client {
        &self.client
    }

    pub fn database_name(&self) -> &str {
        &self.database
    }

    pub fn database(&self) -> mongodb::Database {
        self.client.database(&self.database)
    }

    async fn ping(&self) -> DbResult<()> {
        self.database().run_command(doc! { "ping": 1 }).await?;
        Ok(())
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.client.clone().shutdown().await;
        }
    }
}

/// Engine-specific live handle.
#[derive(Debug, Clone)]
pub enum DbPool {
    Postgres(PgPool),
    MySql(MySqlPool),
    SQLite(SqlitePool),
    Mongo(MongoPool),
}

impl DbPool {
    pub fn engine(&self) -> EngineType {
        match self {
            DbPool::Postgres(_) => EngineType::PostgreSQL,
            DbPool::MySql(_) => EngineType::MySQL,
            DbPool::SQLite(_) => EngineType::SQLite,
            DbPool::Mongo(_) => EngineType::MongoDB,
        }
    }

    /// Close the underlying handle, waiting for checked-out connections.
    pub async fn close(&self) {
        crate::sql_dispatch!(self, p => p.close().await, Mongo(m) => m.close().await)
    }

    pub fn is_closed(&self) -> bool {
        crate::sql_dispatch!(self, p => p.is_closed(), Mongo(m) => m.closed.load(Ordering::SeqCst))
    }

    /// Run the engine's minimal liveness check.
    ///
    /// Expected failure modes (refused, auth, timeout, ...) come back as a
    /// failed [`ProbeOutcome`] rather than an error.
    pub async fn probe(&self, within: Duration) -> ProbeOutcome {
        let start = Instant::now();
        let result = timeout(within, self.ping()).await;
        let latency_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(Ok(())) => ProbeOutcome::ok(latency_ms),
            Ok(Err(e)) => {
                debug!(engine = %self.engine(), error = %e, "Probe failed");
                ProbeOutcome::from_error(&e, latency_ms)
            }
            Err(_) => ProbeOutcome::failed(
                ConnectionFailureCause::Timeout,
                format!("No response within {}s", within.as_secs()),
                latency_ms,
            ),
        }
    }

    async fn ping(&self) -> DbResult<()> {
        crate::sql_dispatch!(
            self,
            p => sqlx::query("SELECT 1").execute(p).await.map(|_| ()).map_err(DbError::from),
            Mongo(m) => m.ping().await,
        )
    }
}

/// A cached pool and the profile it was built for.
#[derive(Debug)]
pub struct ManagedPool {
    pub profile_id: String,
    pub engine: EngineType,
    pub pool: DbPool,
    pub created_at: Instant,
}

/// Lazily builds and caches one pool per profile id.
pub struct PoolManager {
    options: PoolOptions,
    /// Per-profile lazy pools. `OnceCell` gives single-flight construction.
    pools: RwLock<HashMap<String, Arc<OnceCell<Arc<ManagedPool>>>>>,
    constructed: AtomicU64,
}

impl PoolManager {
    pub fn new(options: PoolOptions) -> Self {
        Self {
            options,
            pools: RwLock::new(HashMap::new()),
            constructed: AtomicU64::new(0),
        }
    }

    pub fn options(&self) -> &PoolOptions {
        &self.options
    }

    /// Return the cached pool for `profile.id`, building it on first use.
    ///
    /// Concurrent callers for the same uncached id wait on one construction
    /// and all receive the same `Arc`.
    pub async fn acquire(&self, profile: &ConnectionProfile) -> DbResult<Arc<ManagedPool>> {
        let cell = self.cell_for(&profile.id).await;
        self.initialize(&cell, profile).await
    }

    async fn cell_for(&self, profile_id: &str) -> Arc<OnceCell<Arc<ManagedPool>>> {
        let pools = self.pools.read().await;
        if let Some(cell) = pools.get(profile_id) {
            return Arc::clone(cell);
        }
        drop(pools);

        let mut pools = self.pools.write().await;
        // Another caller may have inserted while we waited for the write lock
        Arc::clone(
            pools
                .entry(profile_id.to_string())
                .or_insert_with(|| Arc::new(OnceCell::new())),
        )
    }

    /// Build the pool behind `cell` once, then confirm the cell is still the
    /// one cached for the profile. A pool whose cell was released meanwhile
    /// is closed instead of handed out.
    async fn initialize(
        &self,
        cell: &Arc<OnceCell<Arc<ManagedPool>>>,
        profile: &ConnectionProfile,
    ) -> DbResult<Arc<ManagedPool>> {
        let managed = cell
            .get_or_try_init(|| async {
                let pool = self.build(profile).await?;
                self.constructed.fetch_add(1, Ordering::SeqCst);
                info!(
                    connection_id = %profile.id,
                    engine = %profile.engine,
                    "Created connection pool"
                );
                Ok::<_, DbError>(Arc::new(ManagedPool {
                    profile_id: profile.id.clone(),
                    engine: profile.engine,
                    pool,
                    created_at: Instant::now(),
                }))
            })
            .await?;

        let registered = {
            let pools = self.pools.read().await;
            pools
                .get(&profile.id)
                .is_some_and(|current| Arc::ptr_eq(current, cell))
        };
        if !registered {
            warn!(connection_id = %profile.id, "Pool released while it was being built, closing");
            managed.pool.close().await;
            return Err(DbError::not_found(&profile.id));
        }

        Ok(Arc::clone(managed))
    }

    /// Close and evict the pool for `profile_id`. No-op if none is cached.
    pub async fn release(&self, profile_id: &str) {
        // Remove under lock, close outside it
        let removed = {
            let mut pools = self.pools.write().await;
            pools.remove(profile_id)
        };

        if let Some(managed) = removed.as_ref().and_then(|cell| cell.get()) {
            info!(connection_id = %profile_id, "Closing connection pool");
            managed.pool.close().await;
        }
    }

    /// Close every cached pool.
    pub async fn close_all(&self) {
        let drained: Vec<_> = {
            let mut pools = self.pools.write().await;
            pools.drain().collect()
        };

        for (id, cell) in drained {
            if let Some(managed) = cell.get() {
                info!(connection_id = %id, "Closing connection pool");
                managed.pool.close().await;
            }
        }
    }

    /// True if a constructed pool is cached for `profile_id`.
    pub async fn is_cached(&self, profile_id: &str) -> bool {
        let pools = self.pools.read().await;
        pools
            .get(profile_id)
            .is_some_and(|cell| cell.initialized())
    }

    pub async fn pool_count(&self) -> usize {
        let pools = self.pools.read().await;
        pools.values().filter(|cell| cell.initialized()).count()
    }

    /// Number of pools this manager has constructed over its lifetime.
    pub fn pools_created(&self) -> u64 {
        self.constructed.load(Ordering::SeqCst)
    }

    /// Build a throwaway pool, probe it and close it again.
    ///
    /// Validation and unsupported-engine errors propagate; connectivity
    /// failures become a failed outcome.
    pub async fn probe_profile(
        &self,
        profile: &ConnectionProfile,
        within: Duration,
    ) -> DbResult<ProbeOutcome> {
        let start = Instant::now();
        let pool = match timeout(within, self.build(profile)).await {
            Ok(Ok(pool)) => pool,
            Ok(Err(e @ (DbError::ConnectionTest { .. } | DbError::Timeout { .. }))) => {
                return Ok(ProbeOutcome::from_error(
                    &e,
                    start.elapsed().as_millis() as u64,
                ));
            }
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Ok(ProbeOutcome::failed(
                    ConnectionFailureCause::Timeout,
                    format!("Could not connect within {}s", within.as_secs()),
                    start.elapsed().as_millis() as u64,
                ));
            }
        };

        let remaining = within.saturating_sub(start.elapsed()).max(Duration::from_secs(1));
        let mut outcome = pool.probe(remaining).await;
        outcome.latency_ms = start.elapsed().as_millis() as u64;
        pool.close().await;
        Ok(outcome)
    }

    /// Build an uncached pool for `profile`.
    pub async fn build(&self, profile: &ConnectionProfile) -> DbResult<DbPool> {
        profile.params.validate_for(profile.engine)?;

        debug!(
            connection_id = %profile.id,
            engine = %profile.engine,
            "Building connection pool"
        );

        match profile.engine {
            EngineType::PostgreSQL => postgres::connect(profile, &self.options).await,
            EngineType::MySQL => mysql::connect(profile, &self.options).await,
            EngineType::SQLite => sqlite::connect(profile, &self.options).await,
            EngineType::MongoDB => mongo::connect(profile, &self.options).await,
            engine @ (EngineType::MsSql
            | EngineType::Oracle
            | EngineType::Snowflake
            | EngineType::BigQuery
            | EngineType::ClickHouse) => {
                warn!(connection_id = %profile.id, engine = %engine, "No driver for engine");
                Err(DbError::unsupported(engine, "connection pooling"))
            }
        }
    }
}

impl Default for PoolManager {
    fn default() -> Self {
        Self::new(PoolOptions::default())
    }
}

impl std::fmt::Debug for PoolManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolManager")
            .field("options", &self.options)
            .field("pools_created", &self.pools_created())
            .finish_non_exhaustive()
    }
}

/// Required text field or a `Validation` error naming it.
fn required<'a>(value: &'a Option<String>, field: &str, engine: EngineType) -> DbResult<&'a str> {
    value
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| DbError::validation(format!("{engine} connections require {field}")))
}

/// Turn a connect-time driver error into a classified `ConnectionTest` error.
fn connect_error(engine: EngineType, err: sqlx::Error) -> DbError {
    match DbError::from(err) {
        e @ DbError::ConnectionTest { .. } => e,
        e @ DbError::Validation { .. } => e,
        other => {
            let message = other.to_string();
            warn!(engine = %engine, error = %message, "Failed to connect");
            DbError::connection_test(ConnectionFailureCause::classify(&message), message)
        }
    }
}

// =============================================================================
// Engine-specific constructors
// =============================================================================

mod postgres {
    use super::*;

    pub async fn connect(profile: &ConnectionProfile, opts: &PoolOptions) -> DbResult<DbPool> {
        let params = &profile.params;
        let engine = profile.engine;

        let mut options = PgConnectOptions::new()
            .host(required(&params.host, "host", engine)?)
            .database(required(&params.database, "database", engine)?)
            .username(required(&params.username, "username", engine)?)
            .application_name(APPLICATION_NAME)
            .ssl_mode(if params.ssl {
                PgSslMode::Require
            } else {
                PgSslMode::Prefer
            });
        if let Some(port) = params.port_or_default(engine) {
            options = options.port(port);
        }
        if let Some(password) = &params.password {
            options = options.password(password);
        }

        let pool = PgPoolOptions::new()
            .min_connections(opts.min_connections_or_default(false))
            .max_connections(opts.max_connections_or_default(false))
            .acquire_timeout(opts.acquire_timeout())
            .idle_timeout(Some(opts.idle_timeout()))
            .test_before_acquire(opts.test_before_acquire_or_default())
            .connect_with(options)
            .await
            .map_err(|e| connect_error(engine, e))?;
        Ok(DbPool::Postgres(pool))
    }
}

mod mysql {
    use super::*;

    pub async fn connect(profile: &ConnectionProfile, opts: &PoolOptions) -> DbResult<DbPool> {
        let params = &profile.params;
        let engine = profile.engine;

        let mut options = MySqlConnectOptions::new()
            .host(required(&params.host, "host", engine)?)
            .database(required(&params.database, "database", engine)?)
            .username(required(&params.username, "username", engine)?)
            .charset("utf8mb4")
            .ssl_mode(if params.ssl {
                MySqlSslMode::Required
            } else {
                MySqlSslMode::Preferred
            });
        if let Some(port) = params.port_or_default(engine) {
            options = options.port(port);
        }
        if let Some(password) = &params.password {
            options = options.password(password);
        }

        let pool = MySqlPoolOptions::new()
            .min_connections(opts.min_connections_or_default(false))
            .max_connections(opts.max_connections_or_default(false))
            .acquire_timeout(opts.acquire_timeout())
            .idle_timeout(Some(opts.idle_timeout()))
            .test_before_acquire(opts.test_before_acquire_or_default())
            .connect_with(options)
            .await
            .map_err(|e| connect_error(engine, e))?;
        Ok(DbPool::MySql(pool))
    }
}

mod sqlite {
    use super::*;

    pub async fn connect(profile: &ConnectionProfile, opts: &PoolOptions) -> DbResult<DbPool> {
        let path = profile
            .params
            .file_path
            .as_ref()
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or_else(|| DbError::validation("SQLite connections require file_path"))?;

        // Never create the file; a missing database is a connection failure
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(false)
            .read_only(true);

        let pool = SqlitePoolOptions::new()
            .min_connections(opts.min_connections_or_default(true))
            .max_connections(opts.max_connections_or_default(true))
            .acquire_timeout(opts.acquire_timeout())
            .idle_timeout(Some(opts.idle_timeout()))
            .test_before_acquire(opts.test_before_acquire_or_default())
            .connect_with(options)
            .await
            .map_err(|e| connect_error(profile.engine, e))?;
        Ok(DbPool::SQLite(pool))
    }
}

mod mongo {
    use super::*;
    use mongodb::options::ClientOptions;
    use url::Url;

    /// Build a `mongodb://` URI with credentials percent-encoded.
    pub fn connection_uri(profile: &ConnectionProfile) -> DbResult<Url> {
        let params = &profile.params;
        let engine = profile.engine;
        let host = required(&params.host, "host", engine)?;
        let database = required(&params.database, "database", engine)?;
        let port = params.port_or_default(engine).unwrap_or(27017);

        let mut uri = Url::parse(&format!("mongodb://{host}:{port}/"))
            .map_err(|e| DbError::validation(format!("Invalid MongoDB host '{host}': {e}")))?;
        uri.set_path(database);

        if let Some(username) = params.username.as_deref().filter(|u| !u.is_empty()) {
            uri.set_username(username)
                .map_err(|_| DbError::validation("Invalid MongoDB username"))?;
            uri.set_password(params.password.as_deref())
                .map_err(|_| DbError::validation("Invalid MongoDB password"))?;
        }
        if params.ssl {
            uri.query_pairs_mut().append_pair("tls", "true");
        }
        Ok(uri)
    }

    pub async fn connect(profile: &ConnectionProfile, opts: &PoolOptions) -> DbResult<DbPool> {
        let uri = connection_uri(profile)?;
        let mut options = ClientOptions::parse(uri.as_str()).await?;
        options.app_name = Some(APPLICATION_NAME.to_string());
        options.max_pool_size = Some(opts.max_connections_or_default(false));
        options.min_pool_size = Some(opts.min_connections_or_default(false));
        options.connect_timeout = Some(opts.acquire_timeout());
        options.server_selection_timeout = Some(opts.acquire_timeout());
        options.max_idle_time = Some(opts.idle_timeout());

        let client = mongodb::Client::with_options(options)?;
        let database = uri.path().trim_start_matches('/').to_string();
        Ok(DbPool::Mongo(MongoPool {
            client,
            database,
            closed: Arc::new(AtomicBool::new(false)),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ConnectionDraft;

    #[tokio::test]
    async fn test_empty_manager() {
        let manager = PoolManager::default();
        assert_eq!(manager.pool_count().await, 0);
        assert_eq!(manager.pools_created(), 0);
        assert!(!manager.is_cached("nope").await);
    }

    #[tokio::test]
    async fn test_pool_released_during_build_is_closed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("race.db");
        let writer = SqlitePool::connect_with(
            SqliteConnectOptions::new().filename(&path).create_if_missing(true),
        )
        .await
        .unwrap();
        sqlx::query("PRAGMA user_version = 1").execute(&writer).await.unwrap();
        writer.close().await;

        let manager = PoolManager::default();
        let profile = ConnectionDraft::sqlite("race", &path).into_profile();

        // A release lands between cell registration and construction
        let cell = manager.cell_for(&profile.id).await;
        manager.release(&profile.id).await;
        let err = manager.initialize(&cell, &profile).await.unwrap_err();

        assert!(matches!(err, DbError::NotFound { .. }));
        assert!(cell.get().unwrap().pool.is_closed());
        assert!(!manager.is_cached(&profile.id).await);
        assert_eq!(manager.pool_count().await, 0);

        let fresh = manager.acquire(&profile).await.unwrap();
        assert!(!fresh.pool.is_closed());
        assert!(!Arc::ptr_eq(&fresh, cell.get().unwrap()));
        assert_eq!(manager.pools_created(), 2);
    }

    #[tokio::test]
    async fn test_release_unknown_is_noop() {
        let manager = PoolManager::default();
        manager.release("missing").await;
        manager.release("missing").await;
        assert_eq!(manager.pool_count().await, 0);
    }

    #[tokio::test]
    async fn test_unsupported_engine_fails_fast() {
        let manager = PoolManager::default();
        let mut draft = ConnectionDraft::new("wh", EngineType::Snowflake);
        draft.params.account = Some("acme".into());
        draft.params.warehouse = Some("WH".into());
        draft.params.username = Some("u".into());
        let profile = draft.into_profile();

        let err = manager.acquire(&profile).await.unwrap_err();
        assert!(matches!(err, DbError::UnsupportedEngine { .. }));
        assert_eq!(manager.pools_created(), 0);
    }

    #[tokio::test]
    async fn test_missing_required_field_is_validation_error() {
        let manager = PoolManager::default();
        let profile = ConnectionDraft::new("pg", EngineType::PostgreSQL)
            .with_host("localhost")
            .into_profile();
        let err = manager.build(&profile).await.unwrap_err();
        assert!(matches!(err, DbError::Validation { .. }));
    }

    #[test]
    fn test_mongo_uri_encodes_credentials() {
        let profile = ConnectionDraft::new("docs", EngineType::MongoDB)
            .with_host("mongo.internal")
            .with_database("app")
            .with_credentials("svc", "p@ss/word")
            .with_ssl(true)
            .into_profile();
        let uri = mongo::connection_uri(&profile).unwrap();
        assert_eq!(uri.scheme(), "mongodb");
        assert_eq!(uri.port(), Some(27017));
        assert_eq!(uri.path(), "/app");
        assert_eq!(uri.username(), "svc");
        assert_ne!(uri.password(), Some("p@ss/word"));
        assert!(uri.as_str().contains("tls=true"));
    }
}
