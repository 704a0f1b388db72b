//! End-to-end tests against real SQLite database files.
//!
//! Each test gets its own directory holding the profile document and the
//! database file. Tables are created through a separate writable connection
//! since the service only ever opens databases read-only.

use db_datasource::models::{ConnectionDraft, EngineType};
use db_datasource::{Config, DataSourceService, DbError};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

struct Fixture {
    _dir: TempDir,
    db_path: PathBuf,
    store_path: PathBuf,
    writer: SqlitePool,
}

impl Fixture {
    async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("app.db");
        let store_path = dir.path().join("connections.json");
        let writer = writable_pool(&db_path).await;
        Self {
            _dir: dir,
            db_path,
            store_path,
            writer,
        }
    }

    async fn exec(&self, sql: &str) {
        sqlx::query(sql).execute(&self.writer).await.unwrap();
    }

    async fn service(&self) -> DataSourceService {
        DataSourceService::open(Config::with_store_path(&self.store_path))
            .await
            .unwrap()
    }
}

async fn writable_pool(path: &Path) -> SqlitePool {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .unwrap();
    // Materialise the file so read-only opens succeed
    sqlx::query("PRAGMA user_version = 1")
        .execute(&pool)
        .await
        .unwrap();
    pool
}

async fn create_sqlite(service: &DataSourceService, fixture: &Fixture) -> String {
    service
        .create_connection(ConnectionDraft::sqlite("local", &fixture.db_path))
        .await
        .unwrap()
        .id
}

#[tokio::test]
async fn test_empty_database_then_one_table() {
    let fixture = Fixture::new().await;
    let service = fixture.service().await;
    let id = create_sqlite(&service, &fixture).await;

    let schema = service.discover_schema(&id).await.unwrap();
    assert_eq!(schema.engine, EngineType::SQLite);
    assert!(schema.tables.is_empty());
    assert!(schema.relationships.is_empty());

    let json = serde_json::to_value(&schema).unwrap();
    assert_eq!(json["tables"], serde_json::json!({}));
    assert_eq!(json["relationships"], serde_json::json!([]));

    fixture
        .exec("CREATE TABLE items (id INTEGER PRIMARY KEY, label TEXT NOT NULL)")
        .await;

    let schema = service.discover_schema(&id).await.unwrap();
    assert_eq!(schema.tables.len(), 1);
    let items = schema.table("items").unwrap();
    let columns: Vec<&str> = items.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(columns, vec!["id", "label"]);
    assert_eq!(items.primary_keys, vec!["id".to_string()]);
    assert!(items.columns[0].is_primary_key);
    assert!(!items.columns[1].nullable);
    assert_eq!(items.row_count, Some(0));
}

#[tokio::test]
async fn test_foreign_keys_become_relationships() {
    let fixture = Fixture::new().await;
    fixture
        .exec("CREATE TABLE users (id INTEGER PRIMARY KEY, email VARCHAR(120) UNIQUE)")
        .await;
    fixture
        .exec(
            "CREATE TABLE orders (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                total DECIMAL(10, 2) DEFAULT 0
            )",
        )
        .await;
    fixture.exec("CREATE INDEX idx_orders_user ON orders(user_id)").await;
    fixture
        .exec("CREATE VIEW big_orders AS SELECT * FROM orders WHERE total > 100")
        .await;
    fixture.exec("INSERT INTO users (id, email) VALUES (1, 'a@b.c')").await;
    fixture
        .exec("INSERT INTO orders (user_id, total) VALUES (1, 5), (1, 250)")
        .await;

    let service = fixture.service().await;
    let id = create_sqlite(&service, &fixture).await;
    let schema = service.discover_schema(&id).await.unwrap();

    assert_eq!(schema.relationships.len(), 1);
    let rel = &schema.relationships[0];
    assert_eq!(rel.table, "orders");
    assert_eq!(rel.column, "user_id");
    assert_eq!(rel.referenced_table, "users");
    assert_eq!(rel.referenced_column, "id");

    let orders = schema.table("orders").unwrap();
    assert!(orders.column("user_id").unwrap().is_foreign_key);
    assert_eq!(orders.row_count, Some(2));
    let total = orders.column("total").unwrap();
    assert_eq!(total.numeric_precision, Some(10));
    assert_eq!(total.numeric_scale, Some(2));
    assert_eq!(total.default_value.as_deref(), Some("0"));
    assert!(orders.indexes.iter().any(|i| i.name == "idx_orders_user" && !i.is_unique));

    let users = schema.table("users").unwrap();
    assert_eq!(users.column("email").unwrap().max_length, Some(120));
    assert!(users.indexes.iter().any(|i| i.is_unique && i.columns == vec!["email"]));

    assert!(schema.views.iter().any(|v| v.name == "big_orders"));
}

#[tokio::test]
async fn test_reference_without_column_targets_parent_key() {
    let fixture = Fixture::new().await;
    fixture
        .exec("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)")
        .await;
    fixture
        .exec("CREATE TABLE orders (id INTEGER PRIMARY KEY, user_id INTEGER REFERENCES users)")
        .await;
    fixture
        .exec("CREATE TABLE regions (country TEXT, code TEXT, PRIMARY KEY (country, code))")
        .await;
    fixture
        .exec(
            "CREATE TABLE stores (
                id INTEGER PRIMARY KEY,
                country TEXT,
                code TEXT,
                FOREIGN KEY (country, code) REFERENCES regions
            )",
        )
        .await;

    let service = fixture.service().await;
    let id = create_sqlite(&service, &fixture).await;
    let schema = service.discover_schema(&id).await.unwrap();

    let orders = schema.table("orders").unwrap();
    assert_eq!(orders.foreign_keys.len(), 1);
    assert_eq!(orders.foreign_keys[0].references_column, "id");
    assert!(orders.column("user_id").unwrap().is_foreign_key);

    let stores = schema.table("stores").unwrap();
    let targets: Vec<(&str, &str)> = stores
        .foreign_keys
        .iter()
        .map(|fk| (fk.column.as_str(), fk.references_column.as_str()))
        .collect();
    assert_eq!(targets, vec![("country", "country"), ("code", "code")]);

    let pairs: Vec<(&str, &str, &str, &str)> = schema
        .relationships
        .iter()
        .map(|r| {
            (
                r.table.as_str(),
                r.column.as_str(),
                r.referenced_table.as_str(),
                r.referenced_column.as_str(),
            )
        })
        .collect();
    assert_eq!(pairs.len(), 3);
    assert!(pairs.contains(&("orders", "user_id", "users", "id")));
    assert!(pairs.contains(&("stores", "country", "regions", "country")));
    assert!(pairs.contains(&("stores", "code", "regions", "code")));
}

#[tokio::test]
async fn test_execute_select_returns_rows() {
    let fixture = Fixture::new().await;
    fixture
        .exec("CREATE TABLE items (id INTEGER PRIMARY KEY, label TEXT, price REAL)")
        .await;
    fixture
        .exec("INSERT INTO items (label, price) VALUES ('a', 1.5), ('b', NULL)")
        .await;

    let service = fixture.service().await;
    let id = create_sqlite(&service, &fixture).await;

    let result = service
        .execute_query(&id, "SELECT id, label, price FROM items ORDER BY id")
        .await
        .unwrap();
    assert!(result.is_success());
    assert_eq!(result.row_count, 2);
    assert!(!result.truncated);
    let names: Vec<&str> = result.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["id", "label", "price"]);
    assert_eq!(result.rows[0]["id"], 1);
    assert_eq!(result.rows[0]["label"], "a");
    assert_eq!(result.rows[0]["price"], 1.5);
    assert!(result.rows[1]["price"].is_null());
}

#[tokio::test]
async fn test_execution_failure_is_structured() {
    let fixture = Fixture::new().await;
    let service = fixture.service().await;
    let id = create_sqlite(&service, &fixture).await;

    let result = service
        .execute_query(&id, "SELECT * FROM missing_table")
        .await
        .unwrap();
    let failure = result.error.expect("driver failure is reported in the result");
    assert_eq!(
        failure.kind,
        db_datasource::error::ExecutionErrorKind::MissingObject
    );
    assert!(result.rows.is_empty());
}

#[tokio::test]
async fn test_row_limit_truncates() {
    let fixture = Fixture::new().await;
    fixture.exec("CREATE TABLE n (v INTEGER)").await;
    fixture.exec("INSERT INTO n VALUES (1), (2), (3)").await;

    let mut config = Config::with_store_path(&fixture.store_path);
    config.row_limit = 2;
    let service = DataSourceService::open(config).await.unwrap();
    let id = create_sqlite(&service, &fixture).await;

    let result = service.execute_query(&id, "SELECT v FROM n").await.unwrap();
    assert_eq!(result.row_count, 2);
    assert!(result.truncated);
    assert!(result.hints.iter().any(|h| h.contains("LIMIT 2")));
}

#[tokio::test]
async fn test_multi_statement_rejected_without_side_effect() {
    let fixture = Fixture::new().await;
    fixture.exec("CREATE TABLE x (id INTEGER)").await;

    let service = fixture.service().await;
    let id = create_sqlite(&service, &fixture).await;

    let err = service
        .execute_query(&id, "SELECT 1; DROP TABLE x;")
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::SecurityValidation { .. }));
    assert_eq!(err.category(), "security_validation_error");
    // Rejected before a pool was ever built
    assert!(!service.pools().is_cached(&id).await);

    let schema = service.discover_schema(&id).await.unwrap();
    assert!(schema.table("x").is_some());
}

#[tokio::test]
async fn test_commented_delete_rejected() {
    let fixture = Fixture::new().await;
    fixture.exec("CREATE TABLE t (id INTEGER)").await;
    fixture.exec("INSERT INTO t VALUES (1)").await;

    let service = fixture.service().await;
    let id = create_sqlite(&service, &fixture).await;

    let err = service
        .execute_query(&id, "-- comment\n   DELETE FROM t")
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::SecurityValidation { .. }));

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM t")
        .fetch_one(&fixture.writer)
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn test_delete_evicts_cached_pool() {
    let fixture = Fixture::new().await;
    let service = fixture.service().await;
    let id = create_sqlite(&service, &fixture).await;
    let profile = service.registry().get(&id).await.unwrap();

    service.discover_schema(&id).await.unwrap();
    let first = service.pools().acquire(&profile).await.unwrap();
    assert_eq!(service.pools().pools_created(), 1);

    service.delete_connection(&id).await.unwrap();
    assert!(!service.pools().is_cached(&id).await);
    assert!(first.pool.is_closed());
    assert!(matches!(
        service.discover_schema(&id).await,
        Err(DbError::NotFound { .. })
    ));

    let second = service.pools().acquire(&profile).await.unwrap();
    assert_eq!(service.pools().pools_created(), 2);
    assert!(!std::sync::Arc::ptr_eq(&first, &second));
    assert!(!second.pool.is_closed());
}

#[tokio::test]
async fn test_boundary_never_exposes_password() {
    let fixture = Fixture::new().await;
    let service = fixture.service().await;

    let summary = service
        .create_connection(
            ConnectionDraft::sqlite("secret", &fixture.db_path)
                .with_credentials("me", "hunter2")
                .with_default(true),
        )
        .await
        .unwrap();
    assert!(summary.has_password);

    let listed = serde_json::to_string(&service.list_connections().await).unwrap();
    assert!(!listed.contains("hunter2"));
    let default = service.get_default_connection().await.unwrap();
    assert_eq!(default.id, summary.id);
}

#[tokio::test]
async fn test_profiles_survive_reopen() {
    let fixture = Fixture::new().await;
    let id = {
        let service = fixture.service().await;
        let id = create_sqlite(&service, &fixture).await;
        service.set_default_connection(&id).await.unwrap();
        service.shutdown().await;
        id
    };

    let service = fixture.service().await;
    let listed = service.list_connections().await;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, id);
    assert!(listed[0].is_default);
}

#[tokio::test]
async fn test_missing_database_file_is_not_stored() {
    let fixture = Fixture::new().await;
    let service = fixture.service().await;

    let err = service
        .create_connection(ConnectionDraft::sqlite(
            "ghost",
            fixture.db_path.with_file_name("ghost.db"),
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::ConnectionTest { .. }));
    assert!(service.list_connections().await.is_empty());

    let outcome = service
        .test_connection(ConnectionDraft::sqlite("local", &fixture.db_path))
        .await
        .unwrap();
    assert!(outcome.success);
}
