//! Query execution engine.
//!
//! Statements are validated by [`validate_readonly`] before any pool is
//! touched. Accepted statements run through a per-engine submodule:
//! - `mysql`: MySQL row fetching
//! - `postgres`: PostgreSQL row fetching
//! - `sqlite`: SQLite row fetching
//!
//! Rows are streamed and only `row_limit + 1` are pulled, so the extra row
//! tells us the result was truncated without materialising the rest.

use crate::db::pool::DbPool;
use crate::db::types::RowToJson;
use crate::db::validator::{ValidatedQuery, validate_readonly};
use crate::dialect::dialect_for;
use crate::error::{DbError, DbResult};
use crate::models::{
    ColumnMetadata, DEFAULT_QUERY_TIMEOUT_SECS, DEFAULT_ROW_LIMIT, EngineType, ExecutionFailure,
    ExecutionResult, MAX_QUERY_TIMEOUT_SECS, MAX_ROW_LIMIT,
};
use futures_util::StreamExt;
use serde_json::{Map, Value as JsonValue};
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, warn};

/// Statements slower than this get an EXPLAIN hint.
const SLOW_QUERY_MS: u64 = 1000;

type Rows = (Vec<ColumnMetadata>, Vec<Map<String, JsonValue>>, bool);

/// Runs validated read-only statements against a pool.
#[derive(Debug, Clone)]
pub struct QueryExecutor {
    default_timeout: Duration,
    row_limit: u32,
}

impl QueryExecutor {
    /// Create a new query executor with default settings.
    pub fn new() -> Self {
        Self {
            default_timeout: Duration::from_secs(DEFAULT_QUERY_TIMEOUT_SECS),
            row_limit: DEFAULT_ROW_LIMIT,
        }
    }

    /// Create a new query executor with custom settings. Both values are
    /// clamped to their allowed ranges.
    pub fn with_defaults(timeout_secs: u64, row_limit: u32) -> Self {
        Self {
            default_timeout: Duration::from_secs(timeout_secs.clamp(1, MAX_QUERY_TIMEOUT_SECS)),
            // limit=0 would mark every non-empty result as truncated
            row_limit: row_limit.clamp(1, MAX_ROW_LIMIT),
        }
    }

    pub fn row_limit(&self) -> u32 {
        self.row_limit
    }

    pub fn timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Validate and run `sql`.
    ///
    /// Rejected statements fail with `SecurityValidation` before the pool is
    /// used. Engine failures come back as a result with `error` set.
    pub async fn execute(
        &self,
        pool: &DbPool,
        engine: EngineType,
        sql: &str,
    ) -> DbResult<ExecutionResult> {
        let query = validate_readonly(sql, engine)?;
        self.execute_validated(pool, engine, &query).await
    }

    /// Run a statement that already passed validation.
    pub async fn execute_validated(
        &self,
        pool: &DbPool,
        engine: EngineType,
        query: &ValidatedQuery,
    ) -> DbResult<ExecutionResult> {
        if pool.engine() != engine {
            return Err(DbError::not_configured(format!(
                "pool is for {} but {} was requested",
                pool.engine(),
                engine
            )));
        }

        debug!(
            engine = %engine,
            sql = %query.sql,
            limit = self.row_limit,
            timeout_secs = self.default_timeout.as_secs(),
            "Executing query"
        );

        let (sql, limit, within) = (query.sql.as_str(), self.row_limit, self.default_timeout);
        let start = Instant::now();
        let fetched = match pool {
            DbPool::Postgres(p) => postgres::fetch_rows(p, sql, limit, within)
                .await
                .map(|rows| process_rows(rows, limit)),
            DbPool::MySql(p) => mysql::fetch_rows(p, sql, limit, within)
                .await
                .map(|rows| process_rows(rows, limit)),
            DbPool::SQLite(p) => sqlite::fetch_rows(p, sql, limit, within)
                .await
                .map(|rows| process_rows(rows, limit)),
            DbPool::Mongo(_) => return Err(DbError::unsupported(engine, "SQL execution")),
        };
        let execution_time_ms = start.elapsed().as_millis() as u64;

        let result = match fetched {
            Ok((columns, rows, truncated)) => {
                if truncated {
                    warn!(limit, "Query result truncated");
                }
                let mut result =
                    ExecutionResult::success(columns, rows, truncated, execution_time_ms);
                result.hints = self.hints(engine, query, &result);
                result
            }
            Err(e) => {
                warn!(engine = %engine, elapsed_ms = execution_time_ms, error = %e, "Query failed");
                ExecutionResult::failed(ExecutionFailure::from_error(&e), execution_time_ms)
            }
        };

        debug!(
            rows = result.row_count,
            elapsed_ms = execution_time_ms,
            "Query finished"
        );
        Ok(result)
    }

    /// Surface heuristics drawn from the engine's dialect.
    fn hints(
        &self,
        engine: EngineType,
        query: &ValidatedQuery,
        result: &ExecutionResult,
    ) -> Vec<String> {
        let dialect = dialect_for(engine);
        let mut hints = Vec::new();

        if query.is_select() && !query.has_row_limit() {
            hints.push(format!(
                "Bound the result with `{}`",
                dialect.pagination_clause(u64::from(self.row_limit), None)
            ));
        }
        if query.selects_star() {
            hints.push("Select only the columns you need instead of `*`".to_string());
        }
        if result.truncated {
            hints.push(format!("Result truncated to {} rows", self.row_limit));
        }
        if result.execution_time_ms >= SLOW_QUERY_MS && query.keyword != "EXPLAIN" {
            if let Some(explain) = dialect.explain(&query.sql) {
                hints.push(format!("Slow query; inspect its plan with `{explain}`"));
            }
        }
        hints
    }
}

impl Default for QueryExecutor {
    fn default() -> Self {
        Self::new()
    }
}

/// Split fetched rows into column metadata, JSON records and a truncation flag.
fn process_rows<R: RowToJson>(rows: Vec<R>, row_limit: u32) -> Rows {
    let truncated = rows.len() > row_limit as usize;
    let columns = rows.first().map(R::column_metadata).unwrap_or_default();
    let records = rows
        .iter()
        .take(row_limit as usize)
        .map(R::to_json_map)
        .collect();
    (columns, records, truncated)
}

// =============================================================================
// Common Helper Functions
// =============================================================================

fn collect_rows<R>(results: Vec<Result<R, sqlx::Error>>) -> DbResult<Vec<R>> {
    let mut rows = Vec::with_capacity(results.len());
    for result in results {
        rows.push(result.map_err(DbError::from)?);
    }
    Ok(rows)
}

fn timeout_error(query_timeout: Duration) -> DbError {
    DbError::timeout("query execution", query_timeout.as_secs())
}

// =============================================================================
// Database-Specific Implementations
// =============================================================================

mod mysql {
    use super::*;
    use sqlx::mysql::MySqlRow;
    use sqlx::{Executor, MySqlPool};

    pub async fn fetch_rows(
        pool: &MySqlPool,
        sql: &str,
        row_limit: u32,
        query_timeout: Duration,
    ) -> DbResult<Vec<MySqlRow>> {
        // Raw SQL: SHOW / DESCRIBE are not preparable on every server version
        let rows_future = pool
            .fetch(sql)
            .take(row_limit as usize + 1)
            .collect::<Vec<_>>();

        match timeout(query_timeout, rows_future).await {
            Ok(results) => collect_rows(results),
            Err(_) => Err(timeout_error(query_timeout)),
        }
    }
}

mod postgres {
    use super::*;
    use sqlx::postgres::PgRow;
    use sqlx::{Executor, PgPool};

    pub async fn fetch_rows(
        pool: &PgPool,
        sql: &str,
        row_limit: u32,
        query_timeout: Duration,
    ) -> DbResult<Vec<PgRow>> {
        let rows_future = pool
            .fetch(sql)
            .take(row_limit as usize + 1)
            .collect::<Vec<_>>();

        match timeout(query_timeout, rows_future).await {
            Ok(results) => collect_rows(results),
            Err(_) => Err(timeout_error(query_timeout)),
        }
    }
}

mod sqlite {
    use super::*;
    use sqlx::sqlite::SqliteRow;
    use sqlx::{Executor, SqlitePool};

    pub async fn fetch_rows(
        pool: &SqlitePool,
        sql: &str,
        row_limit: u32,
        query_timeout: Duration,
    ) -> DbResult<Vec<SqliteRow>> {
        let rows_future = pool
            .fetch(sql)
            .take(row_limit as usize + 1)
            .collect::<Vec<_>>();

        match timeout(query_timeout, rows_future).await {
            Ok(results) => collect_rows(results),
            Err(_) => Err(timeout_error(query_timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_executor_defaults() {
        let executor = QueryExecutor::new();
        assert_eq!(
            executor.timeout(),
            Duration::from_secs(DEFAULT_QUERY_TIMEOUT_SECS)
        );
        assert_eq!(executor.row_limit(), DEFAULT_ROW_LIMIT);
    }

    #[test]
    fn test_executor_custom_settings() {
        let executor = QueryExecutor::with_defaults(60, 500);
        assert_eq!(executor.timeout(), Duration::from_secs(60));
        assert_eq!(executor.row_limit(), 500);
    }

    #[test]
    fn test_executor_limits_clamped() {
        let executor = QueryExecutor::with_defaults(99_999, 99_999);
        assert_eq!(executor.row_limit(), MAX_ROW_LIMIT);
        assert_eq!(executor.timeout(), Duration::from_secs(MAX_QUERY_TIMEOUT_SECS));

        let executor = QueryExecutor::with_defaults(0, 0);
        assert_eq!(executor.row_limit(), 1);
        assert_eq!(executor.timeout(), Duration::from_secs(1));
    }

    #[test]
    fn test_hints_follow_dialect() {
        let executor = QueryExecutor::with_defaults(30, 50);
        let query = validate_readonly("SELECT * FROM t", EngineType::PostgreSQL).unwrap();
        let mut result = ExecutionResult::success(Vec::new(), Vec::new(), true, SLOW_QUERY_MS);
        result.hints = executor.hints(EngineType::PostgreSQL, &query, &result);

        assert!(result.hints.iter().any(|h| h.contains("LIMIT 50")));
        assert!(result.hints.iter().any(|h| h.contains('*')));
        assert!(result.hints.iter().any(|h| h.contains("truncated")));
        assert!(result.hints.iter().any(|h| h.contains("EXPLAIN SELECT * FROM t")));
    }

    #[test]
    fn test_bounded_query_gets_no_limit_hint() {
        let executor = QueryExecutor::new();
        let query = validate_readonly("SELECT id FROM t LIMIT 5", EngineType::SQLite).unwrap();
        let result = ExecutionResult::success(Vec::new(), Vec::new(), false, 1);
        assert!(executor.hints(EngineType::SQLite, &query, &result).is_empty());
    }
}
