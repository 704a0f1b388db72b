//! Schema introspection.
//!
//! Each engine strategy reads its catalog into per-table [`TableDraft`]s. The
//! engine-neutral [`assemble`] step then turns drafts into a [`SchemaInfo`],
//! absorbing failures of the optional enrichments (foreign keys, indexes,
//! row counts) as warnings instead of failing the whole discovery.
//!
//! SQL queries live in the `queries` submodule with constants per engine.

use crate::db::pool::{DbPool, MongoPool};
use crate::dialect::dialect_for;
use crate::error::{DbError, DbResult};
use crate::models::{
    ColumnDefinition, EngineType, ForeignKey, IndexInfo, Relationship, SchemaInfo, TableSchema,
    ViewInfo,
};
use tracing::{debug, info, warn};

/// Catalog output for one table before normalisation.
#[derive(Debug)]
pub struct TableDraft {
    pub name: String,
    /// Columns in ordinal order.
    pub columns: Vec<ColumnDefinition>,
    /// Primary key columns in key order.
    pub primary_keys: Vec<String>,
    pub foreign_keys: DbResult<Vec<ForeignKey>>,
    pub indexes: DbResult<Vec<IndexInfo>>,
    pub row_count: DbResult<u64>,
}

impl TableDraft {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnDefinition>) -> Self {
        let primary_keys = columns
            .iter()
            .filter(|c| c.is_primary_key)
            .map(|c| c.name.clone())
            .collect();
        Self {
            name: name.into(),
            columns,
            primary_keys,
            foreign_keys: Ok(Vec::new()),
            indexes: Ok(Vec::new()),
            row_count: Ok(0),
        }
    }
}

/// Schema introspector for all supported engines.
pub struct SchemaIntrospector;

impl SchemaIntrospector {
    /// Discover the full schema behind `pool`.
    ///
    /// Fails with `NotConfigured` when the pool is closed or belongs to a
    /// different engine, and with `Discovery` when the catalog cannot be read
    /// at all.
    pub async fn discover(pool: &DbPool, engine: EngineType) -> DbResult<SchemaInfo> {
        if pool.is_closed() {
            return Err(DbError::not_configured("connection pool is closed"));
        }
        if pool.engine() != engine {
            return Err(DbError::not_configured(format!(
                "pool is for {} but {} was requested",
                pool.engine(),
                engine
            )));
        }

        let (drafts, views) = crate::impl_db_dispatch!(pool, {
            Postgres(p) => postgres::discover(p).await?,
            MySql(p) => mysql::discover(p).await?,
            SQLite(p) => sqlite::discover(p).await?,
            Mongo(m) => mongo::discover(m).await?,
        });

        let schema = assemble(engine, drafts, views);
        info!(
            engine = %engine,
            tables = schema.tables.len(),
            relationships = schema.relationships.len(),
            warnings = schema.warnings.len(),
            "Discovered schema"
        );
        Ok(schema)
    }
}

/// Normalise drafts into a [`SchemaInfo`].
///
/// Failed enrichments become empty lists (row count: zero) plus a warning.
/// Relationships are kept only when both ends exist in the table map.
pub fn assemble(
    engine: EngineType,
    drafts: Vec<TableDraft>,
    views: DbResult<Vec<ViewInfo>>,
) -> SchemaInfo {
    let mut schema = SchemaInfo::empty(engine);
    match views {
        Ok(views) => schema.views = views,
        Err(e) => {
            warn!(error = %e, "Could not read views");
            schema.warnings.push(format!("could not read views: {e}"));
        }
    }

    for draft in drafts {
        let TableDraft {
            name,
            mut columns,
            primary_keys,
            foreign_keys,
            indexes,
            row_count,
        } = draft;

        let foreign_keys = foreign_keys.unwrap_or_else(|e| {
            absorb(&mut schema.warnings, &name, "foreign keys", &e);
            Vec::new()
        });
        let indexes = indexes.unwrap_or_else(|e| {
            absorb(&mut schema.warnings, &name, "indexes", &e);
            Vec::new()
        });
        let row_count = row_count.unwrap_or_else(|e| {
            absorb(&mut schema.warnings, &name, "row count", &e);
            0
        });

        for column in &mut columns {
            if foreign_keys.iter().any(|fk| fk.column == column.name) {
                column.is_foreign_key = true;
            }
        }

        schema.tables.insert(
            name.clone(),
            TableSchema {
                name,
                columns,
                primary_keys,
                foreign_keys,
                indexes,
                row_count: Some(row_count),
            },
        );
    }

    let relationships: Vec<Relationship> = schema
        .tables
        .values()
        .flat_map(|table| {
            table.foreign_keys.iter().map(move |fk| Relationship {
                table: table.name.clone(),
                column: fk.column.clone(),
                referenced_table: fk.references_table.clone(),
                referenced_column: fk.references_column.clone(),
            })
        })
        .collect();

    for rel in relationships {
        if schema.has_column(&rel.table, &rel.column)
            && schema.has_column(&rel.referenced_table, &rel.referenced_column)
        {
            schema.relationships.push(rel);
        } else {
            debug!(
                table = %rel.table,
                referenced_table = %rel.referenced_table,
                "Dropping relationship to a table outside the discovered set"
            );
        }
    }

    schema
}

fn absorb(warnings: &mut Vec<String>, table: &str, what: &str, err: &DbError) {
    warn!(table = %table, error = %err, "Could not read {}", what);
    warnings.push(format!("{table}: could not read {what}: {err}"));
}

fn catalog_error(what: &str, err: impl std::fmt::Display) -> DbError {
    DbError::discovery(format!("Failed to read {what}: {err}"))
}

/// Length or precision/scale from a declared type such as `VARCHAR(30)` or
/// `DECIMAL(10,2)`.
fn parse_type_modifiers(data_type: &str) -> (Option<i64>, Option<i64>) {
    let Some(args) = data_type
        .split_once('(')
        .and_then(|(_, rest)| rest.split_once(')'))
        .map(|(args, _)| args)
    else {
        return (None, None);
    };
    let mut parts = args.split(',').map(|p| p.trim().parse::<i64>().ok());
    (parts.next().flatten(), parts.next().flatten())
}

// =============================================================================
// SQL Query Templates
// =============================================================================

mod queries {
    pub mod postgres {
        pub const LIST_TABLES: &str = r#"
            SELECT table_name::text AS table_name
            FROM information_schema.tables
            WHERE table_schema = current_schema()
            AND table_type = 'BASE TABLE'
            ORDER BY table_name
            "#;

        pub const LIST_VIEWS: &str = r#"
            SELECT table_name::text AS view_name, view_definition::text AS definition
            FROM information_schema.views
            WHERE table_schema = current_schema()
            ORDER BY table_name
            "#;

        pub const DESCRIBE_COLUMNS: &str = r#"
            SELECT
                c.column_name::text AS column_name,
                format_type(a.atttypid, a.atttypmod) AS column_type,
                c.is_nullable::text AS is_nullable,
                c.column_default::text AS column_default,
                c.character_maximum_length::int8 AS max_length,
                c.numeric_precision::int8 AS numeric_precision,
                c.numeric_scale::int8 AS numeric_scale
            FROM information_schema.columns c
            JOIN pg_class t ON t.relname = c.table_name
            JOIN pg_namespace n ON n.oid = t.relnamespace AND n.nspname = c.table_schema
            JOIN pg_attribute a ON a.attrelid = t.oid AND a.attname = c.column_name
            WHERE c.table_name = $1 AND c.table_schema = current_schema()
            ORDER BY c.ordinal_position
            "#;

        pub const PRIMARY_KEY: &str = r#"
            SELECT kcu.column_name::text AS column_name
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu
                ON tc.constraint_name = kcu.constraint_name
                AND tc.table_schema = kcu.table_schema
            WHERE tc.table_name = $1
            AND tc.table_schema = current_schema()
            AND tc.constraint_type = 'PRIMARY KEY'
            ORDER BY kcu.ordinal_position
            "#;

        pub const DESCRIBE_FOREIGN_KEYS: &str = r#"
            SELECT
                tc.constraint_name::text AS constraint_name,
                kcu.column_name::text AS column_name,
                ccu.table_name::text AS foreign_table_name,
                ccu.column_name::text AS foreign_column_name,
                rc.delete_rule::text AS delete_rule,
                rc.update_rule::text AS update_rule
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu
                ON tc.constraint_name = kcu.constraint_name
                AND tc.table_schema = kcu.table_schema
            JOIN information_schema.constraint_column_usage ccu
                ON ccu.constraint_name = tc.constraint_name
                AND ccu.table_schema = tc.table_schema
            JOIN information_schema.referential_constraints rc
                ON rc.constraint_name = tc.constraint_name
                AND rc.constraint_schema = tc.table_schema
            WHERE tc.table_name = $1
            AND tc.table_schema = current_schema()
            AND tc.constraint_type = 'FOREIGN KEY'
            ORDER BY kcu.ordinal_position
            "#;

        pub const DESCRIBE_INDEXES: &str = r#"
            SELECT
                i.relname::text AS index_name,
                array_agg(a.attname::text ORDER BY array_position(ix.indkey, a.attnum)) AS column_names,
                ix.indisunique AS is_unique,
                ix.indisprimary AS is_primary
            FROM pg_index ix
            JOIN pg_class i ON i.oid = ix.indexrelid
            JOIN pg_class t ON t.oid = ix.indrelid
            JOIN pg_namespace n ON n.oid = t.relnamespace
            JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = ANY(ix.indkey)
            WHERE t.relname = $1 AND n.nspname = current_schema()
            GROUP BY i.relname, ix.indisunique, ix.indisprimary
            ORDER BY i.relname
            "#;

        pub const ROW_ESTIMATE: &str = r#"
            SELECT n_live_tup AS row_count
            FROM pg_stat_user_tables
            WHERE schemaname = current_schema() AND relname = $1
            "#;
    }

    pub mod mysql {
        pub const LIST_TABLES: &str = r#"
            SELECT CONVERT(TABLE_NAME USING utf8) AS TABLE_NAME
            FROM information_schema.TABLES
            WHERE TABLE_SCHEMA = DATABASE()
            AND TABLE_TYPE = 'BASE TABLE'
            ORDER BY TABLE_NAME
            "#;

        pub const LIST_VIEWS: &str = r#"
            SELECT
                CONVERT(TABLE_NAME USING utf8) AS VIEW_NAME,
                CONVERT(VIEW_DEFINITION USING utf8) AS DEFINITION
            FROM information_schema.VIEWS
            WHERE TABLE_SCHEMA = DATABASE()
            ORDER BY TABLE_NAME
            "#;

        pub const DESCRIBE_COLUMNS: &str = r#"
            SELECT
                CONVERT(COLUMN_NAME USING utf8) AS COLUMN_NAME,
                CONVERT(COLUMN_TYPE USING utf8) AS COLUMN_TYPE,
                CONVERT(IS_NULLABLE USING utf8) AS IS_NULLABLE,
                CONVERT(COLUMN_DEFAULT USING utf8) AS COLUMN_DEFAULT,
                CONVERT(COLUMN_KEY USING utf8) AS COLUMN_KEY,
                CHARACTER_MAXIMUM_LENGTH AS MAX_LENGTH,
                NUMERIC_PRECISION AS NUMERIC_PRECISION,
                NUMERIC_SCALE AS NUMERIC_SCALE
            FROM information_schema.COLUMNS
            WHERE TABLE_NAME = ? AND TABLE_SCHEMA = DATABASE()
            ORDER BY ORDINAL_POSITION
            "#;

        pub const PRIMARY_KEY: &str = r#"
            SELECT CONVERT(COLUMN_NAME USING utf8) AS COLUMN_NAME
            FROM information_schema.KEY_COLUMN_USAGE
            WHERE TABLE_NAME = ?
            AND TABLE_SCHEMA = DATABASE()
            AND CONSTRAINT_NAME = 'PRIMARY'
            ORDER BY ORDINAL_POSITION
            "#;

        pub const DESCRIBE_FOREIGN_KEYS: &str = r#"
            SELECT
                CONVERT(k.CONSTRAINT_NAME USING utf8) AS CONSTRAINT_NAME,
                CONVERT(k.COLUMN_NAME USING utf8) AS COLUMN_NAME,
                CONVERT(k.REFERENCED_TABLE_NAME USING utf8) AS REFERENCED_TABLE_NAME,
                CONVERT(k.REFERENCED_COLUMN_NAME USING utf8) AS REFERENCED_COLUMN_NAME,
                CONVERT(r.DELETE_RULE USING utf8) AS DELETE_RULE,
                CONVERT(r.UPDATE_RULE USING utf8) AS UPDATE_RULE
            FROM information_schema.KEY_COLUMN_USAGE k
            JOIN information_schema.REFERENTIAL_CONSTRAINTS r
                ON r.CONSTRAINT_NAME = k.CONSTRAINT_NAME
                AND r.CONSTRAINT_SCHEMA = k.TABLE_SCHEMA
            WHERE k.TABLE_NAME = ?
            AND k.TABLE_SCHEMA = DATABASE()
            AND k.REFERENCED_TABLE_NAME IS NOT NULL
            ORDER BY k.ORDINAL_POSITION
            "#;

        pub const DESCRIBE_INDEXES: &str = r#"
            SELECT
                CONVERT(INDEX_NAME USING utf8) AS INDEX_NAME,
                CONVERT(GROUP_CONCAT(COLUMN_NAME ORDER BY SEQ_IN_INDEX) USING utf8) AS COLUMN_NAMES,
                NOT NON_UNIQUE AS IS_UNIQUE
            FROM information_schema.STATISTICS
            WHERE TABLE_NAME = ? AND TABLE_SCHEMA = DATABASE()
            GROUP BY INDEX_NAME, NON_UNIQUE
            ORDER BY INDEX_NAME
            "#;

        pub const ROW_ESTIMATE: &str = r#"
            SELECT TABLE_ROWS AS ROW_COUNT
            FROM information_schema.TABLES
            WHERE TABLE_NAME = ? AND TABLE_SCHEMA = DATABASE()
            "#;
    }

    pub mod sqlite {
        pub const LIST_TABLES: &str = r#"
            SELECT name FROM sqlite_master
            WHERE type = 'table'
            AND name NOT LIKE 'sqlite_%'
            ORDER BY name
            "#;

        pub const LIST_VIEWS: &str = r#"
            SELECT name, sql FROM sqlite_master
            WHERE type = 'view'
            ORDER BY name
            "#;

        pub const TABLE_INFO: &str = r#"
            SELECT name, type, "notnull", dflt_value, pk
            FROM pragma_table_info(?)
            ORDER BY cid
            "#;

        pub const FOREIGN_KEY_LIST: &str = r#"
            SELECT seq, "from", "table", "to", on_update, on_delete
            FROM pragma_foreign_key_list(?)
            ORDER BY id, seq
            "#;

        pub const PRIMARY_KEY: &str = r#"
            SELECT name FROM pragma_table_info(?)
            WHERE pk > 0
            ORDER BY pk
            "#;

        pub const INDEX_LIST: &str = r#"
            SELECT name, "unique", origin FROM pragma_index_list(?)
            "#;

        pub const INDEX_INFO: &str = r#"
            SELECT name FROM pragma_index_info(?) ORDER BY seqno
            "#;
    }
}

// =============================================================================
// Engine-Specific Implementations
// =============================================================================

mod postgres {
    use super::*;
    use sqlx::{PgPool, Row};

    pub async fn discover(pool: &PgPool) -> DbResult<(Vec<TableDraft>, DbResult<Vec<ViewInfo>>)> {
        let tables: Vec<String> = sqlx::query_scalar(queries::postgres::LIST_TABLES)
            .fetch_all(pool)
            .await
            .map_err(|e| catalog_error("table list", e))?;

        let mut drafts = Vec::with_capacity(tables.len());
        for table in tables {
            let columns = fetch_columns(pool, &table).await?;
            let primary_keys: Vec<String> = sqlx::query_scalar(queries::postgres::PRIMARY_KEY)
                .bind(&table)
                .fetch_all(pool)
                .await
                .map_err(|e| catalog_error("primary keys", e))?;
            let columns = columns
                .into_iter()
                .map(|c| {
                    let is_pk = primary_keys.contains(&c.name);
                    c.with_primary_key(is_pk)
                })
                .collect();

            let mut draft = TableDraft::new(&table, columns);
            draft.primary_keys = primary_keys;
            draft.foreign_keys = fetch_foreign_keys(pool, &table).await;
            draft.indexes = fetch_indexes(pool, &table).await;
            draft.row_count = sqlx::query_scalar::<_, i64>(queries::postgres::ROW_ESTIMATE)
                .bind(&table)
                .fetch_optional(pool)
                .await
                .map(|n| n.unwrap_or(0).max(0) as u64)
                .map_err(DbError::from);
            drafts.push(draft);
        }

        let views = sqlx::query(queries::postgres::LIST_VIEWS)
            .fetch_all(pool)
            .await
            .map(|rows| {
                rows.iter()
                    .map(|row| ViewInfo {
                        name: row.get("view_name"),
                        definition: row.try_get("definition").ok().flatten(),
                    })
                    .collect()
            })
            .map_err(DbError::from);

        debug!(count = drafts.len(), "Read PostgreSQL catalog");
        Ok((drafts, views))
    }

    async fn fetch_columns(pool: &PgPool, table: &str) -> DbResult<Vec<ColumnDefinition>> {
        let rows = sqlx::query(queries::postgres::DESCRIBE_COLUMNS)
            .bind(table)
            .fetch_all(pool)
            .await
            .map_err(|e| catalog_error("columns", e))?;

        Ok(rows
            .iter()
            .map(|row| {
                let name: String = row.get("column_name");
                let column_type: String = row.get("column_type");
                let nullable: String = row.get("is_nullable");
                ColumnDefinition::new(name, column_type, nullable == "YES")
                    .with_default(row.try_get("column_default").ok().flatten())
                    .with_max_length(row.try_get("max_length").ok().flatten())
                    .with_precision(
                        row.try_get("numeric_precision").ok().flatten(),
                        row.try_get("numeric_scale").ok().flatten(),
                    )
            })
            .collect())
    }

    async fn fetch_foreign_keys(pool: &PgPool, table: &str) -> DbResult<Vec<ForeignKey>> {
        let rows = sqlx::query(queries::postgres::DESCRIBE_FOREIGN_KEYS)
            .bind(table)
            .fetch_all(pool)
            .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let column: String = row.get("column_name");
                let ref_table: String = row.get("foreign_table_name");
                let ref_column: String = row.get("foreign_column_name");
                let delete_rule: String = row.try_get("delete_rule").unwrap_or_default();
                let update_rule: String = row.try_get("update_rule").unwrap_or_default();
                ForeignKey::new(column, ref_table, ref_column)
                    .with_name(row.try_get("constraint_name").ok())
                    .with_actions(&delete_rule, &update_rule)
            })
            .collect())
    }

    async fn fetch_indexes(pool: &PgPool, table: &str) -> DbResult<Vec<IndexInfo>> {
        let rows = sqlx::query(queries::postgres::DESCRIBE_INDEXES)
            .bind(table)
            .fetch_all(pool)
            .await?;

        Ok(rows
            .iter()
            .filter_map(|row| {
                let name: String = row.get("index_name");
                let columns: Vec<String> = row.try_get("column_names").unwrap_or_default();
                let is_unique: bool = row.try_get("is_unique").unwrap_or(false);
                let is_primary: bool = row.try_get("is_primary").unwrap_or(false);
                (!columns.is_empty()).then(|| {
                    IndexInfo::new(name, columns)
                        .with_unique(is_unique)
                        .with_primary(is_primary)
                })
            })
            .collect())
    }
}

mod mysql {
    use super::*;
    use sqlx::mysql::MySqlRow;
    use sqlx::{MySqlPool, Row};

    /// MySQL 5.x may return BIGINT (i64), 8.x BIGINT UNSIGNED (u64).
    fn try_get_u64(row: &MySqlRow, column: &str) -> Option<u64> {
        if let Ok(Some(v)) = row.try_get::<Option<u64>, _>(column) {
            return Some(v);
        }
        row.try_get::<Option<i64>, _>(column)
            .ok()
            .flatten()
            .map(|v| v.max(0) as u64)
    }

    /// MySQL may return VARBINARY instead of VARCHAR depending on charset configuration.
    fn get_string(row: &MySqlRow, column: &str) -> String {
        get_optional_string(row, column).unwrap_or_default()
    }

    fn get_optional_string(row: &MySqlRow, column: &str) -> Option<String> {
        row.try_get::<Option<String>, _>(column)
            .ok()
            .flatten()
            .or_else(|| {
                row.try_get::<Option<Vec<u8>>, _>(column)
                    .ok()
                    .flatten()
                    .and_then(|bytes| String::from_utf8(bytes).ok())
            })
    }

    fn strings(rows: &[MySqlRow], column: &str) -> Vec<String> {
        rows.iter().map(|row| get_string(row, column)).collect()
    }

    pub async fn discover(pool: &MySqlPool) -> DbResult<(Vec<TableDraft>, DbResult<Vec<ViewInfo>>)> {
        let rows = sqlx::query(queries::mysql::LIST_TABLES)
            .fetch_all(pool)
            .await
            .map_err(|e| catalog_error("table list", e))?;
        let tables = strings(&rows, "TABLE_NAME");

        let mut drafts = Vec::with_capacity(tables.len());
        for table in tables {
            let columns = fetch_columns(pool, &table).await?;
            let pk_rows = sqlx::query(queries::mysql::PRIMARY_KEY)
                .bind(&table)
                .fetch_all(pool)
                .await
                .map_err(|e| catalog_error("primary keys", e))?;

            let mut draft = TableDraft::new(&table, columns);
            draft.primary_keys = strings(&pk_rows, "COLUMN_NAME");
            draft.foreign_keys = fetch_foreign_keys(pool, &table).await;
            draft.indexes = fetch_indexes(pool, &table).await;
            draft.row_count = sqlx::query(queries::mysql::ROW_ESTIMATE)
                .bind(&table)
                .fetch_optional(pool)
                .await
                .map(|row| row.and_then(|r| try_get_u64(&r, "ROW_COUNT")).unwrap_or(0))
                .map_err(DbError::from);
            drafts.push(draft);
        }

        let views = sqlx::query(queries::mysql::LIST_VIEWS)
            .fetch_all(pool)
            .await
            .map(|rows| {
                rows.iter()
                    .map(|row| ViewInfo {
                        name: get_string(row, "VIEW_NAME"),
                        definition: get_optional_string(row, "DEFINITION"),
                    })
                    .collect()
            })
            .map_err(DbError::from);

        debug!(count = drafts.len(), "Read MySQL catalog");
        Ok((drafts, views))
    }

    async fn fetch_columns(pool: &MySqlPool, table: &str) -> DbResult<Vec<ColumnDefinition>> {
        let rows = sqlx::query(queries::mysql::DESCRIBE_COLUMNS)
            .bind(table)
            .fetch_all(pool)
            .await
            .map_err(|e| catalog_error("columns", e))?;

        Ok(rows
            .iter()
            .map(|row| {
                let as_i64 = |column: &str| try_get_u64(row, column).map(|v| v as i64);
                ColumnDefinition::new(
                    get_string(row, "COLUMN_NAME"),
                    get_string(row, "COLUMN_TYPE"),
                    get_string(row, "IS_NULLABLE") == "YES",
                )
                .with_primary_key(get_string(row, "COLUMN_KEY") == "PRI")
                .with_default(get_optional_string(row, "COLUMN_DEFAULT"))
                .with_max_length(as_i64("MAX_LENGTH"))
                .with_precision(as_i64("NUMERIC_PRECISION"), as_i64("NUMERIC_SCALE"))
            })
            .collect())
    }

    async fn fetch_foreign_keys(pool: &MySqlPool, table: &str) -> DbResult<Vec<ForeignKey>> {
        let rows = sqlx::query(queries::mysql::DESCRIBE_FOREIGN_KEYS)
            .bind(table)
            .fetch_all(pool)
            .await?;

        Ok(rows
            .iter()
            .map(|row| {
                ForeignKey::new(
                    get_string(row, "COLUMN_NAME"),
                    get_string(row, "REFERENCED_TABLE_NAME"),
                    get_string(row, "REFERENCED_COLUMN_NAME"),
                )
                .with_name(get_optional_string(row, "CONSTRAINT_NAME"))
                .with_actions(
                    &get_string(row, "DELETE_RULE"),
                    &get_string(row, "UPDATE_RULE"),
                )
            })
            .collect())
    }

    async fn fetch_indexes(pool: &MySqlPool, table: &str) -> DbResult<Vec<IndexInfo>> {
        let rows = sqlx::query(queries::mysql::DESCRIBE_INDEXES)
            .bind(table)
            .fetch_all(pool)
            .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let name = get_string(row, "INDEX_NAME");
                let columns = get_string(row, "COLUMN_NAMES")
                    .split(',')
                    .map(str::to_string)
                    .collect();
                let is_unique: i64 = row.try_get("IS_UNIQUE").unwrap_or(0);
                let is_primary = name == "PRIMARY";
                IndexInfo::new(name, columns)
                    .with_unique(is_unique != 0)
                    .with_primary(is_primary)
            })
            .collect())
    }
}

mod sqlite {
    use super::*;
    use sqlx::{Row, SqlitePool};
    use std::collections::HashMap;

    pub async fn discover(pool: &SqlitePool) -> DbResult<(Vec<TableDraft>, DbResult<Vec<ViewInfo>>)> {
        let tables: Vec<String> = sqlx::query_scalar(queries::sqlite::LIST_TABLES)
            .fetch_all(pool)
            .await
            .map_err(|e| catalog_error("table list", e))?;

        let mut drafts = Vec::with_capacity(tables.len());
        for table in tables {
            let (columns, primary_keys) = fetch_columns(pool, &table).await?;
            let mut draft = TableDraft::new(&table, columns);
            draft.primary_keys = primary_keys;
            draft.foreign_keys = fetch_foreign_keys(pool, &table).await;
            draft.indexes = fetch_indexes(pool, &table).await;
            draft.row_count = count_rows(pool, &table).await;
            drafts.push(draft);
        }

        let views = sqlx::query(queries::sqlite::LIST_VIEWS)
            .fetch_all(pool)
            .await
            .map(|rows| {
                rows.iter()
                    .map(|row| ViewInfo {
                        name: row.get("name"),
                        definition: row.try_get("sql").ok().flatten(),
                    })
                    .collect()
            })
            .map_err(DbError::from);

        debug!(count = drafts.len(), "Read SQLite catalog");
        Ok((drafts, views))
    }

    /// Columns in `cid` order and primary key columns in key order.
    async fn fetch_columns(
        pool: &SqlitePool,
        table: &str,
    ) -> DbResult<(Vec<ColumnDefinition>, Vec<String>)> {
        let rows = sqlx::query(queries::sqlite::TABLE_INFO)
            .bind(table)
            .fetch_all(pool)
            .await
            .map_err(|e| catalog_error("columns", e))?;

        let mut pk_positions: Vec<(i64, String)> = Vec::new();
        let columns = rows
            .iter()
            .map(|row| {
                let name: String = row.get("name");
                let data_type: String = row.try_get("type").unwrap_or_default();
                let notnull: i64 = row.try_get("notnull").unwrap_or(0);
                let pk: i64 = row.try_get("pk").unwrap_or(0);
                if pk > 0 {
                    pk_positions.push((pk, name.clone()));
                }

                let (first, second) = parse_type_modifiers(&data_type);
                let lower = data_type.to_lowercase();
                let column = ColumnDefinition::new(&name, &data_type, notnull == 0 && pk == 0)
                    .with_primary_key(pk > 0)
                    .with_default(row.try_get("dflt_value").ok().flatten());
                if lower.contains("char") || lower.contains("text") {
                    column.with_max_length(first)
                } else if lower.contains("dec") || lower.contains("num") {
                    column.with_precision(first, second)
                } else {
                    column
                }
            })
            .collect();

        pk_positions.sort_by_key(|(position, _)| *position);
        let primary_keys = pk_positions.into_iter().map(|(_, name)| name).collect();
        Ok((columns, primary_keys))
    }

    async fn fetch_foreign_keys(pool: &SqlitePool, table: &str) -> DbResult<Vec<ForeignKey>> {
        let rows = sqlx::query(queries::sqlite::FOREIGN_KEY_LIST)
            .bind(table)
            .fetch_all(pool)
            .await?;

        let mut parent_keys: HashMap<String, Vec<String>> = HashMap::new();
        let mut foreign_keys = Vec::with_capacity(rows.len());
        for row in &rows {
            let column: String = row.get("from");
            let ref_table: String = row.get("table");
            let ref_column = match row.try_get::<Option<String>, _>("to").ok().flatten() {
                Some(to) => to,
                // NULL `to` targets the parent's primary key, matched by position
                None => {
                    if !parent_keys.contains_key(&ref_table) {
                        let keys: Vec<String> = sqlx::query_scalar(queries::sqlite::PRIMARY_KEY)
                            .bind(&ref_table)
                            .fetch_all(pool)
                            .await?;
                        parent_keys.insert(ref_table.clone(), keys);
                    }
                    let seq: i64 = row.try_get("seq").unwrap_or(0);
                    parent_keys
                        .get(&ref_table)
                        .and_then(|keys| keys.get(seq.max(0) as usize))
                        .cloned()
                        .unwrap_or_default()
                }
            };
            let on_delete: String = row.try_get("on_delete").unwrap_or_default();
            let on_update: String = row.try_get("on_update").unwrap_or_default();
            foreign_keys.push(
                ForeignKey::new(column, ref_table, ref_column).with_actions(&on_delete, &on_update),
            );
        }
        Ok(foreign_keys)
    }

    async fn fetch_indexes(pool: &SqlitePool, table: &str) -> DbResult<Vec<IndexInfo>> {
        let idx_list = sqlx::query(queries::sqlite::INDEX_LIST)
            .bind(table)
            .fetch_all(pool)
            .await?;

        let mut indexes = Vec::with_capacity(idx_list.len());
        for idx_row in &idx_list {
            let name: String = idx_row.get("name");
            let is_unique: i64 = idx_row.try_get("unique").unwrap_or(0);
            let origin: String = idx_row.try_get("origin").unwrap_or_default();

            let columns: Vec<String> = sqlx::query_scalar(queries::sqlite::INDEX_INFO)
                .bind(&name)
                .fetch_all(pool)
                .await?;
            if !columns.is_empty() {
                indexes.push(
                    IndexInfo::new(name, columns)
                        .with_unique(is_unique != 0)
                        .with_primary(origin == "pk"),
                );
            }
        }
        Ok(indexes)
    }

    async fn count_rows(pool: &SqlitePool, table: &str) -> DbResult<u64> {
        let sql = format!(
            "SELECT COUNT(*) FROM {}",
            dialect_for(EngineType::SQLite).quote_identifier(table)
        );
        let count: i64 = sqlx::query_scalar(&sql).fetch_one(pool).await?;
        Ok(count.max(0) as u64)
    }
}

mod mongo {
    use super::*;
    use crate::db::types::{bson_to_json, bson_type_name};
    use futures_util::TryStreamExt;
    use indexmap::IndexMap;
    use mongodb::IndexModel;
    use mongodb::bson::{Bson, Document, doc};
    use mongodb::results::CollectionSpecification;

    /// Documents sampled per collection to infer fields.
    const SAMPLE_SIZE: i64 = 100;

    pub async fn discover(pool: &MongoPool) -> DbResult<(Vec<TableDraft>, DbResult<Vec<ViewInfo>>)> {
        let db = pool.database();
        let collections = db
            .list_collection_names()
            .filter(doc! { "type": "collection" })
            .await
            .map_err(|e| catalog_error("collection list", e))?;

        let mut drafts = Vec::new();
        for name in collections.into_iter().filter(|n| !n.starts_with("system.")) {
            let collection = db.collection::<Document>(&name);

            let sample: Vec<Document> = collection
                .find(doc! {})
                .limit(SAMPLE_SIZE)
                .await
                .map_err(|e| catalog_error("documents", e))?
                .try_collect()
                .await
                .map_err(|e| catalog_error("documents", e))?;

            let mut draft = TableDraft::new(&name, infer_columns(&sample));
            draft.primary_keys = vec!["_id".to_string()];

            draft.indexes = match collection.list_indexes().await {
                Ok(cursor) => cursor
                    .try_collect::<Vec<IndexModel>>()
                    .await
                    .map(|models| models.iter().map(index_info).collect())
                    .map_err(DbError::from),
                Err(e) => Err(DbError::from(e)),
            };
            draft.row_count = collection
                .estimated_document_count()
                .await
                .map_err(DbError::from);
            drafts.push(draft);
        }

        let views = match db.list_collections().filter(doc! { "type": "view" }).await {
            Ok(cursor) => cursor
                .try_collect::<Vec<CollectionSpecification>>()
                .await
                .map(|specs| specs.into_iter().map(view_info).collect())
                .map_err(DbError::from),
            Err(e) => Err(DbError::from(e)),
        };

        debug!(count = drafts.len(), database = %pool.database_name(), "Read MongoDB catalog");
        Ok((drafts, views))
    }

    /// Union of top-level fields across `sample`, `_id` first, then in
    /// first-seen order. A field absent from or null in any document is
    /// nullable.
    pub fn infer_columns(sample: &[Document]) -> Vec<ColumnDefinition> {
        let mut fields: IndexMap<String, (Option<&'static str>, usize, bool)> = IndexMap::new();
        fields.insert("_id".to_string(), (None, 0, false));

        for document in sample {
            for (key, value) in document {
                let entry = fields.entry(key.clone()).or_insert((None, 0, false));
                entry.1 += 1;
                if matches!(value, Bson::Null) {
                    entry.2 = true;
                } else if entry.0.is_none() {
                    entry.0 = Some(bson_type_name(value));
                }
            }
        }

        fields
            .into_iter()
            .filter(|(name, (_, seen, _))| *seen > 0 || name == "_id")
            .map(|(name, (data_type, seen, saw_null))| {
                let is_id = name == "_id";
                let nullable = !is_id && (saw_null || seen < sample.len());
                ColumnDefinition::new(name, data_type.unwrap_or("objectId"), nullable)
                    .with_primary_key(is_id)
            })
            .collect()
    }

    /// A view's definition is its source collection and pipeline as JSON.
    fn view_info(collection: CollectionSpecification) -> ViewInfo {
        let options = collection.options;
        let definition = options.pipeline.map(|stages| {
            let stages: Vec<serde_json::Value> = stages
                .into_iter()
                .map(|stage| bson_to_json(&Bson::Document(stage)))
                .collect();
            serde_json::json!({ "viewOn": options.view_on, "pipeline": stages }).to_string()
        });
        ViewInfo {
            name: collection.name,
            definition,
        }
    }

    fn index_info(model: &IndexModel) -> IndexInfo {
        let name = model
            .options
            .as_ref()
            .and_then(|o| o.name.clone())
            .unwrap_or_default();
        let unique = model
            .options
            .as_ref()
            .and_then(|o| o.unique)
            .unwrap_or(false);
        let columns = model.keys.keys().cloned().collect();
        let is_primary = name == "_id_";
        IndexInfo::new(name, columns)
            .with_unique(unique)
            .with_primary(is_primary)
    }
}
