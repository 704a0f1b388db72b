//! Per-engine dialect catalog.
//!
//! Static syntax metadata used by the executor for hints and by upstream
//! prompt construction. One immutable record per engine; lookups never fail.

use crate::models::EngineType;
use serde::Serialize;

/// How an engine expresses "first N rows, skipping M".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PaginationStyle {
    /// `LIMIT n [OFFSET m]`
    LimitOffset,
    /// `OFFSET m ROWS FETCH NEXT n ROWS ONLY` (requires ORDER BY)
    OffsetFetch,
    /// `FETCH FIRST n ROWS ONLY`, with a leading `OFFSET m ROWS` when skipping
    FetchFirst,
    /// Aggregation pipeline stages `[{"$skip": m}, {"$limit": n}]`
    PipelineStages,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dialect {
    /// `None` for the generic fallback
    pub engine: Option<EngineType>,
    pub name: &'static str,
    pub quote_open: char,
    pub quote_close: char,
    pub pagination: PaginationStyle,
    pub date_format: &'static str,
    /// Keyword prefix for plan inspection, if the engine has one
    pub explain_keyword: Option<&'static str>,
}

impl Dialect {
    pub fn supports_explain(&self) -> bool {
        self.explain_keyword.is_some()
    }

    /// Pagination clause for `limit` rows after skipping `offset`.
    pub fn pagination_clause(&self, limit: u64, offset: Option<u64>) -> String {
        match (self.pagination, offset) {
            (PaginationStyle::LimitOffset, None) => format!("LIMIT {limit}"),
            (PaginationStyle::LimitOffset, Some(m)) => format!("LIMIT {limit} OFFSET {m}"),
            (PaginationStyle::OffsetFetch, m) => {
                format!("OFFSET {} ROWS FETCH NEXT {limit} ROWS ONLY", m.unwrap_or(0))
            }
            (PaginationStyle::FetchFirst, None) => format!("FETCH FIRST {limit} ROWS ONLY"),
            (PaginationStyle::FetchFirst, Some(m)) => {
                format!("OFFSET {m} ROWS FETCH NEXT {limit} ROWS ONLY")
            }
            (PaginationStyle::PipelineStages, None) => format!("[{{\"$limit\": {limit}}}]"),
            (PaginationStyle::PipelineStages, Some(m)) => {
                format!("[{{\"$skip\": {m}}}, {{\"$limit\": {limit}}}]")
            }
        }
    }

    /// Quote an identifier, doubling any embedded closing quote.
    pub fn quote_identifier(&self, ident: &str) -> String {
        let mut quoted = String::with_capacity(ident.len() + 2);
        quoted.push(self.quote_open);
        for ch in ident.chars() {
            if ch == self.quote_close {
                quoted.push(ch);
            }
            quoted.push(ch);
        }
        quoted.push(self.quote_close);
        quoted
    }

    /// Statement prefix that shows the plan of `sql`, if supported.
    pub fn explain(&self, sql: &str) -> Option<String> {
        self.explain_keyword.map(|kw| format!("{kw} {sql}"))
    }
}

static POSTGRES: Dialect = Dialect {
    engine: Some(EngineType::PostgreSQL),
    name: "PostgreSQL",
    quote_open: '"',
    quote_close: '"',
    pagination: PaginationStyle::LimitOffset,
    date_format: "YYYY-MM-DD",
    explain_keyword: Some("EXPLAIN"),
};

static MYSQL: Dialect = Dialect {
    engine: Some(EngineType::MySQL),
    name: "MySQL",
    quote_open: '`',
    quote_close: '`',
    pagination: PaginationStyle::LimitOffset,
    date_format: "%Y-%m-%d",
    explain_keyword: Some("EXPLAIN"),
};

static SQLITE: Dialect = Dialect {
    engine: Some(EngineType::SQLite),
    name: "SQLite",
    quote_open: '"',
    quote_close: '"',
    pagination: PaginationStyle::LimitOffset,
    date_format: "%Y-%m-%d",
    explain_keyword: Some("EXPLAIN QUERY PLAN"),
};

static MSSQL: Dialect = Dialect {
    engine: Some(EngineType::MsSql),
    name: "SQL Server",
    quote_open: '[',
    quote_close: ']',
    pagination: PaginationStyle::OffsetFetch,
    date_format: "yyyy-MM-dd",
    explain_keyword: None,
};

static ORACLE: Dialect = Dialect {
    engine: Some(EngineType::Oracle),
    name: "Oracle",
    quote_open: '"',
    quote_close: '"',
    pagination: PaginationStyle::FetchFirst,
    date_format: "YYYY-MM-DD",
    explain_keyword: Some("EXPLAIN PLAN FOR"),
};

static SNOWFLAKE: Dialect = Dialect {
    engine: Some(EngineType::Snowflake),
    name: "Snowflake",
    quote_open: '"',
    quote_close: '"',
    pagination: PaginationStyle::LimitOffset,
    date_format: "YYYY-MM-DD",
    explain_keyword: Some("EXPLAIN"),
};

static BIGQUERY: Dialect = Dialect {
    engine: Some(EngineType::BigQuery),
    name: "BigQuery",
    quote_open: '`',
    quote_close: '`',
    pagination: PaginationStyle::LimitOffset,
    date_format: "%Y-%m-%d",
    explain_keyword: None,
};

static CLICKHOUSE: Dialect = Dialect {
    engine: Some(EngineType::ClickHouse),
    name: "ClickHouse",
    quote_open: '`',
    quote_close: '`',
    pagination: PaginationStyle::LimitOffset,
    date_format: "%Y-%m-%d",
    explain_keyword: Some("EXPLAIN"),
};

static MONGODB: Dialect = Dialect {
    engine: Some(EngineType::MongoDB),
    name: "MongoDB",
    quote_open: '"',
    quote_close: '"',
    pagination: PaginationStyle::PipelineStages,
    date_format: "%Y-%m-%d",
    explain_keyword: None,
};

static GENERIC: Dialect = Dialect {
    engine: None,
    name: "ANSI SQL",
    quote_open: '"',
    quote_close: '"',
    pagination: PaginationStyle::LimitOffset,
    date_format: "YYYY-MM-DD",
    explain_keyword: None,
};

/// Dialect for an engine.
pub fn dialect_for(engine: EngineType) -> &'static Dialect {
    match engine {
        EngineType::PostgreSQL => &POSTGRES,
        EngineType::MySQL => &MYSQL,
        EngineType::SQLite => &SQLITE,
        EngineType::MsSql => &MSSQL,
        EngineType::Oracle => &ORACLE,
        EngineType::Snowflake => &SNOWFLAKE,
        EngineType::BigQuery => &BIGQUERY,
        EngineType::ClickHouse => &CLICKHOUSE,
        EngineType::MongoDB => &MONGODB,
    }
}

/// Dialect for an engine name, falling back to ANSI for unknown names.
pub fn dialect_for_name(name: &str) -> &'static Dialect {
    name.parse::<EngineType>()
        .map(dialect_for)
        .unwrap_or(&GENERIC)
}

/// The ANSI fallback dialect.
pub fn generic_dialect() -> &'static Dialect {
    &GENERIC
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlparser::dialect::GenericDialect;
    use sqlparser::parser::Parser;

    fn parses(sql: &str) -> bool {
        Parser::parse_sql(&GenericDialect {}, sql).is_ok()
    }

    #[test]
    fn test_every_engine_has_a_dialect() {
        for engine in EngineType::ALL {
            let dialect = dialect_for(engine);
            assert_eq!(dialect.engine, Some(engine));
        }
    }

    #[test]
    fn test_sql_pagination_clauses_parse() {
        for engine in EngineType::ALL {
            let dialect = dialect_for(engine);
            if dialect.pagination == PaginationStyle::PipelineStages {
                continue;
            }
            for offset in [None, Some(40)] {
                let sql = format!(
                    "SELECT id FROM t ORDER BY id {}",
                    dialect.pagination_clause(20, offset)
                );
                assert!(parses(&sql), "{engine}: {sql}");
            }
        }
    }

    #[test]
    fn test_pipeline_pagination_is_json() {
        let dialect = dialect_for(EngineType::MongoDB);
        let stages: serde_json::Value =
            serde_json::from_str(&dialect.pagination_clause(10, Some(5))).unwrap();
        assert_eq!(stages[0]["$skip"], 5);
        assert_eq!(stages[1]["$limit"], 10);

        let only_limit: serde_json::Value =
            serde_json::from_str(&dialect.pagination_clause(10, None)).unwrap();
        assert_eq!(only_limit[0]["$limit"], 10);
    }

    #[test]
    fn test_unknown_name_falls_back_to_generic() {
        let dialect = dialect_for_name("teradata");
        assert_eq!(dialect.engine, None);
        assert_eq!(dialect.quote_open, '"');
        assert!(!dialect.supports_explain());
        assert_eq!(dialect.pagination_clause(5, Some(10)), "LIMIT 5 OFFSET 10");
    }

    #[test]
    fn test_quote_identifier_escapes() {
        assert_eq!(dialect_for(EngineType::MySQL).quote_identifier("a`b"), "`a``b`");
        assert_eq!(dialect_for(EngineType::MsSql).quote_identifier("a]b"), "[a]]b]");
        assert_eq!(
            dialect_for(EngineType::PostgreSQL).quote_identifier("Order Items"),
            "\"Order Items\""
        );
    }

    #[test]
    fn test_explain_support() {
        assert_eq!(
            dialect_for(EngineType::SQLite).explain("SELECT 1").as_deref(),
            Some("EXPLAIN QUERY PLAN SELECT 1")
        );
        assert!(dialect_for(EngineType::MsSql).explain("SELECT 1").is_none());
    }
}
