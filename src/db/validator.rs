//! Read-only SQL gate.
//!
//! Every statement passes a keyword gate that does not depend on any engine
//! parser:
//!
//! 1. comments are stripped and whitespace collapsed (quoted text is kept),
//! 2. denylisted leading keywords are rejected,
//! 3. more than one non-empty statement is rejected,
//! 4. meta-commands and file/program side channels are rejected,
//! 5. the leading keyword must be in the engine's accepted set.
//!
//! After the gate, [sqlparser](https://docs.rs/sqlparser/) parses the
//! statement with the engine's dialect. When it parses, every statement must
//! be a read-only kind. When it does not parse, the gate's verdict stands, so
//! the parser can only narrow what the gate accepts.

use crate::error::{DbError, DbResult};
use crate::models::EngineType;
use sqlparser::ast::Statement;
use sqlparser::dialect::{
    BigQueryDialect, ClickHouseDialect, Dialect, GenericDialect, MsSqlDialect, MySqlDialect,
    PostgreSqlDialect, SQLiteDialect, SnowflakeDialect,
};
use sqlparser::parser::Parser;
use tracing::debug;

/// Leading keywords that always reject, whatever the engine.
pub const DENIED_LEADING_KEYWORDS: &[&str] = &[
    "DROP", "DELETE", "UPDATE", "INSERT", "ALTER", "CREATE", "TRUNCATE", "GRANT", "REVOKE",
    "COMMIT", "ROLLBACK", "COPY", "CALL", "EXECUTE", "PREPARE",
];

/// Words that turn a read into a write or a file/program side channel.
const SIDE_CHANNEL_WORDS: &[&str] = &[
    "INTO",
    "OUTFILE",
    "DUMPFILE",
    "LOAD_FILE",
    "PG_READ_FILE",
    "PG_READ_BINARY_FILE",
    "PG_LS_DIR",
    "LO_IMPORT",
    "LO_EXPORT",
];

/// Statements that may not open a `WITH` or `EXPLAIN` body. `REPLACE` is
/// left out: its statement form needs `INTO`, which is already rejected.
const EMBEDDED_WRITE_WORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "MERGE", "DROP", "ALTER", "CREATE", "TRUNCATE", "GRANT",
    "REVOKE",
];

/// Words that may sit between `EXPLAIN` and the statement it wraps.
const EXPLAIN_OPTION_WORDS: &[&str] = &[
    "EXPLAIN", "ANALYZE", "VERBOSE", "QUERY", "PLAN", "EXTENDED", "FORMAT", "JSON", "TREE",
    "TRADITIONAL",
];

/// A statement that passed the gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedQuery {
    /// Comment-free text to send to the engine.
    pub sql: String,
    /// Upper-cased leading keyword.
    pub keyword: String,
    /// Upper-cased text with quoted content masked out.
    skeleton: String,
}

impl ValidatedQuery {
    /// True if the statement already bounds its rows.
    pub fn has_row_limit(&self) -> bool {
        words(&self.skeleton).any(|w| matches!(w, "LIMIT" | "TOP" | "FETCH"))
    }

    pub fn selects_star(&self) -> bool {
        self.skeleton.contains("SELECT *") || self.skeleton.contains("SELECT DISTINCT *")
    }

    pub fn is_select(&self) -> bool {
        matches!(self.keyword.as_str(), "SELECT" | "WITH")
    }
}

/// Validate `sql` for read-only execution on `engine`.
///
/// Rejections are `SecurityValidation` errors and never touch the network.
///
/// ```
/// use db_datasource::db::validator::validate_readonly;
/// use db_datasource::models::EngineType;
///
/// assert!(validate_readonly("SELECT * FROM users", EngineType::PostgreSQL).is_ok());
/// assert!(validate_readonly("-- hi\n DELETE FROM users", EngineType::PostgreSQL).is_err());
/// ```
pub fn validate_readonly(sql: &str, engine: EngineType) -> DbResult<ValidatedQuery> {
    let normalized = normalize(sql, engine == EngineType::MySQL)?;
    let skeleton = normalized.skeleton.to_uppercase();

    let first = skeleton.trim_start_matches(|c: char| c == ';' || c == ' ' || c == '(');
    if first.is_empty() {
        return Err(DbError::security("EMPTY", "No SQL statement to execute"));
    }
    if let Some(prefix) = first.chars().next().filter(|c| matches!(c, '\\' | '.' | '!')) {
        return Err(DbError::security(
            prefix.to_string(),
            "Client meta-commands are not allowed",
        ));
    }

    let keyword = words(first).next().unwrap_or_default().to_string();
    if DENIED_LEADING_KEYWORDS.contains(&keyword.as_str()) {
        return Err(DbError::security(
            &keyword,
            format!("{keyword} statements modify data or schema and are not allowed"),
        ));
    }

    let statements = skeleton
        .split(';')
        .filter(|segment| !segment.trim().is_empty())
        .count();
    if statements > 1 {
        return Err(DbError::security(
            "MULTIPLE_STATEMENTS",
            format!("Only one statement may be executed, found {statements}"),
        ));
    }

    if let Some(word) = words(&skeleton).find(|w| SIDE_CHANNEL_WORDS.contains(w)) {
        return Err(DbError::security(
            word,
            format!("{word} can write data or reach the server filesystem"),
        ));
    }
    if skeleton.contains("TO PROGRAM") || skeleton.contains("TO STDOUT") {
        return Err(DbError::security("COPY", "COPY directives are not allowed"));
    }

    if !engine
        .accepted_leading_keywords()
        .contains(&keyword.as_str())
    {
        return Err(DbError::security(
            &keyword,
            format!(
                "{} statements are not accepted for {}",
                if keyword.is_empty() { "Unrecognized" } else { keyword.as_str() },
                engine
            ),
        ));
    }

    if matches!(keyword.as_str(), "WITH" | "EXPLAIN") {
        if let Some(word) = embedded_write(&skeleton) {
            return Err(DbError::security(
                word,
                format!("{keyword} body contains a {word} statement"),
            ));
        }
    }

    let sql = normalized
        .text
        .trim_matches(|c: char| c == ';' || c == ' ')
        .to_string();
    check_parsed(&sql, engine)?;

    Ok(ValidatedQuery {
        sql,
        keyword,
        skeleton,
    })
}

/// Parser layer. Parse failures keep the gate's verdict.
fn check_parsed(sql: &str, engine: EngineType) -> DbResult<()> {
    let dialect = parser_dialect(engine);
    let statements = match Parser::parse_sql(dialect.as_ref(), sql) {
        Ok(statements) => statements,
        Err(e) => {
            debug!(engine = %engine, error = %e, "Parser could not read statement, keeping keyword verdict");
            return Ok(());
        }
    };

    if statements.len() > 1 {
        return Err(DbError::security(
            "MULTIPLE_STATEMENTS",
            format!("Only one statement may be executed, found {}", statements.len()),
        ));
    }
    for statement in &statements {
        if let Some(kind) = write_kind(statement) {
            return Err(DbError::security(
                kind,
                format!("{kind} is not a read-only statement"),
            ));
        }
    }
    Ok(())
}

fn parser_dialect(engine: EngineType) -> Box<dyn Dialect> {
    match engine {
        EngineType::PostgreSQL => Box::new(PostgreSqlDialect {}),
        EngineType::MySQL => Box::new(MySqlDialect {}),
        EngineType::SQLite => Box::new(SQLiteDialect {}),
        EngineType::MsSql => Box::new(MsSqlDialect {}),
        EngineType::Snowflake => Box::new(SnowflakeDialect {}),
        EngineType::BigQuery => Box::new(BigQueryDialect {}),
        EngineType::ClickHouse => Box::new(ClickHouseDialect {}),
        EngineType::Oracle | EngineType::MongoDB => Box::new(GenericDialect {}),
    }
}

/// `None` for read-only statements, otherwise a label for the rejection.
fn write_kind(statement: &Statement) -> Option<&'static str> {
    match statement {
        Statement::Query(_)
        | Statement::ExplainTable { .. }
        | Statement::ShowTables { .. }
        | Statement::ShowViews { .. }
        | Statement::ShowObjects(_)
        | Statement::ShowCharset(_)
        | Statement::ShowColumns { .. }
        | Statement::ShowDatabases { .. }
        | Statement::ShowSchemas { .. }
        | Statement::ShowCreate { .. }
        | Statement::ShowFunctions { .. }
        | Statement::ShowVariable { .. }
        | Statement::ShowVariables { .. }
        | Statement::ShowStatus { .. }
        | Statement::ShowCollation { .. } => None,
        Statement::Explain { statement, .. } => write_kind(statement),
        Statement::Insert(_) => Some("INSERT"),
        Statement::Update { .. } => Some("UPDATE"),
        Statement::Delete(_) => Some("DELETE"),
        Statement::Merge { .. } => Some("MERGE"),
        Statement::Copy { .. } => Some("COPY"),
        Statement::Set(_) => Some("SET"),
        Statement::Pragma { .. } => Some("PRAGMA"),
        Statement::AttachDatabase { .. } => Some("ATTACH"),
        _ => Some("UNRECOGNIZED"),
    }
}

struct Normalized {
    /// Comments removed, whitespace outside quotes collapsed.
    text: String,
    /// Same as `text` with every quoted run replaced by `?`.
    skeleton: String,
}

/// Strip `--`, `/* */` (and `#` for MySQL) comments and collapse whitespace,
/// leaving quoted strings and identifiers untouched.
fn normalize(sql: &str, hash_comments: bool) -> DbResult<Normalized> {
    let chars: Vec<char> = sql.chars().collect();
    let mut text = String::with_capacity(sql.len());
    let mut skeleton = String::with_capacity(sql.len());
    let mut pending_space = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        if (c == '-' && next == Some('-')) || (c == '#' && hash_comments) {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
            pending_space = true;
            continue;
        }

        if c == '/' && next == Some('*') {
            let mut j = i + 2;
            while j + 1 < chars.len() && !(chars[j] == '*' && chars[j + 1] == '/') {
                j += 1;
            }
            if j + 1 >= chars.len() {
                return Err(DbError::security("COMMENT", "Unterminated block comment"));
            }
            i = j + 2;
            pending_space = true;
            continue;
        }

        if c.is_whitespace() {
            pending_space = true;
            i += 1;
            continue;
        }

        if pending_space && !text.is_empty() {
            text.push(' ');
            skeleton.push(' ');
        }
        pending_space = false;

        if matches!(c, '\'' | '"' | '`') {
            let end = closing_quote(&chars, i, hash_comments)
                .ok_or_else(|| DbError::security("QUOTE", "Unterminated quoted text"))?;
            text.extend(&chars[i..=end]);
            skeleton.push('?');
            i = end + 1;
            continue;
        }

        text.push(c);
        skeleton.push(c);
        i += 1;
    }

    Ok(Normalized { text, skeleton })
}

/// Index of the quote closing the one at `start`. A doubled quote is an
/// escaped quote; MySQL also escapes with a backslash.
fn closing_quote(chars: &[char], start: usize, backslash_escapes: bool) -> Option<usize> {
    let quote = chars[start];
    let mut i = start + 1;
    while i < chars.len() {
        let c = chars[i];
        if backslash_escapes && c == '\\' && quote != '`' {
            i += 2;
            continue;
        }
        if c == quote {
            if chars.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return Some(i);
        }
        i += 1;
    }
    None
}

fn words(s: &str) -> impl Iterator<Item = &str> {
    s.split(|c: char| !is_word_char(c))
        .filter(|w| !w.is_empty())
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Words of `s` with their byte offsets.
fn word_spans(s: &str) -> Vec<(usize, &str)> {
    let mut spans = Vec::new();
    let mut start = None;
    for (i, c) in s.char_indices() {
        match (is_word_char(c), start) {
            (true, None) => start = Some(i),
            (false, Some(from)) => {
                spans.push((from, &s[from..i]));
                start = None;
            }
            _ => {}
        }
    }
    if let Some(from) = start {
        spans.push((from, &s[from..]));
    }
    spans
}

/// First mutating keyword that opens a statement inside a `WITH` or
/// `EXPLAIN` skeleton.
///
/// A keyword opens a statement when it follows a parenthesis (a CTE body or
/// the statement after one) or only `EXPLAIN` options. A keyword followed by
/// `(` is a function call and never counts.
fn embedded_write(skeleton: &str) -> Option<&str> {
    let spans = word_spans(skeleton);
    let mut options_only = true;
    for (idx, &(start, word)) in spans.iter().enumerate() {
        let end = start + word.len();
        let before = skeleton[..start].trim_end().chars().last();
        let after = skeleton[end..].trim_start().chars().next();
        let after_options = options_only && idx > 0 && before.is_some_and(is_word_char);

        if EMBEDDED_WRITE_WORDS.contains(&word)
            && after != Some('(')
            && (matches!(before, Some('(' | ')')) || after_options)
        {
            return Some(word);
        }
        options_only &= EXPLAIN_OPTION_WORDS.contains(&word);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const PG: EngineType = EngineType::PostgreSQL;

    fn rejected_rule(sql: &str, engine: EngineType) -> String {
        match validate_readonly(sql, engine) {
            Err(DbError::SecurityValidation { rule, .. }) => rule,
            other => panic!("expected rejection for {sql:?}, got {other:?}"),
        }
    }

    #[test]
    fn test_select_accepted() {
        let q = validate_readonly("SELECT id, name FROM users WHERE id = 1", PG).unwrap();
        assert_eq!(q.keyword, "SELECT");
        assert!(q.is_select());
        assert!(!q.has_row_limit());
    }

    #[test]
    fn test_comments_stripped_and_whitespace_collapsed() {
        let q = validate_readonly("/* top */ SELECT\n\t1 -- trailing\n", PG).unwrap();
        assert_eq!(q.sql, "SELECT 1");
    }

    #[test]
    fn test_quoted_whitespace_preserved() {
        let q = validate_readonly("SELECT 'a   b' AS x;", PG).unwrap();
        assert_eq!(q.sql, "SELECT 'a   b' AS x");
    }

    #[test]
    fn test_comment_does_not_hide_delete() {
        assert_eq!(rejected_rule("-- comment\n   DELETE FROM t", PG), "DELETE");
        assert_eq!(rejected_rule("/* x */delete from t", PG), "DELETE");
    }

    #[test]
    fn test_denylist_is_leading_keyword_not_substring() {
        assert!(validate_readonly("SELECT updated_at, deleted FROM t", PG).is_ok());
        assert!(validate_readonly("SELECT 'DROP TABLE x' AS s", PG).is_ok());
    }

    #[test]
    fn test_multiple_statements_rejected() {
        assert_eq!(
            rejected_rule("SELECT 1; DROP TABLE x;", PG),
            "MULTIPLE_STATEMENTS"
        );
        assert_eq!(rejected_rule("SELECT 1; SELECT 2", PG), "MULTIPLE_STATEMENTS");
    }

    #[test]
    fn test_semicolon_inside_literal_is_one_statement() {
        assert!(validate_readonly("SELECT 'a;b'; ", PG).is_ok());
    }

    #[test]
    fn test_meta_commands_rejected() {
        assert_eq!(rejected_rule("\\copy t to '/tmp/x'", PG), "\\");
        assert_eq!(rejected_rule(".tables", EngineType::SQLite), ".");
        assert_eq!(
            rejected_rule("SELECT * FROM t INTO OUTFILE '/tmp/x'", EngineType::MySQL),
            "INTO"
        );
        assert_eq!(rejected_rule("SELECT pg_read_file('/etc/passwd')", PG), "PG_READ_FILE");
    }

    #[test]
    fn test_select_into_rejected() {
        assert_eq!(rejected_rule("SELECT * INTO backup FROM users", PG), "INTO");
    }

    #[test]
    fn test_engine_narrows_accepted_set() {
        assert!(validate_readonly("DESCRIBE users", EngineType::MySQL).is_ok());
        assert_eq!(rejected_rule("DESCRIBE users", EngineType::SQLite), "DESCRIBE");
        assert_eq!(rejected_rule("SHOW TABLES", EngineType::SQLite), "SHOW");
        assert_eq!(rejected_rule("PRAGMA table_info(t)", EngineType::SQLite), "PRAGMA");
    }

    #[test]
    fn test_with_body_write_rejected() {
        let sql = "WITH gone AS (DELETE FROM t RETURNING *) SELECT * FROM gone";
        assert_eq!(rejected_rule(sql, PG), "DELETE");
        assert!(validate_readonly("WITH a AS (SELECT 1 AS x) SELECT x FROM a", PG).is_ok());
    }

    #[test]
    fn test_write_keyword_as_function_or_column_accepted() {
        let sql = "WITH a AS (SELECT replace(name, 'a', 'b') AS n FROM t) SELECT n FROM a";
        assert!(validate_readonly(sql, PG).is_ok());
        assert!(validate_readonly("EXPLAIN SELECT replace(name, 'x', 'y') FROM t", PG).is_ok());
        assert!(validate_readonly("SELECT program FROM courses", PG).is_ok());
        assert_eq!(embedded_write("WITH A AS (SELECT 1) DELETE FROM T"), Some("DELETE"));
        assert_eq!(embedded_write("EXPLAIN (ANALYZE) UPDATE T SET A = 1"), Some("UPDATE"));
        assert_eq!(embedded_write("EXPLAIN QUERY PLAN SELECT 1"), None);
    }

    #[test]
    fn test_read_only_show_variants_accepted() {
        assert!(validate_readonly("SHOW CHARSET", EngineType::MySQL).is_ok());
        assert!(validate_readonly("SHOW VIEWS", EngineType::Snowflake).is_ok());
    }

    #[test]
    fn test_explain_of_write_rejected() {
        assert_eq!(rejected_rule("EXPLAIN UPDATE t SET a = 1", PG), "UPDATE");
        assert!(validate_readonly("EXPLAIN SELECT 1", PG).is_ok());
    }

    #[test]
    fn test_empty_and_unterminated_rejected() {
        assert_eq!(rejected_rule("  -- only a comment", PG), "EMPTY");
        assert_eq!(rejected_rule("SELECT 'open", PG), "QUOTE");
        assert_eq!(rejected_rule("SELECT 1 /* open", PG), "COMMENT");
    }

    #[test]
    fn test_mysql_hash_comment_and_backslash_escape() {
        let q = validate_readonly("# note\nSELECT 'it\\'s'", EngineType::MySQL).unwrap();
        assert_eq!(q.sql, "SELECT 'it\\'s'");
    }

    #[test]
    fn test_parenthesized_select_accepted() {
        assert!(validate_readonly("(SELECT 1) UNION (SELECT 2)", PG).is_ok());
    }

    #[test]
    fn test_hint_helpers() {
        let q = validate_readonly("SELECT * FROM t LIMIT 5", PG).unwrap();
        assert!(q.selects_star());
        assert!(q.has_row_limit());
    }

    #[test]
    fn test_every_denylisted_keyword_rejected_any_case() {
        for keyword in DENIED_LEADING_KEYWORDS {
            for sql in [
                format!("{keyword} something"),
                format!("  {} something", keyword.to_lowercase()),
                format!("/* c */ {keyword} x"),
            ] {
                for engine in EngineType::ALL {
                    assert!(
                        matches!(
                            validate_readonly(&sql, engine),
                            Err(DbError::SecurityValidation { .. })
                        ),
                        "{sql:?} should be rejected for {engine}"
                    );
                }
            }
        }
    }
}
