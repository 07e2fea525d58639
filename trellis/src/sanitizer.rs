//! Identifier quoting and SQL literal formatting per backend

use once_cell::sync::Lazy;
use regex::Regex;
use sea_orm::sea_query::{MysqlQueryBuilder, PostgresQueryBuilder, QueryBuilder, SqliteQueryBuilder};
use sea_orm::{DatabaseBackend, Value};
use std::collections::HashSet;

use crate::codec::FieldValue;

static BARE_IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("static regex"));

static RESERVED_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "all", "and", "as", "asc", "between", "by", "case", "check", "column", "constraint",
        "create", "cross", "default", "delete", "desc", "distinct", "drop", "else", "end",
        "exists", "false", "from", "full", "group", "having", "in", "index", "inner", "insert",
        "into", "is", "join", "key", "left", "like", "limit", "not", "null", "offset", "on",
        "or", "order", "outer", "primary", "references", "right", "select", "set", "table",
        "then", "to", "true", "union", "unique", "update", "user", "using", "values", "when",
        "where", "with",
    ]
    .into_iter()
    .collect()
});

/// Renders identifiers and literals for one SQL dialect
pub trait Sanitizer: Send + Sync {
    /// Return the identifier as it must appear in SQL text, quoted if needed
    fn sanitize_identifier(&self, identifier: &str) -> String;

    /// Render a database value as a SQL literal
    fn format_value(&self, value: &Value) -> String;

    fn quote_string(&self, text: &str) -> String {
        format!("'{}'", text.replace('\'', "''"))
    }

    /// Timestamp literal with an explicit cast so comparisons stay typed
    fn timestamp_literal(&self, text: &str, with_time_zone: bool) -> String;

    /// Render a host value as a SQL literal
    fn format_literal(&self, value: &FieldValue) -> String {
        match value {
            FieldValue::Null => "NULL".to_string(),
            FieldValue::String(s) | FieldValue::Enum(s) => self.quote_string(s),
            FieldValue::Char(c) => self.quote_string(&c.to_string()),
            FieldValue::Bool(b) => b.to_string(),
            FieldValue::DateTime(n) => {
                self.timestamp_literal(&n.format(TIMESTAMP_FORMAT).to_string(), false)
            }
            FieldValue::DateTimeUtc(d) => self.timestamp_literal(
                &d.format(TIMESTAMP_TZ_FORMAT).to_string(),
                true,
            ),
            FieldValue::DateTimeOffset(d) => self.timestamp_literal(
                &d.format(TIMESTAMP_TZ_FORMAT).to_string(),
                true,
            ),
            other => self.format_value(&other.to_db_value()),
        }
    }

    /// Sanitize each part of a possibly qualified name like `t1.created_at`
    fn sanitize_qualified(&self, name: &str) -> String {
        name.split('.')
            .map(|part| self.sanitize_identifier(part))
            .collect::<Vec<_>>()
            .join(".")
    }
}

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";
const TIMESTAMP_TZ_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f%:z";

/// Sanitizer for the backends sea-orm speaks
#[derive(Debug, Clone, Copy)]
pub struct BackendSanitizer {
    backend: DatabaseBackend,
}

impl BackendSanitizer {
    pub fn new(backend: DatabaseBackend) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> DatabaseBackend {
        self.backend
    }

    fn needs_quoting(&self, identifier: &str) -> bool {
        if !BARE_IDENTIFIER.is_match(identifier) {
            return true;
        }
        if RESERVED_WORDS.contains(identifier.to_ascii_lowercase().as_str()) {
            return true;
        }
        // Postgres folds unquoted names to lower case
        matches!(self.backend, DatabaseBackend::Postgres)
            && identifier.chars().any(|c| c.is_ascii_uppercase())
    }
}

impl Sanitizer for BackendSanitizer {
    fn sanitize_identifier(&self, identifier: &str) -> String {
        if !self.needs_quoting(identifier) {
            return identifier.to_string();
        }
        match self.backend {
            DatabaseBackend::MySql => format!("`{}`", identifier.replace('`', "``")),
            _ => format!("\"{}\"", identifier.replace('"', "\"\"")),
        }
    }

    fn format_value(&self, value: &Value) -> String {
        match self.backend {
            DatabaseBackend::MySql => MysqlQueryBuilder.value_to_string(value),
            DatabaseBackend::Sqlite => SqliteQueryBuilder.value_to_string(value),
            _ => PostgresQueryBuilder.value_to_string(value),
        }
    }

    fn quote_string(&self, text: &str) -> String {
        match self.backend {
            DatabaseBackend::MySql => {
                format!("'{}'", text.replace('\\', "\\\\").replace('\'', "''"))
            }
            _ => format!("'{}'", text.replace('\'', "''")),
        }
    }

    fn timestamp_literal(&self, text: &str, with_time_zone: bool) -> String {
        let quoted = self.quote_string(text);
        match self.backend {
            DatabaseBackend::MySql => format!("CAST({} AS DATETIME(6))", quoted),
            DatabaseBackend::Sqlite => format!("datetime({})", quoted),
            _ if with_time_zone => format!("{}::timestamptz", quoted),
            _ => format!("{}::timestamp", quoted),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_identifiers_stay_bare() {
        let pg = BackendSanitizer::new(DatabaseBackend::Postgres);
        assert_eq!(pg.sanitize_identifier("customer_id"), "customer_id");
        assert_eq!(pg.sanitize_identifier("t1"), "t1");
    }

    #[test]
    fn test_unsafe_identifiers_are_quoted() {
        let pg = BackendSanitizer::new(DatabaseBackend::Postgres);
        assert_eq!(pg.sanitize_identifier("order"), "\"order\"");
        assert_eq!(pg.sanitize_identifier("CreatedAt"), "\"CreatedAt\"");
        assert_eq!(pg.sanitize_identifier("a\"b"), "\"a\"\"b\"");

        let mysql = BackendSanitizer::new(DatabaseBackend::MySql);
        assert_eq!(mysql.sanitize_identifier("CreatedAt"), "CreatedAt");
        assert_eq!(mysql.sanitize_identifier("my col"), "`my col`");

        let sqlite = BackendSanitizer::new(DatabaseBackend::Sqlite);
        assert_eq!(sqlite.sanitize_identifier("group"), "\"group\"");
    }

    #[test]
    fn test_string_literals_double_quotes() {
        let pg = BackendSanitizer::new(DatabaseBackend::Postgres);
        assert_eq!(pg.quote_string("O'Brien"), "'O''Brien'");
        let mysql = BackendSanitizer::new(DatabaseBackend::MySql);
        assert_eq!(mysql.quote_string(r"a\b"), r"'a\\b'");
    }

    #[test]
    fn test_timestamp_literals_carry_a_cast() {
        let text = "2024-01-02 03:04:05";
        assert_eq!(
            BackendSanitizer::new(DatabaseBackend::Postgres).timestamp_literal(text, false),
            "'2024-01-02 03:04:05'::timestamp"
        );
        assert_eq!(
            BackendSanitizer::new(DatabaseBackend::Postgres).timestamp_literal(text, true),
            "'2024-01-02 03:04:05'::timestamptz"
        );
        assert_eq!(
            BackendSanitizer::new(DatabaseBackend::MySql).timestamp_literal(text, false),
            "CAST('2024-01-02 03:04:05' AS DATETIME(6))"
        );
        assert_eq!(
            BackendSanitizer::new(DatabaseBackend::Sqlite).timestamp_literal(text, false),
            "datetime('2024-01-02 03:04:05')"
        );
    }

    #[test]
    fn test_host_values_render_as_literals() {
        use chrono::NaiveDate;

        let pg = BackendSanitizer::new(DatabaseBackend::Postgres);
        assert_eq!(pg.format_literal(&FieldValue::Null), "NULL");
        assert_eq!(pg.format_literal(&FieldValue::from("A")), "'A'");
        assert_eq!(pg.format_literal(&FieldValue::Enum("Draft".into())), "'Draft'");
        assert_eq!(pg.format_literal(&FieldValue::Bool(false)), "false");
        assert_eq!(pg.format_literal(&FieldValue::Int(3)), "3");

        let at = NaiveDate::from_ymd_opt(2024, 5, 6)
            .and_then(|d| d.and_hms_opt(7, 8, 9))
            .expect("valid timestamp");
        assert_eq!(
            pg.format_literal(&FieldValue::DateTime(at)),
            "'2024-05-06 07:08:09'::timestamp"
        );
        assert_eq!(
            pg.format_literal(&FieldValue::DateTimeUtc(at.and_utc())),
            "'2024-05-06 07:08:09+00:00'::timestamptz"
        );
    }

    #[test]
    fn test_qualified_names() {
        let pg = BackendSanitizer::new(DatabaseBackend::Postgres);
        assert_eq!(pg.sanitize_qualified("t1.user"), "t1.\"user\"");
    }

    #[test]
    fn test_numbers_render_through_query_builder() {
        let pg = BackendSanitizer::new(DatabaseBackend::Postgres);
        assert_eq!(pg.format_value(&Value::from(42i64)), "42");
        assert_eq!(pg.format_value(&Value::Int(None)), "NULL");
    }
}
