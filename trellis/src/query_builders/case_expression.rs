//! Conditional projections: `CASE WHEN ... THEN ... ELSE ... END AS alias`
//!
//! [`CaseBuilder`] records branches and renders them once. [`CaseBuilder::end_case`]
//! consumes the builder, so a finished expression cannot gain branches:
//!
//! ```compile_fail
//! use sea_orm::DatabaseBackend;
//! use trellis::{BackendSanitizer, CaseBuilder};
//!
//! let sanitizer = BackendSanitizer::new(DatabaseBackend::Postgres);
//! let builder = CaseBuilder::new(&sanitizer).when("total > 100", "large");
//! let expression = builder.end_case("size").unwrap();
//! let builder = builder.when("total > 10", "medium");
//! ```

use std::fmt;

use super::predicate::{Filter, Predicate, PredicateTranslator, SqlPredicateTranslator};
use crate::codec::FieldValue;
use crate::sanitizer::Sanitizer;
use crate::types::{Result, TrellisError};

/// Condition of one WHEN branch
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Trusted SQL, emitted verbatim
    Raw(String),
    Predicate(Predicate),
}

impl From<&str> for Condition {
    fn from(sql: &str) -> Self {
        Self::Raw(sql.to_string())
    }
}

impl From<String> for Condition {
    fn from(sql: String) -> Self {
        Self::Raw(sql)
    }
}

impl From<Predicate> for Condition {
    fn from(predicate: Predicate) -> Self {
        Self::Predicate(predicate)
    }
}

impl From<Filter> for Condition {
    fn from(filter: Filter) -> Self {
        Self::Predicate(filter.into())
    }
}

pub struct CaseBuilder<'a> {
    sanitizer: &'a dyn Sanitizer,
    translator: Option<&'a dyn PredicateTranslator>,
    branches: Vec<(Condition, FieldValue)>,
    default: Option<FieldValue>,
}

impl<'a> CaseBuilder<'a> {
    pub fn new(sanitizer: &'a dyn Sanitizer) -> Self {
        Self {
            sanitizer,
            translator: None,
            branches: Vec::new(),
            default: None,
        }
    }

    /// Translate structured conditions with `translator` instead of the
    /// sanitizer-backed SQL translator
    pub fn with_translator(mut self, translator: &'a dyn PredicateTranslator) -> Self {
        self.translator = Some(translator);
        self
    }

    pub fn when(mut self, condition: impl Into<Condition>, result: impl Into<FieldValue>) -> Self {
        self.branches.push((condition.into(), result.into()));
        self
    }

    /// ELSE branch; the last call wins
    pub fn otherwise(mut self, result: impl Into<FieldValue>) -> Self {
        self.default = Some(result.into());
        self
    }

    pub fn end_case(self, alias: &str) -> Result<CaseExpression> {
        let requested = alias;
        let alias = alias.trim();
        if alias.is_empty() {
            return Err(TrellisError::validation(requested, "case expression alias is empty"));
        }
        if self.branches.is_empty() {
            return Err(TrellisError::validation(
                alias,
                "case expression needs at least one WHEN branch",
            ));
        }

        let fallback = SqlPredicateTranslator::new(self.sanitizer);
        let translator: &dyn PredicateTranslator = match self.translator {
            Some(translator) => translator,
            None => &fallback,
        };

        let mut expression = String::from("CASE");
        for (condition, result) in &self.branches {
            let condition = match condition {
                Condition::Raw(sql) if sql.trim().is_empty() => {
                    return Err(TrellisError::validation(alias, "WHEN condition is empty"));
                }
                Condition::Raw(sql) => sql.trim().to_string(),
                Condition::Predicate(predicate) => translator.translate(predicate)?,
            };
            expression.push_str(&format!(
                " WHEN {} THEN {}",
                condition,
                self.sanitizer.format_literal(result)
            ));
        }
        if let Some(default) = &self.default {
            expression.push_str(&format!(" ELSE {}", self.sanitizer.format_literal(default)));
        }
        expression.push_str(" END");

        Ok(CaseExpression {
            expression,
            alias: self.sanitizer.sanitize_identifier(alias),
        })
    }
}

/// A finished CASE expression and its (sanitized) alias
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseExpression {
    pub expression: String,
    pub alias: String,
}

impl CaseExpression {
    pub fn to_sql(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for CaseExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} AS {}", self.expression, self.alias)
    }
}

/// Extra select-list items appended after the compiled columns
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Projection {
    items: Vec<String>,
}

impl Projection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn case(mut self, expression: CaseExpression) -> Self {
        self.items.push(expression.to_sql());
        self
    }

    /// Trusted select-list item, emitted verbatim
    pub fn raw(mut self, sql: impl Into<String>) -> Self {
        self.items.push(sql.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn to_sql(&self) -> String {
        self.items.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sanitizer::BackendSanitizer;
    use sea_orm::DatabaseBackend;

    fn pg() -> BackendSanitizer {
        BackendSanitizer::new(DatabaseBackend::Postgres)
    }

    #[test]
    fn test_raw_branches_and_default() {
        let sanitizer = pg();
        let case = CaseBuilder::new(&sanitizer)
            .when("c1", "A")
            .when("c2", "B")
            .otherwise("C")
            .end_case("bucket")
            .unwrap();
        assert_eq!(
            case.to_sql(),
            "CASE WHEN c1 THEN 'A' WHEN c2 THEN 'B' ELSE 'C' END AS bucket"
        );
    }

    #[test]
    fn test_last_otherwise_wins_and_else_is_optional() {
        let sanitizer = pg();
        let case = CaseBuilder::new(&sanitizer)
            .when("x > 1", 1)
            .otherwise(2)
            .otherwise(FieldValue::Null)
            .end_case("n")
            .unwrap();
        assert_eq!(case.expression, "CASE WHEN x > 1 THEN 1 ELSE NULL END");

        let case = CaseBuilder::new(&sanitizer)
            .when("x > 1", true)
            .end_case("flag")
            .unwrap();
        assert_eq!(case.to_sql(), "CASE WHEN x > 1 THEN true END AS flag");
    }

    #[test]
    fn test_structured_conditions_use_translator() {
        let sanitizer = pg();
        let case = CaseBuilder::new(&sanitizer)
            .when(Filter::gte("t0.total", 1000), "gold")
            .when(
                Predicate::from(Filter::gte("t0.total", 100)).and(Filter::equals("t0.status", "paid")),
                "silver",
            )
            .otherwise("bronze")
            .end_case("tier")
            .unwrap();
        assert_eq!(
            case.expression,
            "CASE WHEN t0.total >= 1000 THEN 'gold' \
             WHEN (t0.total >= 100 AND t0.status = 'paid') THEN 'silver' ELSE 'bronze' END"
        );
    }

    struct Fixed;

    impl PredicateTranslator for Fixed {
        fn translate(&self, _predicate: &Predicate) -> Result<String> {
            Ok("CUSTOM".to_string())
        }
    }

    #[test]
    fn test_custom_translator() {
        let sanitizer = pg();
        let case = CaseBuilder::new(&sanitizer)
            .with_translator(&Fixed)
            .when(Filter::is_null("a"), "x")
            .end_case("c")
            .unwrap();
        assert_eq!(case.expression, "CASE WHEN CUSTOM THEN 'x' END");
    }

    #[test]
    fn test_alias_is_validated_and_sanitized() {
        let sanitizer = pg();
        match CaseBuilder::new(&sanitizer).when("a", 1).end_case("  ") {
            Err(TrellisError::Validation { path, reason }) => {
                assert_eq!(path, "  ");
                assert!(reason.contains("alias"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(matches!(
            CaseBuilder::new(&sanitizer).otherwise(1).end_case("n"),
            Err(TrellisError::Validation { .. })
        ));
        let case = CaseBuilder::new(&sanitizer).when("a", 1).end_case("Order Size").unwrap();
        assert_eq!(case.alias, "\"Order Size\"");
    }

    #[test]
    fn test_dialect_timestamp_results() {
        use chrono::NaiveDate;

        let at = NaiveDate::from_ymd_opt(2024, 1, 31)
            .and_then(|d| d.and_hms_opt(12, 0, 0))
            .expect("valid timestamp");
        let mysql = BackendSanitizer::new(DatabaseBackend::MySql);
        let case = CaseBuilder::new(&mysql)
            .when("shipped", at)
            .end_case("eta")
            .unwrap();
        assert_eq!(
            case.expression,
            "CASE WHEN shipped THEN CAST('2024-01-31 12:00:00' AS DATETIME(6)) END"
        );
    }

    #[test]
    fn test_projection_collects_cases() {
        let sanitizer = pg();
        let case = CaseBuilder::new(&sanitizer).when("a", "b").end_case("c").unwrap();
        let projection = Projection::new().case(case).raw("count(*) AS total");
        assert_eq!(projection.len(), 2);
        assert_eq!(
            projection.to_sql(),
            "CASE WHEN a THEN 'b' END AS c, count(*) AS total"
        );
    }
}
