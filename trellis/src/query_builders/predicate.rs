use crate::codec::FieldValue;
use crate::sanitizer::Sanitizer;
use crate::types::Result;

/// Field operations for filtering
#[derive(Debug, Clone, PartialEq)]
pub enum FieldOp {
    Equals(FieldValue),
    NotEquals(FieldValue),
    Gt(FieldValue),
    Lt(FieldValue),
    Gte(FieldValue),
    Lte(FieldValue),
    InVec(Vec<FieldValue>),
    NotInVec(Vec<FieldValue>),
    Contains(String),
    StartsWith(String),
    EndsWith(String),
    IsNull,
    IsNotNull,
}

/// One condition on one column, optionally qualified by a table alias
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub operation: FieldOp,
}

impl Filter {
    pub fn new(field: impl Into<String>, operation: FieldOp) -> Self {
        Self {
            field: field.into(),
            operation,
        }
    }

    pub fn equals(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self::new(field, FieldOp::Equals(value.into()))
    }

    pub fn not_equals(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self::new(field, FieldOp::NotEquals(value.into()))
    }

    pub fn gt(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self::new(field, FieldOp::Gt(value.into()))
    }

    pub fn lt(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self::new(field, FieldOp::Lt(value.into()))
    }

    pub fn gte(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self::new(field, FieldOp::Gte(value.into()))
    }

    pub fn lte(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self::new(field, FieldOp::Lte(value.into()))
    }

    pub fn in_vec<V: Into<FieldValue>>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Self::new(field, FieldOp::InVec(values.into_iter().map(Into::into).collect()))
    }

    pub fn not_in_vec<V: Into<FieldValue>>(
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Self::new(field, FieldOp::NotInVec(values.into_iter().map(Into::into).collect()))
    }

    pub fn contains(field: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(field, FieldOp::Contains(text.into()))
    }

    pub fn starts_with(field: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(field, FieldOp::StartsWith(text.into()))
    }

    pub fn ends_with(field: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(field, FieldOp::EndsWith(text.into()))
    }

    pub fn is_null(field: impl Into<String>) -> Self {
        Self::new(field, FieldOp::IsNull)
    }

    pub fn is_not_null(field: impl Into<String>) -> Self {
        Self::new(field, FieldOp::IsNotNull)
    }
}

/// Boolean combination of filters
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Filter(Filter),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    pub fn and(self, other: impl Into<Predicate>) -> Self {
        match self {
            Self::And(mut items) => {
                items.push(other.into());
                Self::And(items)
            }
            first => Self::And(vec![first, other.into()]),
        }
    }

    pub fn or(self, other: impl Into<Predicate>) -> Self {
        match self {
            Self::Or(mut items) => {
                items.push(other.into());
                Self::Or(items)
            }
            first => Self::Or(vec![first, other.into()]),
        }
    }

    pub fn negate(self) -> Self {
        Self::Not(Box::new(self))
    }
}

impl From<Filter> for Predicate {
    fn from(filter: Filter) -> Self {
        Self::Filter(filter)
    }
}

/// Turns a structured predicate into SQL condition text
pub trait PredicateTranslator {
    fn translate(&self, predicate: &Predicate) -> Result<String>;
}

/// Renders predicates with a sanitizer's identifier and literal rules
pub struct SqlPredicateTranslator<'a> {
    sanitizer: &'a dyn Sanitizer,
}

impl<'a> SqlPredicateTranslator<'a> {
    pub fn new(sanitizer: &'a dyn Sanitizer) -> Self {
        Self { sanitizer }
    }

    fn filter(&self, filter: &Filter) -> String {
        let column = self.sanitizer.sanitize_qualified(&filter.field);
        let literal = |value: &FieldValue| self.sanitizer.format_literal(value);
        let list = |values: &[FieldValue]| {
            values.iter().map(|v| literal(v)).collect::<Vec<_>>().join(", ")
        };

        match &filter.operation {
            FieldOp::Equals(FieldValue::Null) => format!("{} IS NULL", column),
            FieldOp::NotEquals(FieldValue::Null) => format!("{} IS NOT NULL", column),
            FieldOp::Equals(v) => format!("{} = {}", column, literal(v)),
            FieldOp::NotEquals(v) => format!("{} <> {}", column, literal(v)),
            FieldOp::Gt(v) => format!("{} > {}", column, literal(v)),
            FieldOp::Lt(v) => format!("{} < {}", column, literal(v)),
            FieldOp::Gte(v) => format!("{} >= {}", column, literal(v)),
            FieldOp::Lte(v) => format!("{} <= {}", column, literal(v)),
            FieldOp::InVec(values) if values.is_empty() => "1 = 0".to_string(),
            FieldOp::InVec(values) => format!("{} IN ({})", column, list(values)),
            FieldOp::NotInVec(values) if values.is_empty() => "1 = 1".to_string(),
            FieldOp::NotInVec(values) => format!("{} NOT IN ({})", column, list(values)),
            FieldOp::Contains(text) => self.like(&column, &format!("%{}%", escape_like(text))),
            FieldOp::StartsWith(text) => self.like(&column, &format!("{}%", escape_like(text))),
            FieldOp::EndsWith(text) => self.like(&column, &format!("%{}", escape_like(text))),
            FieldOp::IsNull => format!("{} IS NULL", column),
            FieldOp::IsNotNull => format!("{} IS NOT NULL", column),
        }
    }

    fn like(&self, column: &str, pattern: &str) -> String {
        format!(
            "{} LIKE {} ESCAPE '{}'",
            column,
            self.sanitizer.quote_string(pattern),
            LIKE_ESCAPE
        )
    }

    fn render(&self, predicate: &Predicate) -> String {
        match predicate {
            Predicate::Filter(filter) => self.filter(filter),
            Predicate::And(items) => self.group(items, " AND ", "1 = 1"),
            Predicate::Or(items) => self.group(items, " OR ", "1 = 0"),
            Predicate::Not(inner) => format!("NOT ({})", self.render(inner)),
        }
    }

    fn group(&self, items: &[Predicate], separator: &str, empty: &str) -> String {
        match items {
            [] => empty.to_string(),
            [single] => self.render(single),
            many => format!(
                "({})",
                many.iter()
                    .map(|p| self.render(p))
                    .collect::<Vec<_>>()
                    .join(separator)
            ),
        }
    }
}

impl PredicateTranslator for SqlPredicateTranslator<'_> {
    fn translate(&self, predicate: &Predicate) -> Result<String> {
        Ok(self.render(predicate))
    }
}

const LIKE_ESCAPE: char = '!';

fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '!' | '%' | '_') {
            escaped.push(LIKE_ESCAPE);
        }
        escaped.push(c);
    }
    escaped
}
