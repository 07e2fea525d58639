//! Value codec
//!
//! Converts host values ([`FieldValue`]) to and from database column values
//! ([`sea_orm::Value`]), directed by the host type ([`FieldType`]) and the
//! per-property storage flags ([`PropertyMeta`]). Also maps host types to the
//! canonical column type names of each backend.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use sea_orm::{DatabaseBackend, Value};
use serde_json::Value as Json;
use std::str::FromStr;
use uuid::Uuid;

use crate::entity_metadata::ColumnMetadata;
use crate::types::TrellisError;

/// Codec-level failure, wrapped into [`TrellisError::Conversion`] together with
/// the property and column it happened on.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConversionError {
    #[error("cannot convert {from} to {to}")]
    Incompatible { from: String, to: String },

    #[error("cannot parse '{text}' as {to}")]
    InvalidText { text: String, to: String },

    #[error("'{value}' is not a variant of enum {enum_name}")]
    UnknownEnumVariant { enum_name: String, value: String },

    #[error("{value} is out of range for {to}")]
    OutOfRange { value: String, to: String },

    #[error("invalid JSON: {0}")]
    Json(String),

    #[error("driver error: {0}")]
    Driver(String),
}

/// Host-side type of a property
#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    Bool,
    SmallInt,
    Int,
    BigInt,
    Float,
    Double,
    Decimal,
    String,
    Char,
    Bytes,
    /// Timezone-naive timestamp
    DateTime,
    DateTimeUtc,
    DateTimeOffset,
    Date,
    Time,
    Duration,
    Uuid,
    Enum(EnumType),
    /// Opaque structured value (records, maps), stored as JSON
    Json,
    Array(Box<FieldType>),
    Nullable(Box<FieldType>),
}

impl FieldType {
    pub fn nullable(inner: FieldType) -> Self {
        Self::Nullable(Box::new(inner))
    }

    pub fn array(element: FieldType) -> Self {
        Self::Array(Box::new(element))
    }

    /// Strip every `Nullable` wrapper
    pub fn unwrap_nullable(&self) -> &FieldType {
        let mut current = self;
        while let Self::Nullable(inner) = current {
            current = inner;
        }
        current
    }

    pub fn is_nullable(&self) -> bool {
        matches!(self, Self::Nullable(_))
    }

    /// Primitive, string, decimal, date/time family, uuid and enums are simple.
    /// Everything else is stored as JSON.
    pub fn is_simple(&self) -> bool {
        !matches!(self.unwrap_nullable(), Self::Json | Self::Array(_))
    }

    pub fn label(&self) -> String {
        match self {
            Self::Bool => "bool".into(),
            Self::SmallInt => "smallint".into(),
            Self::Int => "int".into(),
            Self::BigInt => "bigint".into(),
            Self::Float => "float".into(),
            Self::Double => "double".into(),
            Self::Decimal => "decimal".into(),
            Self::String => "string".into(),
            Self::Char => "char".into(),
            Self::Bytes => "bytes".into(),
            Self::DateTime => "datetime".into(),
            Self::DateTimeUtc => "datetime (utc)".into(),
            Self::DateTimeOffset => "datetime (offset)".into(),
            Self::Date => "date".into(),
            Self::Time => "time".into(),
            Self::Duration => "duration".into(),
            Self::Uuid => "uuid".into(),
            Self::Enum(ty) => format!("enum {}", ty.name),
            Self::Json => "json".into(),
            Self::Array(element) => format!("array of {}", element.label()),
            Self::Nullable(inner) => format!("nullable {}", inner.label()),
        }
    }
}

/// Enum type descriptor: variant names and their integer discriminants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnumType {
    pub name: &'static str,
    pub variants: &'static [EnumVariant],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnumVariant {
    pub name: &'static str,
    pub value: i64,
}

impl EnumType {
    pub const fn new(name: &'static str, variants: &'static [EnumVariant]) -> Self {
        Self { name, variants }
    }

    /// Exact match first, then case-insensitive
    pub fn by_name(&self, name: &str) -> Option<&EnumVariant> {
        self.variants
            .iter()
            .find(|v| v.name == name)
            .or_else(|| self.variants.iter().find(|v| v.name.eq_ignore_ascii_case(name)))
    }

    pub fn by_value(&self, value: i64) -> Option<&EnumVariant> {
        self.variants.iter().find(|v| v.value == value)
    }
}

/// Property-level storage flags
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyMeta {
    /// Store enums as their discriminant instead of their name
    pub enum_as_integer: bool,
    /// The column keeps the offset; aware date-times are not normalized
    pub timezone_aware: bool,
    /// Store uuids as text
    pub uuid_as_string: bool,
    /// Bounded length for text columns
    pub max_length: Option<u32>,
}

/// Host-side value
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    SmallInt(i16),
    Int(i32),
    BigInt(i64),
    Float(f32),
    Double(f64),
    Decimal(Decimal),
    String(String),
    Char(char),
    Bytes(Vec<u8>),
    DateTime(NaiveDateTime),
    DateTimeUtc(DateTime<Utc>),
    DateTimeOffset(DateTime<FixedOffset>),
    Date(NaiveDate),
    Time(NaiveTime),
    Duration(Duration),
    Uuid(Uuid),
    /// Enum variant name
    Enum(String),
    Array(Vec<FieldValue>),
    Json(Json),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Untyped database value, used where no column type is known (SQL literals)
    pub fn to_db_value(&self) -> Value {
        match self {
            Self::Null => Value::String(None),
            Self::Bool(b) => Value::from(*b),
            Self::SmallInt(i) => Value::from(*i),
            Self::Int(i) => Value::from(*i),
            Self::BigInt(i) => Value::from(*i),
            Self::Float(f) => Value::from(*f),
            Self::Double(f) => Value::from(*f),
            Self::Decimal(d) => Value::from(*d),
            Self::String(s) => Value::from(s.clone()),
            Self::Char(c) => Value::from(*c),
            Self::Bytes(b) => Value::from(b.clone()),
            Self::DateTime(n) => Value::from(*n),
            Self::DateTimeUtc(d) => Value::from(*d),
            Self::DateTimeOffset(d) => Value::from(*d),
            Self::Date(d) => Value::from(*d),
            Self::Time(t) => Value::from(*t),
            Self::Duration(d) => match interval_text(d) {
                Ok(text) => Value::from(text),
                Err(_) => Value::String(None),
            },
            Self::Uuid(u) => Value::from(*u),
            Self::Enum(name) => Value::from(name.clone()),
            Self::Array(_) | Self::Json(_) => Value::from(self.to_json()),
        }
    }

    /// JSON rendering used for structured columns and assembled object graphs
    pub fn to_json(&self) -> Json {
        match self {
            Self::Null => Json::Null,
            Self::Bool(b) => Json::Bool(*b),
            Self::SmallInt(i) => Json::from(*i),
            Self::Int(i) => Json::from(*i),
            Self::BigInt(i) => Json::from(*i),
            Self::Float(f) => float_json(*f as f64),
            Self::Double(f) => float_json(*f),
            Self::Decimal(d) => Json::String(d.to_string()),
            Self::String(s) => Json::String(s.clone()),
            Self::Char(c) => Json::String(c.to_string()),
            Self::Bytes(bytes) => Json::Array(bytes.iter().map(|b| Json::from(*b)).collect()),
            Self::DateTime(n) => Json::String(n.format(NAIVE_ISO_FORMAT).to_string()),
            Self::DateTimeUtc(d) => Json::String(d.to_rfc3339()),
            Self::DateTimeOffset(d) => Json::String(d.to_rfc3339()),
            Self::Date(d) => Json::String(d.format("%Y-%m-%d").to_string()),
            Self::Time(t) => Json::String(t.format("%H:%M:%S%.f").to_string()),
            Self::Duration(d) => d.num_microseconds().map(Json::from).unwrap_or(Json::Null),
            Self::Uuid(u) => Json::String(u.to_string()),
            Self::Enum(name) => Json::String(name.clone()),
            Self::Array(items) => Json::Array(items.iter().map(FieldValue::to_json).collect()),
            Self::Json(value) => value.clone(),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::SmallInt(_) => "smallint",
            Self::Int(_) => "int",
            Self::BigInt(_) => "bigint",
            Self::Float(_) => "float",
            Self::Double(_) => "double",
            Self::Decimal(_) => "decimal",
            Self::String(_) => "string",
            Self::Char(_) => "char",
            Self::Bytes(_) => "bytes",
            Self::DateTime(_) => "datetime",
            Self::DateTimeUtc(_) => "datetime (utc)",
            Self::DateTimeOffset(_) => "datetime (offset)",
            Self::Date(_) => "date",
            Self::Time(_) => "time",
            Self::Duration(_) => "duration",
            Self::Uuid(_) => "uuid",
            Self::Enum(_) => "enum",
            Self::Array(_) => "array",
            Self::Json(_) => "json",
        }
    }
}

const NAIVE_ISO_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

fn float_json(f: f64) -> Json {
    serde_json::Number::from_f64(f)
        .map(Json::Number)
        .unwrap_or(Json::Null)
}

macro_rules! impl_from_for_field_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for FieldValue {
                fn from(value: $ty) -> Self {
                    FieldValue::$variant(value)
                }
            }
        )*
    };
}

impl_from_for_field_value!(
    bool => Bool,
    i16 => SmallInt,
    i32 => Int,
    i64 => BigInt,
    f32 => Float,
    f64 => Double,
    Decimal => Decimal,
    String => String,
    char => Char,
    NaiveDateTime => DateTime,
    DateTime<Utc> => DateTimeUtc,
    DateTime<FixedOffset> => DateTimeOffset,
    NaiveDate => Date,
    NaiveTime => Time,
    Duration => Duration,
    Uuid => Uuid,
    Json => Json,
);

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::String(value.to_string())
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(FieldValue::Null)
    }
}

/// Rust types that map onto a [`FieldType`]
pub trait FieldKind {
    fn field_type() -> FieldType;
}

macro_rules! impl_field_kind {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl FieldKind for $ty {
                fn field_type() -> FieldType {
                    FieldType::$variant
                }
            }
        )*
    };
}

impl_field_kind!(
    bool => Bool,
    i16 => SmallInt,
    i32 => Int,
    i64 => BigInt,
    f32 => Float,
    f64 => Double,
    Decimal => Decimal,
    String => String,
    char => Char,
    NaiveDateTime => DateTime,
    DateTime<Utc> => DateTimeUtc,
    DateTime<FixedOffset> => DateTimeOffset,
    NaiveDate => Date,
    NaiveTime => Time,
    Duration => Duration,
    Uuid => Uuid,
    Json => Json,
);

impl<T: FieldKind> FieldKind for Option<T> {
    fn field_type() -> FieldType {
        FieldType::nullable(T::field_type())
    }
}

impl<T: FieldKind> FieldKind for Vec<T> {
    fn field_type() -> FieldType {
        FieldType::array(T::field_type())
    }
}

/// Bidirectional converter between host values and column values
#[derive(Debug, Clone, Copy)]
pub struct ValueCodec {
    backend: DatabaseBackend,
}

impl ValueCodec {
    pub fn new(backend: DatabaseBackend) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> DatabaseBackend {
        self.backend
    }

    /// Convert a host value into the column representation for `target`
    pub fn to_database(
        &self,
        value: &FieldValue,
        target: &FieldType,
        meta: &PropertyMeta,
    ) -> Result<Value, ConversionError> {
        let target = target.unwrap_nullable();
        if value.is_null() {
            return Ok(typed_null(target, meta));
        }
        if !target.is_simple() {
            return Ok(Value::from(value.to_json()));
        }

        let converted = match value {
            FieldValue::DateTime(n) => Value::from(*n),
            FieldValue::DateTimeUtc(d) if meta.timezone_aware => Value::from(*d),
            FieldValue::DateTimeUtc(d) => Value::from(d.naive_utc()),
            FieldValue::DateTimeOffset(d) if meta.timezone_aware => Value::from(*d),
            FieldValue::DateTimeOffset(d) => Value::from(d.naive_utc()),
            FieldValue::Date(d) => Value::from(*d),
            FieldValue::Time(t) => Value::from(*t),
            FieldValue::Duration(d) => Value::from(interval_text(d)?),
            FieldValue::Uuid(u) if meta.uuid_as_string => Value::from(u.to_string()),
            FieldValue::Uuid(u) => Value::from(*u),
            FieldValue::Enum(name) => match target {
                FieldType::Enum(ty) => {
                    let variant = ty.by_name(name).ok_or_else(|| unknown_variant(ty, name))?;
                    encode_enum(variant, meta)?
                }
                _ => Value::from(name.clone()),
            },
            FieldValue::SmallInt(_) | FieldValue::Int(_) | FieldValue::BigInt(_) => {
                let raw = value.to_db_value();
                match (target, value_as_i64(&raw)) {
                    (FieldType::Enum(ty), Some(discriminant)) => {
                        let variant = ty
                            .by_value(discriminant)
                            .ok_or_else(|| unknown_variant(ty, &discriminant.to_string()))?;
                        encode_enum(variant, meta)?
                    }
                    _ => raw,
                }
            }
            FieldValue::Array(_) | FieldValue::Json(_) => Value::from(value.to_json()),
            scalar => scalar.to_db_value(),
        };
        Ok(converted)
    }

    /// Convert a column value back into the host representation of `target`
    pub fn from_database(
        &self,
        value: &Value,
        target: &FieldType,
        meta: &PropertyMeta,
    ) -> Result<FieldValue, ConversionError> {
        if is_null(value) {
            return Ok(FieldValue::Null);
        }
        let target = target.unwrap_nullable();
        let converted = match target {
            FieldType::Bool => {
                FieldValue::Bool(lenient_bool(value).ok_or_else(|| incompatible(value, target))?)
            }
            FieldType::SmallInt => {
                let i = integer(value, target)?;
                FieldValue::SmallInt(i16::try_from(i).map_err(|_| out_of_range(i, target))?)
            }
            FieldType::Int => {
                let i = integer(value, target)?;
                FieldValue::Int(i32::try_from(i).map_err(|_| out_of_range(i, target))?)
            }
            FieldType::BigInt => FieldValue::BigInt(integer(value, target)?),
            FieldType::Float => FieldValue::Float(real(value, target)? as f32),
            FieldType::Double => FieldValue::Double(real(value, target)?),
            FieldType::Decimal => FieldValue::Decimal(decimal(value, target)?),
            FieldType::String => match value {
                Value::Bytes(Some(b)) => FieldValue::String(
                    String::from_utf8(b.to_vec()).map_err(|_| incompatible(value, target))?,
                ),
                other => FieldValue::String(value_text(other).ok_or_else(|| incompatible(other, target))?),
            },
            FieldType::Char => {
                let text = value_text(value).ok_or_else(|| incompatible(value, target))?;
                let mut chars = text.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => FieldValue::Char(c),
                    _ => return Err(invalid_text(&text, target)),
                }
            }
            FieldType::Bytes => match value {
                Value::Bytes(Some(b)) => FieldValue::Bytes(b.to_vec()),
                Value::String(Some(s)) => FieldValue::Bytes(s.as_bytes().to_vec()),
                other => return Err(incompatible(other, target)),
            },
            FieldType::DateTime => FieldValue::DateTime(match value {
                Value::ChronoDateTime(Some(n)) => **n,
                Value::ChronoDateTimeUtc(Some(d)) => d.naive_utc(),
                Value::ChronoDateTimeWithTimeZone(Some(d)) => d.naive_local(),
                Value::ChronoDateTimeLocal(Some(d)) => d.naive_local(),
                Value::ChronoDate(Some(d)) => midnight(**d),
                other => text_of(other, target).and_then(|t| parse_naive_datetime(&t, target))?,
            }),
            FieldType::DateTimeUtc => FieldValue::DateTimeUtc(match value {
                Value::ChronoDateTime(Some(n)) => n.and_utc(),
                Value::ChronoDateTimeUtc(Some(d)) => **d,
                Value::ChronoDateTimeWithTimeZone(Some(d)) => d.with_timezone(&Utc),
                Value::ChronoDateTimeLocal(Some(d)) => d.with_timezone(&Utc),
                other => text_of(other, target)
                    .and_then(|t| parse_offset_datetime(&t, target))?
                    .with_timezone(&Utc),
            }),
            FieldType::DateTimeOffset => FieldValue::DateTimeOffset(match value {
                Value::ChronoDateTime(Some(n)) => n.and_utc().fixed_offset(),
                Value::ChronoDateTimeUtc(Some(d)) => d.fixed_offset(),
                Value::ChronoDateTimeWithTimeZone(Some(d)) => **d,
                Value::ChronoDateTimeLocal(Some(d)) => d.fixed_offset(),
                other => text_of(other, target).and_then(|t| parse_offset_datetime(&t, target))?,
            }),
            FieldType::Date => FieldValue::Date(match value {
                Value::ChronoDate(Some(d)) => **d,
                Value::ChronoDateTime(Some(n)) => n.date(),
                Value::ChronoDateTimeUtc(Some(d)) => d.date_naive(),
                Value::ChronoDateTimeWithTimeZone(Some(d)) => d.date_naive(),
                other => {
                    let text = text_of(other, target)?;
                    NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d")
                        .map_err(|_| invalid_text(&text, target))?
                }
            }),
            FieldType::Time => FieldValue::Time(match value {
                Value::ChronoTime(Some(t)) => **t,
                Value::ChronoDateTime(Some(n)) => n.time(),
                other => {
                    let text = text_of(other, target)?;
                    parse_time(&text).ok_or_else(|| invalid_text(&text, target))?
                }
            }),
            FieldType::Duration => FieldValue::Duration(match value {
                Value::ChronoTime(Some(t)) => since_midnight(**t),
                Value::String(Some(s)) => {
                    parse_interval(s).ok_or_else(|| invalid_text(s, target))?
                }
                other => Duration::microseconds(integer(other, target)?),
            }),
            FieldType::Uuid => FieldValue::Uuid(match value {
                Value::Uuid(Some(u)) => **u,
                Value::Bytes(Some(b)) => {
                    Uuid::from_slice(b).map_err(|_| incompatible(value, target))?
                }
                other => {
                    let text = text_of(other, target)?;
                    Uuid::parse_str(text.trim()).map_err(|_| invalid_text(&text, target))?
                }
            }),
            FieldType::Enum(ty) => {
                let variant = match value {
                    Value::String(Some(s)) => ty
                        .by_name(s)
                        .or_else(|| s.trim().parse::<i64>().ok().and_then(|i| ty.by_value(i))),
                    other => value_as_i64(other).and_then(|i| ty.by_value(i)),
                };
                let variant = variant.ok_or_else(|| {
                    unknown_variant(ty, &value_text(value).unwrap_or_default())
                })?;
                FieldValue::Enum(variant.name.to_string())
            }
            FieldType::Json | FieldType::Array(_) => {
                let json = match value {
                    Value::Json(Some(j)) => (**j).clone(),
                    Value::String(Some(s)) => serde_json::from_str(s)
                        .map_err(|e| ConversionError::Json(e.to_string()))?,
                    other => return Err(incompatible(other, target)),
                };
                self.json_to_field(&json, target, meta)?
            }
            FieldType::Nullable(inner) => return self.from_database(value, inner, meta),
        };
        Ok(converted)
    }

    /// Decode a JSON value into the host shape of `target`
    pub fn json_to_field(
        &self,
        json: &Json,
        target: &FieldType,
        meta: &PropertyMeta,
    ) -> Result<FieldValue, ConversionError> {
        if json.is_null() {
            return Ok(FieldValue::Null);
        }
        let target = target.unwrap_nullable();
        match (target, json) {
            (FieldType::Json, _) => Ok(FieldValue::Json(json.clone())),
            (FieldType::Array(element), Json::Array(items)) => items
                .iter()
                .map(|item| self.json_to_field(item, element, meta))
                .collect::<Result<Vec<_>, _>>()
                .map(FieldValue::Array),
            (FieldType::Bytes, Json::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_u64()
                        .and_then(|b| u8::try_from(b).ok())
                        .ok_or_else(|| ConversionError::Json(format!("{} is not a byte", item)))
                })
                .collect::<Result<Vec<u8>, _>>()
                .map(FieldValue::Bytes),
            (_, Json::Bool(b)) => self.from_database(&Value::from(*b), target, meta),
            (_, Json::Number(n)) => {
                let scalar = match n.as_i64() {
                    Some(i) => Value::from(i),
                    None => Value::from(n.as_f64().unwrap_or(f64::NAN)),
                };
                self.from_database(&scalar, target, meta)
            }
            (_, Json::String(s)) => self.from_database(&Value::from(s.clone()), target, meta),
            _ => Err(ConversionError::Incompatible {
                from: json.to_string(),
                to: target.label(),
            }),
        }
    }

    /// Encode a property value of `column`, wrapping failures with its names
    pub fn encode_column(
        &self,
        column: &ColumnMetadata,
        value: &FieldValue,
    ) -> crate::Result<Value> {
        self.to_database(value, &column.field_type, &column.meta)
            .map_err(|e| TrellisError::conversion(&column.property, &column.column, e))
    }

    /// Decode a column value of `column`, wrapping failures with its names
    pub fn decode_column(&self, column: &ColumnMetadata, value: &Value) -> crate::Result<FieldValue> {
        self.from_database(value, &column.field_type, &column.meta)
            .map_err(|e| TrellisError::conversion(&column.property, &column.column, e))
    }

    /// Canonical column type name for `target` on this backend
    pub fn database_type_name(&self, target: &FieldType, meta: &PropertyMeta) -> String {
        let target = target.unwrap_nullable();
        match self.backend {
            DatabaseBackend::MySql => mysql_type_name(target, meta),
            DatabaseBackend::Sqlite => sqlite_type_name(target, meta),
            _ => postgres_type_name(target, meta),
        }
    }
}

fn postgres_type_name(target: &FieldType, meta: &PropertyMeta) -> String {
    let text = || match meta.max_length {
        Some(n) => format!("varchar({})", n),
        None => "text".to_string(),
    };
    match target {
        FieldType::Bool => "boolean".into(),
        FieldType::SmallInt => "smallint".into(),
        FieldType::Int => "integer".into(),
        FieldType::BigInt => "bigint".into(),
        FieldType::Float => "real".into(),
        FieldType::Double => "double precision".into(),
        FieldType::Decimal => "numeric".into(),
        FieldType::String => text(),
        FieldType::Char => "char(1)".into(),
        FieldType::Bytes => "bytea".into(),
        FieldType::DateTime => "timestamp".into(),
        FieldType::DateTimeUtc | FieldType::DateTimeOffset if meta.timezone_aware => {
            "timestamptz".into()
        }
        FieldType::DateTimeUtc | FieldType::DateTimeOffset => "timestamp".into(),
        FieldType::Date => "date".into(),
        FieldType::Time => "time".into(),
        FieldType::Duration => "interval".into(),
        FieldType::Uuid if meta.uuid_as_string => "varchar(36)".into(),
        FieldType::Uuid => "uuid".into(),
        FieldType::Enum(_) if meta.enum_as_integer => "integer".into(),
        FieldType::Enum(_) => text(),
        FieldType::Json | FieldType::Array(_) => "jsonb".into(),
        FieldType::Nullable(inner) => postgres_type_name(inner, meta),
    }
}

fn mysql_type_name(target: &FieldType, meta: &PropertyMeta) -> String {
    let text = || match meta.max_length {
        Some(n) => format!("varchar({})", n),
        None => "longtext".to_string(),
    };
    match target {
        FieldType::Bool => "tinyint(1)".into(),
        FieldType::SmallInt => "smallint".into(),
        FieldType::Int => "int".into(),
        FieldType::BigInt => "bigint".into(),
        FieldType::Float => "float".into(),
        FieldType::Double => "double".into(),
        FieldType::Decimal => "decimal(65,30)".into(),
        FieldType::String => text(),
        FieldType::Char => "char(1)".into(),
        FieldType::Bytes => "longblob".into(),
        FieldType::DateTime => "datetime(6)".into(),
        FieldType::DateTimeUtc | FieldType::DateTimeOffset if meta.timezone_aware => {
            "timestamp(6)".into()
        }
        FieldType::DateTimeUtc | FieldType::DateTimeOffset => "datetime(6)".into(),
        FieldType::Date => "date".into(),
        FieldType::Time => "time(6)".into(),
        FieldType::Duration => "varchar(64)".into(),
        FieldType::Uuid => "char(36)".into(),
        FieldType::Enum(_) if meta.enum_as_integer => "int".into(),
        FieldType::Enum(_) => match meta.max_length {
            Some(n) => format!("varchar({})", n),
            None => "varchar(255)".to_string(),
        },
        FieldType::Json | FieldType::Array(_) => "json".into(),
        FieldType::Nullable(inner) => mysql_type_name(inner, meta),
    }
}

fn sqlite_type_name(target: &FieldType, meta: &PropertyMeta) -> String {
    match target {
        FieldType::Bool | FieldType::SmallInt | FieldType::Int | FieldType::BigInt => {
            "INTEGER".into()
        }
        FieldType::Float | FieldType::Double => "REAL".into(),
        FieldType::Bytes => "BLOB".into(),
        FieldType::Uuid if !meta.uuid_as_string => "BLOB".into(),
        FieldType::Enum(_) if meta.enum_as_integer => "INTEGER".into(),
        FieldType::Nullable(inner) => sqlite_type_name(inner, meta),
        _ => "TEXT".into(),
    }
}

fn encode_enum(variant: &EnumVariant, meta: &PropertyMeta) -> Result<Value, ConversionError> {
    if meta.enum_as_integer {
        let value = i32::try_from(variant.value).map_err(|_| ConversionError::OutOfRange {
            value: variant.value.to_string(),
            to: "int".into(),
        })?;
        Ok(Value::from(value))
    } else {
        Ok(Value::from(variant.name.to_string()))
    }
}

fn typed_null(target: &FieldType, meta: &PropertyMeta) -> Value {
    match target.unwrap_nullable() {
        FieldType::Bool => Value::Bool(None),
        FieldType::SmallInt => Value::SmallInt(None),
        FieldType::Int => Value::Int(None),
        FieldType::BigInt => Value::BigInt(None),
        FieldType::Float => Value::Float(None),
        FieldType::Double => Value::Double(None),
        FieldType::Decimal => Value::Decimal(None),
        FieldType::Char => Value::Char(None),
        FieldType::Bytes => Value::Bytes(None),
        FieldType::DateTimeUtc if meta.timezone_aware => Value::ChronoDateTimeUtc(None),
        FieldType::DateTimeOffset if meta.timezone_aware => {
            Value::ChronoDateTimeWithTimeZone(None)
        }
        FieldType::DateTime | FieldType::DateTimeUtc | FieldType::DateTimeOffset => {
            Value::ChronoDateTime(None)
        }
        FieldType::Date => Value::ChronoDate(None),
        FieldType::Time => Value::ChronoTime(None),
        FieldType::Uuid if !meta.uuid_as_string => Value::Uuid(None),
        FieldType::Enum(_) if meta.enum_as_integer => Value::Int(None),
        FieldType::Json | FieldType::Array(_) => Value::Json(None),
        _ => Value::String(None),
    }
}

/// True for every null variant the codec produces or reads
pub(crate) fn is_null(value: &Value) -> bool {
    matches!(
        value,
        Value::Bool(None)
            | Value::TinyInt(None)
            | Value::SmallInt(None)
            | Value::Int(None)
            | Value::BigInt(None)
            | Value::TinyUnsigned(None)
            | Value::SmallUnsigned(None)
            | Value::Unsigned(None)
            | Value::BigUnsigned(None)
            | Value::Float(None)
            | Value::Double(None)
            | Value::String(None)
            | Value::Char(None)
            | Value::Bytes(None)
            | Value::Json(None)
            | Value::ChronoDate(None)
            | Value::ChronoTime(None)
            | Value::ChronoDateTime(None)
            | Value::ChronoDateTimeUtc(None)
            | Value::ChronoDateTimeLocal(None)
            | Value::ChronoDateTimeWithTimeZone(None)
            | Value::Uuid(None)
            | Value::Decimal(None)
    )
}

pub(crate) fn value_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::TinyInt(Some(i)) => Some(*i as i64),
        Value::SmallInt(Some(i)) => Some(*i as i64),
        Value::Int(Some(i)) => Some(*i as i64),
        Value::BigInt(Some(i)) => Some(*i),
        Value::TinyUnsigned(Some(i)) => Some(*i as i64),
        Value::SmallUnsigned(Some(i)) => Some(*i as i64),
        Value::Unsigned(Some(i)) => Some(*i as i64),
        Value::BigUnsigned(Some(i)) => i64::try_from(*i).ok(),
        _ => None,
    }
}

fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Float(Some(f)) => Some(*f as f64),
        Value::Double(Some(f)) => Some(*f),
        Value::Decimal(Some(d)) => d.to_f64(),
        other => value_as_i64(other).map(|i| i as f64),
    }
}

/// Text form of a scalar value, used by the string and parsing fallbacks
fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(Some(s)) => Some(s.to_string()),
        Value::Char(Some(c)) => Some(c.to_string()),
        Value::Bool(Some(b)) => Some(b.to_string()),
        Value::Float(Some(f)) => Some(f.to_string()),
        Value::Double(Some(f)) => Some(f.to_string()),
        Value::Decimal(Some(d)) => Some(d.to_string()),
        Value::Uuid(Some(u)) => Some(u.to_string()),
        Value::ChronoDate(Some(d)) => Some(d.to_string()),
        Value::ChronoTime(Some(t)) => Some(t.to_string()),
        Value::ChronoDateTime(Some(n)) => Some(n.to_string()),
        Value::ChronoDateTimeUtc(Some(d)) => Some(d.to_rfc3339()),
        Value::ChronoDateTimeWithTimeZone(Some(d)) => Some(d.to_rfc3339()),
        Value::Json(Some(j)) => Some(match &**j {
            Json::String(s) => s.clone(),
            other => other.to_string(),
        }),
        other => value_as_i64(other).map(|i| i.to_string()),
    }
}

fn text_of(value: &Value, target: &FieldType) -> Result<String, ConversionError> {
    match value {
        Value::String(Some(s)) => Ok(s.to_string()),
        other => Err(incompatible(other, target)),
    }
}

/// Non-zero numbers are true; text other than "0" and "false" is true
fn lenient_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(Some(b)) => Some(*b),
        Value::String(Some(s)) => {
            let s = s.trim();
            Some(!(s == "0" || s.eq_ignore_ascii_case("false")))
        }
        Value::Char(Some(c)) => Some(*c != '0'),
        other => value_as_f64(other).map(|f| f != 0.0),
    }
}

fn integer(value: &Value, target: &FieldType) -> Result<i64, ConversionError> {
    if let Some(i) = value_as_i64(value) {
        return Ok(i);
    }
    match value {
        Value::Bool(Some(b)) => Ok(*b as i64),
        Value::Float(_) | Value::Double(_) | Value::Decimal(_) => {
            let f = value_as_f64(value).ok_or_else(|| incompatible(value, target))?;
            if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
                Ok(f as i64)
            } else {
                Err(out_of_range(f, target))
            }
        }
        Value::String(Some(s)) => s.trim().parse::<i64>().map_err(|_| invalid_text(s, target)),
        other => Err(incompatible(other, target)),
    }
}

fn real(value: &Value, target: &FieldType) -> Result<f64, ConversionError> {
    if let Some(f) = value_as_f64(value) {
        return Ok(f);
    }
    match value {
        Value::String(Some(s)) => s.trim().parse::<f64>().map_err(|_| invalid_text(s, target)),
        other => Err(incompatible(other, target)),
    }
}

fn decimal(value: &Value, target: &FieldType) -> Result<Decimal, ConversionError> {
    match value {
        Value::Decimal(Some(d)) => Ok(**d),
        Value::Float(Some(f)) => Decimal::from_f32(*f).ok_or_else(|| out_of_range(f, target)),
        Value::Double(Some(f)) => Decimal::from_f64(*f).ok_or_else(|| out_of_range(f, target)),
        Value::String(Some(s)) => Decimal::from_str(s.trim()).map_err(|_| invalid_text(s, target)),
        other => value_as_i64(other)
            .map(Decimal::from)
            .ok_or_else(|| incompatible(other, target)),
    }
}

fn midnight(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}

fn since_midnight(time: NaiveTime) -> Duration {
    time.signed_duration_since(NaiveTime::MIN)
}

fn parse_naive_datetime(text: &str, target: &FieldType) -> Result<NaiveDateTime, ConversionError> {
    let trimmed = text.trim();
    for format in [NAIVE_ISO_FORMAT, "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(n) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(n);
        }
    }
    if let Ok(d) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(d.naive_local());
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .map(midnight)
        .map_err(|_| invalid_text(text, target))
}

fn parse_offset_datetime(
    text: &str,
    target: &FieldType,
) -> Result<DateTime<FixedOffset>, ConversionError> {
    let trimmed = text.trim();
    if let Ok(d) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(d);
    }
    if let Ok(d) = DateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f%#z") {
        return Ok(d);
    }
    parse_naive_datetime(trimmed, target).map(|n| n.and_utc().fixed_offset())
}

fn parse_time(text: &str) -> Option<NaiveTime> {
    let trimmed = text.trim();
    NaiveTime::parse_from_str(trimmed, "%H:%M:%S%.f")
        .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M"))
        .ok()
}

/// Interval text accepted by every supported backend
fn interval_text(duration: &Duration) -> Result<String, ConversionError> {
    duration
        .num_microseconds()
        .map(|micros| format!("{} microseconds", micros))
        .ok_or_else(|| ConversionError::OutOfRange {
            value: duration.to_string(),
            to: "interval".into(),
        })
}

/// Parses `"<n> microseconds"` and the Postgres output form
/// `"[N day[s]] [-]HH:MM:SS[.ffffff]"`
fn parse_interval(text: &str) -> Option<Duration> {
    let trimmed = text.trim();
    if let Some(micros) = trimmed.strip_suffix("microseconds") {
        return micros.trim().parse::<i64>().ok().map(Duration::microseconds);
    }
    let parts: Vec<&str> = trimmed.split_whitespace().collect();
    if parts.is_empty() {
        return None;
    }
    let mut total = Duration::zero();
    let mut i = 0;
    while i < parts.len() {
        if i + 1 < parts.len() && parts[i + 1].starts_with("day") {
            total = total + Duration::days(parts[i].parse::<i64>().ok()?);
            i += 2;
        } else {
            total = total + parse_clock(parts[i])?;
            i += 1;
        }
    }
    Some(total)
}

fn parse_clock(text: &str) -> Option<Duration> {
    let (negative, body) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let mut fields = body.split(':');
    let hours: i64 = fields.next()?.parse().ok()?;
    let minutes: i64 = fields.next()?.parse().ok()?;
    let seconds: f64 = fields.next().unwrap_or("0").parse().ok()?;
    if fields.next().is_some() {
        return None;
    }
    let micros = (hours * 3600 + minutes * 60) * 1_000_000 + (seconds * 1_000_000.0).round() as i64;
    Some(Duration::microseconds(if negative { -micros } else { micros }))
}

fn incompatible(value: &Value, target: &FieldType) -> ConversionError {
    ConversionError::Incompatible {
        from: format!("{:?}", value),
        to: target.label(),
    }
}

fn invalid_text(text: &str, target: &FieldType) -> ConversionError {
    ConversionError::InvalidText {
        text: text.to_string(),
        to: target.label(),
    }
}

fn out_of_range(value: impl ToString, target: &FieldType) -> ConversionError {
    ConversionError::OutOfRange {
        value: value.to_string(),
        to: target.label(),
    }
}

fn unknown_variant(ty: &EnumType, value: &str) -> ConversionError {
    ConversionError::UnknownEnumVariant {
        enum_name: ty.name.to_string(),
        value: value.to_string(),
    }
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String(s) => write!(f, "{}", s),
            Self::Enum(name) => write!(f, "{}", name),
            other => write!(f, "{} {}", other.kind(), other.to_json()),
        }
    }
}
