use serde::de::DeserializeOwned;
use serde_json::{Map, Value as Json};
use std::collections::HashMap;

use sea_orm::{DatabaseBackend, DbErr, QueryResult, Value};

use super::include_tree::{NodeId, ROOT_ALIAS};
use super::join_compiler::{ColumnMapping, JoinCompilation};
use crate::codec::{ConversionError, FieldType, PropertyMeta, ValueCodec};
use crate::key_types::RowKey;
use crate::types::{Result, TrellisError};

/// Columns of one alias inside a positional row
#[derive(Debug, Clone)]
struct Segment<'c> {
    start: usize,
    columns: &'c [ColumnMapping],
    key_index: Option<usize>,
}

#[derive(Debug)]
struct Record {
    node: Option<NodeId>,
    object: Map<String, Json>,
    related: HashMap<NodeId, Vec<usize>>,
}

/// Folds flat joined rows back into nested JSON objects.
///
/// Rows must follow [`JoinCompilation::positional_layout`]. Parents repeated
/// by one-to-many and many-to-many joins are merged by primary key.
pub struct RowAssembler<'a> {
    compilation: &'a JoinCompilation,
    codec: ValueCodec,
}

impl<'a> RowAssembler<'a> {
    pub fn new(compilation: &'a JoinCompilation, codec: ValueCodec) -> Self {
        Self { compilation, codec }
    }

    fn segments(&self) -> HashMap<&'a str, Segment<'a>> {
        let compilation = self.compilation;
        let mut segments = HashMap::new();
        let mut start = 0;
        for alias in &compilation.select_order {
            let columns = compilation.columns(alias);
            let key_index = match compilation.forest.find_by_alias(alias) {
                Some(node) => columns
                    .iter()
                    .position(|c| c.column == node.related_primary_key),
                None => columns
                    .iter()
                    .position(|c| c.property.is_primary_key)
                    .or_else(|| columns.iter().position(|c| c.column == "id")),
            };
            segments.insert(
                alias.as_str(),
                Segment {
                    start,
                    columns,
                    key_index,
                },
            );
            start += columns.len();
        }
        segments
    }

    pub fn assemble(&self, rows: &[Vec<Value>]) -> Result<Vec<Json>> {
        let segments = self.segments();
        let width: usize = segments.values().map(|s| s.columns.len()).sum();
        let root = segments.get(ROOT_ALIAS).filter(|s| !s.columns.is_empty()).ok_or_else(|| {
            TrellisError::configuration(
                &self.compilation.root_entity,
                "no column mappings to assemble rows with",
            )
        })?;
        let order = self.compilation.forest.depth_first();

        let mut records: Vec<Record> = Vec::new();
        let mut roots: Vec<usize> = Vec::new();
        let mut root_index: HashMap<RowKey, usize> = HashMap::new();
        let mut child_index: HashMap<(usize, NodeId, RowKey), usize> = HashMap::new();

        for row in rows {
            if row.len() < width {
                return Err(TrellisError::configuration(
                    &self.compilation.root_entity,
                    format!("result row has {} columns, expected {}", row.len(), width),
                ));
            }

            let root_key = root.key_index.and_then(|i| RowKey::from_db_value(&row[root.start + i]));
            let existing = root_key.as_ref().and_then(|k| root_index.get(k).copied());
            let root_record = match existing {
                Some(index) => index,
                None => {
                    records.push(Record {
                        node: None,
                        object: self.decode(root, row)?,
                        related: HashMap::new(),
                    });
                    let index = records.len() - 1;
                    roots.push(index);
                    if let Some(key) = root_key {
                        root_index.insert(key, index);
                    }
                    index
                }
            };

            let mut in_row: HashMap<NodeId, usize> = HashMap::new();
            for &id in &order {
                let node = &self.compilation.forest[id];
                let parent_record = match node.parent {
                    Some(parent) => match in_row.get(&parent) {
                        Some(index) => *index,
                        None => continue,
                    },
                    None => root_record,
                };
                let Some(segment) = segments.get(node.alias.as_str()) else {
                    continue;
                };
                // LEFT JOIN without a match
                let Some(key) = segment
                    .key_index
                    .and_then(|i| RowKey::from_db_value(&row[segment.start + i]))
                else {
                    continue;
                };

                let lookup = (parent_record, id, key);
                let index = match child_index.get(&lookup).copied() {
                    Some(index) => index,
                    None => {
                        records.push(Record {
                            node: Some(id),
                            object: self.decode(segment, row)?,
                            related: HashMap::new(),
                        });
                        let index = records.len() - 1;
                        records[parent_record]
                            .related
                            .entry(id)
                            .or_default()
                            .push(index);
                        child_index.insert(lookup, index);
                        index
                    }
                };
                in_row.insert(id, index);
            }
        }

        log::debug!(
            "assembled {} rows into {} {} objects",
            rows.len(),
            roots.len(),
            self.compilation.root_entity
        );
        Ok(roots.iter().map(|&index| self.render(&records, index)).collect())
    }

    /// Assemble and deserialize into typed graphs
    pub fn assemble_as<T: DeserializeOwned>(&self, rows: &[Vec<Value>]) -> Result<Vec<T>> {
        self.assemble(rows)?
            .into_iter()
            .map(|object| {
                serde_json::from_value(object).map_err(|e| {
                    TrellisError::conversion(
                        &self.compilation.root_entity,
                        ROOT_ALIAS,
                        ConversionError::Json(e.to_string()),
                    )
                })
            })
            .collect()
    }

    /// Read a driver row positionally, one typed read per selected column
    pub fn read_row(&self, row: &QueryResult) -> Result<Vec<Value>> {
        self.compilation
            .positional_layout()
            .into_iter()
            .enumerate()
            .map(|(index, mapping)| {
                read_value(row, index, &mapping.property.field_type, &mapping.property.meta, self.codec.backend())
                    .map_err(|e| {
                        TrellisError::conversion(
                            &mapping.property.property,
                            &mapping.column,
                            ConversionError::Driver(e.to_string()),
                        )
                    })
            })
            .collect()
    }

    pub fn assemble_results(&self, rows: &[QueryResult]) -> Result<Vec<Json>> {
        let values = rows
            .iter()
            .map(|row| self.read_row(row))
            .collect::<Result<Vec<_>>>()?;
        self.assemble(&values)
    }

    fn decode(&self, segment: &Segment<'_>, row: &[Value]) -> Result<Map<String, Json>> {
        let mut object = Map::with_capacity(segment.columns.len());
        for (offset, mapping) in segment.columns.iter().enumerate() {
            let value = self
                .codec
                .decode_column(&mapping.property, &row[segment.start + offset])?;
            object.insert(mapping.property.property.clone(), value.to_json());
        }
        Ok(object)
    }

    fn render(&self, records: &[Record], index: usize) -> Json {
        let record = &records[index];
        let mut object = record.object.clone();
        for &child in self.compilation.forest.children_of(record.node) {
            let node = &self.compilation.forest[child];
            let related = record.related.get(&child).map(Vec::as_slice).unwrap_or_default();
            let value = if node.is_collection {
                Json::Array(related.iter().map(|&i| self.render(records, i)).collect())
            } else {
                related
                    .first()
                    .map(|&i| self.render(records, i))
                    .unwrap_or(Json::Null)
            };
            object.insert(node.property.clone(), value);
        }
        Json::Object(object)
    }
}

fn read_value(
    row: &QueryResult,
    index: usize,
    field_type: &FieldType,
    meta: &PropertyMeta,
    backend: DatabaseBackend,
) -> std::result::Result<Value, DbErr> {
    let sqlite = matches!(backend, DatabaseBackend::Sqlite);
    let value = match field_type.unwrap_nullable() {
        FieldType::Bool => Value::from(row.try_get_by_index::<Option<bool>>(index)?),
        FieldType::SmallInt => Value::from(row.try_get_by_index::<Option<i16>>(index)?),
        FieldType::Int => Value::from(row.try_get_by_index::<Option<i32>>(index)?),
        FieldType::BigInt => Value::from(row.try_get_by_index::<Option<i64>>(index)?),
        FieldType::Float => Value::from(row.try_get_by_index::<Option<f32>>(index)?),
        FieldType::Double => Value::from(row.try_get_by_index::<Option<f64>>(index)?),
        FieldType::Decimal if !sqlite => {
            Value::from(row.try_get_by_index::<Option<rust_decimal::Decimal>>(index)?)
        }
        FieldType::Bytes => Value::from(row.try_get_by_index::<Option<Vec<u8>>>(index)?),
        FieldType::DateTimeUtc if meta.timezone_aware => Value::from(
            row.try_get_by_index::<Option<chrono::DateTime<chrono::Utc>>>(index)?,
        ),
        FieldType::DateTimeOffset if meta.timezone_aware => Value::from(
            row.try_get_by_index::<Option<chrono::DateTime<chrono::FixedOffset>>>(index)?,
        ),
        FieldType::DateTime | FieldType::DateTimeUtc | FieldType::DateTimeOffset => {
            Value::from(row.try_get_by_index::<Option<chrono::NaiveDateTime>>(index)?)
        }
        FieldType::Date => Value::from(row.try_get_by_index::<Option<chrono::NaiveDate>>(index)?),
        FieldType::Time => Value::from(row.try_get_by_index::<Option<chrono::NaiveTime>>(index)?),
        FieldType::Uuid if !meta.uuid_as_string => {
            Value::from(row.try_get_by_index::<Option<uuid::Uuid>>(index)?)
        }
        FieldType::Enum(_) if meta.enum_as_integer => {
            Value::from(row.try_get_by_index::<Option<i64>>(index)?)
        }
        FieldType::Json | FieldType::Array(_) if !sqlite => {
            Value::from(row.try_get_by_index::<Option<serde_json::Value>>(index)?)
        }
        _ => Value::from(row.try_get_by_index::<Option<String>>(index)?),
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::FieldType;
    use crate::config::CompilerOptions;
    use crate::entity_metadata::{ColumnMetadata, EntityMetadata, EntityRegistry, NavigationMetadata};
    use crate::query_builders::join_compiler::JoinCompiler;
    use crate::sanitizer::BackendSanitizer;
    use serde_json::json;

    fn registry() -> EntityRegistry {
        EntityRegistry::new()
            .with(
                EntityMetadata::new("Customer")
                    .column(ColumnMetadata::new("id", "id", FieldType::Int).primary_key())
                    .column(ColumnMetadata::new("name", "name", FieldType::String))
                    .navigation(NavigationMetadata::collection("orders", "Order")),
            )
            .with(
                EntityMetadata::new("Order")
                    .table("orders")
                    .column(ColumnMetadata::new("id", "id", FieldType::Int).primary_key())
                    .column(ColumnMetadata::new("customer_id", "customer_id", FieldType::Int))
                    .column(ColumnMetadata::new("paid", "paid", FieldType::Bool))
                    .navigation(NavigationMetadata::single("customer", "Customer").foreign_key("customer_id")),
            )
    }

    fn compile(root: &str, table: &str, paths: &[&str]) -> JoinCompilation {
        let registry = registry();
        let sanitizer = BackendSanitizer::new(DatabaseBackend::Sqlite);
        JoinCompiler::new(&registry, &sanitizer, CompilerOptions::default())
            .compile(root, table, paths)
            .unwrap()
    }

    fn codec() -> ValueCodec {
        ValueCodec::new(DatabaseBackend::Sqlite)
    }

    #[test]
    fn test_collections_are_grouped_under_their_parent() {
        let compilation = compile("Customer", "customer", &["orders"]);
        let rows: Vec<Vec<Value>> = vec![
            vec![1.into(), "Ada".into(), 10.into(), 1.into(), 1.into()],
            vec![1.into(), "Ada".into(), 11.into(), 1.into(), 0.into()],
            vec![2.into(), "Bob".into(), Value::Int(None), Value::Int(None), Value::Bool(None)],
        ];
        let assembled = RowAssembler::new(&compilation, codec()).assemble(&rows).unwrap();
        assert_eq!(
            assembled,
            vec![
                json!({
                    "id": 1,
                    "name": "Ada",
                    "orders": [
                        { "id": 10, "customer_id": 1, "paid": true },
                        { "id": 11, "customer_id": 1, "paid": false }
                    ]
                }),
                json!({ "id": 2, "name": "Bob", "orders": [] }),
            ]
        );
    }

    #[test]
    fn test_single_navigation_is_object_or_null() {
        let compilation = compile("Order", "orders", &["customer"]);
        let rows: Vec<Vec<Value>> = vec![
            vec![10.into(), 1.into(), true.into(), 1.into(), "Ada".into()],
            vec![12.into(), Value::Int(None), false.into(), Value::Int(None), Value::String(None)],
        ];
        let assembled = RowAssembler::new(&compilation, codec()).assemble(&rows).unwrap();
        assert_eq!(assembled[0]["customer"], json!({ "id": 1, "name": "Ada" }));
        assert_eq!(assembled[1]["customer"], Json::Null);
        assert_eq!(assembled[1]["customer_id"], Json::Null);
    }

    #[test]
    fn test_short_rows_are_rejected() {
        let compilation = compile("Order", "orders", &[]);
        let result = RowAssembler::new(&compilation, codec()).assemble(&[vec![Value::from(1)]]);
        assert!(matches!(result, Err(TrellisError::Configuration { .. })));
    }

    #[test]
    fn test_typed_graphs() {
        #[derive(serde::Deserialize)]
        struct Customer {
            id: i32,
            name: String,
            orders: Vec<Order>,
        }
        #[derive(serde::Deserialize)]
        struct Order {
            id: i32,
            paid: bool,
        }

        let compilation = compile("Customer", "customer", &["orders"]);
        let rows: Vec<Vec<Value>> = vec![vec![3.into(), "Cy".into(), 30.into(), 3.into(), 1.into()]];
        let customers: Vec<Customer> = RowAssembler::new(&compilation, codec())
            .assemble_as(&rows)
            .unwrap();
        assert_eq!(customers[0].id, 3);
        assert_eq!(customers[0].name, "Cy");
        assert_eq!(customers[0].orders[0].id, 30);
        assert!(customers[0].orders[0].paid);
    }
}
