// Entity metadata: declared columns and navigations, relationship resolution
// and the registry that serves them to the include compiler.

use heck::{ToSnakeCase, ToUpperCamelCase};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::codec::{FieldType, PropertyMeta};
use crate::types::{Result, TrellisError};

/// Declared shape of one entity
#[derive(Debug, Clone, PartialEq)]
pub struct EntityMetadata {
    pub name: String,
    /// Explicit table name; defaults to the snake_case entity name
    pub table_name: Option<String>,
    pub columns: Vec<ColumnMetadata>,
    pub navigations: Vec<NavigationMetadata>,
}

impl EntityMetadata {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table_name: None,
            columns: Vec::new(),
            navigations: Vec::new(),
        }
    }

    pub fn table(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = Some(table_name.into());
        self
    }

    pub fn column(mut self, column: ColumnMetadata) -> Self {
        self.columns.push(column);
        self
    }

    pub fn navigation(mut self, navigation: NavigationMetadata) -> Self {
        self.navigations.push(navigation);
        self
    }

    pub fn resolved_table_name(&self) -> String {
        self.table_name
            .clone()
            .unwrap_or_else(|| self.name.to_snake_case())
    }

    /// First column flagged as primary key
    pub fn primary_key(&self) -> Option<&ColumnMetadata> {
        self.columns.iter().find(|c| c.is_primary_key)
    }

    /// Look a column up by property or column name
    pub fn find_column(&self, name: &str) -> Option<&ColumnMetadata> {
        self.columns
            .iter()
            .find(|c| c.property == name || c.column == name)
            .or_else(|| {
                self.columns.iter().find(|c| {
                    c.property.eq_ignore_ascii_case(name) || c.column.eq_ignore_ascii_case(name)
                })
            })
    }

    /// Exact name, then case-insensitive, then snake_case equivalence
    pub fn find_navigation(&self, name: &str) -> Option<&NavigationMetadata> {
        if let Some(nav) = self.navigations.iter().find(|n| n.property == name) {
            return Some(nav);
        }
        if let Some(nav) = self
            .navigations
            .iter()
            .find(|n| n.property.eq_ignore_ascii_case(name))
        {
            return Some(nav);
        }
        let snake = name.to_snake_case();
        self.navigations
            .iter()
            .find(|n| n.property.to_snake_case() == snake)
    }
}

/// One mapped column
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMetadata {
    pub property: String,
    pub column: String,
    pub field_type: FieldType,
    pub is_primary_key: bool,
    /// Navigation this column is the foreign key of
    pub references: Option<String>,
    pub meta: PropertyMeta,
}

impl ColumnMetadata {
    pub fn new(property: impl Into<String>, column: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            property: property.into(),
            column: column.into(),
            field_type,
            is_primary_key: false,
            references: None,
            meta: PropertyMeta::default(),
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.is_primary_key = true;
        self
    }

    pub fn references(mut self, navigation: impl Into<String>) -> Self {
        self.references = Some(navigation.into());
        self
    }

    pub fn with_meta(mut self, meta: PropertyMeta) -> Self {
        self.meta = meta;
        self
    }

    pub fn enum_as_integer(mut self) -> Self {
        self.meta.enum_as_integer = true;
        self
    }

    pub fn timezone_aware(mut self) -> Self {
        self.meta.timezone_aware = true;
        self
    }

    pub fn uuid_as_string(mut self) -> Self {
        self.meta.uuid_as_string = true;
        self
    }

    pub fn max_length(mut self, length: u32) -> Self {
        self.meta.max_length = Some(length);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationShape {
    Single,
    Collection,
}

/// A navigation property pointing at another entity
#[derive(Debug, Clone, PartialEq)]
pub struct NavigationMetadata {
    pub property: String,
    /// Related entity, the element type for collections
    pub target: String,
    pub shape: NavigationShape,
    /// Foreign key column on the declaring entity
    pub foreign_key: Option<String>,
    /// Foreign key column on the related entity
    pub inverse_key: Option<String>,
    pub junction: Option<JunctionMetadata>,
}

impl NavigationMetadata {
    pub fn single(property: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(property.into(), target.into(), NavigationShape::Single)
    }

    pub fn collection(property: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(property.into(), target.into(), NavigationShape::Collection)
    }

    fn new(property: String, target: String, shape: NavigationShape) -> Self {
        Self {
            property,
            target,
            shape,
            foreign_key: None,
            inverse_key: None,
            junction: None,
        }
    }

    pub fn foreign_key(mut self, key: impl Into<String>) -> Self {
        self.foreign_key = Some(key.into());
        self
    }

    pub fn inverse_key(mut self, key: impl Into<String>) -> Self {
        self.inverse_key = Some(key.into());
        self
    }

    /// Many-to-many through `entity`, whose `parent_key` references the
    /// declaring entity and `target_key` the related one
    pub fn through(
        mut self,
        entity: impl Into<String>,
        parent_key: impl Into<String>,
        target_key: impl Into<String>,
    ) -> Self {
        self.junction = Some(JunctionMetadata {
            entity: entity.into(),
            parent_key: parent_key.into(),
            target_key: target_key.into(),
        });
        self
    }

    pub fn is_collection(&self) -> bool {
        self.shape == NavigationShape::Collection
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JunctionMetadata {
    pub entity: String,
    pub parent_key: String,
    pub target_key: String,
}

/// Types that describe themselves to the registry, usually via `#[derive(Entity)]`
pub trait Entity {
    const NAME: &'static str;

    fn metadata() -> EntityMetadata;
}

/// How a navigation is joined, resolved once per navigation property
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationshipKind {
    /// FK column on the parent references the related primary key
    ForwardForeignKey { foreign_key: String },
    /// FK column on the related entity references the parent primary key
    InverseForeignKey { foreign_key: String },
    ManyToMany {
        junction_entity: String,
        junction_table: String,
        parent_key: String,
        target_key: String,
    },
}

/// A navigation resolved against the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationDescriptor {
    /// Declared property name
    pub property: String,
    pub related_entity: String,
    pub is_collection: bool,
    pub relationship: RelationshipKind,
}

/// Schema source consulted by the include compiler
pub trait MetadataProvider: Send + Sync {
    fn table_name(&self, entity: &str) -> Result<String>;

    /// Ordered column mappings of an entity
    fn column_mappings(&self, entity: &str) -> Result<Arc<Vec<ColumnMetadata>>>;

    /// First primary-key column, `"id"` when none is declared
    fn primary_key_column(&self, entity: &str) -> Result<String> {
        let columns = self.column_mappings(entity)?;
        Ok(columns
            .iter()
            .find(|c| c.is_primary_key)
            .map(|c| c.column.clone())
            .unwrap_or_else(|| "id".to_string()))
    }

    fn resolve_navigation(&self, entity: &str, property: &str) -> Result<Arc<NavigationDescriptor>>;
}

/// Lazily filled derived data, shared across compilations
#[derive(Debug, Default)]
pub struct MetadataCache {
    tables: RwLock<HashMap<String, String>>,
    columns: RwLock<HashMap<String, Arc<Vec<ColumnMetadata>>>>,
    navigations: RwLock<HashMap<(String, String), Arc<NavigationDescriptor>>>,
}

impl MetadataCache {
    pub fn clear(&self) {
        self.tables.write().clear();
        self.columns.write().clear();
        self.navigations.write().clear();
    }

    pub fn is_empty(&self) -> bool {
        self.tables.read().is_empty()
            && self.columns.read().is_empty()
            && self.navigations.read().is_empty()
    }
}

/// Registry of entity metadata, populated at startup
#[derive(Debug, Default)]
pub struct EntityRegistry {
    entities: HashMap<String, Arc<EntityMetadata>>,
    cache: MetadataCache,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, metadata: EntityMetadata) -> &mut Self {
        log::trace!("registering entity {}", metadata.name);
        self.entities
            .insert(metadata.name.clone(), Arc::new(metadata));
        self.cache.clear();
        self
    }

    pub fn with(mut self, metadata: EntityMetadata) -> Self {
        self.register(metadata);
        self
    }

    pub fn with_entity<E: Entity>(self) -> Self {
        self.with(E::metadata())
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Drop every derived value; the next lookups recompute them
    pub fn invalidate(&self) {
        self.cache.clear();
    }

    pub fn cache(&self) -> &MetadataCache {
        &self.cache
    }

    /// Namespace-aware lookup: exact name, then without a `module::`
    /// prefix, then the UpperCamelCase spelling
    pub fn entity(&self, name: &str) -> Option<&Arc<EntityMetadata>> {
        if let Some(meta) = self.entities.get(name) {
            return Some(meta);
        }
        if let Some(colon_pos) = name.rfind("::") {
            if let Some(meta) = self.entities.get(&name[colon_pos + 2..]) {
                return Some(meta);
            }
        }
        self.entities.get(&name.to_upper_camel_case())
    }

    fn require(&self, name: &str) -> Result<&Arc<EntityMetadata>> {
        self.entity(name)
            .ok_or_else(|| TrellisError::configuration(name, "entity is not registered"))
    }

    fn resolve_relationship(
        &self,
        parent: &EntityMetadata,
        nav: &NavigationMetadata,
        related: &EntityMetadata,
    ) -> Result<RelationshipKind> {
        let subject = format!("{}.{}", parent.name, nav.property);

        if let Some(key) = &nav.foreign_key {
            let column = parent.find_column(key).ok_or_else(|| {
                TrellisError::configuration(
                    &subject,
                    format!("foreign key '{}' is not a column of {}", key, parent.name),
                )
            })?;
            return Ok(RelationshipKind::ForwardForeignKey {
                foreign_key: column.column.clone(),
            });
        }

        if let Some(column) = parent.columns.iter().find(|c| {
            c.references
                .as_deref()
                .is_some_and(|r| r.eq_ignore_ascii_case(&nav.property))
        }) {
            return Ok(RelationshipKind::ForwardForeignKey {
                foreign_key: column.column.clone(),
            });
        }

        if let Some(junction) = &nav.junction {
            let missing = |detail: String| {
                TrellisError::configuration(&subject, format!("missing junction metadata: {}", detail))
            };
            let junction_meta = self
                .entity(&junction.entity)
                .ok_or_else(|| missing(format!("entity '{}' is not registered", junction.entity)))?;
            let parent_key = junction_meta.find_column(&junction.parent_key).ok_or_else(|| {
                missing(format!("'{}' is not a column of {}", junction.parent_key, junction.entity))
            })?;
            let target_key = junction_meta.find_column(&junction.target_key).ok_or_else(|| {
                missing(format!("'{}' is not a column of {}", junction.target_key, junction.entity))
            })?;
            return Ok(RelationshipKind::ManyToMany {
                junction_entity: junction_meta.name.clone(),
                junction_table: junction_meta.resolved_table_name(),
                parent_key: parent_key.column.clone(),
                target_key: target_key.column.clone(),
            });
        }

        if let Some(key) = &nav.inverse_key {
            let column = related.find_column(key).ok_or_else(|| {
                TrellisError::configuration(
                    &subject,
                    format!("inverse key '{}' is not a column of {}", key, related.name),
                )
            })?;
            return Ok(RelationshipKind::InverseForeignKey {
                foreign_key: column.column.clone(),
            });
        }

        // A navigation on the related entity pointing back with its own forward key
        for back in related
            .navigations
            .iter()
            .filter(|n| names_match(&n.target, &parent.name) && n.junction.is_none())
        {
            if let Some(key) = &back.foreign_key {
                if let Some(column) = related.find_column(key) {
                    return Ok(RelationshipKind::InverseForeignKey {
                        foreign_key: column.column.clone(),
                    });
                }
            }
            if let Some(column) = related.columns.iter().find(|c| {
                c.references
                    .as_deref()
                    .is_some_and(|r| r.eq_ignore_ascii_case(&back.property))
            }) {
                return Ok(RelationshipKind::InverseForeignKey {
                    foreign_key: column.column.clone(),
                });
            }
        }

        Err(TrellisError::configuration(
            subject,
            format!(
                "cannot resolve a foreign key between {} and {}",
                parent.name, related.name
            ),
        ))
    }
}

fn names_match(declared: &str, name: &str) -> bool {
    let short = |s: &str| match s.rfind("::") {
        Some(pos) => s[pos + 2..].to_string(),
        None => s.to_string(),
    };
    short(declared) == short(name)
}

impl MetadataProvider for EntityRegistry {
    fn table_name(&self, entity: &str) -> Result<String> {
        if let Some(table) = self.cache.tables.read().get(entity) {
            return Ok(table.clone());
        }
        let table = self.require(entity)?.resolved_table_name();
        log::trace!("cached table name {} for {}", table, entity);
        self.cache
            .tables
            .write()
            .insert(entity.to_string(), table.clone());
        Ok(table)
    }

    fn column_mappings(&self, entity: &str) -> Result<Arc<Vec<ColumnMetadata>>> {
        if let Some(columns) = self.cache.columns.read().get(entity) {
            return Ok(Arc::clone(columns));
        }
        let columns = Arc::new(self.require(entity)?.columns.clone());
        log::trace!("cached {} column mappings for {}", columns.len(), entity);
        self.cache
            .columns
            .write()
            .insert(entity.to_string(), Arc::clone(&columns));
        Ok(columns)
    }

    fn resolve_navigation(&self, entity: &str, property: &str) -> Result<Arc<NavigationDescriptor>> {
        let key = (entity.to_string(), property.to_string());
        if let Some(found) = self.cache.navigations.read().get(&key) {
            return Ok(Arc::clone(found));
        }

        let parent = self.require(entity)?;
        let nav = parent.find_navigation(property).ok_or_else(|| {
            TrellisError::configuration(
                entity,
                format!("no navigation property '{}' on {}", property, parent.name),
            )
        })?;
        let related = self.entity(&nav.target).ok_or_else(|| {
            TrellisError::configuration(
                format!("{}.{}", parent.name, nav.property),
                format!("related entity '{}' is not registered", nav.target),
            )
        })?;
        let relationship = self.resolve_relationship(parent, nav, related)?;

        let descriptor = Arc::new(NavigationDescriptor {
            property: nav.property.clone(),
            related_entity: related.name.clone(),
            is_collection: nav.is_collection(),
            relationship,
        });
        log::trace!(
            "resolved navigation {}.{} as {:?}",
            parent.name,
            nav.property,
            descriptor.relationship
        );
        self.cache
            .navigations
            .write()
            .insert(key, Arc::clone(&descriptor));
        Ok(descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> EntityRegistry {
        EntityRegistry::new()
            .with(
                EntityMetadata::new("Customer")
                    .column(ColumnMetadata::new("id", "id", FieldType::Int).primary_key())
                    .column(ColumnMetadata::new("name", "name", FieldType::String))
                    .navigation(NavigationMetadata::collection("Orders", "Order")),
            )
            .with(
                EntityMetadata::new("Order")
                    .table("orders")
                    .column(ColumnMetadata::new("id", "id", FieldType::Int).primary_key())
                    .column(ColumnMetadata::new("customer_id", "customer_id", FieldType::Int))
                    .navigation(NavigationMetadata::single("Customer", "Customer").foreign_key("customer_id")),
            )
            .with(
                EntityMetadata::new("Invoice")
                    .column(ColumnMetadata::new("Id", "id", FieldType::Int).primary_key())
                    .column(ColumnMetadata::new("BuyerId", "buyer_id", FieldType::Int).references("Buyer"))
                    .navigation(NavigationMetadata::single("Buyer", "Customer")),
            )
            .with(
                EntityMetadata::new("Post")
                    .column(ColumnMetadata::new("id", "id", FieldType::Int).primary_key())
                    .navigation(NavigationMetadata::collection("Tags", "Tag").through("PostTag", "post_id", "tag_id"))
                    .navigation(NavigationMetadata::collection("Labels", "Tag").through("PostLabel", "post_id", "tag_id")),
            )
            .with(EntityMetadata::new("Tag").column(ColumnMetadata::new("id", "id", FieldType::Int).primary_key()))
            .with(
                EntityMetadata::new("PostTag")
                    .column(ColumnMetadata::new("post_id", "post_id", FieldType::Int))
                    .column(ColumnMetadata::new("tag_id", "tag_id", FieldType::Int)),
            )
    }

    #[test]
    fn test_table_names_default_to_snake_case() {
        let registry = registry();
        assert_eq!(registry.table_name("Customer").unwrap(), "customer");
        assert_eq!(registry.table_name("Order").unwrap(), "orders");
        assert_eq!(registry.table_name("PostTag").unwrap(), "post_tag");
    }

    #[test]
    fn test_namespaced_entity_names_resolve() {
        let registry = registry();
        assert!(registry.entity("shop::Customer").is_some());
        assert!(registry.entity("post_tag").is_some());
        assert!(registry.entity("Unknown").is_none());
    }

    #[test]
    fn test_primary_key_defaults_to_id() {
        let registry = EntityRegistry::new()
            .with(EntityMetadata::new("Audit").column(ColumnMetadata::new("at", "at", FieldType::DateTime)));
        assert_eq!(registry.primary_key_column("Audit").unwrap(), "id");
    }

    #[test]
    fn test_forward_and_inferred_inverse_keys() {
        let registry = registry();
        let forward = registry.resolve_navigation("Order", "customer").unwrap();
        assert_eq!(
            forward.relationship,
            RelationshipKind::ForwardForeignKey {
                foreign_key: "customer_id".into()
            }
        );
        assert!(!forward.is_collection);

        let inverse = registry.resolve_navigation("Customer", "orders").unwrap();
        assert_eq!(inverse.property, "Orders");
        assert_eq!(
            inverse.relationship,
            RelationshipKind::InverseForeignKey {
                foreign_key: "customer_id".into()
            }
        );
        assert!(inverse.is_collection);
    }

    #[test]
    fn test_references_attribute_marks_forward_key() {
        let registry = registry();
        let nav = registry.resolve_navigation("Invoice", "buyer").unwrap();
        assert_eq!(
            nav.relationship,
            RelationshipKind::ForwardForeignKey {
                foreign_key: "buyer_id".into()
            }
        );
    }

    #[test]
    fn test_junction_resolution() {
        let registry = registry();
        let tags = registry.resolve_navigation("Post", "Tags").unwrap();
        assert_eq!(
            tags.relationship,
            RelationshipKind::ManyToMany {
                junction_entity: "PostTag".into(),
                junction_table: "post_tag".into(),
                parent_key: "post_id".into(),
                target_key: "tag_id".into(),
            }
        );

        match registry.resolve_navigation("Post", "Labels") {
            Err(TrellisError::Configuration { message, .. }) => {
                assert!(message.contains("missing junction metadata"))
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_navigation_is_configuration_error() {
        let registry = registry();
        assert!(matches!(
            registry.resolve_navigation("Order", "Supplier"),
            Err(TrellisError::Configuration { .. })
        ));
    }

    #[test]
    fn test_cache_fills_and_invalidates() {
        let registry = registry();
        assert!(registry.cache().is_empty());
        registry.resolve_navigation("Order", "Customer").unwrap();
        registry.column_mappings("Order").unwrap();
        assert!(!registry.cache().is_empty());
        registry.invalidate();
        assert!(registry.cache().is_empty());
    }
}
