use std::collections::HashMap;

use super::case_expression::Projection;
use super::include_tree::{IncludeForest, IncludeTreeBuilder, NodeId, ROOT_ALIAS};
use crate::config::CompilerOptions;
use crate::entity_metadata::{ColumnMetadata, MetadataProvider, RelationshipKind};
use crate::sanitizer::Sanitizer;
use crate::types::Result;

/// Where one selected column lands in the result set
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMapping {
    pub column: String,
    /// Result-set alias, only set when columns are listed explicitly
    pub column_alias: Option<String>,
    pub property: ColumnMetadata,
    pub table_alias: String,
}

/// SQL fragments and column layout for one root entity plus its includes
#[derive(Debug, Clone)]
pub struct JoinCompilation {
    pub root_entity: String,
    pub base_table: String,
    pub select_clause: String,
    pub join_clause: String,
    pub forest: IncludeForest,
    /// Table alias to the columns it contributes, in declaration order
    pub column_map: HashMap<String, Vec<ColumnMapping>>,
    /// Table aliases in the order they appear in the select clause
    pub select_order: Vec<String>,
}

impl JoinCompilation {
    /// Full statement: `SELECT <select> FROM <base_table> t0 <joins>`
    pub fn to_sql(&self) -> String {
        if self.join_clause.is_empty() {
            format!("SELECT {} FROM {} {}", self.select_clause, self.base_table, ROOT_ALIAS)
        } else {
            format!(
                "SELECT {} FROM {} {} {}",
                self.select_clause, self.base_table, ROOT_ALIAS, self.join_clause
            )
        }
    }

    /// Full statement with extra select-list items after the compiled columns,
    /// which keeps the positional layout intact
    pub fn to_sql_with(&self, projection: &Projection) -> String {
        if projection.is_empty() {
            return self.to_sql();
        }
        let select = format!("{}, {}", self.select_clause, projection.to_sql());
        let mut sql = format!("SELECT {} FROM {} {}", select, self.base_table, ROOT_ALIAS);
        if !self.join_clause.is_empty() {
            sql.push(' ');
            sql.push_str(&self.join_clause);
        }
        sql
    }

    pub fn columns(&self, alias: &str) -> &[ColumnMapping] {
        self.column_map
            .get(alias)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Every selected column in result-set order
    pub fn positional_layout(&self) -> Vec<&ColumnMapping> {
        self.select_order
            .iter()
            .flat_map(|alias| self.columns(alias))
            .collect()
    }
}

/// Compiles include paths into LEFT JOIN fragments
pub struct JoinCompiler<'a> {
    provider: &'a dyn MetadataProvider,
    sanitizer: &'a dyn Sanitizer,
    options: CompilerOptions,
}

impl<'a> JoinCompiler<'a> {
    pub fn new(
        provider: &'a dyn MetadataProvider,
        sanitizer: &'a dyn Sanitizer,
        options: CompilerOptions,
    ) -> Self {
        Self {
            provider,
            sanitizer,
            options,
        }
    }

    pub fn compile<S: AsRef<str>>(
        &self,
        root_entity: &str,
        base_table: &str,
        include_paths: &[S],
    ) -> Result<JoinCompilation> {
        log::debug!(
            "compiling {} include paths for {}",
            include_paths.len(),
            root_entity
        );

        let forest = IncludeTreeBuilder::new(self.provider, &self.options)
            .parse_includes(root_entity, include_paths)?;

        let mut compilation = JoinCompilation {
            root_entity: root_entity.to_string(),
            base_table: self.sanitizer.sanitize_identifier(base_table),
            select_clause: String::new(),
            join_clause: String::new(),
            forest: IncludeForest::default(),
            column_map: HashMap::new(),
            select_order: Vec::new(),
        };

        // An include-free query always selects `t0.*`
        let explicit = self.options.explicit_columns && !include_paths.is_empty();
        match self.provider.column_mappings(root_entity) {
            Ok(columns) => self.map_columns(&mut compilation, ROOT_ALIAS, &columns, explicit),
            // Without includes the root only needs `t0.*`
            Err(_) if include_paths.is_empty() => {}
            Err(err) => return Err(err),
        }
        let mut select = vec![self.select_columns(&compilation, ROOT_ALIAS, explicit)];
        compilation.select_order.push(ROOT_ALIAS.to_string());

        let mut joins = Vec::with_capacity(forest.len());
        for id in forest.depth_first() {
            let node = &forest[id];
            let columns = self.provider.column_mappings(&node.related_entity)?;
            self.map_columns(&mut compilation, &node.alias, &columns, explicit);
            select.push(self.select_columns(&compilation, &node.alias, explicit));
            compilation.select_order.push(node.alias.clone());

            let join = self.join_for(&forest, id);
            log::trace!("{} -> {}", node.path, join);
            joins.push(join);
        }

        compilation.select_clause = select.join(", ");
        compilation.join_clause = joins.join(" ");
        compilation.forest = forest;

        log::debug!(
            "compiled {} with {} aliases",
            root_entity,
            compilation.select_order.len()
        );
        Ok(compilation)
    }

    fn map_columns(
        &self,
        compilation: &mut JoinCompilation,
        alias: &str,
        columns: &[ColumnMetadata],
        explicit: bool,
    ) {
        let mappings = columns
            .iter()
            .map(|column| ColumnMapping {
                column: column.column.clone(),
                column_alias: explicit.then(|| format!("{}__{}", alias, column.column)),
                property: column.clone(),
                table_alias: alias.to_string(),
            })
            .collect();
        compilation.column_map.insert(alias.to_string(), mappings);
    }

    fn select_columns(&self, compilation: &JoinCompilation, alias: &str, explicit: bool) -> String {
        let columns = compilation.columns(alias);
        if !explicit || columns.is_empty() {
            return format!("{}.*", alias);
        }
        columns
            .iter()
            .map(|mapping| {
                let column_alias = mapping.column_alias.as_deref().unwrap_or(&mapping.column);
                format!(
                    "{}.{} AS {}",
                    alias,
                    self.sanitizer.sanitize_identifier(&mapping.column),
                    self.sanitizer.sanitize_identifier(column_alias)
                )
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn join_for(&self, forest: &IncludeForest, id: NodeId) -> String {
        let node = &forest[id];
        let s = |identifier: &str| self.sanitizer.sanitize_identifier(identifier);
        let parent = forest.parent_alias(id);
        let alias = &node.alias;
        let table = s(&node.related_table);

        match &node.relationship {
            RelationshipKind::ForwardForeignKey { foreign_key } => format!(
                "LEFT JOIN {} {} ON {}.{} = {}.{}",
                table,
                alias,
                parent,
                s(foreign_key),
                alias,
                s(&node.related_primary_key)
            ),
            RelationshipKind::InverseForeignKey { foreign_key } => format!(
                "LEFT JOIN {} {} ON {}.{} = {}.{}",
                table,
                alias,
                parent,
                s(&node.parent_primary_key),
                alias,
                s(foreign_key)
            ),
            RelationshipKind::ManyToMany {
                junction_table,
                parent_key,
                target_key,
                ..
            } => {
                let junction = format!("jt_{}", alias);
                format!(
                    "LEFT JOIN {} {} ON {}.{} = {}.{} LEFT JOIN {} {} ON {}.{} = {}.{}",
                    s(junction_table),
                    junction,
                    parent,
                    s(&node.parent_primary_key),
                    junction,
                    s(parent_key),
                    table,
                    alias,
                    junction,
                    s(target_key),
                    alias,
                    s(&node.related_primary_key)
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::FieldType;
    use crate::entity_metadata::{EntityMetadata, EntityRegistry, NavigationMetadata};
    use crate::sanitizer::BackendSanitizer;
    use crate::types::TrellisError;
    use sea_orm::DatabaseBackend;

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
                    .table("order")
                    .column(ColumnMetadata::new("id", "id", FieldType::Int).primary_key())
                    .column(ColumnMetadata::new("customer_id", "customer_id", FieldType::Int))
                    .navigation(NavigationMetadata::single("Customer", "Customer").foreign_key("customer_id")),
            )
    }

    fn compile(paths: &[&str], options: CompilerOptions) -> Result<JoinCompilation> {
        let registry = registry();
        let sanitizer = BackendSanitizer::new(DatabaseBackend::Postgres);
        JoinCompiler::new(&registry, &sanitizer, options).compile("Order", "order", paths)
    }

    #[test]
    fn test_no_includes_selects_root_only() {
        let compilation = compile(&[], CompilerOptions::default()).unwrap();
        assert_eq!(compilation.select_clause, "t0.*");
        assert_eq!(compilation.join_clause, "");
        assert_eq!(compilation.columns("t0").len(), 2);
        assert_eq!(compilation.to_sql(), "SELECT t0.* FROM \"order\" t0");
    }

    #[test]
    fn test_inverse_join_uses_parent_key() {
        let registry = registry();
        let sanitizer = BackendSanitizer::new(DatabaseBackend::Postgres);
        let compilation = JoinCompiler::new(&registry, &sanitizer, CompilerOptions::default())
            .compile("Customer", "customer", &["Orders"])
            .unwrap();
        assert_eq!(
            compilation.join_clause,
            "LEFT JOIN \"order\" t1 ON t0.id = t1.customer_id"
        );
    }

    #[test]
    fn test_explicit_columns_are_aliased() {
        let options = CompilerOptions {
            explicit_columns: true,
            ..CompilerOptions::default()
        };
        let compilation = compile(&["Customer"], options).unwrap();
        assert_eq!(
            compilation.select_clause,
            "t0.id AS t0__id, t0.customer_id AS t0__customer_id, t1.id AS t1__id, t1.name AS t1__name"
        );
        assert_eq!(
            compilation.columns("t1")[1].column_alias.as_deref(),
            Some("t1__name")
        );
        let layout: Vec<&str> = compilation
            .positional_layout()
            .iter()
            .map(|m| m.column.as_str())
            .collect();
        assert_eq!(layout, vec!["id", "customer_id", "id", "name"]);
    }

    #[test]
    fn test_explicit_columns_without_includes_select_root_only() {
        let options = CompilerOptions {
            explicit_columns: true,
            ..CompilerOptions::default()
        };
        let compilation = compile(&[], options).unwrap();
        assert_eq!(compilation.select_clause, "t0.*");
        assert_eq!(compilation.join_clause, "");
        assert!(compilation.columns("t0").iter().all(|m| m.column_alias.is_none()));
    }

    #[test]
    fn test_projection_is_appended() {
        use crate::query_builders::case_expression::CaseBuilder;

        let sanitizer = BackendSanitizer::new(DatabaseBackend::Postgres);
        let compilation = compile(&["Customer"], CompilerOptions::default()).unwrap();
        let case = CaseBuilder::new(&sanitizer)
            .when("t1.name IS NULL", "guest")
            .otherwise("member")
            .end_case("kind")
            .unwrap();
        assert_eq!(
            compilation.to_sql_with(&Projection::new().case(case)),
            "SELECT t0.*, t1.*, CASE WHEN t1.name IS NULL THEN 'guest' ELSE 'member' END AS kind \
             FROM \"order\" t0 LEFT JOIN customer t1 ON t0.customer_id = t1.id"
        );
    }

    #[test]
    fn test_errors_name_the_path() {
        match compile(&["Customer.Invoices"], CompilerOptions::default()) {
            Err(TrellisError::Configuration { subject, .. }) => {
                assert_eq!(subject, "Customer.Invoices")
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
