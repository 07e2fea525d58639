// Lets the derives' `::trellis` paths resolve inside this crate too
extern crate self as trellis;

pub mod codec;
pub mod config;
pub mod entity_metadata;
pub mod key_types;
pub mod query_builders;
pub mod sanitizer;
pub mod types;

use std::sync::Arc;

use sea_orm::DatabaseBackend;

pub use codec::{
    ConversionError, EnumType, EnumVariant, FieldKind, FieldType, FieldValue, PropertyMeta,
    ValueCodec,
};
pub use config::CompilerOptions;
pub use entity_metadata::{
    ColumnMetadata, Entity, EntityMetadata, EntityRegistry, JunctionMetadata, MetadataCache,
    MetadataProvider, NavigationDescriptor, NavigationMetadata, NavigationShape, RelationshipKind,
};
pub use key_types::RowKey;
pub use query_builders::*;
pub use sanitizer::{BackendSanitizer, Sanitizer};
pub use types::{Result, TrellisError};

// Re-export derives so `#[derive(trellis::Entity)]` works without a second dependency
pub use trellis_macros::{Entity, FieldEnum};

/// Entry point bundling the registry, the dialect and the compiler options.
///
/// Cheap to share: everything per compilation is created inside each call.
#[derive(Debug, Clone)]
pub struct QueryCompiler {
    registry: Arc<EntityRegistry>,
    sanitizer: BackendSanitizer,
    codec: ValueCodec,
    options: CompilerOptions,
}

impl QueryCompiler {
    pub fn new(registry: Arc<EntityRegistry>, backend: DatabaseBackend) -> Self {
        Self {
            registry,
            sanitizer: BackendSanitizer::new(backend),
            codec: ValueCodec::new(backend),
            options: CompilerOptions::default(),
        }
    }

    pub fn with_options(mut self, options: CompilerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    pub fn backend(&self) -> DatabaseBackend {
        self.sanitizer.backend()
    }

    pub fn sanitizer(&self) -> &BackendSanitizer {
        &self.sanitizer
    }

    pub fn codec(&self) -> &ValueCodec {
        &self.codec
    }

    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    /// Compile include paths against the root entity's own table
    pub fn compile_includes<S: AsRef<str>>(
        &self,
        root_entity: &str,
        include_paths: &[S],
    ) -> Result<JoinCompilation> {
        let base_table = self.registry.table_name(root_entity)?;
        self.join_compiler()
            .compile(root_entity, &base_table, include_paths)
    }

    pub fn compile_for<E: entity_metadata::Entity, S: AsRef<str>>(
        &self,
        include_paths: &[S],
    ) -> Result<JoinCompilation> {
        self.compile_includes(E::NAME, include_paths)
    }

    pub fn join_compiler(&self) -> JoinCompiler<'_> {
        JoinCompiler::new(self.registry.as_ref(), &self.sanitizer, self.options.clone())
    }

    pub fn case(&self) -> CaseBuilder<'_> {
        CaseBuilder::new(&self.sanitizer)
    }

    pub fn predicates(&self) -> SqlPredicateTranslator<'_> {
        SqlPredicateTranslator::new(&self.sanitizer)
    }

    pub fn assembler<'a>(&self, compilation: &'a JoinCompilation) -> RowAssembler<'a> {
        RowAssembler::new(compilation, self.codec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compiler(backend: DatabaseBackend) -> QueryCompiler {
        let registry = EntityRegistry::new()
            .with(
                EntityMetadata::new("Author")
                    .column(ColumnMetadata::new("id", "id", FieldType::Int).primary_key())
                    .column(ColumnMetadata::new("name", "name", FieldType::String))
                    .navigation(NavigationMetadata::collection("Books", "Book")),
            )
            .with(
                EntityMetadata::new("Book")
                    .column(ColumnMetadata::new("id", "id", FieldType::Int).primary_key())
                    .column(
                        ColumnMetadata::new("author_id", "author_id", FieldType::Int)
                            .references("Author"),
                    )
                    .navigation(NavigationMetadata::single("Author", "Author")),
            );
        QueryCompiler::new(Arc::new(registry), backend)
    }

    #[test]
    fn test_compile_includes_uses_registered_table() {
        let compiler = compiler(DatabaseBackend::Postgres);
        let compilation = compiler.compile_includes("Author", &["Books"]).unwrap();
        assert_eq!(
            compilation.to_sql(),
            "SELECT t0.*, t1.* FROM author t0 LEFT JOIN book t1 ON t0.id = t1.author_id"
        );
    }

    #[test]
    fn test_options_are_applied() {
        let compiler = compiler(DatabaseBackend::Sqlite).with_options(CompilerOptions {
            max_include_depth: 0,
            ..CompilerOptions::default()
        });
        assert!(matches!(
            compiler.compile_includes("Author", &["Books"]),
            Err(TrellisError::Validation { .. })
        ));
        assert_eq!(compiler.options().max_include_depth, 0);
        assert_eq!(compiler.backend(), DatabaseBackend::Sqlite);
    }

    #[test]
    fn test_case_uses_compiler_dialect() {
        let compiler = compiler(DatabaseBackend::MySql);
        let case = compiler
            .case()
            .when(Filter::equals("t0.name", "it's"), "quoted")
            .end_case("label")
            .unwrap();
        assert_eq!(
            case.expression,
            "CASE WHEN t0.name = 'it''s' THEN 'quoted' END"
        );
    }
}
