//! Error types for macro compilation failures

use proc_macro2::Span;

#[derive(Debug, thiserror::Error)]
pub enum MacroError {
    #[error("#[derive(Entity)] on '{entity_name}' requires a struct with named fields")]
    NotANamedStruct { entity_name: String },

    #[error("#[derive(FieldEnum)] on '{enum_name}' requires an enum whose variants carry no data")]
    NotAUnitEnum { enum_name: String },

    #[error("No primary key field found in entity '{entity_name}'.\n\nPlease add #[trellis(primary_key)] to a field or name it 'id'.\n\nExample:\n    #[trellis(primary_key)]\n    user_id: i32,")]
    NoPrimaryKey { entity_name: String },

    #[error("Multiple primary key fields found in entity '{entity_name}'. Please specify exactly one primary key field.")]
    MultiplePrimaryKeys { entity_name: String },

    #[error("Navigation '{field_name}' declares both a junction and a foreign key. Use either 'junction' or 'foreign_key'/'inverse_key'.")]
    ConflictingRelation { field_name: String },

    #[error("Navigation '{field_name}' has an incomplete junction.\n\nExample:\n    #[trellis(junction = \"PostTag\", junction_parent = \"post_id\", junction_target = \"tag_id\")]\n    tags: Vec<Tag>,")]
    IncompleteJunction { field_name: String },

    #[error("Attribute '{attribute}' on '{field_name}' only applies to navigation fields")]
    NavigationOnly {
        field_name: String,
        attribute: String,
    },

    #[error("Cannot infer the related entity of navigation '{field_name}'. Please add related = \"EntityName\".")]
    UnknownRelatedEntity { field_name: String },
}

impl MacroError {
    pub fn at(self, span: Span) -> syn::Error {
        syn::Error::new(span, self.to_string())
    }
}
