#![crate_type = "proc-macro"]

extern crate proc_macro;
mod common;
mod entity;
mod errors;
mod field_enum;

use proc_macro::TokenStream;
use syn::{parse_macro_input, DeriveInput};

/// Implements `trellis::entity_metadata::Entity` for a struct with named fields.
///
/// Struct attributes: `#[trellis(table = "...", name = "...")]`.
/// Column attributes: `primary_key`, `column`, `name`, `references`, `json`,
/// `enum_as_integer`, `timezone_aware`, `uuid_as_string`, `max_length`, `skip`.
/// Navigation attributes: `navigation`, `related`, `foreign_key`, `inverse_key`,
/// `junction`, `junction_parent`, `junction_target`.
#[proc_macro_derive(Entity, attributes(trellis))]
pub fn entity_derive(input: TokenStream) -> TokenStream {
    let ast = parse_macro_input!(input as DeriveInput);
    entity::generate_entity_impl(&ast)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

/// Implements `trellis::FieldKind` for a fieldless enum so it can be used as
/// an entity column.
#[proc_macro_derive(FieldEnum, attributes(trellis))]
pub fn field_enum_derive(input: TokenStream) -> TokenStream {
    let ast = parse_macro_input!(input as DeriveInput);
    field_enum::generate_field_enum_impl(&ast)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}
