use heck::ToSnakeCase;
use proc_macro2::{Span, TokenStream};
use quote::quote;
use syn::spanned::Spanned;
use syn::{DeriveInput, LitInt, LitStr};

use crate::common::{is_bytes, is_collection, is_option, related_entity_name};
use crate::errors::MacroError;

#[derive(Default)]
struct EntityAttrs {
    table: Option<String>,
    name: Option<String>,
}

#[derive(Default)]
struct FieldAttrs {
    skip: bool,
    primary_key: bool,
    name: Option<String>,
    column: Option<String>,
    references: Option<String>,
    json: bool,
    enum_as_integer: bool,
    timezone_aware: bool,
    uuid_as_string: bool,
    max_length: Option<u32>,

    navigation: bool,
    related: Option<String>,
    foreign_key: Option<String>,
    inverse_key: Option<String>,
    junction: Option<String>,
    junction_parent: Option<String>,
    junction_target: Option<String>,
}

impl FieldAttrs {
    fn is_navigation(&self) -> bool {
        self.navigation
            || self.related.is_some()
            || self.foreign_key.is_some()
            || self.inverse_key.is_some()
            || self.junction.is_some()
            || self.junction_parent.is_some()
            || self.junction_target.is_some()
    }
}

fn string_value(meta: &syn::meta::ParseNestedMeta) -> syn::Result<String> {
    let lit: LitStr = meta.value()?.parse()?;
    Ok(lit.value())
}

fn parse_entity_attrs(ast: &DeriveInput) -> syn::Result<EntityAttrs> {
    let mut attrs = EntityAttrs::default();
    for attr in ast.attrs.iter().filter(|a| a.path().is_ident("trellis")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("table") {
                attrs.table = Some(string_value(&meta)?);
            } else if meta.path.is_ident("name") {
                attrs.name = Some(string_value(&meta)?);
            } else {
                return Err(meta.error("expected `table` or `name`"));
            }
            Ok(())
        })?;
    }
    Ok(attrs)
}

fn parse_field_attrs(field: &syn::Field) -> syn::Result<FieldAttrs> {
    let mut attrs = FieldAttrs::default();
    for attr in field.attrs.iter().filter(|a| a.path().is_ident("trellis")) {
        attr.parse_nested_meta(|meta| {
            let path = &meta.path;
            if path.is_ident("skip") {
                attrs.skip = true;
            } else if path.is_ident("primary_key") {
                attrs.primary_key = true;
            } else if path.is_ident("name") {
                attrs.name = Some(string_value(&meta)?);
            } else if path.is_ident("column") {
                attrs.column = Some(string_value(&meta)?);
            } else if path.is_ident("references") {
                attrs.references = Some(string_value(&meta)?);
            } else if path.is_ident("json") {
                attrs.json = true;
            } else if path.is_ident("enum_as_integer") {
                attrs.enum_as_integer = true;
            } else if path.is_ident("timezone_aware") {
                attrs.timezone_aware = true;
            } else if path.is_ident("uuid_as_string") {
                attrs.uuid_as_string = true;
            } else if path.is_ident("max_length") {
                let lit: LitInt = meta.value()?.parse()?;
                attrs.max_length = Some(lit.base10_parse()?);
            } else if path.is_ident("navigation") {
                attrs.navigation = true;
            } else if path.is_ident("related") {
                attrs.related = Some(string_value(&meta)?);
            } else if path.is_ident("foreign_key") {
                attrs.foreign_key = Some(string_value(&meta)?);
            } else if path.is_ident("inverse_key") {
                attrs.inverse_key = Some(string_value(&meta)?);
            } else if path.is_ident("junction") {
                attrs.junction = Some(string_value(&meta)?);
            } else if path.is_ident("junction_parent") {
                attrs.junction_parent = Some(string_value(&meta)?);
            } else if path.is_ident("junction_target") {
                attrs.junction_target = Some(string_value(&meta)?);
            } else {
                return Err(meta.error("unknown trellis attribute"));
            }
            Ok(())
        })?;
    }
    Ok(attrs)
}

pub fn generate_entity_impl(ast: &DeriveInput) -> syn::Result<TokenStream> {
    let ident = &ast.ident;
    let fields = match &ast.data {
        syn::Data::Struct(syn::DataStruct {
            fields: syn::Fields::Named(fields),
            ..
        }) => &fields.named,
        _ => {
            return Err(MacroError::NotANamedStruct {
                entity_name: ident.to_string(),
            }
            .at(ident.span()))
        }
    };

    let entity_attrs = parse_entity_attrs(ast)?;
    let entity_name = entity_attrs.name.unwrap_or_else(|| ident.to_string());

    let mut parsed = Vec::with_capacity(fields.len());
    for field in fields {
        let attrs = parse_field_attrs(field)?;
        if !attrs.skip {
            parsed.push((field, attrs));
        }
    }

    let primary_key = primary_key_field(&entity_name, ident.span(), &parsed)?;

    let mut columns = Vec::new();
    let mut navigations = Vec::new();
    for (index, (field, attrs)) in parsed.iter().enumerate() {
        if attrs.is_navigation() {
            navigations.push(navigation_tokens(field, attrs)?);
        } else {
            columns.push(column_tokens(field, attrs, primary_key == Some(index))?);
        }
    }

    let table = entity_attrs
        .table
        .map(|table| quote! { .table(#table) })
        .unwrap_or_default();

    Ok(quote! {
        impl ::trellis::entity_metadata::Entity for #ident {
            const NAME: &'static str = #entity_name;

            fn metadata() -> ::trellis::entity_metadata::EntityMetadata {
                ::trellis::entity_metadata::EntityMetadata::new(Self::NAME)
                    #table
                    #(#columns)*
                    #(#navigations)*
            }
        }
    })
}

/// Index of the primary-key column: the flagged field, else a field named `id`
fn primary_key_field(
    entity_name: &str,
    span: Span,
    fields: &[(&syn::Field, FieldAttrs)],
) -> syn::Result<Option<usize>> {
    let flagged: Vec<usize> = fields
        .iter()
        .enumerate()
        .filter(|(_, (_, attrs))| attrs.primary_key)
        .map(|(index, _)| index)
        .collect();

    match flagged.as_slice() {
        [index] => Ok(Some(*index)),
        [] => {
            let by_name = fields.iter().position(|(field, attrs)| {
                !attrs.is_navigation() && field.ident.as_ref().is_some_and(|i| i == "id")
            });
            match by_name {
                Some(index) => Ok(Some(index)),
                None => Err(MacroError::NoPrimaryKey {
                    entity_name: entity_name.to_string(),
                }
                .at(span)),
            }
        }
        _ => Err(MacroError::MultiplePrimaryKeys {
            entity_name: entity_name.to_string(),
        }
        .at(span)),
    }
}

fn field_name(field: &syn::Field) -> String {
    field
        .ident
        .as_ref()
        .map(|i| i.to_string().trim_start_matches("r#").to_string())
        .unwrap_or_default()
}

fn property_name(field: &syn::Field, attrs: &FieldAttrs) -> String {
    attrs.name.clone().unwrap_or_else(|| field_name(field))
}

fn column_tokens(field: &syn::Field, attrs: &FieldAttrs, primary_key: bool) -> syn::Result<TokenStream> {
    let property = property_name(field, attrs);
    let column = attrs
        .column
        .clone()
        .unwrap_or_else(|| field_name(field).to_snake_case());
    let ty = &field.ty;

    let fixed = if attrs.json {
        Some(quote! { ::trellis::codec::FieldType::Json })
    } else if is_bytes(ty) {
        Some(quote! { ::trellis::codec::FieldType::Bytes })
    } else {
        None
    };
    let field_type = match fixed {
        Some(fixed) if is_option(ty) => quote! { ::trellis::codec::FieldType::nullable(#fixed) },
        Some(fixed) => fixed,
        None => quote! { <#ty as ::trellis::codec::FieldKind>::field_type() },
    };

    let mut chain = Vec::new();
    if primary_key {
        chain.push(quote! { .primary_key() });
    }
    if let Some(references) = &attrs.references {
        chain.push(quote! { .references(#references) });
    }
    if attrs.enum_as_integer {
        chain.push(quote! { .enum_as_integer() });
    }
    if attrs.timezone_aware {
        chain.push(quote! { .timezone_aware() });
    }
    if attrs.uuid_as_string {
        chain.push(quote! { .uuid_as_string() });
    }
    if let Some(length) = attrs.max_length {
        chain.push(quote! { .max_length(#length) });
    }

    Ok(quote! {
        .column(
            ::trellis::entity_metadata::ColumnMetadata::new(#property, #column, #field_type)
                #(#chain)*
        )
    })
}

fn navigation_tokens(field: &syn::Field, attrs: &FieldAttrs) -> syn::Result<TokenStream> {
    let property = property_name(field, attrs);
    let span = field.span();

    for (set, attribute) in [
        (attrs.primary_key, "primary_key"),
        (attrs.json, "json"),
        (attrs.column.is_some(), "column"),
        (attrs.references.is_some(), "references"),
    ] {
        if set {
            return Err(MacroError::NavigationOnly {
                field_name: property,
                attribute: attribute.to_string(),
            }
            .at(span));
        }
    }

    let related = match attrs.related.clone().or_else(|| related_entity_name(&field.ty)) {
        Some(related) => related,
        None => return Err(MacroError::UnknownRelatedEntity { field_name: property }.at(span)),
    };

    let constructor = if is_collection(&field.ty) {
        quote! { ::trellis::entity_metadata::NavigationMetadata::collection(#property, #related) }
    } else {
        quote! { ::trellis::entity_metadata::NavigationMetadata::single(#property, #related) }
    };

    let mut chain = Vec::new();
    if let Some(key) = &attrs.foreign_key {
        chain.push(quote! { .foreign_key(#key) });
    }
    if let Some(key) = &attrs.inverse_key {
        chain.push(quote! { .inverse_key(#key) });
    }

    let junction_parts = [&attrs.junction, &attrs.junction_parent, &attrs.junction_target];
    if junction_parts.iter().any(|part| part.is_some()) {
        if !chain.is_empty() {
            return Err(MacroError::ConflictingRelation { field_name: property }.at(span));
        }
        match (&attrs.junction, &attrs.junction_parent, &attrs.junction_target) {
            (Some(entity), Some(parent_key), Some(target_key)) => {
                chain.push(quote! { .through(#entity, #parent_key, #target_key) });
            }
            _ => return Err(MacroError::IncompleteJunction { field_name: property }.at(span)),
        }
    }

    Ok(quote! { .navigation(#constructor #(#chain)*) })
}
