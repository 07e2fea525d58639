use proc_macro2::TokenStream;
use quote::quote;
use syn::spanned::Spanned;
use syn::{DeriveInput, LitStr};

use crate::errors::MacroError;

fn rename(attrs: &[syn::Attribute]) -> syn::Result<Option<String>> {
    let mut name = None;
    for attr in attrs.iter().filter(|a| a.path().is_ident("trellis")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                let lit: LitStr = meta.value()?.parse()?;
                name = Some(lit.value());
                Ok(())
            } else {
                Err(meta.error("expected `name`"))
            }
        })?;
    }
    Ok(name)
}

fn discriminant(expr: &syn::Expr) -> syn::Result<i64> {
    match expr {
        syn::Expr::Lit(syn::ExprLit {
            lit: syn::Lit::Int(lit),
            ..
        }) => lit.base10_parse(),
        syn::Expr::Unary(syn::ExprUnary {
            op: syn::UnOp::Neg(_),
            expr,
            ..
        }) => discriminant(expr).map(|value| -value),
        other => Err(syn::Error::new(
            other.span(),
            "FieldEnum discriminants must be integer literals",
        )),
    }
}

pub fn generate_field_enum_impl(ast: &DeriveInput) -> syn::Result<TokenStream> {
    let ident = &ast.ident;
    let not_unit = || {
        MacroError::NotAUnitEnum {
            enum_name: ident.to_string(),
        }
        .at(ident.span())
    };

    let data = match &ast.data {
        syn::Data::Enum(data) if !data.variants.is_empty() => data,
        _ => return Err(not_unit()),
    };

    let enum_name = rename(&ast.attrs)?.unwrap_or_else(|| ident.to_string());

    // Implicit discriminants continue from the previous one, like rustc does
    let mut next = 0i64;
    let mut variants = Vec::with_capacity(data.variants.len());
    let mut arms = Vec::with_capacity(data.variants.len());
    for variant in &data.variants {
        if !matches!(variant.fields, syn::Fields::Unit) {
            return Err(not_unit());
        }
        let value = match &variant.discriminant {
            Some((_, expr)) => discriminant(expr)?,
            None => next,
        };
        next = value + 1;

        let variant_ident = &variant.ident;
        let name = rename(&variant.attrs)?.unwrap_or_else(|| variant_ident.to_string());
        variants.push(quote! {
            ::trellis::codec::EnumVariant { name: #name, value: #value }
        });
        arms.push(quote! { #ident::#variant_ident => #name });
    }

    Ok(quote! {
        impl ::trellis::codec::FieldKind for #ident {
            fn field_type() -> ::trellis::codec::FieldType {
                const VARIANTS: &[::trellis::codec::EnumVariant] = &[#(#variants),*];
                ::trellis::codec::FieldType::Enum(
                    ::trellis::codec::EnumType::new(#enum_name, VARIANTS),
                )
            }
        }

        impl ::std::convert::From<#ident> for ::trellis::codec::FieldValue {
            fn from(value: #ident) -> Self {
                let name = match value {
                    #(#arms,)*
                };
                ::trellis::codec::FieldValue::Enum(name.to_string())
            }
        }
    })
}
