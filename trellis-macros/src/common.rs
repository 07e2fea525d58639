// Type inspection helpers shared by the derives

const COLLECTIONS: &[&str] = &["Vec", "HashSet", "BTreeSet", "VecDeque"];

fn last_segment(ty: &syn::Type) -> Option<&syn::PathSegment> {
    match ty {
        syn::Type::Path(type_path) => type_path.path.segments.last(),
        _ => None,
    }
}

fn first_generic(segment: &syn::PathSegment) -> Option<&syn::Type> {
    if let syn::PathArguments::AngleBracketed(args) = &segment.arguments {
        if let Some(syn::GenericArgument::Type(inner)) = args.args.first() {
            return Some(inner);
        }
    }
    None
}

pub fn is_option(ty: &syn::Type) -> bool {
    last_segment(ty).is_some_and(|segment| segment.ident == "Option")
}

/// Extract the inner type from Option<T>, or return the original type if not an Option
pub fn extract_inner_type_from_option(ty: &syn::Type) -> &syn::Type {
    match last_segment(ty) {
        Some(segment) if segment.ident == "Option" => first_generic(segment).unwrap_or(ty),
        _ => ty,
    }
}

pub fn is_collection(ty: &syn::Type) -> bool {
    let ty = extract_inner_type_from_option(ty);
    last_segment(ty).is_some_and(|segment| COLLECTIONS.iter().any(|c| segment.ident == c))
}

/// `Vec<u8>` or `Option<Vec<u8>>`, mapped to a binary column
pub fn is_bytes(ty: &syn::Type) -> bool {
    let ty = extract_inner_type_from_option(ty);
    match last_segment(ty) {
        Some(segment) if segment.ident == "Vec" => first_generic(segment)
            .and_then(last_segment)
            .is_some_and(|inner| inner.ident == "u8"),
        _ => false,
    }
}

/// Entity name a navigation field points at: the element type of a collection,
/// with `Option` and `Box` peeled off
pub fn related_entity_name(ty: &syn::Type) -> Option<String> {
    let mut ty = extract_inner_type_from_option(ty);
    loop {
        let segment = last_segment(ty)?;
        let peel = segment.ident == "Box"
            || segment.ident == "Option"
            || COLLECTIONS.iter().any(|c| segment.ident == c);
        if !peel {
            return Some(segment.ident.to_string());
        }
        ty = first_generic(segment)?;
    }
}
