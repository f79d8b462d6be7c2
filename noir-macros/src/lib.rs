//! Proc macros for response schema generation.
//!
//! Provides `#[derive(Schema)]` to generate the JSON schema a language model
//! is asked to follow, straight from the Rust type it will be parsed into.
//!
//! # Example
//!
//! ```ignore
//! /// A clue found at the scene
//! #[derive(Schema)]
//! struct Clue {
//!     /// Short name of the clue
//!     name: String,
//!     /// Where it was found
//!     location: Option<String>,
//! }
//! ```

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{parse_macro_input, DeriveInput, Field, Lit, Meta, Type};

/// Derive macro for generating `json_schema()` on structs and unit enums.
///
/// # Attributes
///
/// - `#[schema(optional)]` on fields - Leave the field out of `required`
/// - `#[schema(rename = "...")]` on fields or variants - Override the schema name
///
/// Field types that are not primitives, `Option` or `Vec` must themselves
/// derive `Schema`; their `json_schema()` is inlined.
#[proc_macro_derive(Schema, attributes(schema))]
pub fn derive_schema(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand_schema(input)
        .unwrap_or_else(|err| err.to_compile_error())
        .into()
}

fn expand_schema(input: DeriveInput) -> syn::Result<TokenStream2> {
    let type_name = &input.ident;
    let description = get_doc_comment(&input.attrs);

    let body = match &input.data {
        syn::Data::Struct(data) => match &data.fields {
            syn::Fields::Named(named) => struct_schema(named.named.iter())?,
            _ => {
                return Err(syn::Error::new_spanned(
                    &input,
                    "Schema derive only supports structs with named fields",
                ))
            }
        },
        syn::Data::Enum(data) => {
            let mut names = Vec::new();
            for variant in &data.variants {
                if !matches!(variant.fields, syn::Fields::Unit) {
                    return Err(syn::Error::new_spanned(
                        variant,
                        "Schema derive only supports enums with unit variants",
                    ));
                }
                names.push(get_rename(&variant.attrs).unwrap_or_else(|| variant.ident.to_string()));
            }
            quote! {
                serde_json::json!({
                    "type": "string",
                    "enum": [#(#names),*]
                })
            }
        }
        syn::Data::Union(_) => {
            return Err(syn::Error::new_spanned(&input, "Schema derive does not support unions"))
        }
    };

    let desc_token = if description.is_empty() {
        quote! {}
    } else {
        quote! { schema["description"] = serde_json::json!(#description); }
    };

    Ok(quote! {
        impl #type_name {
            /// Get the schema description taken from the type's doc comment.
            pub fn schema_description() -> &'static str {
                #description
            }

            /// Generate the JSON schema for this type.
            #[allow(unused_mut)]
            pub fn json_schema() -> serde_json::Value {
                let mut schema = #body;
                #desc_token
                schema
            }
        }
    })
}

fn struct_schema<'a>(fields: impl Iterator<Item = &'a Field>) -> syn::Result<TokenStream2> {
    let mut property_tokens = Vec::new();
    let mut required_fields = Vec::new();

    for field in fields {
        let field_name_str = get_field_name(field)?;
        let field_desc = get_doc_comment(&field.attrs);
        let field_type = &field.ty;

        let type_schema = type_to_schema(field_type)?;

        let desc_token = if field_desc.is_empty() {
            quote! {}
        } else {
            quote! { property["description"] = serde_json::json!(#field_desc); }
        };

        property_tokens.push(quote! {
            {
                let mut property = #type_schema;
                #desc_token
                properties.insert(#field_name_str.to_string(), property);
            }
        });

        if !is_field_optional(field) && !is_option_type(field_type) {
            required_fields.push(field_name_str);
        }
    }

    Ok(quote! {
        {
            let mut properties = serde_json::Map::new();
            #(#property_tokens)*

            let required: Vec<&str> = vec![#(#required_fields),*];

            serde_json::json!({
                "type": "object",
                "properties": properties,
                "required": required
            })
        }
    })
}

fn get_rename(attrs: &[syn::Attribute]) -> Option<String> {
    for attr in attrs {
        if attr.path().is_ident("schema") {
            if let Ok(Meta::NameValue(nv)) = attr.parse_args::<Meta>() {
                if nv.path.is_ident("rename") {
                    if let syn::Expr::Lit(expr_lit) = &nv.value {
                        if let Lit::Str(s) = &expr_lit.lit {
                            return Some(s.value());
                        }
                    }
                }
            }
        }
    }
    None
}

fn get_field_name(field: &Field) -> syn::Result<String> {
    if let Some(name) = get_rename(&field.attrs) {
        return Ok(name);
    }
    field
        .ident
        .as_ref()
        .map(|ident| ident.to_string().trim_start_matches("r#").to_string())
        .ok_or_else(|| syn::Error::new_spanned(field, "expected a named field"))
}

fn is_field_optional(field: &Field) -> bool {
    field.attrs.iter().any(|attr| {
        attr.path().is_ident("schema")
            && matches!(attr.parse_args::<Meta>(), Ok(Meta::Path(path)) if path.is_ident("optional"))
    })
}

fn get_doc_comment(attrs: &[syn::Attribute]) -> String {
    let mut docs = Vec::new();
    for attr in attrs {
        if attr.path().is_ident("doc") {
            if let Meta::NameValue(nv) = &attr.meta {
                if let syn::Expr::Lit(expr_lit) = &nv.value {
                    if let Lit::Str(s) = &expr_lit.lit {
                        docs.push(s.value().trim().to_string());
                    }
                }
            }
        }
    }
    docs.join(" ")
}

fn is_option_type(ty: &Type) -> bool {
    if let Type::Path(type_path) = ty {
        if let Some(segment) = type_path.path.segments.last() {
            return segment.ident == "Option";
        }
    }
    false
}

fn first_generic(segment: &syn::PathSegment) -> Option<&Type> {
    if let syn::PathArguments::AngleBracketed(args) = &segment.arguments {
        if let Some(syn::GenericArgument::Type(inner)) = args.args.first() {
            return Some(inner);
        }
    }
    None
}

fn type_to_schema(ty: &Type) -> syn::Result<TokenStream2> {
    let Type::Path(type_path) = ty else {
        return Ok(quote! { serde_json::json!({}) });
    };
    let Some(segment) = type_path.path.segments.last() else {
        return Ok(quote! { serde_json::json!({}) });
    };

    Ok(match segment.ident.to_string().as_str() {
        "String" | "str" => quote! { serde_json::json!({"type": "string"}) },
        "i8" | "i16" | "i32" | "i64" | "isize" | "u8" | "u16" | "u32" | "u64" | "usize" => {
            quote! { serde_json::json!({"type": "integer"}) }
        }
        "f32" | "f64" => quote! { serde_json::json!({"type": "number"}) },
        "bool" => quote! { serde_json::json!({"type": "boolean"}) },
        "Option" => match first_generic(segment) {
            Some(inner) => type_to_schema(inner)?,
            None => quote! { serde_json::json!({}) },
        },
        "Vec" => match first_generic(segment) {
            Some(inner) => {
                let inner_schema = type_to_schema(inner)?;
                quote! {
                    serde_json::json!({
                        "type": "array",
                        "items": #inner_schema
                    })
                }
            }
            None => quote! { serde_json::json!({"type": "array"}) },
        },
        // Anything else is expected to derive Schema itself.
        _ => quote! { <#ty>::json_schema() },
    })
}
