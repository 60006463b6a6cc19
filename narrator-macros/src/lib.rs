//! Proc macros for narrator decision schemas.
//!
//! Provides `#[derive(Schema)]`, which turns a plain serde struct into the
//! declarative field contract the ingestion pipeline and the prompt builder
//! both read.
//!
//! # Example
//!
//! ```ignore
//! /// One skill check the player must roll
//! #[derive(Schema, Serialize, Deserialize, Default)]
//! #[schema(name = "SkillCheckRequest")]
//! struct SkillCheckRequest {
//!     /// Skill name, e.g. "Stealth"
//!     skill: String,
//!     /// Difficulty class
//!     dc: i32,
//!     #[serde(default)]
//!     advantage: bool,
//! }
//! ```
//!
//! Field kinds come from the Rust type, hints from doc comments and defaults
//! from the type's `Default` value, so the struct definition stays the single
//! source of truth.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{parse_macro_input, Attribute, DeriveInput, Expr, Lit, LitStr, Meta, PathSegment, Type};

/// Derive macro for generating `Schema` implementations.
///
/// # Attributes
///
/// - `#[schema(name = "...")]` on the struct - Override the schema name (defaults to the struct name)
/// - `#[schema(hint = "...")]` on fields - Override the doc-comment hint
/// - `#[serde(rename = "...")]` on fields - Honoured for the wire name
#[proc_macro_derive(Schema, attributes(schema))]
pub fn derive_schema(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand_schema(input)
        .unwrap_or_else(|err| err.to_compile_error())
        .into()
}

fn expand_schema(input: DeriveInput) -> syn::Result<TokenStream2> {
    let struct_name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let schema_name = get_schema_name(&input)?;

    let fields = match &input.data {
        syn::Data::Struct(data) => match &data.fields {
            syn::Fields::Named(named) => &named.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    &input,
                    "Schema derive only supports structs with named fields",
                ))
            }
        },
        _ => return Err(syn::Error::new_spanned(&input, "Schema derive only supports structs")),
    };

    let mut spec_tokens = Vec::new();
    for field in fields {
        let ident = field
            .ident
            .as_ref()
            .ok_or_else(|| syn::Error::new_spanned(field, "expected a named field"))?;
        let options = field_options(&field.attrs)?;
        let wire_name = serde_rename(&field.attrs)?.unwrap_or_else(|| ident.to_string());
        let hint = options.hint.unwrap_or_else(|| get_doc_comment(&field.attrs));
        let (kind, nullable) = field_kind(&field.ty)?;

        spec_tokens.push(quote! {
            ::narrator_core::schema::FieldSpec {
                name: #wire_name,
                kind: #kind,
                default: defaults
                    .get(#wire_name)
                    .cloned()
                    .unwrap_or(::serde_json::Value::Null),
                hint: #hint,
                nullable: #nullable,
            }
        });
    }

    Ok(quote! {
        impl #impl_generics ::narrator_core::schema::Schema for #struct_name #ty_generics #where_clause {
            fn schema_name() -> &'static str {
                #schema_name
            }

            fn fields() -> ::std::vec::Vec<::narrator_core::schema::FieldSpec> {
                let defaults = ::serde_json::to_value(<Self as ::std::default::Default>::default())
                    .unwrap_or(::serde_json::Value::Null);
                ::std::vec![#(#spec_tokens),*]
            }
        }
    })
}

fn get_schema_name(input: &DeriveInput) -> syn::Result<String> {
    for attr in &input.attrs {
        if attr.path().is_ident("schema") {
            let meta = attr.parse_args::<Meta>()?;
            if let Meta::NameValue(nv) = meta {
                if nv.path.is_ident("name") {
                    if let Expr::Lit(expr_lit) = &nv.value {
                        if let Lit::Str(s) = &expr_lit.lit {
                            return Ok(s.value());
                        }
                    }
                }
            }
            return Err(syn::Error::new_spanned(attr, "expected #[schema(name = \"...\")]"));
        }
    }

    Ok(input.ident.to_string())
}

/// Read `rename = "..."` out of `#[serde(...)]`, skipping every other serde option.
fn serde_rename(attrs: &[Attribute]) -> syn::Result<Option<String>> {
    let mut rename = None;
    for attr in attrs {
        if !attr.path().is_ident("serde") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("rename") && meta.input.peek(syn::Token![=]) {
                let lit: LitStr = meta.value()?.parse()?;
                rename = Some(lit.value());
            } else if meta.input.peek(syn::Token![=]) {
                let _: Expr = meta.value()?.parse()?;
            } else if meta.input.peek(syn::token::Paren) {
                let content;
                syn::parenthesized!(content in meta.input);
                let _: TokenStream2 = content.parse()?;
            }
            Ok(())
        })?;
    }
    Ok(rename)
}

/// Field-level `#[schema(hint = "...")]` options.
#[derive(Default)]
struct FieldOptions {
    hint: Option<String>,
}

fn field_options(attrs: &[Attribute]) -> syn::Result<FieldOptions> {
    let mut options = FieldOptions::default();
    for attr in attrs {
        if !attr.path().is_ident("schema") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("hint") {
                let lit: LitStr = meta.value()?.parse()?;
                options.hint = Some(lit.value());
                Ok(())
            } else {
                Err(meta.error("unsupported schema field attribute"))
            }
        })?;
    }
    Ok(options)
}

fn get_doc_comment(attrs: &[Attribute]) -> String {
    let mut docs = Vec::new();
    for attr in attrs {
        if attr.path().is_ident("doc") {
            if let Meta::NameValue(nv) = &attr.meta {
                if let Expr::Lit(expr_lit) = &nv.value {
                    if let Lit::Str(s) = &expr_lit.lit {
                        docs.push(s.value().trim().to_string());
                    }
                }
            }
        }
    }
    docs.join(" ")
}

fn last_segment(ty: &Type) -> Option<&PathSegment> {
    if let Type::Path(type_path) = ty {
        type_path.path.segments.last()
    } else {
        None
    }
}

fn first_type_argument(segment: &PathSegment) -> Option<&Type> {
    if let syn::PathArguments::AngleBracketed(args) = &segment.arguments {
        if let Some(syn::GenericArgument::Type(inner)) = args.args.first() {
            return Some(inner);
        }
    }
    None
}

/// Map a field type to its `FieldKind` tokens and whether it accepts `null`.
fn field_kind(ty: &Type) -> syn::Result<(TokenStream2, bool)> {
    let segment = last_segment(ty)
        .ok_or_else(|| syn::Error::new_spanned(ty, "unsupported field type for Schema"))?;

    if segment.ident == "Option" {
        let inner = first_type_argument(segment)
            .ok_or_else(|| syn::Error::new_spanned(ty, "Option without a type argument"))?;
        let (kind, _) = field_kind(inner)?;
        return Ok((kind, true));
    }

    Ok((kind_tokens(ty, segment)?, false))
}

fn kind_tokens(ty: &Type, segment: &PathSegment) -> syn::Result<TokenStream2> {
    let kind = quote! { ::narrator_core::schema::FieldKind };
    Ok(match segment.ident.to_string().as_str() {
        "String" => quote! { #kind::String },
        "i32" => quote! { #kind::Integer },
        "i8" | "i16" | "i64" | "isize" | "u8" | "u16" | "u32" | "u64" | "usize" => {
            return Err(syn::Error::new_spanned(
                ty,
                "integer Schema fields must be i32; convert after ingestion",
            ))
        }
        "f32" | "f64" => quote! { #kind::Float },
        "bool" => quote! { #kind::Boolean },
        "Vec" => {
            let inner = first_type_argument(segment)
                .ok_or_else(|| syn::Error::new_spanned(ty, "Vec without a type argument"))?;
            let is_string = last_segment(inner).is_some_and(|s| s.ident == "String");
            if is_string {
                quote! { #kind::StringList }
            } else {
                quote! { #kind::RecordList(<#inner as ::narrator_core::schema::Schema>::fields) }
            }
        }
        _ => {
            return Err(syn::Error::new_spanned(
                ty,
                "Schema fields must be String, i32, float, bool, Vec or Option of those",
            ))
        }
    })
}
