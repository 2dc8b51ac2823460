//! # Model Derive Macro Implementation
//!
//! Expands `#[derive(Model)]` into implementations of `Attributes` and
//! `Model` for a struct that stores its attributes in a `Record` field.
//!
//! ## Example
//!
//! ```rust,ignore
//! // Input struct:
//! #[derive(Model)]
//! #[orm(auto_key = "id", cached)]
//! struct BlogPost(Record);
//!
//! // Generated implementation:
//! impl Attributes for BlogPost {
//!     fn record(&self) -> &Record { &self.0 }
//!     fn record_mut(&mut self) -> &mut Record { &mut self.0 }
//! }
//!
//! impl Model for BlogPost {
//!     fn table_meta() -> &'static TableMeta {
//!         static META: OnceLock<TableMeta> = OnceLock::new();
//!         META.get_or_init(|| TableMeta::builder("blog_post").auto_key("id").cached(true).build())
//!     }
//!     fn from_record(record: Record) -> Result<Self> { Ok(Self(record)) }
//! }
//! ```

// ============================================================================
// External Crate Imports
// ============================================================================

use heck::ToSnakeCase;
use proc_macro2::TokenStream;
use quote::quote;
use syn::{Data, DeriveInput, Fields, Index, Member, Type};

// ============================================================================
// Internal Crate Imports
// ============================================================================

use crate::table_attrs::TableAttrs;

/// Whether `ty` is (a path ending in) `Record`.
fn is_record_type(ty: &Type) -> bool {
    match ty {
        Type::Path(path) => path.path.segments.last().is_some_and(|s| s.ident == "Record"),
        _ => false,
    }
}

// ============================================================================
// Macro Expansion Function
// ============================================================================

/// Expands the `#[derive(Model)]` macro.
pub fn expand(ast: DeriveInput) -> syn::Result<TokenStream> {
    let struct_name = &ast.ident;

    if !ast.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(&ast.generics, "Model cannot be derived for generic structs"));
    }

    let Data::Struct(data) = &ast.data else {
        return Err(syn::Error::new_spanned(struct_name, "Model must be a struct"));
    };

    // ========================================================================
    // Locate the Record Field
    // ========================================================================

    let members: Vec<(Member, bool)> = match &data.fields {
        Fields::Named(fields) => fields
            .named
            .iter()
            .filter_map(|f| f.ident.clone().map(|ident| (Member::Named(ident), is_record_type(&f.ty))))
            .collect(),
        Fields::Unnamed(fields) => fields
            .unnamed
            .iter()
            .enumerate()
            .map(|(i, f)| (Member::Unnamed(Index::from(i)), is_record_type(&f.ty)))
            .collect(),
        Fields::Unit => Vec::new(),
    };

    let record_fields: Vec<&Member> = members.iter().filter(|(_, is_record)| *is_record).map(|(m, _)| m).collect();
    let record_member = match record_fields.as_slice() {
        [member] => *member,
        [] => return Err(syn::Error::new_spanned(struct_name, "Model needs a field of type `Record`")),
        _ => return Err(syn::Error::new_spanned(struct_name, "Model must have exactly one `Record` field")),
    };

    // ========================================================================
    // Generate TableMeta Builder Calls
    // ========================================================================

    let attrs = TableAttrs::parse(&ast.attrs)?;
    let table = attrs.table.clone().unwrap_or_else(|| struct_name.to_string().to_snake_case());

    let mut builder_calls = Vec::new();
    if let Some(key) = &attrs.auto_key {
        builder_calls.push(quote! { .auto_key(#key) });
    }
    if let Some(key) = &attrs.generated_key {
        builder_calls.push(quote! { .generated_key(#key) });
    }
    if !attrs.primary_key.is_empty() {
        let keys = &attrs.primary_key;
        builder_calls.push(quote! { .primary_key([#(#keys),*]) });
    }
    if !attrs.columns.is_empty() {
        let columns = &attrs.columns;
        builder_calls.push(quote! { .columns([#(#columns),*]) });
    }
    if attrs.cached {
        builder_calls.push(quote! { .cached(true) });
    }
    if let Some(seconds) = attrs.expired {
        builder_calls.push(quote! { .expired(#seconds) });
    }
    if let Some(generator) = &attrs.generator {
        builder_calls.push(quote! { .generator(::std::sync::Arc::new(#generator)) });
    }

    // ========================================================================
    // Generate from_record() Constructor
    // ========================================================================

    // Every field other than the record starts from its default value.
    let inits = members.iter().map(|(member, is_record)| {
        if *is_record {
            quote! { #member: record }
        } else {
            quote! { #member: ::std::default::Default::default() }
        }
    });

    // ========================================================================
    // Generate Complete Implementation
    // ========================================================================

    Ok(quote! {
        impl ::active_orm::Attributes for #struct_name {
            fn record(&self) -> &::active_orm::Record {
                &self.#record_member
            }

            fn record_mut(&mut self) -> &mut ::active_orm::Record {
                &mut self.#record_member
            }
        }

        impl ::active_orm::Model for #struct_name {
            fn table_meta() -> &'static ::active_orm::TableMeta {
                static META: ::std::sync::OnceLock<::active_orm::TableMeta> = ::std::sync::OnceLock::new();
                META.get_or_init(|| ::active_orm::TableMeta::builder(#table) #(#builder_calls)* .build())
            }

            fn from_record(record: ::active_orm::Record) -> ::active_orm::Result<Self> {
                ::std::result::Result::Ok(Self { #(#inits),* })
            }
        }
    })
}
