//! # Active ORM Procedural Macros
//!
//! This crate provides the `#[derive(Model)]` macro of the Active ORM
//! framework. It is not meant to be used directly; the main `active-orm`
//! crate re-exports it:
//!
//! ```rust,ignore
//! use active_orm::{Model, Record};
//!
//! #[derive(Model, Debug, Clone, Default)]
//! #[orm(table = "users", auto_key = "id", cached, expired = 60)]
//! struct User(Record);
//! ```
//!
//! ## Architecture
//!
//! - **`lib.rs`** (this file): Entry point and macro definitions
//! - **`derive_model.rs`**: Code generation for `Attributes` and `Model`
//! - **`table_attrs.rs`**: Parsing of the struct-level `#[orm(...)]` options
//!
//! ## Supported Attributes
//!
//! All options go on the struct itself:
//!
//! | Option | Meaning |
//! |---|---|
//! | `table = "name"` | Table name; defaults to the struct name in snake_case |
//! | `auto_key = "col"` | Key generated by the database, read back after INSERT |
//! | `generated_key = "col"` | Key generated by the application before INSERT |
//! | `primary_key = "a, b"` | Natural key columns |
//! | `columns = "a, b, c"` | Known columns; other result columns are skipped |
//! | `cached` | Query results go through the query cache |
//! | `expired = N` | Cache TTL in seconds |
//! | `generator = "path::Gen"` | `KeyGenerator` expression for `generated_key` |

// ============================================================================
// External Crate Imports
// ============================================================================

use proc_macro::TokenStream;
use syn::{parse_macro_input, DeriveInput};

// ============================================================================
// Module Declarations
// ============================================================================

/// Model derive implementation module.
mod derive_model;

/// Struct-level attribute parsing.
mod table_attrs;

// ============================================================================
// Procedural Macro Definitions
// ============================================================================

/// Derives `Attributes` and `Model` for a struct holding a `Record`.
///
/// The struct must have exactly one field of type `Record` (tuple or named);
/// any other field is filled with `Default::default()` when rows are loaded.
///
/// # Generated Implementation
///
/// - `Attributes::record` / `record_mut` expose the `Record` field
/// - `Model::table_meta` builds the `TableMeta` once, on first use
/// - `Model::from_record` wraps a loaded record
///
/// # Example
///
/// ```rust,ignore
/// #[derive(Model, Debug, Clone, Default)]
/// #[orm(table = "memberships", primary_key = "group_id, user_id")]
/// struct Membership {
///     record: Record,
/// }
/// ```
#[proc_macro_derive(Model, attributes(orm))]
pub fn model_derive(input: TokenStream) -> TokenStream {
    // Parse the input tokens into a syntax tree
    let ast = parse_macro_input!(input as DeriveInput);

    // Expand, turning parse failures into compile errors at the offending span
    let expanded = derive_model::expand(ast).unwrap_or_else(syn::Error::into_compile_error);

    TokenStream::from(expanded)
}
