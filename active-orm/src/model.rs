//! # Model Module
//!
//! This module defines the `Model` trait and the [`TableMeta`] structure that
//! describes how a type maps to a table.
//!
//! ## Overview
//!
//! An entity is a type that owns a [`Record`] (the structural half, exposed via
//! [`Attributes`]) and implements `Model` (the persistence half). `Model` only
//! answers two questions: which table the type maps to, and how to build an
//! instance from a freshly loaded record. All CRUD operations live in the
//! engine (`session.model::<T>()`), so entities never extend a base type.
//!
//! ## Identity Strategies
//!
//! A table identifies rows through:
//!
//! - a **generated key** column, filled either by the database
//!   ([`KeyStrategy::Database`], read back after INSERT) or by the application
//!   ([`KeyStrategy::Application`], filled by the table's [`KeyGenerator`]
//!   before INSERT), and/or
//! - one or more **natural primary key** columns supplied by the caller.
//!
//! At least one of them must exist for identity-dependent operations
//! (`find_by_id`, `update`, `delete`).
//!
//! ## Automatic Implementation
//!
//! ```rust,ignore
//! use active_orm::{Model, Record};
//!
//! #[derive(Model, Debug, Clone, Default)]
//! #[orm(table = "users", auto_key = "id", cached, expired = 60)]
//! struct User(Record);
//!
//! #[derive(Model, Debug, Clone, Default)]
//! #[orm(table = "tokens", generated_key = "token")]
//! struct Token(Record);
//!
//! #[derive(Model, Debug, Clone, Default)]
//! #[orm(table = "memberships", primary_key = "group_id, user_id")]
//! struct Membership(Record);
//! ```

// ============================================================================
// External Crate Imports
// ============================================================================

use std::{fmt, sync::Arc, time::Duration};

// ============================================================================
// Internal Crate Imports
// ============================================================================

use crate::{
    errors::Result,
    generator::{KeyGenerator, UuidGenerator},
    record::{Attributes, Record},
    Error,
};

// ============================================================================
// Key Strategy
// ============================================================================

/// Who produces the value of a generated key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStrategy {
    /// Auto-increment / identity column, read back after INSERT.
    Database,
    /// Filled by the table's [`KeyGenerator`] before INSERT.
    Application,
}

/// A generated key column together with its strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedKey {
    pub column: String,
    pub strategy: KeyStrategy,
}

// ============================================================================
// Table Metadata
// ============================================================================

/// Immutable structural description of a mapped table.
///
/// Built once per mapped type and shared freely afterwards.
#[derive(Clone)]
pub struct TableMeta {
    table_name: String,
    primary_key: Vec<String>,
    generated_key: Option<GeneratedKey>,
    cached: bool,
    expired: Option<Duration>,
    columns: Vec<String>,
    generator: Arc<dyn KeyGenerator>,
}

impl fmt::Debug for TableMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableMeta")
            .field("table_name", &self.table_name)
            .field("primary_key", &self.primary_key)
            .field("generated_key", &self.generated_key)
            .field("cached", &self.cached)
            .field("expired", &self.expired)
            .field("columns", &self.columns)
            .finish()
    }
}

impl TableMeta {
    /// Starts describing the table `table_name`.
    pub fn builder(table_name: &str) -> TableMetaBuilder {
        TableMetaBuilder {
            meta: TableMeta {
                table_name: table_name.to_string(),
                primary_key: Vec::new(),
                generated_key: None,
                cached: false,
                expired: None,
                columns: Vec::new(),
                generator: Arc::new(UuidGenerator),
            },
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Declared natural key columns.
    pub fn primary_key(&self) -> &[String] {
        &self.primary_key
    }

    pub fn generated_key(&self) -> Option<&GeneratedKey> {
        self.generated_key.as_ref()
    }

    /// Column of a key the database fills on INSERT.
    pub fn auto_generated_key(&self) -> Option<&str> {
        self.generated_key.as_ref().filter(|k| k.strategy == KeyStrategy::Database).map(|k| k.column.as_str())
    }

    /// Column of a key the application fills before INSERT.
    pub fn app_generated_key(&self) -> Option<&str> {
        self.generated_key.as_ref().filter(|k| k.strategy == KeyStrategy::Application).map(|k| k.column.as_str())
    }

    /// Whether query results of this table go through the query cache.
    pub fn is_cached(&self) -> bool {
        self.cached
    }

    /// Eviction horizon of cached results; `None` means no expiry.
    pub fn expired(&self) -> Option<Duration> {
        self.expired
    }

    pub fn generator(&self) -> &dyn KeyGenerator {
        self.generator.as_ref()
    }

    /// Whether `column` belongs to the table.
    ///
    /// Tables declared without a column list accept every column.
    pub fn has_column(&self, column: &str) -> bool {
        self.columns.is_empty() || self.columns.iter().any(|c| c.eq_ignore_ascii_case(column.trim()))
    }

    /// The single column used by `find_by_id`, `find_in_ids` and friends:
    /// the generated key when present, otherwise the first natural key.
    pub fn primary_key_column(&self) -> Result<&str> {
        if let Some(key) = &self.generated_key {
            return Ok(key.column.as_str());
        }
        self.primary_key.first().map(String::as_str).ok_or_else(|| self.missing_identity())
    }

    /// Every identity column, generated key first, then the natural keys.
    pub fn identity_columns(&self) -> Result<Vec<&str>> {
        let mut keys: Vec<&str> = Vec::with_capacity(self.primary_key.len() + 1);
        if let Some(key) = &self.generated_key {
            keys.push(key.column.as_str());
        }
        for column in &self.primary_key {
            if !keys.iter().any(|k| k.eq_ignore_ascii_case(column)) {
                keys.push(column.as_str());
            }
        }
        if keys.is_empty() {
            return Err(self.missing_identity());
        }
        Ok(keys)
    }

    fn missing_identity(&self) -> Error {
        Error::Usage(format!("Table '{}' must have at least one generated key or primary key.", self.table_name))
    }
}

/// Builder for [`TableMeta`].
pub struct TableMetaBuilder {
    meta: TableMeta,
}

impl TableMetaBuilder {
    /// Declares a key the database generates (auto-increment / identity).
    pub fn auto_key(mut self, column: &str) -> Self {
        self.meta.generated_key = Some(GeneratedKey { column: column.to_string(), strategy: KeyStrategy::Database });
        self
    }

    /// Declares a key the application generates with the table's generator.
    pub fn generated_key(mut self, column: &str) -> Self {
        self.meta.generated_key =
            Some(GeneratedKey { column: column.to_string(), strategy: KeyStrategy::Application });
        self
    }

    /// Declares the natural key columns.
    pub fn primary_key<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.meta.primary_key = columns
            .into_iter()
            .map(|c| c.as_ref().trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();
        self
    }

    /// Declares the known columns; unknown result columns are then skipped
    /// when rows are mapped.
    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.meta.columns = columns.into_iter().map(|c| c.as_ref().trim().to_string()).collect();
        self
    }

    /// Enables the query cache for this table.
    pub fn cached(mut self, cached: bool) -> Self {
        self.meta.cached = cached;
        self
    }

    /// Cache TTL in seconds; a negative value means no expiry.
    pub fn expired(mut self, seconds: i64) -> Self {
        self.meta.expired = u64::try_from(seconds).ok().map(Duration::from_secs);
        self
    }

    pub fn generator(mut self, generator: Arc<dyn KeyGenerator>) -> Self {
        self.meta.generator = generator;
        self
    }

    pub fn build(self) -> TableMeta {
        self.meta
    }
}

// ============================================================================
// Model Trait
// ============================================================================

/// Persistence capability of an entity type.
///
/// Usually derived with `#[derive(Model)]`. Cached query results are cloned
/// out of the cache, hence the `Clone` bound.
pub trait Model: Attributes + Clone + Send + Sync + Sized + 'static {
    /// Metadata of the mapped table.
    fn table_meta() -> &'static TableMeta;

    /// Builds an instance from a loaded record (modified set already empty).
    ///
    /// Returning an error surfaces as [`Error::Mapping`].
    fn from_record(record: Record) -> Result<Self>;
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_puts_generated_key_first() {
        let meta = TableMeta::builder("orders").auto_key("id").primary_key(["tenant", "number"]).build();

        assert_eq!(meta.identity_columns().unwrap(), vec!["id", "tenant", "number"]);
        assert_eq!(meta.primary_key_column().unwrap(), "id");
        assert_eq!(meta.auto_generated_key(), Some("id"));
        assert_eq!(meta.app_generated_key(), None);
    }

    #[test]
    fn test_natural_keys_only() {
        let meta = TableMeta::builder("memberships").primary_key("group_id, user_id".split(',')).build();

        assert_eq!(meta.identity_columns().unwrap(), vec!["group_id", "user_id"]);
        assert_eq!(meta.primary_key_column().unwrap(), "group_id");
    }

    #[test]
    fn test_missing_identity_is_usage_error() {
        let meta = TableMeta::builder("logs").build();

        assert!(matches!(meta.identity_columns(), Err(Error::Usage(_))));
        assert!(matches!(meta.primary_key_column(), Err(Error::Usage(_))));
    }

    #[test]
    fn test_generated_key_not_repeated_in_identity() {
        let meta = TableMeta::builder("tokens").generated_key("token").primary_key(["TOKEN"]).build();

        assert_eq!(meta.identity_columns().unwrap(), vec!["token"]);
        assert_eq!(meta.app_generated_key(), Some("token"));
    }

    #[test]
    fn test_negative_ttl_means_no_expiry() {
        let meta = TableMeta::builder("users").cached(true).expired(-1).build();
        assert!(meta.is_cached());
        assert_eq!(meta.expired(), None);

        let meta = TableMeta::builder("users").expired(30).build();
        assert_eq!(meta.expired(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_has_column_without_declared_columns_accepts_all() {
        let open = TableMeta::builder("users").build();
        assert!(open.has_column("anything"));

        let closed = TableMeta::builder("users").columns(["id", "Name"]).build();
        assert!(closed.has_column("name"));
        assert!(!closed.has_column("age"));
    }
}
