//! # Active Record Engine
//!
//! [`ActiveRecord`] runs every persistence operation of one entity type on
//! one [`Session`]. It is obtained with `session.model::<M>()` and lives for
//! a single call chain:
//!
//! ```rust,ignore
//! let mut session = ds.session();
//!
//! let mut user = User::default();
//! user.set("name", "alice").set("age", 30);
//! session.model::<User>().save(&mut user).await?;
//!
//! let adults = session.model::<User>().find_by("age >= ?", &params![18]).await?;
//! let page = session.model::<User>().alias("u")?.full_paginate_all(1, 20).await?;
//! ```
//!
//! Reads on cached tables go through the data source's query cache unless
//! [`ActiveRecord::un_cache`] is called; every write on a table purges the
//! table's cache group first.

mod find;
mod write;

use std::marker::PhantomData;

use sqlx::any::AnyRow;

use crate::{
    batch::{execute_one, KeyReadback},
    database::{log_statement, DataSource},
    dialect::Dialect,
    model::{Model, TableMeta},
    record::Record,
    transaction::Session,
    value_binding::decode_row,
    Error, Result, Value,
};

/// Persistence operations of the entity type `M`.
pub struct ActiveRecord<'s, M: Model> {
    session: &'s mut Session,
    ds: DataSource,
    alias: Option<String>,
    use_cache: bool,
    _model: PhantomData<M>,
}

impl<M: Model> std::fmt::Debug for ActiveRecord<'_, M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveRecord")
            .field("table", &M::table_meta().table_name())
            .field("alias", &self.alias)
            .field("use_cache", &self.use_cache)
            .finish()
    }
}

impl<'s, M: Model> ActiveRecord<'s, M> {
    pub(crate) fn new(session: &'s mut Session) -> Self {
        let ds = session.data_source().clone();
        Self { session, ds, alias: None, use_cache: true, _model: PhantomData }
    }

    // ========================================================================
    // Options
    // ========================================================================

    /// Sets the table alias used by the generated statements.
    ///
    /// The alias may be set once per call chain.
    pub fn alias(mut self, alias: &str) -> Result<Self> {
        if let Some(current) = &self.alias {
            return Err(Error::Usage(format!(
                "Alias of table '{}' is already set to '{}'",
                M::table_meta().table_name(),
                current
            )));
        }
        self.alias = Some(alias.trim().to_string());
        Ok(self)
    }

    /// Bypasses the query cache for this call chain.
    pub fn un_cache(mut self) -> Self {
        self.use_cache = false;
        self
    }

    /// Drops every cached result of the table.
    pub fn purge_cache(&self) {
        if M::table_meta().is_cached() {
            self.ds.cache().purge(self.ds.name(), M::table_meta().table_name());
        }
    }

    // ========================================================================
    // Shared Helpers
    // ========================================================================

    fn meta(&self) -> &'static TableMeta {
        M::table_meta()
    }

    fn table(&self) -> &'static str {
        M::table_meta().table_name()
    }

    fn dialect(&self) -> &dyn Dialect {
        self.ds.dialect()
    }

    fn type_name() -> &'static str {
        std::any::type_name::<M>()
    }

    fn alias_ref(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    fn cache_enabled(&self) -> bool {
        self.use_cache && self.ds.cache().is_enabled() && self.meta().is_cached()
    }

    /// In dev mode, rejects statements that do not mention the table.
    fn check_table(&self, sql: &str) -> Result<()> {
        if self.ds.is_dev_mode() && !sql.to_lowercase().contains(&self.table().to_lowercase()) {
            return Err(Error::Usage(format!("Statement does not use table '{}': {}", self.table(), sql)));
        }
        Ok(())
    }

    /// Quoted column reference, alias-qualified when an alias is set.
    fn column_ref(&self, column: &str) -> String {
        match self.alias_ref() {
            Some(alias) => format!("{}.{}", alias, self.dialect().quote(column)),
            None => self.dialect().quote(column),
        }
    }

    /// `a = ? AND b = ?` over `columns`.
    fn equality_filter(&self, columns: &[&str]) -> String {
        columns.iter().map(|c| format!("{} = ?", self.column_ref(c))).collect::<Vec<_>>().join(" AND ")
    }

    /// Current values of `columns` on `record`; a missing one is a usage error.
    fn identity_values(&self, record: &Record, columns: &[&str]) -> Result<Vec<Value>> {
        columns
            .iter()
            .map(|column| match record.get(column) {
                Some(value) if !value.is_null() => Ok(value.clone()),
                _ => Err(Error::Usage(format!("Key '{}' of table '{}' has no value", column, self.table()))),
            })
            .collect()
    }

    fn to_model(row: &AnyRow) -> Result<M> {
        let meta = M::table_meta();
        let mut record = Record::new();
        for (name, value) in decode_row(row)? {
            if meta.has_column(&name) {
                record.put_loaded(&name, value);
            }
        }
        M::from_record(record).map_err(|e| match e {
            Error::Mapping(_) => e,
            other => Error::Mapping(format!("{}: {}", Self::type_name(), other)),
        })
    }

    // ========================================================================
    // Execution
    // ========================================================================

    async fn fetch_rows(&mut self, sql: &str, params: &[Value]) -> Result<Vec<AnyRow>> {
        log_statement(self.ds.is_show_sql(), sql, params);
        let prepared = self.ds.dialect().prepare(sql);
        let args = crate::value_binding::bind_values(params, &self.ds.dialect().driver())?;

        let mut conn = self.session.connection().await?;
        let rows = sqlx::query_with(prepared.as_ref(), args).fetch_all(&mut *conn).await;
        conn.close();
        Ok(rows?)
    }

    async fn execute_write(&mut self, sql: &str, params: &[Value], readback: KeyReadback) -> Result<(u64, Option<Value>)> {
        let mut conn = self.session.connection().await?;
        let outcome = execute_one(&mut *conn, self.ds.dialect(), self.ds.is_show_sql(), sql, params, readback).await;
        conn.close();
        outcome
    }
}
