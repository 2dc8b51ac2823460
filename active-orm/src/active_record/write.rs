//! Write path: save, batch save, update, delete and raw statements.

use crate::{
    batch::{execute_batch, KeyReadback},
    model::Model,
    record::Attributes,
    transaction::Conn,
    Error, Result, Value,
};

use super::ActiveRecord;

impl<M: Model> ActiveRecord<'_, M> {
    /// How the generated key of an INSERT is read back, and the suffix the
    /// INSERT needs for it.
    fn readback(&self, auto_key: Option<&str>) -> (KeyReadback, Option<String>) {
        match auto_key {
            None => (KeyReadback::None, None),
            Some(key) => match self.dialect().returning(key) {
                Some(suffix) => (KeyReadback::Returning, Some(suffix)),
                None => (KeyReadback::LastInsertId, None),
            },
        }
    }

    fn fill_app_key(&self, entity: &mut M) {
        let meta = self.meta();
        if let Some(key) = meta.app_generated_key() {
            if entity.record().is_unset(key) {
                entity.record_mut().set(key, meta.generator().generate_key());
            }
        }
    }

    // ========================================================================
    // Save
    // ========================================================================

    /// Inserts the entity from its modified attributes.
    ///
    /// A missing application-generated key is filled first; a
    /// database-generated key is read back into the entity afterwards.
    /// Returns `Ok(false)` without touching storage when nothing was modified.
    pub async fn save(&mut self, entity: &mut M) -> Result<bool> {
        self.purge_cache();
        self.fill_app_key(entity);

        let record = entity.record();
        if !record.is_modified() {
            log::warn!("Could not save '{}': no attribute was modified", self.table());
            return Ok(false);
        }

        let auto_key = self.meta().auto_generated_key().filter(|key| record.is_unset(key));
        let (readback, suffix) = self.readback(auto_key);
        let mut sql = self.dialect().insert(self.table(), &record.modified_names());
        if let Some(suffix) = suffix {
            sql.push_str(&suffix);
        }
        let values = record.modified_values();

        let (count, key) = self.execute_write(&sql, &values, readback).await?;
        if let (Some(column), Some(key)) = (auto_key, key) {
            entity.record_mut().put_loaded(column, key);
        }
        entity.clear_modified();
        Ok(count >= 1)
    }

    /// Inserts many entities as one chunked batch.
    ///
    /// Columns are taken from the first entity's modified attributes. Outside
    /// a transaction the batch runs in a transaction of its own, committed
    /// before the result is reported: `Ok(false)` means some row was not
    /// inserted although the others were.
    pub async fn save_all(&mut self, entities: &mut [M]) -> Result<bool> {
        match entities.len() {
            0 => {
                log::warn!("Could not batch save '{}': no entity was given", self.table());
                return Ok(false);
            }
            1 => return self.save(&mut entities[0]).await,
            _ => {}
        }

        self.purge_cache();
        for entity in entities.iter_mut() {
            self.fill_app_key(entity);
        }

        let columns: Vec<String> = entities[0].record().modified_names().into_iter().map(str::to_string).collect();
        if columns.is_empty() {
            log::warn!("Could not batch save '{}': no attribute was modified", self.table());
            return Ok(false);
        }
        let column_refs: Vec<&str> = columns.iter().map(String::as_str).collect();

        let auto_key = self.meta().auto_generated_key();
        let (readback, suffix) = self.readback(auto_key);
        let mut sql = self.dialect().insert(self.table(), &column_refs);
        if let Some(suffix) = suffix {
            sql.push_str(&suffix);
        }

        let statements: Vec<(String, Vec<Value>)> = entities
            .iter()
            .map(|entity| {
                let record = entity.record();
                let values = column_refs.iter().map(|c| record.get(c).cloned().unwrap_or_default()).collect();
                (sql.clone(), values)
            })
            .collect();

        let outcome = {
            let mut conn = self.session.connection().await?;
            let own_transaction = !conn.is_bound();
            let run = execute_batch(
                &mut *conn,
                self.ds.dialect(),
                self.ds.is_show_sql(),
                own_transaction,
                readback,
                statements,
            )
            .await;
            release(conn, run.transaction_left_open);
            run.result?
        };

        if let Some(column) = auto_key {
            for (entity, key) in entities.iter_mut().zip(outcome.generated_keys.iter()) {
                if entity.record().is_unset(column) {
                    entity.record_mut().put_loaded(column, key.clone());
                }
            }
        }
        for entity in entities.iter_mut() {
            entity.clear_modified();
        }
        Ok(outcome.all_succeeded())
    }

    // ========================================================================
    // Update
    // ========================================================================

    /// Writes the modified attributes of the entity.
    ///
    /// Returns `Ok(false)` when nothing was modified. Otherwise the row is
    /// located by every identity column, each of which must have a value on
    /// the entity.
    pub async fn update(&mut self, entity: &mut M) -> Result<bool> {
        self.purge_cache();
        let record = entity.record();
        if !record.is_modified() {
            log::warn!("Could not update '{}': no attribute was modified", self.table());
            return Ok(false);
        }
        let keys = self.meta().identity_columns()?;
        let key_values = self.identity_values(record, &keys)?;

        let columns: Vec<&str> = record
            .modified_names()
            .into_iter()
            .filter(|name| !keys.iter().any(|k| k.eq_ignore_ascii_case(name)))
            .collect();
        if columns.is_empty() {
            log::warn!("Could not update '{}': no attribute was modified", self.table());
            return Ok(false);
        }

        let mut params: Vec<Value> =
            columns.iter().map(|c| record.get(c).cloned().unwrap_or_default()).collect();
        params.extend(key_values);

        let filter = self.identity_filter(&keys);
        let sql = self.dialect().update(self.table(), None, Some(filter.as_str()), &columns);

        let (count, _) = self.execute_write(&sql, &params, KeyReadback::None).await?;
        entity.clear_modified();
        Ok(count >= 1)
    }

    /// Sets `columns` on every row matching `filter`.
    ///
    /// `params` holds the new column values followed by the filter's own
    /// parameters.
    pub async fn update_cols_by(&mut self, columns: &[&str], filter: &str, params: &[Value]) -> Result<bool> {
        self.purge_cache();
        let sql = self.dialect().update(self.table(), self.alias_ref(), Some(filter), columns);
        let (count, _) = self.execute_write(&sql, params, KeyReadback::None).await?;
        Ok(count >= 1)
    }

    /// Sets `columns` on every row of the table.
    pub async fn update_cols_all(&mut self, columns: &[&str], params: &[Value]) -> Result<bool> {
        log::warn!("Updating every row of '{}'", self.table());
        self.purge_cache();
        let sql = self.dialect().update(self.table(), self.alias_ref(), None, columns);
        let (count, _) = self.execute_write(&sql, params, KeyReadback::None).await?;
        Ok(count >= 1)
    }

    // ========================================================================
    // Delete
    // ========================================================================

    /// Deletes the entity's row, located by every identity column.
    pub async fn delete(&mut self, entity: &M) -> Result<bool> {
        self.purge_cache();
        let keys = self.meta().identity_columns()?;
        let params = self.identity_values(entity.record(), &keys)?;
        let filter = self.identity_filter(&keys);
        self.delete_where(&filter, &params).await
    }

    pub async fn delete_by_id(&mut self, id: impl Into<Value>) -> Result<bool> {
        self.purge_cache();
        let key = self.meta().primary_key_column()?;
        let filter = self.identity_filter(&[key]);
        self.delete_where(&filter, &[id.into()]).await
    }

    /// Deletes the row matching every identity column.
    pub async fn delete_by_ids(&mut self, ids: &[Value]) -> Result<bool> {
        self.purge_cache();
        let keys = self.meta().identity_columns()?;
        if keys.len() != ids.len() {
            return Err(Error::Usage(format!(
                "Table '{}' has {} key column(s) but {} value(s) were given",
                self.table(),
                keys.len(),
                ids.len()
            )));
        }
        let filter = self.identity_filter(&keys);
        self.delete_where(&filter, ids).await
    }

    /// Deletes the rows whose primary key column is one of `ids`.
    pub async fn delete_in_ids(&mut self, ids: &[Value]) -> Result<bool> {
        self.purge_cache();
        let filter = self.in_filter(ids, false)?;
        self.delete_where(&filter, ids).await
    }

    pub async fn delete_by(&mut self, filter: &str, params: &[Value]) -> Result<bool> {
        self.purge_cache();
        self.delete_where(filter, params).await
    }

    /// Deletes every row of the table.
    pub async fn delete_all(&mut self) -> Result<bool> {
        log::warn!("Deleting every row of '{}'", self.table());
        self.purge_cache();
        let sql = self.dialect().delete(self.table(), None);
        let (count, _) = self.execute_write(&sql, &[], KeyReadback::None).await?;
        Ok(count >= 1)
    }

    async fn delete_where(&mut self, filter: &str, params: &[Value]) -> Result<bool> {
        let sql = self.dialect().delete(self.table(), Some(filter));
        let (count, _) = self.execute_write(&sql, params, KeyReadback::None).await?;
        Ok(count >= 1)
    }

    /// `a = ? AND b = ?` without alias, for statements on the bare table.
    fn identity_filter(&self, columns: &[&str]) -> String {
        columns.iter().map(|c| format!("{} = ?", self.dialect().quote(c))).collect::<Vec<_>>().join(" AND ")
    }

    // ========================================================================
    // Raw Statements
    // ========================================================================

    /// Runs a parameterized write and returns the affected-row count.
    pub async fn execute_update(&mut self, sql: &str, params: &[Value]) -> Result<u64> {
        self.check_table(sql)?;
        self.purge_cache();
        let (count, _) = self.execute_write(sql, params, KeyReadback::None).await?;
        Ok(count)
    }

    /// Runs unparameterized statements as one chunked batch and returns the
    /// affected-row count of each.
    ///
    /// The cache is not touched; call [`ActiveRecord::purge_cache`] when the
    /// statements change cached tables.
    pub async fn execute(&mut self, statements: &[&str]) -> Result<Vec<u64>> {
        if statements.is_empty() {
            return Ok(Vec::new());
        }
        let statements = statements.iter().map(|sql| (sql.to_string(), Vec::new())).collect();

        let mut conn = self.session.connection().await?;
        let own_transaction = !conn.is_bound();
        let run = execute_batch(
            &mut *conn,
            self.ds.dialect(),
            self.ds.is_show_sql(),
            own_transaction,
            KeyReadback::None,
            statements,
        )
        .await;
        release(conn, run.transaction_left_open);
        Ok(run.result?.counts)
    }
}

fn release(conn: Conn<'_>, transaction_left_open: bool) {
    if transaction_left_open {
        conn.discard();
    } else {
        conn.close();
    }
}
