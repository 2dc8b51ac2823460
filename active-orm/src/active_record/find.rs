//! Read path: finders, pagination, generic queries and callable reads.

use crate::{
    callable::{ObjectCall, ResultSetCall},
    model::Model,
    pagination::{FullPage, Page, Pagination},
    value_binding::decode_values,
    Error, QueryRow, Result, Value,
};

use super::ActiveRecord;

impl<M: Model> ActiveRecord<'_, M> {
    // ========================================================================
    // Core Finders
    // ========================================================================

    /// Runs a SELECT and maps every row to `M`.
    ///
    /// On a cached table the result is served from, or stored into, the
    /// query cache under the exact `(sql, params)` invocation.
    pub async fn find(&mut self, sql: &str, params: &[Value]) -> Result<Vec<M>> {
        self.check_table(sql)?;
        let cached = self.cache_enabled();
        if cached {
            if let Some(hit) = self.ds.cache().get::<Vec<M>>(self.ds.name(), self.table(), Self::type_name(), sql, params) {
                return Ok(hit);
            }
        }

        let rows = self.fetch_rows(sql, params).await?;
        let models = rows.iter().map(Self::to_model).collect::<Result<Vec<M>>>()?;

        if cached {
            self.ds.cache().add(
                self.ds.name(),
                self.table(),
                Self::type_name(),
                sql,
                params,
                models.clone(),
                self.meta().expired(),
            );
        }
        Ok(models)
    }

    /// First row of a SELECT, limited to one row in SQL.
    pub async fn find_first(&mut self, sql: &str, params: &[Value]) -> Result<Option<M>> {
        let sql = self.dialect().paginate_with(1, 1, sql);
        Ok(self.find(&sql, params).await?.into_iter().next())
    }

    // ========================================================================
    // Identity Finders
    // ========================================================================

    /// Row whose primary key column equals `id`.
    pub async fn find_by_id(&mut self, id: impl Into<Value>) -> Result<Option<M>> {
        self.find_cols_by_id(&[], id).await
    }

    pub async fn find_cols_by_id(&mut self, columns: &[&str], id: impl Into<Value>) -> Result<Option<M>> {
        let key = self.meta().primary_key_column()?;
        let filter = self.equality_filter(&[key]);
        let sql = self.dialect().select(self.table(), self.alias_ref(), Some(filter.as_str()), columns);
        self.find_first(&sql, &[id.into()]).await
    }

    /// Row matching every identity column, generated key first.
    pub async fn find_by_ids(&mut self, ids: &[Value]) -> Result<Option<M>> {
        self.find_cols_by_ids(&[], ids).await
    }

    pub async fn find_cols_by_ids(&mut self, columns: &[&str], ids: &[Value]) -> Result<Option<M>> {
        let keys = self.meta().identity_columns()?;
        if keys.len() != ids.len() {
            return Err(Error::Usage(format!(
                "Table '{}' has {} key column(s) but {} value(s) were given",
                self.table(),
                keys.len(),
                ids.len()
            )));
        }
        let filter = self.equality_filter(&keys);
        let sql = self.dialect().select(self.table(), self.alias_ref(), Some(filter.as_str()), columns);
        self.find_first(&sql, ids).await
    }

    /// Rows whose primary key column is one of `ids`.
    pub async fn find_in_ids(&mut self, ids: &[Value]) -> Result<Vec<M>> {
        self.find_cols_in_ids(&[], ids).await
    }

    pub async fn find_cols_in_ids(&mut self, columns: &[&str], ids: &[Value]) -> Result<Vec<M>> {
        let filter = self.in_filter(ids, true)?;
        let sql = self.dialect().select(self.table(), self.alias_ref(), Some(filter.as_str()), columns);
        self.find(&sql, ids).await
    }

    /// `key IN (?, ?, ...)` with one placeholder per id.
    pub(super) fn in_filter(&self, ids: &[Value], qualified: bool) -> Result<String> {
        if ids.is_empty() {
            return Err(Error::Usage(format!("Id list for table '{}' must not be empty", self.table())));
        }
        let key = self.meta().primary_key_column()?;
        let column = if qualified { self.column_ref(key) } else { self.dialect().quote(key) };
        Ok(format!("{} IN ({})", column, vec!["?"; ids.len()].join(", ")))
    }

    // ========================================================================
    // Convenience Finders
    // ========================================================================

    pub async fn find_all(&mut self) -> Result<Vec<M>> {
        self.find_cols_all(&[]).await
    }

    pub async fn find_cols_all(&mut self, columns: &[&str]) -> Result<Vec<M>> {
        let sql = self.dialect().select(self.table(), self.alias_ref(), None, columns);
        self.find(&sql, &[]).await
    }

    /// Rows matching a WHERE fragment, e.g. `"age > ? ORDER BY name"`.
    pub async fn find_by(&mut self, filter: &str, params: &[Value]) -> Result<Vec<M>> {
        self.find_cols_by(&[], filter, params).await
    }

    pub async fn find_cols_by(&mut self, columns: &[&str], filter: &str, params: &[Value]) -> Result<Vec<M>> {
        let sql = self.dialect().select(self.table(), self.alias_ref(), Some(filter), columns);
        self.find(&sql, params).await
    }

    pub async fn find_first_by(&mut self, filter: &str, params: &[Value]) -> Result<Option<M>> {
        self.find_cols_first_by(&[], filter, params).await
    }

    pub async fn find_cols_first_by(&mut self, columns: &[&str], filter: &str, params: &[Value]) -> Result<Option<M>> {
        let sql = self.dialect().select(self.table(), self.alias_ref(), Some(filter), columns);
        self.find_first(&sql, params).await
    }

    /// The first `top` rows matching a WHERE fragment.
    pub async fn find_top_by(&mut self, top: usize, filter: &str, params: &[Value]) -> Result<Vec<M>> {
        self.find_cols_top_by(top, &[], filter, params).await
    }

    pub async fn find_cols_top_by(
        &mut self,
        top: usize,
        columns: &[&str],
        filter: &str,
        params: &[Value],
    ) -> Result<Vec<M>> {
        Pagination::new(1, top).validate()?;
        let sql = self.dialect().select(self.table(), self.alias_ref(), Some(filter), columns);
        let sql = self.dialect().paginate_with(1, top, &sql);
        self.find(&sql, params).await
    }

    // ========================================================================
    // Pagination
    // ========================================================================

    /// One page of a SELECT. Page numbers start at 1.
    pub async fn paginate(&mut self, page_number: usize, page_size: usize, sql: &str, params: &[Value]) -> Result<Page<M>> {
        Pagination::new(page_number, page_size).validate()?;
        let paged = self.dialect().paginate_with(page_number, page_size, sql);
        let list = self.find(&paged, params).await?;
        Ok(Page::new(list, page_number, page_size))
    }

    pub async fn paginate_all(&mut self, page_number: usize, page_size: usize) -> Result<Page<M>> {
        self.paginate_cols_all(page_number, page_size, &[]).await
    }

    pub async fn paginate_cols_all(&mut self, page_number: usize, page_size: usize, columns: &[&str]) -> Result<Page<M>> {
        let sql = self.dialect().select(self.table(), self.alias_ref(), None, columns);
        self.paginate(page_number, page_size, &sql, &[]).await
    }

    pub async fn paginate_by(
        &mut self,
        page_number: usize,
        page_size: usize,
        filter: &str,
        params: &[Value],
    ) -> Result<Page<M>> {
        self.paginate_cols_by(page_number, page_size, &[], filter, params).await
    }

    pub async fn paginate_cols_by(
        &mut self,
        page_number: usize,
        page_size: usize,
        columns: &[&str],
        filter: &str,
        params: &[Value],
    ) -> Result<Page<M>> {
        let sql = self.dialect().select(self.table(), self.alias_ref(), Some(filter), columns);
        self.paginate(page_number, page_size, &sql, params).await
    }

    /// One page of a SELECT together with the row and page totals.
    ///
    /// The total comes from counting the unpaginated statement. When the
    /// count yields no row the page query is skipped; when it yields several
    /// rows (grouped statements) their number is the total.
    pub async fn full_paginate(
        &mut self,
        page_number: usize,
        page_size: usize,
        sql: &str,
        params: &[Value],
    ) -> Result<FullPage<M>> {
        Pagination::new(page_number, page_size).validate()?;

        let count_sql = self.dialect().count_with(sql);
        let counts = self.query(&count_sql, params).await?;
        let total_row = match counts.len() {
            0 => return Ok(FullPage::empty(page_number, page_size)),
            1 => match counts[0].first() {
                Some(value) => usize::try_from(value.as_i64()?).unwrap_or(0),
                None => 0,
            },
            n => n,
        };
        if total_row == 0 {
            return Ok(FullPage::empty(page_number, page_size));
        }

        let page = self.paginate(page_number, page_size, sql, params).await?;
        Ok(FullPage::new(page.list, page_number, page_size, total_row))
    }

    pub async fn full_paginate_all(&mut self, page_number: usize, page_size: usize) -> Result<FullPage<M>> {
        self.full_paginate_cols_all(page_number, page_size, &[]).await
    }

    pub async fn full_paginate_cols_all(
        &mut self,
        page_number: usize,
        page_size: usize,
        columns: &[&str],
    ) -> Result<FullPage<M>> {
        let sql = self.dialect().select(self.table(), self.alias_ref(), None, columns);
        self.full_paginate(page_number, page_size, &sql, &[]).await
    }

    pub async fn full_paginate_by(
        &mut self,
        page_number: usize,
        page_size: usize,
        filter: &str,
        params: &[Value],
    ) -> Result<FullPage<M>> {
        self.full_paginate_cols_by(page_number, page_size, &[], filter, params).await
    }

    pub async fn full_paginate_cols_by(
        &mut self,
        page_number: usize,
        page_size: usize,
        columns: &[&str],
        filter: &str,
        params: &[Value],
    ) -> Result<FullPage<M>> {
        let sql = self.dialect().select(self.table(), self.alias_ref(), Some(filter), columns);
        self.full_paginate(page_number, page_size, &sql, params).await
    }

    // ========================================================================
    // Generic Queries
    // ========================================================================

    /// Runs any SELECT and returns raw rows.
    ///
    /// One-column results come back as [`QueryRow::Single`].
    pub async fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<QueryRow>> {
        let cached = self.cache_enabled();
        let type_tag = format!("{}::query", Self::type_name());
        if cached {
            if let Some(hit) = self.ds.cache().get::<Vec<QueryRow>>(self.ds.name(), self.table(), &type_tag, sql, params) {
                return Ok(hit);
            }
        }

        let rows = self.fetch_rows(sql, params).await?;
        let result = rows.iter().map(to_query_row).collect::<Result<Vec<_>>>()?;

        if cached {
            self.ds.cache().add(self.ds.name(), self.table(), &type_tag, sql, params, result.clone(), self.meta().expired());
        }
        Ok(result)
    }

    pub async fn query_first(&mut self, sql: &str, params: &[Value]) -> Result<Option<QueryRow>> {
        let sql = self.dialect().paginate_with(1, 1, sql);
        Ok(self.query(&sql, params).await?.into_iter().next())
    }

    pub async fn count_all(&mut self) -> Result<u64> {
        let sql = self.dialect().count(self.table(), self.alias_ref(), None);
        self.count_sql(&sql, &[]).await
    }

    pub async fn count_by(&mut self, filter: &str, params: &[Value]) -> Result<u64> {
        let sql = self.dialect().count(self.table(), self.alias_ref(), Some(filter));
        self.count_sql(&sql, params).await
    }

    async fn count_sql(&mut self, sql: &str, params: &[Value]) -> Result<u64> {
        let rows = self.query(sql, params).await?;
        let count = match rows.first().and_then(QueryRow::first) {
            Some(value) => value.as_i64()?,
            None => 0,
        };
        Ok(u64::try_from(count).unwrap_or(0))
    }

    // ========================================================================
    // Callable Reads
    // ========================================================================

    /// Rows produced by a caller-defined invocation, never cached.
    pub async fn query_call(&mut self, sql: &str, call: &dyn ResultSetCall) -> Result<Vec<QueryRow>> {
        let rows = self.call_rows(sql, call).await?;
        rows.iter().map(to_query_row).collect()
    }

    pub async fn query_call_first(&mut self, sql: &str, call: &dyn ResultSetCall) -> Result<Option<QueryRow>> {
        Ok(self.query_call(sql, call).await?.into_iter().next())
    }

    /// Value extracted by a caller-defined invocation.
    pub async fn query_call_object<C: ObjectCall>(&mut self, sql: &str, call: &C) -> Result<C::Output> {
        crate::database::log_statement(self.ds.is_show_sql(), sql, &[]);
        let mut conn = self.session.connection().await?;
        let outcome = call.call(&mut *conn, sql).await;
        conn.close();
        Ok(outcome?)
    }

    pub async fn find_call(&mut self, sql: &str, call: &dyn ResultSetCall) -> Result<Vec<M>> {
        let rows = self.call_rows(sql, call).await?;
        rows.iter().map(Self::to_model).collect()
    }

    pub async fn find_call_first(&mut self, sql: &str, call: &dyn ResultSetCall) -> Result<Option<M>> {
        Ok(self.find_call(sql, call).await?.into_iter().next())
    }

    async fn call_rows(&mut self, sql: &str, call: &dyn ResultSetCall) -> Result<Vec<sqlx::any::AnyRow>> {
        crate::database::log_statement(self.ds.is_show_sql(), sql, &[]);
        let mut conn = self.session.connection().await?;
        let outcome = call.call(&mut *conn, sql).await;
        conn.close();
        Ok(outcome?)
    }
}

fn to_query_row(row: &sqlx::any::AnyRow) -> Result<QueryRow> {
    let mut values = decode_values(row)?;
    Ok(if values.len() == 1 { QueryRow::Single(values.remove(0)) } else { QueryRow::Multi(values) })
}
