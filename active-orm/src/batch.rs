//! # Batch Module
//!
//! Chunked execution of many statements on one connection.
//!
//! Statements are queued and flushed every [`BATCH_SIZE`] entries; the last,
//! partial chunk is flushed when the batch finishes. Every statement's
//! affected-row count is kept, so a caller can tell which rows were written
//! even when the batch as a whole is reported as unsuccessful.
//!
//! When the connection is not already inside a transaction, [`execute_batch`]
//! wraps the whole run in one: it commits after the last flush and rolls back
//! if any statement fails.

use sqlx::{AnyConnection, Executor};

use crate::{
    database::log_statement,
    dialect::Dialect,
    value_binding::{bind_values, decode_column},
    Result, Value,
};

/// Number of statements sent per flush.
pub const BATCH_SIZE: usize = 1000;

/// How the key generated by an INSERT is read back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyReadback {
    /// Nothing to read.
    None,
    /// The driver reports the last inserted id (MySQL, SQLite).
    LastInsertId,
    /// The statement carries a `RETURNING` clause (Postgres).
    Returning,
}

/// Outcome of a batch run.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct BatchResult {
    /// Affected rows per statement, in emission order.
    pub counts: Vec<u64>,
    /// Keys read back, in emission order.
    pub generated_keys: Vec<Value>,
    /// Number of statements sent by each flush.
    pub flushes: Vec<usize>,
}

impl BatchResult {
    /// True when every statement affected at least one row.
    pub fn all_succeeded(&self) -> bool {
        !self.counts.is_empty() && self.counts.iter().all(|&count| count >= 1)
    }
}

/// Runs one statement, returning its affected-row count and the generated key.
pub(crate) async fn execute_one(
    conn: &mut AnyConnection,
    dialect: &dyn Dialect,
    show_sql: bool,
    sql: &str,
    params: &[Value],
    readback: KeyReadback,
) -> Result<(u64, Option<Value>)> {
    log_statement(show_sql, sql, params);
    let prepared = dialect.prepare(sql);
    let args = bind_values(params, &dialect.driver())?;
    let query = sqlx::query_with(prepared.as_ref(), args);

    match readback {
        KeyReadback::Returning => {
            let rows = query.fetch_all(&mut *conn).await?;
            let key = match rows.first() {
                Some(row) => Some(decode_column(row, 0)?),
                None => None,
            };
            Ok((rows.len() as u64, key))
        }
        KeyReadback::LastInsertId => {
            let done = query.execute(&mut *conn).await?;
            Ok((done.rows_affected(), done.last_insert_id().map(Value::Int)))
        }
        KeyReadback::None => {
            let done = query.execute(&mut *conn).await?;
            Ok((done.rows_affected(), None))
        }
    }
}

/// Statement queue flushed every [`BATCH_SIZE`] entries.
pub struct Batch<'c> {
    conn: &'c mut AnyConnection,
    dialect: &'c dyn Dialect,
    show_sql: bool,
    readback: KeyReadback,
    pending: Vec<(String, Vec<Value>)>,
    result: BatchResult,
}

impl<'c> Batch<'c> {
    pub fn new(conn: &'c mut AnyConnection, dialect: &'c dyn Dialect, show_sql: bool, readback: KeyReadback) -> Self {
        Self { conn, dialect, show_sql, readback, pending: Vec::with_capacity(BATCH_SIZE), result: BatchResult::default() }
    }

    /// Queues a statement; a full chunk is flushed immediately.
    pub async fn add(&mut self, sql: String, params: Vec<Value>) -> Result<()> {
        self.pending.push((sql, params));
        if self.pending.len() >= BATCH_SIZE {
            self.flush().await?;
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let chunk = std::mem::take(&mut self.pending);
        log::debug!("Batch flush: {} statement(s)", chunk.len());
        for (sql, params) in &chunk {
            let (count, key) = execute_one(&mut *self.conn, self.dialect, self.show_sql, sql, params, self.readback).await?;
            self.result.counts.push(count);
            if let Some(key) = key {
                self.result.generated_keys.push(key);
            }
        }
        self.result.flushes.push(chunk.len());
        Ok(())
    }

    /// Flushes the remaining statements.
    pub async fn finish(mut self) -> Result<BatchResult> {
        self.flush().await?;
        Ok(self.result)
    }
}

/// Outcome of [`execute_batch`].
#[derive(Debug)]
pub(crate) struct BatchRun {
    pub result: Result<BatchResult>,
    /// The own transaction could be neither committed nor rolled back; the
    /// connection must not go back to the pool.
    pub transaction_left_open: bool,
}

/// Runs `statements` in chunks, inside a transaction of its own when
/// `own_transaction` is set.
///
/// With an own transaction the batch is committed before the result is
/// returned, even when some statement affected no rows. A failed commit is
/// followed by a rollback.
pub(crate) async fn execute_batch(
    conn: &mut AnyConnection,
    dialect: &dyn Dialect,
    show_sql: bool,
    own_transaction: bool,
    readback: KeyReadback,
    statements: Vec<(String, Vec<Value>)>,
) -> BatchRun {
    if own_transaction {
        for statement in dialect.begin_statements(false, None) {
            if let Err(e) = (&mut *conn).execute(statement.as_str()).await {
                return BatchRun { result: Err(e.into()), transaction_left_open: false };
            }
        }
    }

    let outcome = run_chunks(conn, dialect, show_sql, readback, statements).await;
    if !own_transaction {
        return BatchRun { result: outcome, transaction_left_open: false };
    }

    let outcome = match outcome {
        Ok(result) => match (&mut *conn).execute(dialect.commit_statement()).await {
            Ok(_) => return BatchRun { result: Ok(result), transaction_left_open: false },
            Err(e) => {
                log::warn!("Batch commit failed: {}", e);
                Err(e.into())
            }
        },
        Err(e) => Err(e),
    };
    let transaction_left_open = !rollback(conn, dialect).await;
    BatchRun { result: outcome, transaction_left_open }
}

/// Rolls back the own transaction; `false` when the rollback itself failed.
async fn rollback(conn: &mut AnyConnection, dialect: &dyn Dialect) -> bool {
    match (&mut *conn).execute(dialect.rollback_statement()).await {
        Ok(_) => true,
        Err(e) => {
            log::warn!("Batch rollback failed: {}", e);
            false
        }
    }
}

async fn run_chunks(
    conn: &mut AnyConnection,
    dialect: &dyn Dialect,
    show_sql: bool,
    readback: KeyReadback,
    statements: Vec<(String, Vec<Value>)>,
) -> Result<BatchResult> {
    let mut batch = Batch::new(conn, dialect, show_sql, readback);
    for (sql, params) in statements {
        batch.add(sql, params).await?;
    }
    batch.finish().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{database::Drivers, dialect::StandardDialect};
    use sqlx::Connection;

    async fn connection() -> AnyConnection {
        sqlx::any::install_default_drivers();
        let mut conn = AnyConnection::connect("sqlite::memory:").await.unwrap();
        (&mut conn).execute("CREATE TABLE items (id INTEGER PRIMARY KEY AUTOINCREMENT, n INTEGER)").await.unwrap();
        conn
    }

    #[tokio::test]
    async fn test_flushes_every_thousand_statements() {
        let mut conn = connection().await;
        let dialect = StandardDialect::new(Drivers::SQLite);

        let mut statements: Vec<(String, Vec<Value>)> =
            (0..2499).map(|i| ("INSERT INTO items (n) VALUES (?)".to_string(), vec![Value::Int(i)])).collect();
        statements.push(("UPDATE items SET n = 0 WHERE id = -1".to_string(), vec![]));

        let result = execute_batch(&mut conn, &dialect, false, true, KeyReadback::LastInsertId, statements).await.result.unwrap();

        assert_eq!(result.flushes, vec![1000, 1000, 500]);
        assert_eq!(result.counts.len(), 2500);
        assert_eq!(result.counts[2499], 0);
        assert!(!result.all_succeeded());

        // Committed regardless of the zero count.
        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM items").fetch_one(&mut conn).await.unwrap();
        assert_eq!(rows, 2499);
    }

    #[tokio::test]
    async fn test_generated_keys_follow_emission_order() {
        let mut conn = connection().await;
        let dialect = StandardDialect::new(Drivers::SQLite);
        let statements = (0..3).map(|i| ("INSERT INTO items (n) VALUES (?)".to_string(), vec![Value::Int(i)])).collect();

        let result = execute_batch(&mut conn, &dialect, false, true, KeyReadback::LastInsertId, statements).await.result.unwrap();

        assert!(result.all_succeeded());
        assert_eq!(result.generated_keys, vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
    }

    #[tokio::test]
    async fn test_failure_rolls_back_own_transaction() {
        let mut conn = connection().await;
        let dialect = StandardDialect::new(Drivers::SQLite);
        let statements = vec![
            ("INSERT INTO items (n) VALUES (1)".to_string(), vec![]),
            ("INSERT INTO missing (n) VALUES (1)".to_string(), vec![]),
        ];

        let run = execute_batch(&mut conn, &dialect, false, true, KeyReadback::None, statements).await;
        assert!(matches!(run.result, Err(crate::Error::Storage(_))));
        assert!(!run.transaction_left_open);

        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM items").fetch_one(&mut conn).await.unwrap();
        assert_eq!(rows, 0);
    }

    #[tokio::test]
    async fn test_failed_commit_is_rolled_back() {
        let mut conn = connection().await;
        let dialect = StandardDialect::new(Drivers::SQLite);
        (&mut conn).execute("PRAGMA foreign_keys = ON").await.unwrap();
        (&mut conn).execute("CREATE TABLE parents (id INTEGER PRIMARY KEY)").await.unwrap();
        (&mut conn)
            .execute(
                "CREATE TABLE children (id INTEGER PRIMARY KEY, \
                 parent_id INTEGER REFERENCES parents(id) DEFERRABLE INITIALLY DEFERRED)",
            )
            .await
            .unwrap();

        // The deferred constraint only fails at COMMIT, which leaves SQLite's transaction open.
        let statements = vec![("INSERT INTO children (parent_id) VALUES (42)".to_string(), vec![])];
        let run = execute_batch(&mut conn, &dialect, false, true, KeyReadback::None, statements).await;
        assert!(matches!(run.result, Err(crate::Error::Storage(_))));
        assert!(!run.transaction_left_open);

        // A fresh transaction can begin, so none is pending on the connection.
        (&mut conn).execute("BEGIN").await.unwrap();
        (&mut conn).execute("ROLLBACK").await.unwrap();
        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM children").fetch_one(&mut conn).await.unwrap();
        assert_eq!(rows, 0);
    }
}
