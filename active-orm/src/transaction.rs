//! # Transaction Module
//!
//! A [`Session`] is one unit of work on a [`DataSource`]. It carries the
//! reentrant transaction context: nested `init_transaction` / `end_transaction`
//! pairs only move a depth counter, and the physical transaction is begun once
//! (lazily, on the first statement) and committed or rolled back once (at
//! depth 1).
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! let mut session = ds.session();
//!
//! session.init_transaction(false, None);
//! let result = async {
//!     session.model::<User>().save(&mut user).await?;
//!     session.model::<Post>().save(&mut post).await?;
//!     session.commit_transaction().await
//! }
//! .await;
//! session.end_transaction().await?;
//! result?;
//! ```

use std::ops::{Deref, DerefMut};

use sqlx::{pool::PoolConnection, Any, AnyConnection, Executor};

use crate::{
    active_record::ActiveRecord,
    database::DataSource,
    dialect::IsolationLevel,
    errors::Result,
    Error, Model,
};

// ============================================================================
// Transaction Context
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TxState {
    /// Initialized, nothing sent to the database yet.
    Pending,
    Active,
    Committed,
    RolledBack,
}

#[derive(Debug)]
struct TransactionContext {
    depth: u32,
    readonly: bool,
    isolation: Option<IsolationLevel>,
    state: TxState,
    conn: Option<PoolConnection<Any>>,
}

impl TransactionContext {
    fn new(readonly: bool, isolation: Option<IsolationLevel>) -> Self {
        Self { depth: 1, readonly, isolation, state: TxState::Pending, conn: None }
    }

    fn enter(&mut self) {
        self.depth += 1;
    }

    /// Decrements the depth; returns `true` when the outermost level ends.
    fn leave(&mut self) -> bool {
        if self.depth > 1 {
            self.depth -= 1;
            return false;
        }
        true
    }

    fn is_outermost(&self) -> bool {
        self.depth == 1
    }
}

// ============================================================================
// Session
// ============================================================================

/// Unit of work on a data source.
///
/// A session is owned by one task. It is the only carrier of transaction
/// state, so two sessions never observe each other's transactions.
#[derive(Debug)]
pub struct Session {
    ds: DataSource,
    tx: Option<TransactionContext>,
}

impl Session {
    pub(crate) fn new(ds: DataSource) -> Self {
        Self { ds, tx: None }
    }

    pub fn data_source(&self) -> &DataSource {
        &self.ds
    }

    /// Engine handle for the entity type `M`.
    pub fn model<M: Model>(&mut self) -> ActiveRecord<'_, M> {
        ActiveRecord::new(self)
    }

    /// Current nesting depth; 0 outside any transaction.
    pub fn transaction_depth(&self) -> u32 {
        self.tx.as_ref().map_or(0, |ctx| ctx.depth)
    }

    pub fn in_transaction(&self) -> bool {
        self.tx.is_some()
    }

    /// Whether statements currently run on the transaction-bound connection.
    pub fn has_bound_connection(&self) -> bool {
        self.tx.as_ref().is_some_and(|ctx| ctx.conn.is_some())
    }

    // ========================================================================
    // Transaction Control
    // ========================================================================

    /// Opens a transaction level.
    ///
    /// The first call fixes `readonly` and `isolation`; nested calls only
    /// increase the depth.
    pub fn init_transaction(&mut self, readonly: bool, isolation: Option<IsolationLevel>) {
        match self.tx.as_mut() {
            Some(ctx) => ctx.enter(),
            None => self.tx = Some(TransactionContext::new(readonly, isolation)),
        }
    }

    /// Physically begins the pending transaction, at most once.
    ///
    /// Called implicitly by the first statement of the transaction.
    pub async fn begin_transaction(&mut self) -> Result<()> {
        let Some(ctx) = self.tx.as_mut() else {
            return Ok(());
        };
        if ctx.state != TxState::Pending {
            return Ok(());
        }

        let mut conn = self.ds.pool.acquire().await?;
        for statement in self.ds.dialect.begin_statements(ctx.readonly, ctx.isolation) {
            log::debug!("Transaction begin: {}", statement);
            (&mut *conn).execute(statement.as_str()).await?;
        }
        ctx.conn = Some(conn);
        ctx.state = TxState::Active;
        Ok(())
    }

    /// Commits the physical transaction; a no-op inside nested levels.
    pub async fn commit_transaction(&mut self) -> Result<()> {
        let Some(ctx) = self.tx.as_mut() else {
            return Err(Error::usage("commit_transaction called outside a transaction"));
        };
        if !ctx.is_outermost() {
            log::debug!("Commit deferred to outer transaction (depth {})", ctx.depth);
            return Ok(());
        }
        if ctx.state == TxState::Active {
            if let Some(conn) = ctx.conn.as_mut() {
                log::debug!("Transaction commit");
                (&mut **conn).execute(self.ds.dialect.commit_statement()).await?;
            }
        }
        ctx.state = TxState::Committed;
        Ok(())
    }

    /// Rolls back the physical transaction; a no-op inside nested levels.
    pub async fn rollback_transaction(&mut self) -> Result<()> {
        let Some(ctx) = self.tx.as_mut() else {
            return Err(Error::usage("rollback_transaction called outside a transaction"));
        };
        if !ctx.is_outermost() {
            log::debug!("Rollback deferred to outer transaction (depth {})", ctx.depth);
            return Ok(());
        }
        if ctx.state == TxState::Active {
            if let Some(conn) = ctx.conn.as_mut() {
                log::debug!("Transaction rollback");
                (&mut **conn).execute(self.ds.dialect.rollback_statement()).await?;
            }
        }
        ctx.state = TxState::RolledBack;
        Ok(())
    }

    /// Closes a transaction level.
    ///
    /// At the outermost level an unfinished transaction is rolled back and
    /// the bound connection goes back to the pool.
    pub async fn end_transaction(&mut self) -> Result<()> {
        let Some(ctx) = self.tx.as_mut() else {
            return Err(Error::usage("end_transaction called without init_transaction"));
        };
        if !ctx.leave() {
            return Ok(());
        }

        let Some(mut ctx) = self.tx.take() else {
            return Ok(());
        };
        let Some(mut conn) = ctx.conn.take() else {
            return Ok(());
        };
        if ctx.state == TxState::Active {
            log::warn!("Transaction ended without commit or rollback, rolling back");
            if let Err(e) = (&mut *conn).execute(self.ds.dialect.rollback_statement()).await {
                log::warn!("Could not roll back unfinished transaction: {}", e);
                drop(conn.detach());
            }
        }
        Ok(())
    }

    // ========================================================================
    // Connections
    // ========================================================================

    /// Connection for the next statement.
    ///
    /// Inside a transaction this begins it if needed and hands out the bound
    /// connection; otherwise a pooled connection is acquired.
    pub async fn connection(&mut self) -> Result<Conn<'_>> {
        self.begin_transaction().await?;
        match self.tx.as_mut().and_then(|ctx| ctx.conn.as_mut()) {
            Some(conn) => Ok(Conn::Bound(conn)),
            None => Ok(Conn::Pooled(self.ds.pool.acquire().await?)),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(ctx) = self.tx.as_mut() {
            log::warn!("Session dropped inside a transaction (depth {})", ctx.depth);
            // The connection may hold an open transaction; never return it to the pool.
            if let Some(conn) = ctx.conn.take() {
                drop(conn.detach());
            }
        }
    }
}

// ============================================================================
// Connection Handle
// ============================================================================

/// A connection handed out by [`Session::connection`].
#[derive(Debug)]
pub enum Conn<'a> {
    /// Belongs to the active transaction and stays with the session.
    Bound(&'a mut PoolConnection<Any>),
    /// Borrowed from the pool for a single operation.
    Pooled(PoolConnection<Any>),
}

impl Conn<'_> {
    pub fn is_bound(&self) -> bool {
        matches!(self, Conn::Bound(_))
    }

    /// Releases the connection. Bound connections are left untouched.
    pub fn close(self) {
        match self {
            Conn::Bound(_) => {}
            Conn::Pooled(conn) => {
                log::trace!("Connection returned to pool");
                drop(conn);
            }
        }
    }

    /// Releases a connection left in an unknown transaction state.
    ///
    /// A pooled connection is detached and closed instead of going back to
    /// the pool. Bound connections stay with the session, which rolls them
    /// back or detaches them when the transaction ends.
    pub fn discard(self) {
        match self {
            Conn::Bound(_) => {}
            Conn::Pooled(conn) => {
                log::warn!("Connection left inside a transaction, detaching it from the pool");
                drop(conn.detach());
            }
        }
    }
}

impl Deref for Conn<'_> {
    type Target = AnyConnection;

    fn deref(&self) -> &AnyConnection {
        match self {
            Conn::Bound(conn) => &***conn,
            Conn::Pooled(conn) => &**conn,
        }
    }
}

impl DerefMut for Conn<'_> {
    fn deref_mut(&mut self) -> &mut AnyConnection {
        match self {
            Conn::Bound(conn) => &mut ***conn,
            Conn::Pooled(conn) => &mut **conn,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_depth_collapses_to_outermost() {
        let mut ctx = TransactionContext::new(false, None);
        ctx.enter();
        ctx.enter();
        assert_eq!(ctx.depth, 3);
        assert!(!ctx.is_outermost());

        assert!(!ctx.leave());
        assert!(!ctx.leave());
        assert!(ctx.is_outermost());
        assert!(ctx.leave());
    }

    async fn session() -> Session {
        DataSource::builder().max_connections(1).connect("sqlite::memory:").await.unwrap().session()
    }

    #[tokio::test]
    async fn test_nested_init_keeps_first_characteristics() {
        let mut session = session().await;
        session.init_transaction(true, Some(IsolationLevel::Serializable));
        session.init_transaction(false, None);

        let ctx = session.tx.as_ref().unwrap();
        assert!(ctx.readonly);
        assert_eq!(ctx.isolation, Some(IsolationLevel::Serializable));
        assert_eq!(session.transaction_depth(), 2);
        assert_eq!(ctx.state, TxState::Pending);

        session.end_transaction().await.unwrap();
        session.end_transaction().await.unwrap();
        assert!(!session.in_transaction());
    }

    #[tokio::test]
    async fn test_begin_is_lazy_and_happens_once() {
        let mut session = session().await;
        session.init_transaction(false, None);
        assert!(!session.has_bound_connection());

        {
            let conn = session.connection().await.unwrap();
            assert!(conn.is_bound());
            conn.close();
        }
        session.begin_transaction().await.unwrap();
        assert_eq!(session.tx.as_ref().unwrap().state, TxState::Active);

        session.commit_transaction().await.unwrap();
        session.end_transaction().await.unwrap();
        assert_eq!(session.transaction_depth(), 0);
    }

    #[tokio::test]
    async fn test_inner_commit_is_deferred() {
        let mut session = session().await;
        session.init_transaction(false, None);
        session.init_transaction(false, None);
        session.begin_transaction().await.unwrap();

        session.commit_transaction().await.unwrap();
        assert_eq!(session.tx.as_ref().unwrap().state, TxState::Active);

        session.end_transaction().await.unwrap();
        session.rollback_transaction().await.unwrap();
        assert_eq!(session.tx.as_ref().unwrap().state, TxState::RolledBack);
        session.end_transaction().await.unwrap();
    }

    #[tokio::test]
    async fn test_end_without_init_is_usage_error() {
        let mut session = session().await;
        assert!(matches!(session.end_transaction().await, Err(Error::Usage(_))));
        assert!(matches!(session.commit_transaction().await, Err(Error::Usage(_))));
    }

    #[tokio::test]
    async fn test_connection_outside_transaction_is_pooled() {
        let mut session = session().await;
        let conn = session.connection().await.unwrap();
        assert!(!conn.is_bound());
        conn.close();
    }
}
