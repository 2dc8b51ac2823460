//! Stored-procedure and custom invocation hooks.
//!
//! The engine does not know how a procedure is called on a given database
//! (`CALL`, `EXEC`, `SELECT * FROM fn(...)`, out parameters...). Callers
//! supply that knowledge through these traits; the engine provides the
//! connection, which is the transaction-bound one inside a transaction.
//! Results of callable invocations are never cached.

use async_trait::async_trait;
use sqlx::{any::AnyRow, AnyConnection};

/// Invocation producing rows, which the engine maps afterwards.
#[async_trait]
pub trait ResultSetCall: Send + Sync {
    async fn call(&self, conn: &mut AnyConnection, sql: &str) -> Result<Vec<AnyRow>, sqlx::Error>;
}

/// Invocation producing an arbitrary value extracted by the caller.
#[async_trait]
pub trait ObjectCall: Send + Sync {
    type Output: Send;

    async fn call(&self, conn: &mut AnyConnection, sql: &str) -> Result<Self::Output, sqlx::Error>;
}
