//! # Error Handling Module
//!
//! This module defines the error type used throughout Active ORM.
//! Every engine operation returns `Result<T, Error>`, and the variants are
//! split by who has to react to them:
//!
//! - **Storage**: wrapped sqlx failures (connectivity, statement preparation,
//!   execution). These may be transient and are the only retryable variant.
//! - **Mapping**: a result row could not be turned into the target type.
//! - **Usage**: a programmer mistake detected before any I/O happens.
//! - **Conversion**: a `Value` could not be converted to the requested Rust type.
//!
//! Policy warnings (saving an entity without modified attributes, deleting
//! every row of a table) are not errors: they are logged and the operation
//! returns `Ok(false)`.
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use active_orm::Error;
//!
//! match session.model::<User>().update(&mut user).await {
//!     Ok(true) => println!("updated"),
//!     Ok(false) => println!("nothing to update"),
//!     Err(Error::Usage(msg)) => eprintln!("caller bug: {}", msg),
//!     Err(e) if e.is_retryable() => eprintln!("transient failure: {}", e),
//!     Err(e) => eprintln!("other error: {}", e),
//! }
//! ```

// ============================================================================
// External Crate Imports
// ============================================================================

use thiserror::Error;

// ============================================================================
// Error Enum Definition
// ============================================================================

/// The main error type for Active ORM operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error.
    ///
    /// Wraps errors from the underlying sqlx library: failed connection
    /// acquisition, statement preparation or execution. The original low-level
    /// error is kept as the source.
    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// Row mapping error.
    ///
    /// Raised when a result row cannot be converted into the target structural
    /// type, for example when a column holds a type the engine cannot decode or
    /// a hand-written `Model::from_record` rejects the record.
    #[error("Mapping error: {0}")]
    Mapping(String),

    /// Invalid usage of the engine.
    ///
    /// Raised synchronously before any I/O for programmer mistakes:
    ///
    /// - a table without generated key and without primary key
    /// - a missing key value on update/delete
    /// - an empty id list for an `IN (...)` lookup
    /// - an alias set twice
    /// - page number or page size lower than 1
    #[error("Usage error: {0}")]
    Usage(String),

    /// Type conversion error.
    ///
    /// Raised when a `Value` cannot be converted into the requested Rust type.
    #[error("Type conversion error: {0}")]
    Conversion(String),
}

/// Result alias used across the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

// ============================================================================
// Helper Functions
// ============================================================================

impl Error {
    /// Creates a `Usage` error from a string slice.
    pub fn usage(msg: &str) -> Self {
        Error::Usage(msg.to_string())
    }

    /// Creates a `Mapping` error from a string slice.
    pub fn mapping(msg: &str) -> Self {
        Error::Mapping(msg.to_string())
    }

    /// Creates a `Conversion` error from a string slice.
    pub fn conversion(msg: &str) -> Self {
        Error::Conversion(msg.to_string())
    }

    /// Whether retrying the same call may succeed.
    ///
    /// Only storage failures are considered transient. Usage, mapping and
    /// conversion errors will fail the same way every time.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Storage(_))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_storage_is_retryable() {
        assert!(Error::Storage(sqlx::Error::PoolTimedOut).is_retryable());
        assert!(!Error::usage("empty id list").is_retryable());
        assert!(!Error::mapping("bad row").is_retryable());
        assert!(!Error::conversion("not a number").is_retryable());
    }

    #[test]
    fn test_sqlx_error_converts_to_storage() {
        fn fails() -> Result<()> {
            Err(sqlx::Error::RowNotFound)?
        }

        assert!(matches!(fails(), Err(Error::Storage(sqlx::Error::RowNotFound))));
    }
}
