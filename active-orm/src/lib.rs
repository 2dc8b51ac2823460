//! Active ORM: an active-record persistence engine over sqlx.
//!
//! Entities own a [`Record`] and derive [`Model`]; every operation runs
//! through `session.model::<T>()` on a [`Session`] opened from a
//! [`DataSource`].

pub use active_orm_macro::Model;

// Declaração dos módulos
pub mod active_record;
pub mod batch;
pub mod cache;
pub mod callable;
pub mod database;
pub mod dialect;
pub mod errors;
pub mod generator;
pub mod model;
pub mod pagination;
pub mod record;
pub mod temporal;
pub mod transaction;
pub mod value;
pub mod value_binding;

// Re-exportação para facilitar o uso pela API pública
pub use active_record::ActiveRecord;
pub use cache::{CacheProvider, MemoryCacheProvider, QueryCache};
pub use callable::{ObjectCall, ResultSetCall};
pub use database::{DataSource, DataSourceConfig, Drivers};
pub use dialect::{Dialect, IsolationLevel, StandardDialect};
pub use errors::{Error, Result};
pub use generator::{KeyGenerator, UuidGenerator};
pub use model::{Model, TableMeta};
pub use pagination::{FullPage, Page, Pagination};
pub use record::{Attributes, Record};
pub use transaction::{Conn, Session};
pub use value::{FromValue, QueryRow, Value};
