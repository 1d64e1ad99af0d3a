//! SQLite backend for the SCV core.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated
//! thread without blocking the async runtime. Owns the raw-record and
//! client tables; the match/evidence/audit ledgers are created by external
//! processes and read through the schema-adaptive resolver.

mod encode;
mod resolver;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use resolver::SchemaCache;
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
