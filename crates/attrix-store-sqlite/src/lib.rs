//! SQLite backend for the attrix measurement datastore.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated
//! thread without blocking the async runtime. Every unit of work submitted
//! through [`SqliteDatastore`] executes inside a single SQLite transaction.

mod dao;
mod encode;
mod error;
mod rollback;
mod schema;
mod store;

pub use rollback::SqliteRollbackWorker;
pub use store::SqliteDatastore;

#[cfg(test)]
mod tests;
