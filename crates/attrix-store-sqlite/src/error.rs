//! Error plumbing for `attrix-store-sqlite`.
//!
//! The crate surfaces [`attrix_core::DatastoreError`] rather than its own
//! error type so DAO consumers stay backend-agnostic; these helpers fold
//! the SQLite layer's errors into it.

use attrix_core::DatastoreError;

/// Fold a rusqlite error into the backend-agnostic error type.
pub(crate) fn db(err: rusqlite::Error) -> DatastoreError {
  DatastoreError::backend(err)
}

/// Fold a connection-level tokio-rusqlite error.
pub(crate) fn conn(err: tokio_rusqlite::Error) -> DatastoreError {
  DatastoreError::backend(err)
}
