//! Error types for `attrix-core`.

use thiserror::Error;
use uuid::Uuid;

/// A failure signalled by the datastore or by code running inside one of
/// its transactions. Any variant surfacing out of
/// [`Datastore::run_in_transaction`](crate::dao::Datastore::run_in_transaction)
/// means the whole transaction was rolled back.
#[derive(Debug, Error)]
pub enum DatastoreError {
  #[error("source not found: {0}")]
  SourceNotFound(Uuid),

  #[error("{0} not found: {1}")]
  RowNotFound(&'static str, Uuid),

  /// An UPDATE touched an unexpected number of rows.
  #[error("{0} update affected an unexpected number of rows")]
  UpdateFailed(&'static str),

  #[error("deletion range start is after end")]
  InvalidRange,

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),

  #[error("datastore backend error: {0}")]
  Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl DatastoreError {
  /// Wrap a backend-specific error without making this crate depend on
  /// the backend.
  pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Backend(Box::new(err))
  }
}

pub type Result<T, E = DatastoreError> = std::result::Result<T, E>;
