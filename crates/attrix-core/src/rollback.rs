//! Rollback reconciliation contract.
//!
//! Deletions must survive an OS module rollback: if the module is rolled
//! back to a build older than the one a deletion ran under, the restored
//! database may resurrect deleted rows. A [`RollbackWorker`] persists a
//! small record of each deletion *outside* the measurement database so
//! the next startup can detect the downgrade and wipe again.

use std::future::Future;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DatastoreError;

/// Why a deletion was recorded for rollback handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletionReason {
  /// A measurement deletion API call wiped rows.
  MeasurementDeletion,
}

impl DeletionReason {
  /// Stable storage key for this reason.
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::MeasurementDeletion => "measurement_deletion",
    }
  }
}

/// The record a worker keeps per deletion reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackRecord {
  /// Module version the deletion ran under.
  pub module_version: u64,
  /// Storage row identity, used to clear the record later.
  pub row_id:         Uuid,
}

/// Persistence for rollback records, keyed by [`DeletionReason`].
///
/// Implementations live outside the measurement database proper so the
/// records survive a measurement wipe, and at most one record per reason
/// is kept: recording again under a newer module version replaces the
/// old record.
pub trait RollbackWorker: Send + Sync {
  /// Record that a deletion for `reason` ran under `module_version`.
  fn record_deletion(
    &self,
    reason: DeletionReason,
    module_version: u64,
  ) -> impl Future<Output = Result<(), DatastoreError>> + Send;

  /// The stored record for `reason`, if any.
  fn stored_record(
    &self,
    reason: DeletionReason,
  ) -> impl Future<Output = Result<Option<RollbackRecord>, DatastoreError>> + Send;

  /// Remove the record with the given row identity.
  fn clear_record(
    &self,
    reason: DeletionReason,
    row_id: Uuid,
  ) -> impl Future<Output = Result<(), DatastoreError>> + Send;
}
