//! [`RollbackReconciliationManager`] — detects deletions undone by an OS
//! module rollback.
//!
//! Worker failures are swallowed on purpose: rollback bookkeeping is
//! best-effort and must never fail the deletion flow it decorates.

use attrix_core::rollback::{DeletionReason, RollbackWorker};
use tracing::{debug, warn};

/// One manager per deletion reason, holding the module version probed at
/// startup (`None` when the module was not found).
pub struct RollbackReconciliationManager<W> {
  reason:          DeletionReason,
  current_version: Option<u64>,
  worker:          W,
}

impl<W: RollbackWorker> RollbackReconciliationManager<W> {
  pub fn new(
    worker: W,
    reason: DeletionReason,
    current_version: Option<u64>,
  ) -> Self {
    Self { reason, current_version, worker }
  }

  #[cfg(test)]
  pub(crate) fn worker(&self) -> &W { &self.worker }

  /// Record that a deletion just ran under the current module version.
  /// No-op when the module version is unknown.
  pub async fn record_deletion_occurred(&self) {
    let Some(version) = self.current_version else {
      debug!("module version unknown, not recording deletion");
      return;
    };
    if let Err(err) = self.worker.record_deletion(self.reason, version).await {
      warn!(%err, "failed to record deletion for rollback handling");
    }
  }

  /// Whether a recorded deletion ran under a newer module version than
  /// the one currently installed — meaning the module was rolled back
  /// and the restored database must be wiped again.
  ///
  /// Returns `true` at most once per recorded deletion: the record is
  /// cleared as a side effect. If the clear itself fails this reports
  /// `false` and leaves the record for a later attempt.
  pub async fn needs_reconciliation(&self) -> bool {
    let Some(current) = self.current_version else {
      return false;
    };

    let record = match self.worker.stored_record(self.reason).await {
      Ok(Some(record)) => record,
      Ok(None) => return false,
      Err(err) => {
        warn!(%err, "failed to read rollback record");
        return false;
      }
    };

    if record.module_version <= current {
      return false;
    }

    if let Err(err) =
      self.worker.clear_record(self.reason, record.row_id).await
    {
      warn!(%err, "failed to clear rollback record");
      return false;
    }
    true
  }
}
