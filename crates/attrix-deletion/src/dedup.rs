//! Dedup-key resets for deleted reports.
//!
//! When a report is deleted, the dedup marker it left on its source must
//! be removed, otherwise the same logical conversion could never report
//! again. Event reports have two historical bookkeeping schemes, modelled
//! as a strategy chosen once at construction: the legacy per-source
//! dedup-key list, and the newer attributed-trigger list that records the
//! (trigger, dedup key) pair together.

use attrix_core::{
  dao::MeasurementDao,
  report::{AggregateReport, EventReport},
  source::{parse_attributed_triggers, serialize_attributed_triggers},
  DatastoreError,
};
use tracing::warn;

/// Removes the event-report dedup markers the given reports left behind.
pub trait EventDedupReset: Send + Sync {
  fn reset(
    &self,
    dao: &mut dyn MeasurementDao,
    reports: &[EventReport],
  ) -> Result<(), DatastoreError>;
}

// ─── Legacy list ─────────────────────────────────────────────────────────────

/// Removes keys from the source's plain event-report dedup-key list.
pub struct LegacyDedupReset;

impl EventDedupReset for LegacyDedupReset {
  fn reset(
    &self,
    dao: &mut dyn MeasurementDao,
    reports: &[EventReport],
  ) -> Result<(), DatastoreError> {
    for report in reports {
      let Some(source_id) = report.source_id else {
        warn!(report_id = %report.id, "event report has no source, skipping dedup reset");
        continue;
      };
      let mut source = dao.get_source(source_id)?;

      // A report without a dedup key ends dedup processing for the whole
      // remaining list, not just this report. Long-standing behavior that
      // callers may depend on; keep it until the product semantics are
      // revisited.
      let Some(key) = report.trigger_dedup_key else {
        return Ok(());
      };

      source.remove_event_report_dedup_key(key);
      dao.update_source_event_report_dedup_keys(&source)?;
    }
    Ok(())
  }
}

// ─── Attributed-trigger alignment ────────────────────────────────────────────

/// Removes entries from the source's attributed-trigger list, matching on
/// both the dedup key and the report's trigger so distinct triggers that
/// happen to share a key are untouched.
pub struct AlignedDedupReset;

impl EventDedupReset for AlignedDedupReset {
  fn reset(
    &self,
    dao: &mut dyn MeasurementDao,
    reports: &[EventReport],
  ) -> Result<(), DatastoreError> {
    for report in reports {
      let Some(source_id) = report.source_id else {
        warn!(report_id = %report.id, "event report has no source, skipping dedup reset");
        continue;
      };
      let source = dao.get_source(source_id)?;

      // Same early termination as the legacy strategy; see above.
      let Some(key) = report.trigger_dedup_key else {
        return Ok(());
      };

      let raw = source.attribution_status.as_deref().unwrap_or("[]");
      let mut attributed = match parse_attributed_triggers(raw) {
        Ok(attributed) => attributed,
        Err(err) => {
          warn!(source_id = %source.id, %err, "unparseable attributed triggers, skipping dedup reset");
          continue;
        }
      };

      attributed.retain(|t| {
        !(t.dedup_key == Some(key) && t.trigger_id == report.trigger_id)
      });
      let serialized = serialize_attributed_triggers(&attributed)?;
      dao.update_source_attributed_triggers(source.id, &serialized)?;
    }
    Ok(())
  }
}

// ─── Aggregate reports ───────────────────────────────────────────────────────

/// Removes the aggregate-report dedup markers the given reports left
/// behind. Reports without a source or without a dedup key are skipped.
pub fn reset_aggregate_dedup_keys(
  dao: &mut dyn MeasurementDao,
  reports: &[AggregateReport],
) -> Result<(), DatastoreError> {
  for report in reports {
    let Some(source_id) = report.source_id else {
      warn!(report_id = %report.id, "aggregate report has no source, skipping dedup reset");
      continue;
    };
    let Some(key) = report.dedup_key else {
      continue;
    };

    let mut source = dao.get_source(source_id)?;
    source.remove_aggregate_report_dedup_key(key);
    dao.update_source_aggregate_report_dedup_keys(&source)?;
  }
  Ok(())
}
