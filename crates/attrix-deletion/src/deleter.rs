//! [`MeasurementDataDeleter`] — the deletion orchestrator.

use std::{collections::HashSet, sync::Arc};

use attrix_core::{
  dao::{Datastore, MatchCriteria, MeasurementDao},
  deletion::{
    DeletionMode, DeletionParam, WipeoutStatus, WipeoutType,
  },
  report::{AggregateReportStatus, EventReportStatus},
  source::{parse_attributed_triggers, SourceStatus},
  trigger::TriggerStatus,
  DatastoreError,
};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
  contributions::reset_aggregate_contributions,
  dedup::{
    reset_aggregate_dedup_keys, AlignedDedupReset, EventDedupReset,
    LegacyDedupReset,
  },
  wipeout::WipeoutLogger,
};

/// Behavior switches fixed at construction time.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeleterConfig {
  /// Also sweep flex sources whose attributed-trigger lists reference a
  /// matched trigger.
  pub flexible_event_reporting: bool,
  /// Reset event-report dedup markers through the attributed-trigger
  /// list instead of the legacy dedup-key list.
  pub aligned_dedup:            bool,
}

/// Deletes or quarantines all attribution state a [`DeletionParam`]
/// names, atomically.
pub struct MeasurementDataDeleter<D> {
  store:                    D,
  flexible_event_reporting: bool,
  event_dedup:              Arc<dyn EventDedupReset>,
  wipeout:                  Arc<dyn WipeoutLogger>,
}

impl<D: Datastore> MeasurementDataDeleter<D> {
  pub fn new(
    store: D,
    config: DeleterConfig,
    wipeout: Arc<dyn WipeoutLogger>,
  ) -> Self {
    let event_dedup: Arc<dyn EventDedupReset> = if config.aligned_dedup {
      Arc::new(AlignedDedupReset)
    } else {
      Arc::new(LegacyDedupReset)
    };
    Self {
      store,
      flexible_event_reporting: config.flexible_event_reporting,
      event_dedup,
      wipeout,
    }
  }

  /// Run the whole deletion in one transaction. On success every matched
  /// row has been deleted or marked according to the request's mode; on
  /// error nothing was committed.
  pub async fn delete(
    &self,
    param: DeletionParam,
  ) -> Result<(), DatastoreError> {
    if param.start > param.end {
      return Err(DatastoreError::InvalidRange);
    }

    let flexible = self.flexible_event_reporting;
    let event_dedup = Arc::clone(&self.event_dedup);
    let status = WipeoutStatus {
      wipeout_type:     WipeoutType::DeletionApi,
      app_package_name: param.app_package_name.clone(),
    };

    self
      .store
      .run_in_transaction(move |dao| {
        run_deletion(dao, &param, flexible, event_dedup.as_ref())
      })
      .await?;

    // Audit only after the transaction committed.
    self.wipeout.log_wipeout(&status);
    Ok(())
  }
}

/// The transactional body of [`MeasurementDataDeleter::delete`].
pub(crate) fn run_deletion(
  dao: &mut dyn MeasurementDao,
  param: &DeletionParam,
  flexible_event_reporting: bool,
  event_dedup: &dyn EventDedupReset,
) -> Result<(), DatastoreError> {
  let criteria = MatchCriteria::from_param(param);

  let source_ids = dao.fetch_matching_sources(&criteria)?;
  let mut trigger_ids = dao.fetch_matching_triggers(&criteria)?;
  let registration_ids = dao.fetch_matching_async_registrations(&criteria)?;

  let mut source_id_set: HashSet<Uuid> = source_ids.iter().copied().collect();

  // Aggregate reports first: their budget and dedup markers are keyed off
  // the directly matched rows only.
  let aggregate_reports =
    dao.fetch_matching_aggregate_reports(&source_id_set, &trigger_ids)?;
  reset_aggregate_contributions(dao, &aggregate_reports)?;
  reset_aggregate_dedup_keys(dao, &aggregate_reports)?;

  // Flex sources track their triggers in their own attributed-trigger
  // list, so a matched trigger can implicate sources (and further
  // triggers) the direct matching missed.
  if flexible_event_reporting {
    extend_with_flex_sources(dao, &mut source_id_set, &mut trigger_ids)?;
  }

  let event_reports =
    dao.fetch_matching_event_reports(&source_id_set, &trigger_ids)?;
  event_dedup.reset(dao, &event_reports)?;

  // Pending registrations have no soft-delete state; remove them in every
  // mode.
  dao.delete_async_registrations(&registration_ids)?;

  match param.deletion_mode {
    DeletionMode::All => {
      dao.delete_sources(&source_ids)?;
      dao.delete_triggers(&trigger_ids)?;
    }
    DeletionMode::ExcludeInternalData => {
      for report in &event_reports {
        dao.mark_event_report_status(
          report.id,
          EventReportStatus::MarkedToDelete,
        )?;
      }
      for report in &aggregate_reports {
        dao.mark_aggregate_report_status(
          report.id,
          AggregateReportStatus::MarkedToDelete,
        )?;
      }
      dao.update_source_status(&source_ids, SourceStatus::MarkedToDelete)?;
      dao.update_trigger_status(&trigger_ids, TriggerStatus::MarkedToDelete)?;
    }
  }

  debug!(
    sources = source_ids.len(),
    triggers = trigger_ids.len(),
    registrations = registration_ids.len(),
    event_reports = event_reports.len(),
    aggregate_reports = aggregate_reports.len(),
    "deletion resolved"
  );
  Ok(())
}

/// Pull flex sources referencing any matched trigger into the sweep:
/// union their attributed trigger ids into `trigger_ids`, clear their
/// attributed-trigger lists, and add them to `source_id_set`. A source
/// with an unparseable list is logged and left alone.
fn extend_with_flex_sources(
  dao: &mut dyn MeasurementDao,
  source_id_set: &mut HashSet<Uuid>,
  trigger_ids: &mut HashSet<Uuid>,
) -> Result<(), DatastoreError> {
  let flex_ids = dao.fetch_flex_source_ids_for(trigger_ids)?;
  for flex_id in flex_ids {
    let source = dao.get_source(flex_id)?;
    let Some(raw) = source.attribution_status.as_deref() else {
      continue;
    };
    let attributed = match parse_attributed_triggers(raw) {
      Ok(attributed) => attributed,
      Err(err) => {
        warn!(source_id = %flex_id, %err, "unparseable attributed triggers, skipping flex source");
        continue;
      }
    };

    trigger_ids.extend(attributed.iter().map(|t| t.trigger_id));
    dao.update_source_attributed_triggers(flex_id, "[]")?;
    source_id_set.insert(flex_id);
  }
  Ok(())
}
