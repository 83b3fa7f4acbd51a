//! The transactional DAO contract over attribution state.
//!
//! The traits are implemented by storage backends (e.g.
//! `attrix-store-sqlite`). The deletion engine depends on this
//! abstraction, not on any concrete backend.

use std::{collections::HashSet, future::Future};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  deletion::{DeletionParam, MatchBehavior},
  error::DatastoreError,
  registration::AsyncRegistration,
  report::{AggregateReport, AggregateReportStatus, EventReport, EventReportStatus},
  source::{Source, SourceStatus},
  trigger::{Trigger, TriggerStatus},
};

// ─── Query type ──────────────────────────────────────────────────────────────

/// Row-selection criteria shared by the `fetch_matching_*` operations.
///
/// Which column the site filters apply to depends on the entity: the
/// publisher for sources, the attribution destination for triggers, the
/// top origin for async registrations.
#[derive(Debug, Clone)]
pub struct MatchCriteria {
  /// Registrant URI, matched exactly.
  pub registrant:     String,
  /// Inclusive lower bound on the entity's own timestamp column.
  pub start:          DateTime<Utc>,
  /// Inclusive upper bound.
  pub end:            DateTime<Utc>,
  pub origin_uris:    Vec<String>,
  pub domain_uris:    Vec<String>,
  pub match_behavior: MatchBehavior,
}

impl MatchCriteria {
  /// Derive the criteria a deletion request implies.
  pub fn from_param(param: &DeletionParam) -> Self {
    Self {
      registrant:     param.registrant_uri(),
      start:          param.start,
      end:            param.end,
      origin_uris:    param.origin_uris.clone(),
      domain_uris:    param.domain_uris.clone(),
      match_behavior: param.match_behavior,
    }
  }
}

// ─── DAO ─────────────────────────────────────────────────────────────────────

/// Synchronous data access over attribution entities, valid only inside a
/// transaction started by [`Datastore::run_in_transaction`].
///
/// Every method is atomic with respect to the enclosing transaction; an
/// `Err` from any of them aborts the whole unit of work.
pub trait MeasurementDao {
  // ── Matching ──────────────────────────────────────────────────────────

  /// IDs of sources matching `criteria`, in stable (insertion) order.
  fn fetch_matching_sources(
    &mut self,
    criteria: &MatchCriteria,
  ) -> Result<Vec<Uuid>, DatastoreError>;

  /// IDs of triggers matching `criteria`. Returned as a set: the caller
  /// may extend it with trigger IDs drawn from flex sources.
  fn fetch_matching_triggers(
    &mut self,
    criteria: &MatchCriteria,
  ) -> Result<HashSet<Uuid>, DatastoreError>;

  /// IDs of pending async registrations matching `criteria`.
  fn fetch_matching_async_registrations(
    &mut self,
    criteria: &MatchCriteria,
  ) -> Result<Vec<Uuid>, DatastoreError>;

  /// Event reports referencing any of the given sources OR triggers.
  fn fetch_matching_event_reports(
    &mut self,
    source_ids: &HashSet<Uuid>,
    trigger_ids: &HashSet<Uuid>,
  ) -> Result<Vec<EventReport>, DatastoreError>;

  /// Aggregate reports referencing any of the given sources OR triggers.
  fn fetch_matching_aggregate_reports(
    &mut self,
    source_ids: &HashSet<Uuid>,
    trigger_ids: &HashSet<Uuid>,
  ) -> Result<Vec<AggregateReport>, DatastoreError>;

  /// IDs of flex sources (non-null trigger specs) whose attributed-trigger
  /// list references any of the given trigger IDs.
  fn fetch_flex_source_ids_for(
    &mut self,
    trigger_ids: &HashSet<Uuid>,
  ) -> Result<HashSet<Uuid>, DatastoreError>;

  // ── Point reads ───────────────────────────────────────────────────────

  fn get_source(&mut self, id: Uuid) -> Result<Source, DatastoreError>;

  fn get_trigger(&mut self, id: Uuid) -> Result<Trigger, DatastoreError>;

  fn get_event_report(
    &mut self,
    id: Uuid,
  ) -> Result<EventReport, DatastoreError>;

  fn get_aggregate_report(
    &mut self,
    id: Uuid,
  ) -> Result<AggregateReport, DatastoreError>;

  // ── Inserts ───────────────────────────────────────────────────────────

  fn insert_source(&mut self, source: &Source) -> Result<(), DatastoreError>;

  fn insert_trigger(&mut self, trigger: &Trigger)
  -> Result<(), DatastoreError>;

  fn insert_event_report(
    &mut self,
    report: &EventReport,
  ) -> Result<(), DatastoreError>;

  fn insert_aggregate_report(
    &mut self,
    report: &AggregateReport,
  ) -> Result<(), DatastoreError>;

  fn insert_async_registration(
    &mut self,
    registration: &AsyncRegistration,
  ) -> Result<(), DatastoreError>;

  // ── Source mutations ──────────────────────────────────────────────────

  /// Persist the source's aggregate-contribution counter.
  fn update_source_aggregate_contributions(
    &mut self,
    source: &Source,
  ) -> Result<(), DatastoreError>;

  /// Persist the source's event-report dedup-key list.
  fn update_source_event_report_dedup_keys(
    &mut self,
    source: &Source,
  ) -> Result<(), DatastoreError>;

  /// Persist the source's aggregate-report dedup-key list.
  fn update_source_aggregate_report_dedup_keys(
    &mut self,
    source: &Source,
  ) -> Result<(), DatastoreError>;

  /// Overwrite the source's serialized attributed-trigger list.
  fn update_source_attributed_triggers(
    &mut self,
    source_id: Uuid,
    attribution_status: &str,
  ) -> Result<(), DatastoreError>;

  // ── Status flips ──────────────────────────────────────────────────────

  fn mark_event_report_status(
    &mut self,
    id: Uuid,
    status: EventReportStatus,
  ) -> Result<(), DatastoreError>;

  fn mark_aggregate_report_status(
    &mut self,
    id: Uuid,
    status: AggregateReportStatus,
  ) -> Result<(), DatastoreError>;

  /// Flip the status of every listed source. Errors if any ID is absent.
  fn update_source_status(
    &mut self,
    source_ids: &[Uuid],
    status: SourceStatus,
  ) -> Result<(), DatastoreError>;

  /// Flip the status of every listed trigger. Errors if any ID is absent.
  fn update_trigger_status(
    &mut self,
    trigger_ids: &HashSet<Uuid>,
    status: TriggerStatus,
  ) -> Result<(), DatastoreError>;

  // ── Hard deletion ─────────────────────────────────────────────────────
  //
  // Unlike the status flips, deletes accept ids with no matching row.

  /// Delete sources by ID; their reports follow by referential cascade.
  fn delete_sources(
    &mut self,
    source_ids: &[Uuid],
  ) -> Result<(), DatastoreError>;

  /// Delete triggers by ID; their reports follow by referential cascade.
  /// IDs with no row (e.g. from a stale attributed-trigger list) are
  /// skipped.
  fn delete_triggers(
    &mut self,
    trigger_ids: &HashSet<Uuid>,
  ) -> Result<(), DatastoreError>;

  fn delete_async_registrations(
    &mut self,
    registration_ids: &[Uuid],
  ) -> Result<(), DatastoreError>;
}

// ─── Transaction boundary ────────────────────────────────────────────────────

/// A datastore able to run a unit of work atomically.
///
/// The closure runs on the store's own thread with a [`MeasurementDao`]
/// scoped to a single transaction: commit on `Ok`, rollback on `Err`. No
/// partial state is observable to concurrent readers either way.
pub trait Datastore: Send + Sync {
  fn run_in_transaction<T, F>(
    &self,
    work: F,
  ) -> impl Future<Output = Result<T, DatastoreError>> + Send
  where
    T: Send + 'static,
    F: FnOnce(&mut dyn MeasurementDao) -> Result<T, DatastoreError>
      + Send
      + 'static;
}
