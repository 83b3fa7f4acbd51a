//! [`SqliteDao`] — the transactional [`MeasurementDao`] over a live
//! SQLite transaction.
//!
//! Matching queries are assembled dynamically from [`MatchCriteria`]; all
//! parameters are bound, never interpolated. Every mutation checks the
//! affected row count so a missing row aborts the transaction instead of
//! silently succeeding.

use std::collections::HashSet;

use attrix_core::{
  dao::{MatchCriteria, MeasurementDao},
  deletion::MatchBehavior,
  registration::AsyncRegistration,
  report::{
    AggregateReport, AggregateReportStatus, EventReport, EventReportStatus,
  },
  source::{Source, SourceStatus},
  trigger::{Trigger, TriggerStatus},
  DatastoreError,
};
use rusqlite::{params_from_iter, OptionalExtension as _, Transaction};
use uuid::Uuid;

use crate::{
  encode::{
    decode_uuid, encode_aggregate_report_status, encode_contributions,
    encode_dt, encode_event_report_status, encode_opt_u64, encode_registration,
    encode_source_status, encode_trigger_status, encode_u64_list, encode_uuid,
    RawAggregateReport, RawEventReport, RawSource, RawTrigger,
  },
  error::db,
};

type Result<T> = std::result::Result<T, DatastoreError>;

// ─── Query assembly ──────────────────────────────────────────────────────────

/// `?,?,…` for an `IN` list of `n` values.
fn placeholders(n: usize) -> String { vec!["?"; n].join(",") }

/// The site filter over `col`, or `None` when no filter applies.
///
/// Origins match exactly; a domain URI `scheme://host` matches the exact
/// site and every subdomain (`scheme://%.host`). Under
/// [`MatchBehavior::Preserve`] the whole disjunction is negated, so rows
/// NOT named by the filters are the ones selected.
fn site_condition(
  col: &str,
  criteria: &MatchCriteria,
  params: &mut Vec<String>,
) -> Option<String> {
  let mut terms: Vec<String> = vec![];

  if !criteria.origin_uris.is_empty() {
    terms
      .push(format!("{col} IN ({})", placeholders(criteria.origin_uris.len())));
    params.extend(criteria.origin_uris.iter().cloned());
  }

  for domain in &criteria.domain_uris {
    match domain.split_once("://") {
      Some((scheme, host)) => {
        terms.push(format!("({col} LIKE ? OR {col} = ?)"));
        params.push(format!("{scheme}://%.{host}"));
        params.push(domain.clone());
      }
      None => {
        terms.push(format!("{col} = ?"));
        params.push(domain.clone());
      }
    }
  }

  if terms.is_empty() {
    return None;
  }

  let joined = terms.join(" OR ");
  Some(match criteria.match_behavior {
    MatchBehavior::Delete => joined,
    MatchBehavior::Preserve => format!("NOT ({joined})"),
  })
}

/// Under [`MatchBehavior::Delete`] empty site filters select nothing at
/// all, so the query can be skipped outright.
fn matches_nothing(criteria: &MatchCriteria) -> bool {
  criteria.match_behavior == MatchBehavior::Delete
    && criteria.origin_uris.is_empty()
    && criteria.domain_uris.is_empty()
}

// ─── DAO ─────────────────────────────────────────────────────────────────────

/// A [`MeasurementDao`] bound to one SQLite transaction.
pub(crate) struct SqliteDao<'conn> {
  tx: Transaction<'conn>,
}

impl<'conn> SqliteDao<'conn> {
  pub(crate) fn new(tx: Transaction<'conn>) -> Self { Self { tx } }

  pub(crate) fn commit(self) -> Result<()> { self.tx.commit().map_err(db) }

  /// Run a registrant + time-range + site-filter query over `table` and
  /// return the matching ids.
  fn matching_ids(
    &mut self,
    table: &str,
    id_col: &str,
    site_col: &str,
    time_col: &str,
    criteria: &MatchCriteria,
  ) -> Result<Vec<Uuid>> {
    if matches_nothing(criteria) {
      return Ok(vec![]);
    }

    let mut params = vec![
      criteria.registrant.clone(),
      encode_dt(criteria.start),
      encode_dt(criteria.end),
    ];
    let mut sql = format!(
      "SELECT {id_col} FROM {table}
       WHERE registrant = ? AND {time_col} BETWEEN ? AND ?"
    );
    if let Some(cond) = site_condition(site_col, criteria, &mut params) {
      sql.push_str(&format!(" AND ({cond})"));
    }

    let mut stmt = self.tx.prepare(&sql).map_err(db)?;
    let ids = stmt
      .query_map(params_from_iter(params.iter()), |row| {
        row.get::<_, String>(0)
      })
      .map_err(db)?
      .collect::<rusqlite::Result<Vec<_>>>()
      .map_err(db)?;

    ids.iter().map(|s| decode_uuid(s)).collect()
  }

  /// `source_id IN (…) OR trigger_id IN (…)`, or `None` when both sets
  /// are empty.
  fn report_condition(
    source_ids: &HashSet<Uuid>,
    trigger_ids: &HashSet<Uuid>,
    params: &mut Vec<String>,
  ) -> Option<String> {
    let mut terms: Vec<String> = vec![];
    if !source_ids.is_empty() {
      terms.push(format!("source_id IN ({})", placeholders(source_ids.len())));
      params.extend(source_ids.iter().copied().map(encode_uuid));
    }
    if !trigger_ids.is_empty() {
      terms
        .push(format!("trigger_id IN ({})", placeholders(trigger_ids.len())));
      params.extend(trigger_ids.iter().copied().map(encode_uuid));
    }
    if terms.is_empty() {
      None
    } else {
      Some(terms.join(" OR "))
    }
  }
}

impl MeasurementDao for SqliteDao<'_> {
  // ── Matching ──────────────────────────────────────────────────────────

  fn fetch_matching_sources(
    &mut self,
    criteria: &MatchCriteria,
  ) -> Result<Vec<Uuid>> {
    self.matching_ids("sources", "source_id", "publisher", "event_time", criteria)
  }

  fn fetch_matching_triggers(
    &mut self,
    criteria: &MatchCriteria,
  ) -> Result<HashSet<Uuid>> {
    Ok(
      self
        .matching_ids(
          "triggers",
          "trigger_id",
          "attribution_destination",
          "trigger_time",
          criteria,
        )?
        .into_iter()
        .collect(),
    )
  }

  fn fetch_matching_async_registrations(
    &mut self,
    criteria: &MatchCriteria,
  ) -> Result<Vec<Uuid>> {
    self.matching_ids(
      "async_registrations",
      "registration_id",
      "top_origin",
      "request_time",
      criteria,
    )
  }

  fn fetch_matching_event_reports(
    &mut self,
    source_ids: &HashSet<Uuid>,
    trigger_ids: &HashSet<Uuid>,
  ) -> Result<Vec<EventReport>> {
    let mut params: Vec<String> = vec![];
    let Some(cond) = Self::report_condition(source_ids, trigger_ids, &mut params)
    else {
      return Ok(vec![]);
    };

    let sql = format!(
      "SELECT report_id, source_id, trigger_id, trigger_dedup_key,
              report_time, status
       FROM event_reports WHERE {cond}"
    );
    let mut stmt = self.tx.prepare(&sql).map_err(db)?;
    let raws = stmt
      .query_map(params_from_iter(params.iter()), |row| {
        Ok(RawEventReport {
          report_id:         row.get(0)?,
          source_id:         row.get(1)?,
          trigger_id:        row.get(2)?,
          trigger_dedup_key: row.get(3)?,
          report_time:       row.get(4)?,
          status:            row.get(5)?,
        })
      })
      .map_err(db)?
      .collect::<rusqlite::Result<Vec<_>>>()
      .map_err(db)?;

    raws.into_iter().map(RawEventReport::into_report).collect()
  }

  fn fetch_matching_aggregate_reports(
    &mut self,
    source_ids: &HashSet<Uuid>,
    trigger_ids: &HashSet<Uuid>,
  ) -> Result<Vec<AggregateReport>> {
    let mut params: Vec<String> = vec![];
    let Some(cond) = Self::report_condition(source_ids, trigger_ids, &mut params)
    else {
      return Ok(vec![]);
    };

    let sql = format!(
      "SELECT report_id, source_id, trigger_id, contributions, dedup_key,
              scheduled_report_time, status
       FROM aggregate_reports WHERE {cond}"
    );
    let mut stmt = self.tx.prepare(&sql).map_err(db)?;
    let raws = stmt
      .query_map(params_from_iter(params.iter()), |row| {
        Ok(RawAggregateReport {
          report_id:             row.get(0)?,
          source_id:             row.get(1)?,
          trigger_id:            row.get(2)?,
          contributions:         row.get(3)?,
          dedup_key:             row.get(4)?,
          scheduled_report_time: row.get(5)?,
          status:                row.get(6)?,
        })
      })
      .map_err(db)?
      .collect::<rusqlite::Result<Vec<_>>>()
      .map_err(db)?;

    raws
      .into_iter()
      .map(RawAggregateReport::into_report)
      .collect()
  }

  fn fetch_flex_source_ids_for(
    &mut self,
    trigger_ids: &HashSet<Uuid>,
  ) -> Result<HashSet<Uuid>> {
    if trigger_ids.is_empty() {
      return Ok(HashSet::new());
    }

    // A flex source references a trigger when its attributed-trigger JSON
    // contains the quoted trigger id.
    let mut params: Vec<String> = vec![];
    let terms: Vec<&'static str> = trigger_ids
      .iter()
      .map(|id| {
        params.push(format!("%\"{}\"%", encode_uuid(*id)));
        "attribution_status LIKE ?"
      })
      .collect();

    let sql = format!(
      "SELECT source_id FROM sources
       WHERE trigger_specs IS NOT NULL AND ({})",
      terms.join(" OR ")
    );
    let mut stmt = self.tx.prepare(&sql).map_err(db)?;
    let ids = stmt
      .query_map(params_from_iter(params.iter()), |row| {
        row.get::<_, String>(0)
      })
      .map_err(db)?
      .collect::<rusqlite::Result<Vec<_>>>()
      .map_err(db)?;

    ids.iter().map(|s| decode_uuid(s)).collect()
  }

  // ── Point reads ───────────────────────────────────────────────────────

  fn get_source(&mut self, id: Uuid) -> Result<Source> {
    let raw = self
      .tx
      .query_row(
        "SELECT source_id, registrant, publisher, event_time, status,
                aggregate_contributions, event_report_dedup_keys,
                aggregate_report_dedup_keys, attribution_status, trigger_specs
         FROM sources WHERE source_id = ?1",
        rusqlite::params![encode_uuid(id)],
        |row| {
          Ok(RawSource {
            source_id:                   row.get(0)?,
            registrant:                  row.get(1)?,
            publisher:                   row.get(2)?,
            event_time:                  row.get(3)?,
            status:                      row.get(4)?,
            aggregate_contributions:     row.get(5)?,
            event_report_dedup_keys:     row.get(6)?,
            aggregate_report_dedup_keys: row.get(7)?,
            attribution_status:          row.get(8)?,
            trigger_specs:               row.get(9)?,
          })
        },
      )
      .optional()
      .map_err(db)?
      .ok_or(DatastoreError::SourceNotFound(id))?;

    raw.into_source()
  }

  fn get_trigger(&mut self, id: Uuid) -> Result<Trigger> {
    let raw = self
      .tx
      .query_row(
        "SELECT trigger_id, registrant, attribution_destination,
                trigger_time, status
         FROM triggers WHERE trigger_id = ?1",
        rusqlite::params![encode_uuid(id)],
        |row| {
          Ok(RawTrigger {
            trigger_id:              row.get(0)?,
            registrant:              row.get(1)?,
            attribution_destination: row.get(2)?,
            trigger_time:            row.get(3)?,
            status:                  row.get(4)?,
          })
        },
      )
      .optional()
      .map_err(db)?
      .ok_or(DatastoreError::RowNotFound("triggers", id))?;

    raw.into_trigger()
  }

  fn get_event_report(&mut self, id: Uuid) -> Result<EventReport> {
    let raw = self
      .tx
      .query_row(
        "SELECT report_id, source_id, trigger_id, trigger_dedup_key,
                report_time, status
         FROM event_reports WHERE report_id = ?1",
        rusqlite::params![encode_uuid(id)],
        |row| {
          Ok(RawEventReport {
            report_id:         row.get(0)?,
            source_id:         row.get(1)?,
            trigger_id:        row.get(2)?,
            trigger_dedup_key: row.get(3)?,
            report_time:       row.get(4)?,
            status:            row.get(5)?,
          })
        },
      )
      .optional()
      .map_err(db)?
      .ok_or(DatastoreError::RowNotFound("event_reports", id))?;

    raw.into_report()
  }

  fn get_aggregate_report(&mut self, id: Uuid) -> Result<AggregateReport> {
    let raw = self
      .tx
      .query_row(
        "SELECT report_id, source_id, trigger_id, contributions, dedup_key,
                scheduled_report_time, status
         FROM aggregate_reports WHERE report_id = ?1",
        rusqlite::params![encode_uuid(id)],
        |row| {
          Ok(RawAggregateReport {
            report_id:             row.get(0)?,
            source_id:             row.get(1)?,
            trigger_id:            row.get(2)?,
            contributions:         row.get(3)?,
            dedup_key:             row.get(4)?,
            scheduled_report_time: row.get(5)?,
            status:                row.get(6)?,
          })
        },
      )
      .optional()
      .map_err(db)?
      .ok_or(DatastoreError::RowNotFound("aggregate_reports", id))?;

    raw.into_report()
  }

  // ── Inserts ───────────────────────────────────────────────────────────

  fn insert_source(&mut self, source: &Source) -> Result<()> {
    self
      .tx
      .execute(
        "INSERT INTO sources (
           source_id, registrant, publisher, event_time, status,
           aggregate_contributions, event_report_dedup_keys,
           aggregate_report_dedup_keys, attribution_status, trigger_specs
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        rusqlite::params![
          encode_uuid(source.id),
          source.registrant,
          source.publisher,
          encode_dt(source.event_time),
          encode_source_status(source.status),
          source.aggregate_contributions,
          encode_u64_list(&source.event_report_dedup_keys)?,
          encode_u64_list(&source.aggregate_report_dedup_keys)?,
          source.attribution_status,
          source.trigger_specs,
        ],
      )
      .map_err(db)?;
    Ok(())
  }

  fn insert_trigger(&mut self, trigger: &Trigger) -> Result<()> {
    self
      .tx
      .execute(
        "INSERT INTO triggers (
           trigger_id, registrant, attribution_destination, trigger_time,
           status
         ) VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![
          encode_uuid(trigger.id),
          trigger.registrant,
          trigger.attribution_destination,
          encode_dt(trigger.trigger_time),
          encode_trigger_status(trigger.status),
        ],
      )
      .map_err(db)?;
    Ok(())
  }

  fn insert_event_report(&mut self, report: &EventReport) -> Result<()> {
    self
      .tx
      .execute(
        "INSERT INTO event_reports (
           report_id, source_id, trigger_id, trigger_dedup_key, report_time,
           status
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
          encode_uuid(report.id),
          report.source_id.map(encode_uuid),
          encode_uuid(report.trigger_id),
          encode_opt_u64(report.trigger_dedup_key),
          encode_dt(report.report_time),
          encode_event_report_status(report.status),
        ],
      )
      .map_err(db)?;
    Ok(())
  }

  fn insert_aggregate_report(&mut self, report: &AggregateReport) -> Result<()> {
    self
      .tx
      .execute(
        "INSERT INTO aggregate_reports (
           report_id, source_id, trigger_id, contributions, dedup_key,
           scheduled_report_time, status
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        rusqlite::params![
          encode_uuid(report.id),
          report.source_id.map(encode_uuid),
          encode_uuid(report.trigger_id),
          encode_contributions(&report.contributions)?,
          encode_opt_u64(report.dedup_key),
          encode_dt(report.scheduled_report_time),
          encode_aggregate_report_status(report.status),
        ],
      )
      .map_err(db)?;
    Ok(())
  }

  fn insert_async_registration(
    &mut self,
    registration: &AsyncRegistration,
  ) -> Result<()> {
    let (id, registrant, top_origin, request_time) =
      encode_registration(registration);
    self
      .tx
      .execute(
        "INSERT INTO async_registrations (
           registration_id, registrant, top_origin, request_time
         ) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![id, registrant, top_origin, request_time],
      )
      .map_err(db)?;
    Ok(())
  }

  // ── Source mutations ──────────────────────────────────────────────────

  fn update_source_aggregate_contributions(
    &mut self,
    source: &Source,
  ) -> Result<()> {
    let changed = self
      .tx
      .execute(
        "UPDATE sources SET aggregate_contributions = ?1 WHERE source_id = ?2",
        rusqlite::params![
          source.aggregate_contributions,
          encode_uuid(source.id)
        ],
      )
      .map_err(db)?;
    if changed != 1 {
      return Err(DatastoreError::SourceNotFound(source.id));
    }
    Ok(())
  }

  fn update_source_event_report_dedup_keys(
    &mut self,
    source: &Source,
  ) -> Result<()> {
    let changed = self
      .tx
      .execute(
        "UPDATE sources SET event_report_dedup_keys = ?1 WHERE source_id = ?2",
        rusqlite::params![
          encode_u64_list(&source.event_report_dedup_keys)?,
          encode_uuid(source.id)
        ],
      )
      .map_err(db)?;
    if changed != 1 {
      return Err(DatastoreError::SourceNotFound(source.id));
    }
    Ok(())
  }

  fn update_source_aggregate_report_dedup_keys(
    &mut self,
    source: &Source,
  ) -> Result<()> {
    let changed = self
      .tx
      .execute(
        "UPDATE sources SET aggregate_report_dedup_keys = ?1
         WHERE source_id = ?2",
        rusqlite::params![
          encode_u64_list(&source.aggregate_report_dedup_keys)?,
          encode_uuid(source.id)
        ],
      )
      .map_err(db)?;
    if changed != 1 {
      return Err(DatastoreError::SourceNotFound(source.id));
    }
    Ok(())
  }

  fn update_source_attributed_triggers(
    &mut self,
    source_id: Uuid,
    attribution_status: &str,
  ) -> Result<()> {
    let changed = self
      .tx
      .execute(
        "UPDATE sources SET attribution_status = ?1 WHERE source_id = ?2",
        rusqlite::params![attribution_status, encode_uuid(source_id)],
      )
      .map_err(db)?;
    if changed != 1 {
      return Err(DatastoreError::SourceNotFound(source_id));
    }
    Ok(())
  }

  // ── Status flips ──────────────────────────────────────────────────────

  fn mark_event_report_status(
    &mut self,
    id: Uuid,
    status: EventReportStatus,
  ) -> Result<()> {
    let changed = self
      .tx
      .execute(
        "UPDATE event_reports SET status = ?1 WHERE report_id = ?2",
        rusqlite::params![encode_event_report_status(status), encode_uuid(id)],
      )
      .map_err(db)?;
    if changed != 1 {
      return Err(DatastoreError::RowNotFound("event_reports", id));
    }
    Ok(())
  }

  fn mark_aggregate_report_status(
    &mut self,
    id: Uuid,
    status: AggregateReportStatus,
  ) -> Result<()> {
    let changed = self
      .tx
      .execute(
        "UPDATE aggregate_reports SET status = ?1 WHERE report_id = ?2",
        rusqlite::params![
          encode_aggregate_report_status(status),
          encode_uuid(id)
        ],
      )
      .map_err(db)?;
    if changed != 1 {
      return Err(DatastoreError::RowNotFound("aggregate_reports", id));
    }
    Ok(())
  }

  fn update_source_status(
    &mut self,
    source_ids: &[Uuid],
    status: SourceStatus,
  ) -> Result<()> {
    if source_ids.is_empty() {
      return Ok(());
    }
    let mut params = vec![encode_source_status(status).to_owned()];
    params.extend(source_ids.iter().copied().map(encode_uuid));
    let sql = format!(
      "UPDATE sources SET status = ? WHERE source_id IN ({})",
      placeholders(source_ids.len())
    );
    let changed = self
      .tx
      .execute(&sql, params_from_iter(params.iter()))
      .map_err(db)?;
    if changed != source_ids.len() {
      return Err(DatastoreError::UpdateFailed("sources"));
    }
    Ok(())
  }

  fn update_trigger_status(
    &mut self,
    trigger_ids: &HashSet<Uuid>,
    status: TriggerStatus,
  ) -> Result<()> {
    if trigger_ids.is_empty() {
      return Ok(());
    }
    let mut params = vec![encode_trigger_status(status).to_owned()];
    params.extend(trigger_ids.iter().copied().map(encode_uuid));
    let sql = format!(
      "UPDATE triggers SET status = ? WHERE trigger_id IN ({})",
      placeholders(trigger_ids.len())
    );
    let changed = self
      .tx
      .execute(&sql, params_from_iter(params.iter()))
      .map_err(db)?;
    if changed != trigger_ids.len() {
      return Err(DatastoreError::UpdateFailed("triggers"));
    }
    Ok(())
  }

  // ── Hard deletion ─────────────────────────────────────────────────────
  //
  // Unlike the status updates above, deletes tolerate ids with no matching
  // row: the sweep may name rows a stale attributed-trigger list still
  // references, or rows an earlier cascade already removed.

  fn delete_sources(&mut self, source_ids: &[Uuid]) -> Result<()> {
    if source_ids.is_empty() {
      return Ok(());
    }
    let params: Vec<String> =
      source_ids.iter().copied().map(encode_uuid).collect();
    let sql = format!(
      "DELETE FROM sources WHERE source_id IN ({})",
      placeholders(source_ids.len())
    );
    self
      .tx
      .execute(&sql, params_from_iter(params.iter()))
      .map_err(db)?;
    Ok(())
  }

  fn delete_triggers(&mut self, trigger_ids: &HashSet<Uuid>) -> Result<()> {
    if trigger_ids.is_empty() {
      return Ok(());
    }
    let params: Vec<String> =
      trigger_ids.iter().copied().map(encode_uuid).collect();
    let sql = format!(
      "DELETE FROM triggers WHERE trigger_id IN ({})",
      placeholders(trigger_ids.len())
    );
    self
      .tx
      .execute(&sql, params_from_iter(params.iter()))
      .map_err(db)?;
    Ok(())
  }

  fn delete_async_registrations(
    &mut self,
    registration_ids: &[Uuid],
  ) -> Result<()> {
    if registration_ids.is_empty() {
      return Ok(());
    }
    let params: Vec<String> =
      registration_ids.iter().copied().map(encode_uuid).collect();
    let sql = format!(
      "DELETE FROM async_registrations WHERE registration_id IN ({})",
      placeholders(registration_ids.len())
    );
    self
      .tx
      .execute(&sql, params_from_iter(params.iter()))
      .map_err(db)?;
    Ok(())
  }
}
