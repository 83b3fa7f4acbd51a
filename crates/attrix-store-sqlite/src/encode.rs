//! Encoding and decoding helpers between Rust domain types and the
//! plain-text representations stored in SQLite columns.
//!
//! All timestamps are stored as RFC 3339 strings. Dedup keys are 64-bit
//! unsigned values and would not survive SQLite's signed INTEGER affinity,
//! so they are stored as decimal strings (JSON lists of decimal strings
//! for the per-source lists). UUIDs are stored as hyphenated lowercase
//! strings.

use attrix_core::{
  registration::AsyncRegistration,
  report::{
    AggregateReport, AggregateReportStatus, EventReport, EventReportStatus,
    HistogramContribution,
  },
  source::{Source, SourceStatus},
  trigger::{Trigger, TriggerStatus},
  DatastoreError, Result,
};
use chrono::{DateTime, Utc};
use uuid::Uuid;

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> {
  Uuid::parse_str(s).map_err(DatastoreError::backend)
}

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(DatastoreError::backend)
}

// ─── Statuses ────────────────────────────────────────────────────────────────

pub fn encode_source_status(s: SourceStatus) -> &'static str {
  match s {
    SourceStatus::Active => "active",
    SourceStatus::Ignored => "ignored",
    SourceStatus::MarkedToDelete => "marked_to_delete",
  }
}

pub fn decode_source_status(s: &str) -> Result<SourceStatus> {
  match s {
    "active" => Ok(SourceStatus::Active),
    "ignored" => Ok(SourceStatus::Ignored),
    "marked_to_delete" => Ok(SourceStatus::MarkedToDelete),
    other => Err(DatastoreError::Backend(
      format!("unknown source status: {other:?}").into(),
    )),
  }
}

pub fn encode_trigger_status(s: TriggerStatus) -> &'static str {
  match s {
    TriggerStatus::Pending => "pending",
    TriggerStatus::Ignored => "ignored",
    TriggerStatus::Attributed => "attributed",
    TriggerStatus::MarkedToDelete => "marked_to_delete",
  }
}

pub fn decode_trigger_status(s: &str) -> Result<TriggerStatus> {
  match s {
    "pending" => Ok(TriggerStatus::Pending),
    "ignored" => Ok(TriggerStatus::Ignored),
    "attributed" => Ok(TriggerStatus::Attributed),
    "marked_to_delete" => Ok(TriggerStatus::MarkedToDelete),
    other => Err(DatastoreError::Backend(
      format!("unknown trigger status: {other:?}").into(),
    )),
  }
}

pub fn encode_event_report_status(s: EventReportStatus) -> &'static str {
  match s {
    EventReportStatus::Pending => "pending",
    EventReportStatus::Delivered => "delivered",
    EventReportStatus::MarkedToDelete => "marked_to_delete",
  }
}

pub fn decode_event_report_status(s: &str) -> Result<EventReportStatus> {
  match s {
    "pending" => Ok(EventReportStatus::Pending),
    "delivered" => Ok(EventReportStatus::Delivered),
    "marked_to_delete" => Ok(EventReportStatus::MarkedToDelete),
    other => Err(DatastoreError::Backend(
      format!("unknown event report status: {other:?}").into(),
    )),
  }
}

pub fn encode_aggregate_report_status(s: AggregateReportStatus) -> &'static str {
  match s {
    AggregateReportStatus::Pending => "pending",
    AggregateReportStatus::Delivered => "delivered",
    AggregateReportStatus::MarkedToDelete => "marked_to_delete",
  }
}

pub fn decode_aggregate_report_status(s: &str) -> Result<AggregateReportStatus> {
  match s {
    "pending" => Ok(AggregateReportStatus::Pending),
    "delivered" => Ok(AggregateReportStatus::Delivered),
    "marked_to_delete" => Ok(AggregateReportStatus::MarkedToDelete),
    other => Err(DatastoreError::Backend(
      format!("unknown aggregate report status: {other:?}").into(),
    )),
  }
}

// ─── Dedup keys ──────────────────────────────────────────────────────────────

pub fn encode_u64_list(keys: &[u64]) -> Result<String> {
  let strings: Vec<String> = keys.iter().map(u64::to_string).collect();
  Ok(serde_json::to_string(&strings)?)
}

pub fn decode_u64_list(s: &str) -> Result<Vec<u64>> {
  let strings: Vec<String> = serde_json::from_str(s)?;
  strings
    .iter()
    .map(|v| v.parse::<u64>().map_err(DatastoreError::backend))
    .collect()
}

pub fn encode_opt_u64(key: Option<u64>) -> Option<String> {
  key.map(|k| k.to_string())
}

pub fn decode_opt_u64(s: Option<&str>) -> Result<Option<u64>> {
  s.map(|v| v.parse::<u64>().map_err(DatastoreError::backend))
    .transpose()
}

// ─── Histogram contributions ─────────────────────────────────────────────────

pub fn encode_contributions(cs: &[HistogramContribution]) -> Result<String> {
  Ok(serde_json::to_string(cs)?)
}

pub fn decode_contributions(s: &str) -> Result<Vec<HistogramContribution>> {
  Ok(serde_json::from_str(s)?)
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read directly from a `sources` row.
pub struct RawSource {
  pub source_id:                   String,
  pub registrant:                  String,
  pub publisher:                   String,
  pub event_time:                  String,
  pub status:                      String,
  pub aggregate_contributions:     u32,
  pub event_report_dedup_keys:     String,
  pub aggregate_report_dedup_keys: String,
  pub attribution_status:          Option<String>,
  pub trigger_specs:               Option<String>,
}

impl RawSource {
  pub fn into_source(self) -> Result<Source> {
    Ok(Source {
      id: decode_uuid(&self.source_id)?,
      registrant: self.registrant,
      publisher: self.publisher,
      event_time: decode_dt(&self.event_time)?,
      status: decode_source_status(&self.status)?,
      aggregate_contributions: self.aggregate_contributions,
      event_report_dedup_keys: decode_u64_list(&self.event_report_dedup_keys)?,
      aggregate_report_dedup_keys: decode_u64_list(
        &self.aggregate_report_dedup_keys,
      )?,
      attribution_status: self.attribution_status,
      trigger_specs: self.trigger_specs,
    })
  }
}

/// Raw strings read directly from a `triggers` row.
pub struct RawTrigger {
  pub trigger_id:              String,
  pub registrant:              String,
  pub attribution_destination: String,
  pub trigger_time:            String,
  pub status:                  String,
}

impl RawTrigger {
  pub fn into_trigger(self) -> Result<Trigger> {
    Ok(Trigger {
      id: decode_uuid(&self.trigger_id)?,
      registrant: self.registrant,
      attribution_destination: self.attribution_destination,
      trigger_time: decode_dt(&self.trigger_time)?,
      status: decode_trigger_status(&self.status)?,
    })
  }
}

/// Raw strings read directly from an `event_reports` row.
pub struct RawEventReport {
  pub report_id:         String,
  pub source_id:         Option<String>,
  pub trigger_id:        String,
  pub trigger_dedup_key: Option<String>,
  pub report_time:       String,
  pub status:            String,
}

impl RawEventReport {
  pub fn into_report(self) -> Result<EventReport> {
    Ok(EventReport {
      id:                decode_uuid(&self.report_id)?,
      source_id:         self
        .source_id
        .as_deref()
        .map(decode_uuid)
        .transpose()?,
      trigger_id:        decode_uuid(&self.trigger_id)?,
      trigger_dedup_key: decode_opt_u64(self.trigger_dedup_key.as_deref())?,
      report_time:       decode_dt(&self.report_time)?,
      status:            decode_event_report_status(&self.status)?,
    })
  }
}

/// Raw strings read directly from an `aggregate_reports` row.
pub struct RawAggregateReport {
  pub report_id:             String,
  pub source_id:             Option<String>,
  pub trigger_id:            String,
  pub contributions:         String,
  pub dedup_key:             Option<String>,
  pub scheduled_report_time: String,
  pub status:                String,
}

impl RawAggregateReport {
  pub fn into_report(self) -> Result<AggregateReport> {
    Ok(AggregateReport {
      id:                    decode_uuid(&self.report_id)?,
      source_id:             self
        .source_id
        .as_deref()
        .map(decode_uuid)
        .transpose()?,
      trigger_id:            decode_uuid(&self.trigger_id)?,
      contributions:         decode_contributions(&self.contributions)?,
      dedup_key:             decode_opt_u64(self.dedup_key.as_deref())?,
      scheduled_report_time: decode_dt(&self.scheduled_report_time)?,
      status:                decode_aggregate_report_status(&self.status)?,
    })
  }
}

/// Encoded column values for an `async_registrations` insert.
pub fn encode_registration(r: &AsyncRegistration) -> (String, String, String, String) {
  (
    encode_uuid(r.id),
    r.registrant.clone(),
    r.top_origin.clone(),
    encode_dt(r.request_time),
  )
}
