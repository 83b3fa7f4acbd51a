//! Derived report records — the artifacts attribution produces from a
//! matched (source, trigger) pair.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Event reports ───────────────────────────────────────────────────────────

/// Delivery status of an event report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventReportStatus {
  Pending,
  Delivered,
  MarkedToDelete,
}

/// A scheduled event-level report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventReport {
  pub id:                Uuid,
  /// The attributed source. Nullable: the source row may already be gone
  /// while the report is still pending delivery.
  pub source_id:         Option<Uuid>,
  pub trigger_id:        Uuid,
  /// Mirrors an entry in the source's event-report dedup list.
  pub trigger_dedup_key: Option<u64>,
  pub report_time:       DateTime<Utc>,
  pub status:            EventReportStatus,
}

// ─── Aggregate reports ───────────────────────────────────────────────────────

/// One histogram bucket contribution carried by an aggregate report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistogramContribution {
  /// Bucket key, a decimal big-integer string.
  pub key:   String,
  pub value: u32,
}

/// Delivery status of an aggregate report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateReportStatus {
  Pending,
  Delivered,
  MarkedToDelete,
}

/// A scheduled aggregatable report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateReport {
  pub id:                    Uuid,
  /// The attributed source. Nullable for the same reason as on
  /// [`EventReport`].
  pub source_id:             Option<Uuid>,
  pub trigger_id:            Uuid,
  pub contributions:         Vec<HistogramContribution>,
  /// Mirrors an entry in the source's aggregate-report dedup list.
  pub dedup_key:             Option<u64>,
  pub scheduled_report_time: DateTime<Utc>,
  pub status:                AggregateReportStatus,
}

impl AggregateReport {
  /// Total budget this report consumed from its source.
  pub fn contribution_sum(&self) -> u64 {
    self.contributions.iter().map(|c| u64::from(c.value)).sum()
  }
}
