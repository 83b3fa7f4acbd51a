//! Trigger — a conversion event matched against sources.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerStatus {
  Pending,
  Ignored,
  Attributed,
  /// Soft-deleted: excluded from attribution but physically retained.
  MarkedToDelete,
}

/// An attribution completion event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trigger {
  pub id:                      Uuid,
  /// Registrant URI, e.g. `android-app://com.example.app`.
  pub registrant:              String,
  /// The site the conversion happened on; matched by deletion filters.
  pub attribution_destination: String,
  pub trigger_time:            DateTime<Utc>,
  pub status:                  TriggerStatus,
}
