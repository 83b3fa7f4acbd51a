//! Source — an attribution registration event awaiting trigger matching.
//!
//! A source owns the budget and deduplication state that reports consume:
//! the aggregate-contribution counter, the event/aggregate dedup-key lists,
//! and (in flexible event reporting) the serialized attributed-trigger list.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Result;

// ─── Status ──────────────────────────────────────────────────────────────────

/// Lifecycle status of a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
  Active,
  Ignored,
  /// Soft-deleted: excluded from attribution but physically retained.
  MarkedToDelete,
}

// ─── Attributed triggers ─────────────────────────────────────────────────────

/// One entry of a source's attributed-trigger list (flexible event
/// reporting). Numeric values are serialized as decimal strings, matching
/// the stored column format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributedTrigger {
  pub trigger_id:   Uuid,
  #[serde(with = "u64_string")]
  pub trigger_data: u64,
  #[serde(
    with = "opt_u64_string",
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub dedup_key:    Option<u64>,
}

/// Decode an attributed-trigger list from its stored JSON form.
///
/// The column is opaque to the store; this is the single typed boundary.
/// Callers decide whether a parse failure is fatal — the deletion engine
/// treats it as a logged skip.
pub fn parse_attributed_triggers(raw: &str) -> Result<Vec<AttributedTrigger>> {
  Ok(serde_json::from_str(raw)?)
}

/// Encode an attributed-trigger list to its stored JSON form.
pub fn serialize_attributed_triggers(
  triggers: &[AttributedTrigger],
) -> Result<String> {
  Ok(serde_json::to_string(triggers)?)
}

// ─── Source ──────────────────────────────────────────────────────────────────

/// An attribution registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
  pub id:                          Uuid,
  /// Registrant URI, e.g. `android-app://com.example.app`.
  pub registrant:                  String,
  /// The site the source was registered on; matched by deletion filters.
  pub publisher:                   String,
  pub event_time:                  DateTime<Utc>,
  pub status:                      SourceStatus,
  /// Consumed aggregate-contribution budget. Never negative; resets clamp
  /// at zero.
  pub aggregate_contributions:     u32,
  /// Dedup keys of event reports already generated for this source.
  pub event_report_dedup_keys:     Vec<u64>,
  /// Dedup keys of aggregate reports already generated for this source.
  pub aggregate_report_dedup_keys: Vec<u64>,
  /// Serialized attributed-trigger list; `None` when the source has never
  /// been attributed in flexible mode. Opaque to the store — decode with
  /// [`parse_attributed_triggers`].
  pub attribution_status:          Option<String>,
  /// Opaque flexible-reporting trigger specification. Presence marks the
  /// source as a flex source.
  pub trigger_specs:               Option<String>,
}

impl Source {
  /// Remove one occurrence of `key` from the event-report dedup list.
  /// Removing an absent key is a no-op.
  pub fn remove_event_report_dedup_key(&mut self, key: u64) {
    if let Some(pos) = self.event_report_dedup_keys.iter().position(|k| *k == key)
    {
      self.event_report_dedup_keys.remove(pos);
    }
  }

  /// Remove one occurrence of `key` from the aggregate-report dedup list.
  /// Removing an absent key is a no-op.
  pub fn remove_aggregate_report_dedup_key(&mut self, key: u64) {
    if let Some(pos) =
      self.aggregate_report_dedup_keys.iter().position(|k| *k == key)
    {
      self.aggregate_report_dedup_keys.remove(pos);
    }
  }

}

// ─── String-encoded integers ─────────────────────────────────────────────────

mod u64_string {
  use serde::{Deserialize as _, Deserializer, Serializer, de::Error as _};

  pub fn serialize<S: Serializer>(value: &u64, ser: S) -> Result<S::Ok, S::Error> {
    ser.serialize_str(&value.to_string())
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<u64, D::Error> {
    let raw = String::deserialize(de)?;
    raw.parse().map_err(D::Error::custom)
  }
}

mod opt_u64_string {
  use serde::{Deserialize as _, Deserializer, Serializer, de::Error as _};

  pub fn serialize<S: Serializer>(
    value: &Option<u64>,
    ser: S,
  ) -> Result<S::Ok, S::Error> {
    match value {
      Some(v) => ser.serialize_str(&v.to_string()),
      None => ser.serialize_none(),
    }
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(
    de: D,
  ) -> Result<Option<u64>, D::Error> {
    Option::<String>::deserialize(de)?
      .map(|raw| raw.parse().map_err(D::Error::custom))
      .transpose()
  }
}
