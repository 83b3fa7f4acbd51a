//! Deletion request envelope and wipeout audit types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// URI scheme used to express an app registrant.
pub const APP_SCHEME: &str = "android-app";

// ─── Request ─────────────────────────────────────────────────────────────────

/// How the origin/domain filters select rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchBehavior {
  /// Delete rows whose site matches the filters. Empty filters match
  /// nothing.
  Delete,
  /// Delete rows whose site does NOT match the filters. Empty filters
  /// match everything.
  Preserve,
}

/// What deletion does to matched rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletionMode {
  /// Hard-delete sources and triggers; reports follow by referential
  /// cascade.
  All,
  /// Keep every row but flip it to `MarkedToDelete`; only async
  /// registrations are physically removed.
  ExcludeInternalData,
}

/// A deletion request: registrant, inclusive time range, site filters,
/// match behavior and mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletionParam {
  pub app_package_name: String,
  pub start:            DateTime<Utc>,
  pub end:              DateTime<Utc>,
  /// Exact origin URIs to match, e.g. `https://ads.example.com`.
  pub origin_uris:      Vec<String>,
  /// Domain URIs matched with their subdomains, e.g.
  /// `https://example.com` also matches `https://sub.example.com`.
  pub domain_uris:      Vec<String>,
  pub match_behavior:   MatchBehavior,
  pub deletion_mode:    DeletionMode,
}

impl DeletionParam {
  /// The registrant URI the store matches against, derived from the
  /// requesting app's package name.
  pub fn registrant_uri(&self) -> String {
    format!("{APP_SCHEME}://{}", self.app_package_name)
  }
}

// ─── Wipeout audit ───────────────────────────────────────────────────────────

/// Why a bulk wipeout happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WipeoutType {
  /// The deletion API was invoked by an app.
  DeletionApi,
  ConsentRevoked,
  /// A previously recorded deletion was redone after an OS module
  /// rollback.
  RollbackReconciliation,
}

/// Audit record emitted once per wipeout, outside the deletion
/// transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WipeoutStatus {
  pub wipeout_type:     WipeoutType,
  pub app_package_name: String,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn registrant_uri_uses_app_scheme() {
    let param = DeletionParam {
      app_package_name: "com.example.app".into(),
      start:            Utc::now(),
      end:              Utc::now(),
      origin_uris:      vec![],
      domain_uris:      vec![],
      match_behavior:   MatchBehavior::Delete,
      deletion_mode:    DeletionMode::All,
    };
    assert_eq!(param.registrant_uri(), "android-app://com.example.app");
  }
}
