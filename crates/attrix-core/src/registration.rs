//! Pending registration fetches not yet resolved into a source or trigger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A queued registration. Has no soft-delete state: deletion requests
/// always remove matching rows outright, in every deletion mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsyncRegistration {
  pub id:           Uuid,
  /// Registrant URI, e.g. `android-app://com.example.app`.
  pub registrant:   String,
  /// The site the registration request came from; matched by deletion
  /// filters.
  pub top_origin:   String,
  pub request_time: DateTime<Utc>,
}
