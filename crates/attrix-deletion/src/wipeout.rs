//! Wipeout audit logging.

use attrix_core::deletion::WipeoutStatus;
use tracing::info;

/// Sink for wipeout audit records. Fire-and-forget: emission happens
/// after the deletion transaction committed and never affects its
/// outcome.
pub trait WipeoutLogger: Send + Sync {
  fn log_wipeout(&self, status: &WipeoutStatus);
}

/// Emits wipeout records to the tracing pipeline.
pub struct TracingWipeoutLogger;

impl WipeoutLogger for TracingWipeoutLogger {
  fn log_wipeout(&self, status: &WipeoutStatus) {
    info!(
      wipeout_type = ?status.wipeout_type,
      app = %status.app_package_name,
      "measurement wipeout"
    );
  }
}
