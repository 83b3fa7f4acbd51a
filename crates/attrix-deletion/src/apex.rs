//! Installed-module version probing.
//!
//! Each installed OS module ships an `apex_manifest.json` carrying its
//! name and version code. The probe scans a modules directory for the one
//! module whose name ends with a known suffix; module names are unique,
//! so the first match is the only match.

use std::{fs, path::Path};

use serde::Deserialize;
use tracing::warn;

/// Module-name suffix of the measurement extension module.
pub const MEASUREMENT_MODULE_SUFFIX: &str = ".ext.adservices";

#[derive(Debug, Deserialize)]
struct ApexManifest {
  name:    String,
  version: u64,
}

/// Version of the installed module whose name ends with `name_suffix`,
/// or `None` when no such module is installed.
pub fn current_module_version(
  modules_dir: impl AsRef<Path>,
  name_suffix: &str,
) -> Option<u64> {
  let entries = match fs::read_dir(modules_dir.as_ref()) {
    Ok(entries) => entries,
    Err(err) => {
      warn!(dir = %modules_dir.as_ref().display(), %err, "cannot scan modules directory");
      return None;
    }
  };

  for entry in entries.flatten() {
    let manifest_path = entry.path().join("apex_manifest.json");
    let Ok(raw) = fs::read_to_string(&manifest_path) else {
      continue;
    };
    match serde_json::from_str::<ApexManifest>(&raw) {
      Ok(manifest) if manifest.name.ends_with(name_suffix) => {
        return Some(manifest.version);
      }
      Ok(_) => {}
      Err(err) => {
        warn!(path = %manifest_path.display(), %err, "malformed module manifest");
      }
    }
  }
  None
}
