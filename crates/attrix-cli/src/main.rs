//! attrix command-line front end.
//!
//! Reads `config.toml` (or the path specified with `--config`), opens the
//! measurement store, and drives the deletion engine: `delete` runs one
//! deletion request, `rollback-check` reports whether a recorded deletion
//! was undone by a module rollback.

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use attrix_core::{
  deletion::{DeletionMode, DeletionParam, MatchBehavior},
  rollback::DeletionReason,
};
use attrix_deletion::{
  apex::{current_module_version, MEASUREMENT_MODULE_SUFFIX},
  deleter::{DeleterConfig, MeasurementDataDeleter},
  reconcile::RollbackReconciliationManager,
  wipeout::TracingWipeoutLogger,
};
use attrix_store_sqlite::{SqliteDatastore, SqliteRollbackWorker};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "attrix measurement deletion engine")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Delete (or quarantine) the attribution state an app registered.
  Delete {
    /// Package name of the requesting app.
    #[arg(long)]
    package: String,

    /// Inclusive start of the time range, RFC 3339.
    #[arg(long)]
    start: String,

    /// Inclusive end of the time range, RFC 3339.
    #[arg(long)]
    end: String,

    /// Origin URI to match exactly; repeatable.
    #[arg(long = "origin")]
    origins: Vec<String>,

    /// Domain URI to match with its subdomains; repeatable.
    #[arg(long = "domain")]
    domains: Vec<String>,

    /// Delete everything EXCEPT the filtered sites instead of only them.
    #[arg(long)]
    preserve: bool,

    /// Mark rows instead of removing them.
    #[arg(long)]
    exclude_internal_data: bool,
  },

  /// Report whether a recorded deletion needs to be redone after a
  /// module rollback. Clears the record when it does.
  RollbackCheck,
}

/// Settings read from config.toml and the `ATTRIX_*` environment.
#[derive(Debug, Clone, Deserialize)]
struct Settings {
  /// Measurement database path.
  #[serde(default = "default_store_path")]
  store_path:               PathBuf,
  /// Sidecar database holding rollback records.
  #[serde(default = "default_rollback_path")]
  rollback_store_path:      PathBuf,
  /// Directory scanned for installed module manifests.
  #[serde(default = "default_modules_dir")]
  modules_dir:              PathBuf,
  #[serde(default)]
  flexible_event_reporting: bool,
  #[serde(default)]
  aligned_dedup:            bool,
}

fn default_store_path() -> PathBuf { PathBuf::from("attrix.db") }
fn default_rollback_path() -> PathBuf { PathBuf::from("attrix-rollback.db") }
fn default_modules_dir() -> PathBuf { PathBuf::from("/apex") }

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("ATTRIX"))
    .build()
    .context("failed to read config file")?;
  let settings: Settings = settings
    .try_deserialize()
    .context("failed to deserialise settings")?;

  let module_version =
    current_module_version(&settings.modules_dir, MEASUREMENT_MODULE_SUFFIX);
  let worker = SqliteRollbackWorker::open(&settings.rollback_store_path)
    .await
    .with_context(|| {
      format!(
        "failed to open rollback store at {:?}",
        settings.rollback_store_path
      )
    })?;
  let reconciliation = RollbackReconciliationManager::new(
    worker,
    DeletionReason::MeasurementDeletion,
    module_version,
  );

  match cli.command {
    Command::Delete {
      package,
      start,
      end,
      origins,
      domains,
      preserve,
      exclude_internal_data,
    } => {
      let store = SqliteDatastore::open(&settings.store_path)
        .await
        .with_context(|| {
          format!("failed to open store at {:?}", settings.store_path)
        })?;

      let param = DeletionParam {
        app_package_name: package,
        start:            parse_time(&start)?,
        end:              parse_time(&end)?,
        origin_uris:      origins,
        domain_uris:      domains,
        match_behavior:   if preserve {
          MatchBehavior::Preserve
        } else {
          MatchBehavior::Delete
        },
        deletion_mode:    if exclude_internal_data {
          DeletionMode::ExcludeInternalData
        } else {
          DeletionMode::All
        },
      };

      let deleter = MeasurementDataDeleter::new(
        store,
        DeleterConfig {
          flexible_event_reporting: settings.flexible_event_reporting,
          aligned_dedup:            settings.aligned_dedup,
        },
        Arc::new(TracingWipeoutLogger),
      );
      deleter.delete(param).await.context("deletion failed")?;

      // Best-effort bookkeeping so the deletion survives a rollback.
      reconciliation.record_deletion_occurred().await;
      println!("deletion committed");
    }

    Command::RollbackCheck => {
      if reconciliation.needs_reconciliation().await {
        println!("reconciliation needed: a recorded deletion was rolled back");
      } else {
        println!("nothing to reconcile");
      }
    }
  }

  Ok(())
}

/// Parse an RFC 3339 timestamp from the command line.
fn parse_time(raw: &str) -> anyhow::Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(raw)
    .map(|dt| dt.with_timezone(&Utc))
    .with_context(|| format!("invalid RFC 3339 timestamp: {raw:?}"))
}
