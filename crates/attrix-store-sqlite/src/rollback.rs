//! [`SqliteRollbackWorker`] — rollback-record persistence in a sidecar
//! SQLite file, kept apart from the measurement database so a measurement
//! wipe cannot take the records with it.

use std::path::Path;

use attrix_core::{
  rollback::{DeletionReason, RollbackRecord, RollbackWorker},
  DatastoreError,
};
use chrono::Utc;
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use crate::{
  encode::{decode_uuid, encode_dt, encode_uuid},
  error,
  schema::ROLLBACK_SCHEMA,
};

/// At most one record is kept per deletion reason; recording again
/// replaces the previous one.
#[derive(Clone)]
pub struct SqliteRollbackWorker {
  conn: tokio_rusqlite::Connection,
}

impl SqliteRollbackWorker {
  /// Open (or create) the sidecar database at `path`.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self, DatastoreError> {
    let conn = tokio_rusqlite::Connection::open(path)
      .await
      .map_err(error::conn)?;
    let worker = Self { conn };
    worker.init_schema().await?;
    Ok(worker)
  }

  /// Open an in-memory worker — useful for testing.
  pub async fn open_in_memory() -> Result<Self, DatastoreError> {
    let conn = tokio_rusqlite::Connection::open_in_memory()
      .await
      .map_err(error::conn)?;
    let worker = Self { conn };
    worker.init_schema().await?;
    Ok(worker)
  }

  async fn init_schema(&self) -> Result<(), DatastoreError> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(ROLLBACK_SCHEMA)?;
        Ok(())
      })
      .await
      .map_err(error::conn)
  }
}

impl RollbackWorker for SqliteRollbackWorker {
  async fn record_deletion(
    &self,
    reason: DeletionReason,
    module_version: u64,
  ) -> Result<(), DatastoreError> {
    let row_id = encode_uuid(Uuid::new_v4());
    let version = module_version.to_string();
    let at = encode_dt(Utc::now());
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO rollback_records (row_id, reason, module_version, recorded_at)
           VALUES (?1, ?2, ?3, ?4)
           ON CONFLICT(reason) DO UPDATE SET
             row_id = excluded.row_id,
             module_version = excluded.module_version,
             recorded_at = excluded.recorded_at",
          rusqlite::params![row_id, reason.as_str(), version, at],
        )?;
        Ok(())
      })
      .await
      .map_err(error::conn)
  }

  async fn stored_record(
    &self,
    reason: DeletionReason,
  ) -> Result<Option<RollbackRecord>, DatastoreError> {
    let raw: Option<(String, String)> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT row_id, module_version FROM rollback_records
               WHERE reason = ?1",
              rusqlite::params![reason.as_str()],
              |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?,
        )
      })
      .await
      .map_err(error::conn)?;

    raw
      .map(|(row_id, version)| {
        Ok(RollbackRecord {
          module_version: version
            .parse::<u64>()
            .map_err(DatastoreError::backend)?,
          row_id:         decode_uuid(&row_id)?,
        })
      })
      .transpose()
  }

  async fn clear_record(
    &self,
    reason: DeletionReason,
    row_id: Uuid,
  ) -> Result<(), DatastoreError> {
    let row_id = encode_uuid(row_id);
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "DELETE FROM rollback_records WHERE reason = ?1 AND row_id = ?2",
          rusqlite::params![reason.as_str(), row_id],
        )?;
        Ok(())
      })
      .await
      .map_err(error::conn)
  }
}
