//! [`SqliteDatastore`] — the SQLite implementation of [`Datastore`].

use std::path::Path;

use attrix_core::{
  dao::{Datastore, MeasurementDao},
  DatastoreError,
};

use crate::{dao::SqliteDao, error, schema::SCHEMA};

/// A measurement datastore backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteDatastore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteDatastore {
  /// Open (or create) a datastore at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self, DatastoreError> {
    let conn = tokio_rusqlite::Connection::open(path)
      .await
      .map_err(error::conn)?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory datastore — useful for testing.
  pub async fn open_in_memory() -> Result<Self, DatastoreError> {
    let conn = tokio_rusqlite::Connection::open_in_memory()
      .await
      .map_err(error::conn)?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<(), DatastoreError> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await
      .map_err(error::conn)
  }
}

impl Datastore for SqliteDatastore {
  fn run_in_transaction<T, F>(
    &self,
    work: F,
  ) -> impl Future<Output = Result<T, DatastoreError>> + Send
  where
    T: Send + 'static,
    F: FnOnce(&mut dyn MeasurementDao) -> Result<T, DatastoreError>
      + Send
      + 'static,
  {
    let conn = self.conn.clone();
    async move {
      conn
        .call(move |conn| {
          let tx = match conn.transaction() {
            Ok(tx) => tx,
            Err(e) => return Ok(Err(error::db(e))),
          };
          let mut dao = SqliteDao::new(tx);
          match work(&mut dao) {
            // Commit only after the whole unit of work succeeded.
            Ok(value) => Ok(dao.commit().map(|()| value)),
            // Dropping the transaction rolls it back.
            Err(e) => Ok(Err(e)),
          }
        })
        .await
        .map_err(error::conn)?
    }
  }
}
