//! SQLite store
//!
//! One connection behind a mutex; every call runs on the blocking pool so
//! the async runtime never waits on disk. Uniqueness is enforced by the
//! primary key, and a constraint violation on insert is reported as
//! [`StoreError::Duplicate`]. Listing follows rowid, which is insertion
//! order.

use crate::{new_record_id, validate_name, Store, StoreError, StoreResult, StoredRecord};
use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS records (
    name TEXT PRIMARY KEY NOT NULL,
    id   TEXT NOT NULL UNIQUE
);
";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct SqliteStore {
    conn: Arc<Mutex<Option<Connection>>>,
    path: Option<PathBuf>,
}

impl SqliteStore {
    /// Open (creating if needed) the database file at `path`
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .map_err(|e| StoreError::unavailable_with_source("open", e))?;
        let store = Self::initialize(conn, Some(path.to_path_buf()))?;
        info!(path = %path.display(), "SQLite store opened");
        Ok(store)
    }

    /// Private database that disappears with the store
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StoreError::unavailable_with_source("open", e))?;
        let store = Self::initialize(conn, None)?;
        info!("In-memory SQLite store opened");
        Ok(store)
    }

    fn initialize(conn: Connection, path: Option<PathBuf>) -> StoreResult<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(|e| StoreError::unavailable_with_source("open", e))?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| StoreError::unavailable_with_source("open", e))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(Some(conn))),
            path,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run `f` against the connection on the blocking pool
    async fn with_connection<T, F>(&self, operation: &'static str, f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> StoreResult<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock();
            let conn = guard.as_ref().ok_or_else(|| StoreError::closed(operation))?;
            f(conn)
        })
        .await
        .map_err(|e| StoreError::unavailable_with_source(operation, e))?
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn list(&self) -> StoreResult<Vec<StoredRecord>> {
        self.with_connection("list", |conn| {
            let mut stmt = conn
                .prepare_cached("SELECT id, name FROM records ORDER BY rowid")
                .map_err(|e| StoreError::unavailable_with_source("list", e))?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(StoredRecord {
                        id: row.get(0)?,
                        name: row.get(1)?,
                    })
                })
                .map_err(|e| StoreError::unavailable_with_source("list", e))?;
            let records = rows
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| StoreError::unavailable_with_source("list", e))?;
            Ok(records)
        })
        .await
    }

    async fn create(&self, name: &str) -> StoreResult<StoredRecord> {
        validate_name(name)?;
        let record = StoredRecord {
            id: new_record_id(),
            name: name.to_string(),
        };

        self.with_connection("create", move |conn| {
            let inserted = conn.execute(
                "INSERT INTO records (name, id) VALUES (?1, ?2)",
                params![record.name, record.id],
            );
            match inserted {
                Ok(_) => {
                    debug!(name = %record.name, id = %record.id, "Record created");
                    Ok(record)
                }
                Err(rusqlite::Error::SqliteFailure(err, _))
                    if err.code == ErrorCode::ConstraintViolation =>
                {
                    Err(StoreError::Duplicate { name: record.name })
                }
                Err(e) => Err(StoreError::unavailable_with_source("create", e)),
            }
        })
        .await
    }

    async fn get_by_name(&self, name: &str) -> StoreResult<Option<StoredRecord>> {
        let name = name.to_string();
        self.with_connection("get_by_name", move |conn| {
            conn.query_row(
                "SELECT id, name FROM records WHERE name = ?1 LIMIT 1",
                params![name],
                |row| {
                    Ok(StoredRecord {
                        id: row.get(0)?,
                        name: row.get(1)?,
                    })
                },
            )
            .optional()
            .map_err(|e| StoreError::unavailable_with_source("get_by_name", e))
        })
        .await
    }

    async fn ping(&self) -> StoreResult<()> {
        self.with_connection("ping", |conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                .map(|_| ())
                .map_err(|e| StoreError::unavailable_with_source("ping", e))
        })
        .await
    }

    async fn close(&self) -> StoreResult<()> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let taken = conn.lock().take();
            match taken {
                Some(conn) => conn
                    .close()
                    .map_err(|(_, e)| StoreError::unavailable_with_source("close", e)),
                None => Ok(()),
            }
        })
        .await
        .map_err(|e| StoreError::unavailable_with_source("close", e))??;
        info!("SQLite store closed");
        Ok(())
    }
}
