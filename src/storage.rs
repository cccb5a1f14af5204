//! Persistent key-value storage.
//!
//! Values are JSON strings keyed by name. Each value is capped at a size
//! quota, and going over it fails the write. The SQLite store stamps every
//! write with a revision and the writer's instance id, so that other
//! instances sharing the file can notice the change and reload.

use crate::events::{AppEvent, EventBus};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension, Result as SqlResult};
use std::collections::HashMap;
use std::path::Path;
#[cfg(test)]
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;

pub const FAVORITES_KEY: &str = "favoriteMemes";
pub const UPLOADED_IMAGE_KEY: &str = "uploadedImage";

/// Per-value budget, matching the usual browser per-origin storage limit.
pub const DEFAULT_QUOTA_BYTES: usize = 5 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("value for '{key}' is {size} bytes, over the {limit} byte storage quota")]
    QuotaExceeded {
        key: String,
        size: usize,
        limit: usize,
    },
    #[error("storage backend error: {0}")]
    Backend(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<rusqlite::Error> for StorageError {
    fn from(error: rusqlite::Error) -> Self {
        StorageError::Backend(error.to_string())
    }
}

impl From<r2d2::Error> for StorageError {
    fn from(error: r2d2::Error) -> Self {
        StorageError::Backend(error.to_string())
    }
}

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

fn check_quota(key: &str, value: &str, limit: usize) -> Result<(), StorageError> {
    if value.len() > limit {
        return Err(StorageError::QuotaExceeded {
            key: key.to_string(),
            size: value.len(),
            limit,
        });
    }
    Ok(())
}

// ────────────────────────── SQLite ──────────────────────────

const SQLITE_POOL_SIZE: u32 = 4;

fn apply_connection_pragmas(conn: &Connection) -> SqlResult<()> {
    conn.execute_batch(
        "PRAGMA journal_mode=WAL;
         PRAGMA synchronous=NORMAL;
         PRAGMA temp_store=MEMORY;
         PRAGMA busy_timeout=5000;",
    )?;
    Ok(())
}

/// SQLite-backed store shared by every process that opens the same file.
#[derive(Clone)]
pub struct SqliteStore {
    pool: Pool<SqliteConnectionManager>,
    instance_id: String,
    quota_bytes: usize,
}

impl SqliteStore {
    pub fn open(db_path: &Path, quota_bytes: usize) -> Result<Self, StorageError> {
        let manager =
            SqliteConnectionManager::file(db_path).with_init(|conn| apply_connection_pragmas(conn));
        let pool = Pool::builder().max_size(SQLITE_POOL_SIZE).build(manager)?;

        let store = SqliteStore {
            pool,
            instance_id: uuid::Uuid::new_v4().to_string(),
            quota_bytes,
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StorageError> {
        let conn = self.pool.get()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv_store (
                key TEXT PRIMARY KEY NOT NULL,
                value TEXT NOT NULL,
                revision INTEGER NOT NULL DEFAULT 1,
                writer TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );",
        )?;
        Ok(())
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Current stamp of every stored key.
    fn revisions(&self) -> Result<HashMap<String, RowStamp>, StorageError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare("SELECT key, revision, updated_at, writer FROM kv_store")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                RowStamp {
                    revision: row.get(1)?,
                    updated_at: row.get(2)?,
                    writer: row.get(3)?,
                },
            ))
        })?;

        let mut revisions = HashMap::new();
        for row in rows {
            let (key, revision) = row?;
            revisions.insert(key, revision);
        }
        Ok(revisions)
    }

    /// Polls for keys written or removed by other instances and publishes
    /// [`AppEvent::StorageChanged`] for each one.
    pub fn spawn_change_watcher(
        &self,
        bus: EventBus,
        interval: Duration,
    ) -> tokio::task::JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut known = match store.revisions() {
                Ok(revisions) => revisions,
                Err(error) => {
                    log::warn!("Storage watcher failed initial read: {}", error);
                    HashMap::new()
                }
            };
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let poll_store = store.clone();
                let current = match tokio::task::spawn_blocking(move || poll_store.revisions()).await
                {
                    Ok(Ok(revisions)) => revisions,
                    Ok(Err(error)) => {
                        log::warn!("Storage watcher poll failed: {}", error);
                        continue;
                    }
                    Err(error) => {
                        log::warn!("Storage watcher task failed: {}", error);
                        continue;
                    }
                };

                for key in changed_keys(&known, &current, &store.instance_id) {
                    log::debug!("Detected external change to '{}'", key);
                    bus.publish(AppEvent::StorageChanged { key });
                }
                known = current;
            }
        })
    }
}

/// Revision, write time, and writer of one row as seen by a poll.
#[derive(Debug, Clone, PartialEq, Eq)]
struct RowStamp {
    revision: i64,
    updated_at: i64,
    writer: String,
}

/// Keys rewritten by another writer, or that disappeared.
///
/// A row removed and re-created between polls restarts at revision 1, so the
/// write time is compared as well.
fn changed_keys(
    previous: &HashMap<String, RowStamp>,
    current: &HashMap<String, RowStamp>,
    own_instance: &str,
) -> Vec<String> {
    let mut changed = Vec::new();
    for (key, stamp) in current {
        let moved = previous
            .get(key)
            .map(|old| old.revision != stamp.revision || old.updated_at != stamp.updated_at)
            .unwrap_or(true);
        if moved && stamp.writer != own_instance {
            changed.push(key.clone());
        }
    }
    for key in previous.keys() {
        if !current.contains_key(key) {
            changed.push(key.clone());
        }
    }
    changed.sort();
    changed
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let conn = self.pool.get()?;
        let value = conn
            .query_row(
                "SELECT value FROM kv_store WHERE key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        check_quota(key, value, self.quota_bytes)?;
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO kv_store (key, value, revision, writer, updated_at)
             VALUES (?1, ?2, 1, ?3, ?4)
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                revision = kv_store.revision + 1,
                writer = excluded.writer,
                updated_at = excluded.updated_at",
            params![
                key,
                value,
                self.instance_id,
                chrono::Utc::now().timestamp_millis()
            ],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let conn = self.pool.get()?;
        conn.execute("DELETE FROM kv_store WHERE key = ?1", params![key])?;
        Ok(())
    }
}

// ────────────────────────── In-memory ──────────────────────────

/// Process-local store with the same quota rules as [`SqliteStore`].
#[cfg(test)]
pub(crate) struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
    quota_bytes: usize,
    fail_writes: Mutex<bool>,
}

#[cfg(test)]
impl MemoryStore {
    pub(crate) fn new(quota_bytes: usize) -> Self {
        Self {
            values: Mutex::new(HashMap::new()),
            quota_bytes,
            fail_writes: Mutex::new(false),
        }
    }

    /// Makes every subsequent `set`/`remove` fail with a backend error.
    pub(crate) fn set_fail_writes(&self, fail: bool) {
        if let Ok(mut flag) = self.fail_writes.lock() {
            *flag = fail;
        }
    }

    fn writes_failing(&self) -> bool {
        self.fail_writes.lock().map(|flag| *flag).unwrap_or(true)
    }

    fn lock_values(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, StorageError> {
        self.values
            .lock()
            .map_err(|_| StorageError::Backend("memory store lock poisoned".to_string()))
    }
}

#[cfg(test)]
impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_QUOTA_BYTES)
    }
}

#[cfg(test)]
impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.lock_values()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        if self.writes_failing() {
            return Err(StorageError::Backend("writes disabled".to_string()));
        }
        check_quota(key, value, self.quota_bytes)?;
        self.lock_values()?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        if self.writes_failing() {
            return Err(StorageError::Backend("writes disabled".to_string()));
        }
        self.lock_values()?.remove(key);
        Ok(())
    }
}
