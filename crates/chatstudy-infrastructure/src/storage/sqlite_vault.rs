//! Embedded SQLite key-value vault (identity Tier-2).
//!
//! Lives in its own database file so that clearing the Tier-1 file does not
//! touch it. Calls run on the blocking pool; the connection is guarded by a
//! mutex and never used from two threads at once.

use async_trait::async_trait;
use chatstudy_core::error::{Result, StudyError};
use chatstudy_core::identity::DurableStore;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::{Arc, Mutex};

pub struct SqliteVault {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteVault {
    /// Opens (or creates) the vault at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(sql_error)?;
        Self::with_connection(conn)
    }

    /// Opens a vault that lives only as long as this handle.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(sql_error)?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;

            CREATE TABLE IF NOT EXISTS vault (
              key TEXT PRIMARY KEY,
              value TEXT NOT NULL,
              updated_at TEXT NOT NULL
            );
            "#,
        )
        .map_err(sql_error)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| StudyError::storage("vault connection poisoned"))?;
            f(&guard).map_err(sql_error)
        })
        .await
        .map_err(|e| StudyError::internal(format!("Failed to join task: {}", e)))?
    }
}

fn sql_error(err: rusqlite::Error) -> StudyError {
    StudyError::storage(format!("sqlite: {}", err))
}

#[async_trait]
impl DurableStore for SqliteVault {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT value FROM vault WHERE key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()
        })
        .await
    }

    async fn put(&self, key: &str, value: &str) -> Result<()> {
        let key = key.to_string();
        let value = value.to_string();
        let now = chrono::Utc::now().to_rfc3339();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO vault (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![key, value, now],
            )
            .map(|_| ())
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM vault WHERE key = ?1", params![key])
                .map(|_| ())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_put_get_delete() {
        let vault = SqliteVault::open_in_memory().unwrap();

        assert_eq!(vault.get("id").await.unwrap(), None);
        vault.put("id", "fp_1").await.unwrap();
        vault.put("id", "fp_2").await.unwrap();
        assert_eq!(vault.get("id").await.unwrap().as_deref(), Some("fp_2"));

        vault.delete("id").await.unwrap();
        assert_eq!(vault.get("id").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("vault.sqlite3");

        SqliteVault::open(&path)
            .unwrap()
            .put("id", "rand_abc")
            .await
            .unwrap();

        let reopened = SqliteVault::open(&path).unwrap();
        assert_eq!(reopened.get("id").await.unwrap().as_deref(), Some("rand_abc"));
    }
}
