use super::KeyValueStore;
use crate::error::{LicenseError, LicenseResult};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Key-value store backed by a SQLite table.
///
/// Suits installations that already keep their application data in SQLite;
/// the table can live in the same database file.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Opens (or creates) a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> LicenseResult<Self> {
        let conn = Connection::open(path.as_ref()).map_err(|e| {
            LicenseError::Storage(format!("failed to open license database: {e}"))
        })?;
        Self::with_connection(conn)
    }

    /// Opens an in-memory store (for testing).
    pub fn open_in_memory() -> LicenseResult<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            LicenseError::Storage(format!("failed to open in-memory license database: {e}"))
        })?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> LicenseResult<Self> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS license_kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            ",
        )
        .map_err(|e| LicenseError::Storage(format!("failed to init license schema: {e}")))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> LicenseResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| LicenseError::Storage("license database lock poisoned".to_string()))
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> LicenseResult<Option<String>> {
        let conn = self.conn()?;
        let value = conn
            .query_row(
                "SELECT value FROM license_kv WHERE key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> LicenseResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO license_kv (key, value, updated_at) VALUES (?1, ?2, ?3)",
            params![key, value, chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> LicenseResult<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM license_kv WHERE key = ?1", params![key])?;
        Ok(())
    }
}
