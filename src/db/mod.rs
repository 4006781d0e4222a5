use std::collections::HashMap;
use std::path::PathBuf;

use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

/// Persisted state keys. All values are JSON strings; see the repository
/// layer in `services::lifecycle` and `services::ingest` for the shapes.
pub const KEY_FINANCE_ALERTS: &str = "financeAlerts";
pub const KEY_ALERT_HISTORY: &str = "alertHistory";
pub const KEY_REVIEWED_ITEMS: &str = "reviewedItems";
pub const KEY_UPLOAD_HISTORY: &str = "uploadHistory";
pub const KEY_CPU_UPLOAD_HISTORY: &str = "cpuDataUploadHistory";

/// Pluggable backing store for lifecycle and history state. Values are
/// opaque JSON strings keyed by the constants above.
pub trait StateBackend {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&mut self, key: &str, value: &str) -> Result<()>;
    fn delete(&mut self, key: &str) -> Result<()>;
}

pub fn read_json<B: StateBackend + ?Sized, T: DeserializeOwned + Default>(
    backend: &B,
    key: &str,
) -> Result<T> {
    match backend.get(key)? {
        Some(raw) => Ok(serde_json::from_str(&raw)?),
        None => Ok(T::default()),
    }
}

pub fn write_json<B: StateBackend + ?Sized, T: Serialize>(
    backend: &mut B,
    key: &str,
    value: &T,
) -> Result<()> {
    backend.set(key, &serde_json::to_string(value)?)
}

/// In-memory backend for tests and previews.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: HashMap<String, String>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateBackend for MemoryBackend {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Embedded SQLite backend for production use.
pub struct SqliteBackend {
    conn: Connection,
}

impl SqliteBackend {
    pub fn new(db_path: PathBuf) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        let mut backend = SqliteBackend { conn };
        backend.run_migrations()?;
        Ok(backend)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let mut backend = SqliteBackend { conn };
        backend.run_migrations()?;
        Ok(backend)
    }

    fn run_migrations(&mut self) -> Result<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                name TEXT PRIMARY KEY,
                applied_at TEXT NOT NULL
            );",
        )?;

        let migrations = vec![(
            "001_create_app_state.sql",
            "CREATE TABLE IF NOT EXISTS app_state (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );",
        )];

        for (name, sql) in migrations {
            let applied: Option<String> = self
                .conn
                .query_row(
                    "SELECT name FROM schema_migrations WHERE name = ?1",
                    params![name],
                    |row| row.get(0),
                )
                .optional()?;

            if applied.is_none() {
                let tx = self.conn.transaction()?;
                tx.execute_batch(sql)?;
                tx.execute(
                    "INSERT INTO schema_migrations (name, applied_at) VALUES (?1, datetime('now'))",
                    params![name],
                )?;
                tx.commit()?;
            }
        }

        Ok(())
    }
}

impl StateBackend for SqliteBackend {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT value FROM app_state WHERE key = ?1")?;
        Ok(stmt.query_row(params![key], |row| row.get(0)).optional()?)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO app_state (key, value, updated_at) VALUES (?1, ?2, datetime('now'))",
            params![key, value],
        )?;
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM app_state WHERE key = ?1", params![key])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(backend: &mut dyn StateBackend) {
        assert_eq!(backend.get("missing").unwrap(), None);
        backend.set("k", "{\"a\":1}").unwrap();
        assert_eq!(backend.get("k").unwrap().as_deref(), Some("{\"a\":1}"));
        backend.set("k", "{\"a\":2}").unwrap();
        assert_eq!(backend.get("k").unwrap().as_deref(), Some("{\"a\":2}"));
        backend.delete("k").unwrap();
        assert_eq!(backend.get("k").unwrap(), None);
        // deleting an absent key is a no-op
        backend.delete("k").unwrap();
    }

    #[test]
    fn memory_backend_roundtrip() {
        let mut backend = MemoryBackend::new();
        roundtrip(&mut backend);
    }

    #[test]
    fn sqlite_backend_roundtrip() {
        let mut backend = SqliteBackend::open_in_memory().unwrap();
        roundtrip(&mut backend);
    }

    #[test]
    fn sqlite_backend_persists_across_connections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.sqlite");

        {
            let mut backend = SqliteBackend::new(path.clone()).unwrap();
            backend.set(KEY_FINANCE_ALERTS, "{}").unwrap();
        }

        let backend = SqliteBackend::new(path).unwrap();
        assert_eq!(
            backend.get(KEY_FINANCE_ALERTS).unwrap().as_deref(),
            Some("{}")
        );
    }

    #[test]
    fn typed_read_defaults_when_absent() {
        let backend = MemoryBackend::new();
        let map: HashMap<String, String> = read_json(&backend, KEY_REVIEWED_ITEMS).unwrap();
        assert!(map.is_empty());
    }
}
