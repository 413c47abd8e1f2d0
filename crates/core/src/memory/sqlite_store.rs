//! # SQLite Coordination Store
//!
//! Persistent [`CoordinationStore`] so several agent processes on one host
//! can share messages and task results through `.hive/coordination.db`.
//! Rows are scoped by the configured memory namespace.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection};
use serde_json::Value;

use super::store::{CoordinationStore, KeyPattern};
use crate::error::{Result, WorkerError};

/// Schema version for migrations
const SCHEMA_VERSION: i32 = 1;

/// SQLite-backed coordination store
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    namespace: String,
}

impl SqliteStore {
    /// Open or create the database at `path`
    pub fn open_at<P: AsRef<Path>>(path: P, namespace: &str) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path.as_ref())?;
        Self::with_connection(conn, namespace)
    }

    pub fn open_in_memory(namespace: &str) -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?, namespace)
    }

    fn with_connection(conn: Connection, namespace: &str) -> Result<Self> {
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            namespace: namespace.to_string(),
        };
        store.run_migrations()?;
        Ok(store)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| WorkerError::Store(format!("Lock error: {}", e)))
    }

    fn run_migrations(&self) -> Result<()> {
        let conn = self.lock()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY)",
            [],
        )?;

        let current_version: i32 = conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )?;

        if current_version < 1 {
            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS coordination_entries (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    namespace TEXT NOT NULL,
                    key TEXT NOT NULL,
                    value_json TEXT NOT NULL,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );
                CREATE INDEX IF NOT EXISTS idx_coordination_ns_key
                    ON coordination_entries(namespace, key);
                "#,
            )?;
            conn.execute(
                "INSERT OR REPLACE INTO schema_version (version) VALUES (?1)",
                [SCHEMA_VERSION],
            )?;
        }

        Ok(())
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Remove every entry in this namespace. Returns the number removed.
    pub fn clear(&self) -> Result<usize> {
        let conn = self.lock()?;
        let removed = conn.execute(
            "DELETE FROM coordination_entries WHERE namespace = ?1",
            params![self.namespace],
        )?;
        Ok(removed)
    }
}

#[async_trait]
impl CoordinationStore for SqliteStore {
    async fn store(&self, key: &str, value: Value) -> Result<()> {
        let value_json = serde_json::to_string(&value)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO coordination_entries (namespace, key, value_json) VALUES (?1, ?2, ?3)",
            params![self.namespace, key, value_json],
        )?;
        Ok(())
    }

    async fn retrieve(&self, pattern: &str) -> Result<Vec<Value>> {
        let matcher = KeyPattern::new(pattern)?;
        let prefix = KeyPattern::literal_prefix(pattern);
        // LIKE wildcards in the literal prefix are escaped with '\'
        let like = format!(
            "{}%",
            prefix
                .replace('\\', "\\\\")
                .replace('%', "\\%")
                .replace('_', "\\_")
        );

        let rows = {
            let conn = self.lock()?;
            let mut stmt = conn.prepare(
                r#"
                SELECT key, value_json
                FROM coordination_entries
                WHERE namespace = ?1 AND key LIKE ?2 ESCAPE '\'
                ORDER BY id ASC
                "#,
            )?;
            let rows = stmt
                .query_map(params![self.namespace, like], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows
        };

        let mut values = Vec::new();
        for (key, raw) in rows {
            if !matcher.matches(&key) {
                continue;
            }
            match serde_json::from_str(&raw) {
                Ok(value) => values.push(value),
                Err(e) => tracing::warn!(key = %key, "skipping corrupt coordination entry: {}", e),
            }
        }
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_store_and_retrieve_wildcard() {
        let store = SqliteStore::open_in_memory("default").unwrap();
        store.store("agent/a/coordination/messages/b", json!({"n": 1})).await.unwrap();
        store.store("agent/a/coordination/messages/c", json!({"n": 2})).await.unwrap();
        store.store("agent/z/coordination/messages/b", json!({"n": 3})).await.unwrap();

        let values = store
            .retrieve("agent/a/coordination/messages/*")
            .await
            .unwrap();
        assert_eq!(values, vec![json!({"n": 1}), json!({"n": 2})]);
    }

    #[tokio::test]
    async fn test_namespaces_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coordination.db");

        let alpha = SqliteStore::open_at(&path, "alpha").unwrap();
        let beta = SqliteStore::open_at(&path, "beta").unwrap();

        alpha.store("tasks/t1/result", json!("a")).await.unwrap();
        beta.store("tasks/t1/result", json!("b")).await.unwrap();

        assert_eq!(alpha.retrieve("tasks/t1/result").await.unwrap(), vec![json!("a")]);
        assert_eq!(beta.clear().unwrap(), 1);
        assert!(beta.retrieve("tasks/*/result").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reopen_keeps_schema_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hive/coordination.db");

        {
            let store = SqliteStore::open_at(&path, "default").unwrap();
            store.store("k_1", json!(true)).await.unwrap();
        }

        let store = SqliteStore::open_at(&path, "default").unwrap();
        // '_' must not act as a LIKE wildcard
        store.store("kx1", json!(false)).await.unwrap();
        assert_eq!(store.retrieve("k_1").await.unwrap(), vec![json!(true)]);

        let conn = store.lock().unwrap();
        let version: i32 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }
}
