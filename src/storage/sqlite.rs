//! SQLite-based report store.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use tokio::sync::Mutex;

use super::{ReportStore, StorageError, StoredReport};

const SCHEMA: &str = r#"
PRAGMA journal_mode = WAL;

CREATE TABLE IF NOT EXISTS reports (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    created_at TEXT NOT NULL,
    payload TEXT NOT NULL
);
"#;

pub struct SqliteReportStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteReportStore {
    /// Open (or create) the database at `db_path`.
    pub async fn open(db_path: PathBuf) -> Result<Self, StorageError> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                tracing::warn!(component = "storage", "Failed to create report dir: {}", e);
            }
        }

        let conn = tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&db_path)?;
            conn.execute_batch(SCHEMA)?;
            Ok::<_, StorageError>(conn)
        })
        .await??;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory SQLite database, mostly for tests.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Number of stored reports.
    pub async fn count(&self) -> Result<i64, StorageError> {
        let conn = Arc::clone(&self.conn);
        let count = tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            conn.query_row("SELECT COUNT(*) FROM reports", [], |row| row.get(0))
        })
        .await??;
        Ok(count)
    }
}

#[async_trait]
impl ReportStore for SqliteReportStore {
    fn is_persistent(&self) -> bool {
        true
    }

    async fn persist(&self, payload: &Value) -> Result<Option<i64>, StorageError> {
        let text = serde_json::to_string(payload)?;
        let created_at = Utc::now().to_rfc3339();
        let conn = Arc::clone(&self.conn);

        let id = tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            conn.execute(
                "INSERT INTO reports (created_at, payload) VALUES (?1, ?2)",
                params![created_at, text],
            )?;
            Ok::<_, StorageError>(conn.last_insert_rowid())
        })
        .await??;

        tracing::debug!(component = "storage", report_id = id, "Saved report");
        Ok(Some(id))
    }

    async fn get_report(&self, id: i64) -> Result<Option<StoredReport>, StorageError> {
        let conn = Arc::clone(&self.conn);
        let row = tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            conn.query_row(
                "SELECT created_at, payload FROM reports WHERE id = ?1",
                params![id],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()
        })
        .await??;

        let Some((created_at, payload)) = row else {
            return Ok(None);
        };
        let created_at = DateTime::parse_from_rfc3339(&created_at)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        Ok(Some(StoredReport {
            id,
            created_at,
            payload: serde_json::from_str(&payload)?,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_reports_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("reports.db");

        let id = {
            let store = SqliteReportStore::open(path.clone()).await.unwrap();
            store
                .persist(&json!({"executive_summary": "steady week"}))
                .await
                .unwrap()
                .unwrap()
        };

        let store = SqliteReportStore::open(path).await.unwrap();
        let report = store.get_report(id).await.unwrap().unwrap();
        assert_eq!(report.payload["executive_summary"], "steady week");
        assert_eq!(store.count().await.unwrap(), 1);
        assert!(store.is_persistent());
    }

    #[tokio::test]
    async fn test_missing_report_is_none() {
        let store = SqliteReportStore::open_in_memory().unwrap();
        assert!(store.get_report(42).await.unwrap().is_none());
        let first = store.persist(&json!({})).await.unwrap();
        let second = store.persist(&json!({})).await.unwrap();
        assert_eq!(first, Some(1));
        assert_eq!(second, Some(2));
    }
}
