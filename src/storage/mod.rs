//! Report storage - best-effort persistence of generated reports.
//!
//! The engine only ever calls `persist`; callers read reports back through
//! `get_report`.

mod memory;
mod sqlite;

pub use memory::InMemoryReportStore;
pub use sqlite::SqliteReportStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Errors from a report store.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// A report as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredReport {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub payload: Value,
}

/// Report store trait - implemented by all storage backends.
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Whether this store persists data across restarts.
    fn is_persistent(&self) -> bool;

    /// Save a report payload and return its id, if the backend assigns one.
    async fn persist(&self, payload: &Value) -> Result<Option<i64>, StorageError>;

    /// Load a report by id.
    async fn get_report(&self, id: i64) -> Result<Option<StoredReport>, StorageError>;
}
