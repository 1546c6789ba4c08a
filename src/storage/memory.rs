//! In-memory report store (non-persistent).

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::RwLock;

use super::{ReportStore, StorageError, StoredReport};

#[derive(Clone, Default)]
pub struct InMemoryReportStore {
    reports: Arc<RwLock<BTreeMap<i64, StoredReport>>>,
}

impl InMemoryReportStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.reports.read().await.len()
    }
}

#[async_trait]
impl ReportStore for InMemoryReportStore {
    fn is_persistent(&self) -> bool {
        false
    }

    async fn persist(&self, payload: &Value) -> Result<Option<i64>, StorageError> {
        let mut reports = self.reports.write().await;
        let id = reports.keys().next_back().map_or(1, |last| last + 1);
        reports.insert(
            id,
            StoredReport {
                id,
                created_at: Utc::now(),
                payload: payload.clone(),
            },
        );
        Ok(Some(id))
    }

    async fn get_report(&self, id: i64) -> Result<Option<StoredReport>, StorageError> {
        Ok(self.reports.read().await.get(&id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_ids_are_sequential() {
        let store = InMemoryReportStore::new();
        assert_eq!(store.persist(&json!({"a": 1})).await.unwrap(), Some(1));
        assert_eq!(store.persist(&json!({"a": 2})).await.unwrap(), Some(2));
        assert_eq!(store.len().await, 2);

        let report = store.get_report(2).await.unwrap().unwrap();
        assert_eq!(report.payload, json!({"a": 2}));
        assert!(store.get_report(3).await.unwrap().is_none());
    }

    #[test]
    fn test_store_is_not_persistent() {
        let store = InMemoryReportStore::new();
        assert!(!store.is_persistent());
        let id = tokio_test::block_on(store.persist(&json!({"week": 1}))).unwrap();
        assert_eq!(id, Some(1));
    }
}
