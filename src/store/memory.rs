//! In-memory task store for development and tests

use super::{StoreError, StoreTransition, TaskStore};
use crate::task::{StatusChange, TaskRecord};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Task store backed by a `HashMap` behind an async lock
#[derive(Debug, Default)]
pub struct InMemoryTaskStore {
    records: RwLock<HashMap<Uuid, TaskRecord>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Snapshot of every stored record, in no particular order
    pub async fn records(&self) -> Vec<TaskRecord> {
        self.records.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    fn backend_name(&self) -> &str {
        "memory"
    }

    async fn insert(&self, record: &TaskRecord) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.id) {
            return Err(StoreError::Duplicate(record.id));
        }
        records.insert(record.id, record.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<TaskRecord>, StoreError> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn advance(
        &self,
        id: Uuid,
        change: StatusChange,
    ) -> Result<StoreTransition, StoreError> {
        // Check and write under one guard
        let mut records = self.records.write().await;
        let record = records.get_mut(&id).ok_or(StoreError::NotFound(id))?;

        if !record.status.can_advance_to(change.target()) {
            return Ok(StoreTransition::Ignored(record.clone()));
        }

        change.apply_to(record, Utc::now());
        Ok(StoreTransition::Applied(record.clone()))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{Submission, TaskStatus, TaskType};
    use serde_json::json;
    use std::sync::Arc;

    fn pending_record() -> TaskRecord {
        TaskRecord::new_pending(Submission {
            task_type: TaskType::AnalyzeNiche,
            project_id: "project-1".to_string(),
            requester_id: "user-1".to_string(),
            payload: json!({"passions": ["baking"], "skills": ["writing"]}),
        })
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let store = InMemoryTaskStore::new();
        let record = pending_record();

        store.insert(&record).await.unwrap();

        let loaded = store.get(record.id).await.unwrap().unwrap();
        assert_eq!(loaded, record);
        assert!(store.get(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_insert_rejected() {
        let store = InMemoryTaskStore::new();
        let record = pending_record();

        store.insert(&record).await.unwrap();
        let result = store.insert(&record).await;

        assert!(matches!(result, Err(StoreError::Duplicate(id)) if id == record.id));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_advance_applies_forward_changes() {
        let store = InMemoryTaskStore::new();
        let record = pending_record();
        store.insert(&record).await.unwrap();

        let processing = store
            .advance(record.id, StatusChange::Processing)
            .await
            .unwrap();
        assert!(processing.is_applied());
        assert_eq!(processing.record().status, TaskStatus::Processing);

        let completed = store
            .advance(record.id, StatusChange::Completed(json!(["niche"])))
            .await
            .unwrap();
        assert!(completed.is_applied());
        assert_eq!(completed.record().result, Some(json!(["niche"])));
        assert!(completed.record().updated_at >= record.updated_at);
    }

    #[tokio::test]
    async fn test_advance_ignores_regressions() {
        let store = InMemoryTaskStore::new();
        let record = pending_record();
        store.insert(&record).await.unwrap();

        store
            .advance(record.id, StatusChange::Failed("first".to_string()))
            .await
            .unwrap();
        let second = store
            .advance(record.id, StatusChange::Completed(json!({"late": true})))
            .await
            .unwrap();

        assert!(!second.is_applied());
        let current = second.into_record();
        assert_eq!(current.status, TaskStatus::Failed);
        assert_eq!(current.error_message.as_deref(), Some("first"));
        assert!(current.result.is_none());
    }

    #[tokio::test]
    async fn test_advance_unknown_id() {
        let store = InMemoryTaskStore::new();
        let result = store
            .advance(Uuid::new_v4(), StatusChange::Processing)
            .await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_concurrent_completions_apply_once() {
        let store = Arc::new(InMemoryTaskStore::new());
        let record = pending_record();
        store.insert(&record).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            let id = record.id;
            handles.push(tokio::spawn(async move {
                store
                    .advance(id, StatusChange::Completed(json!({ "writer": i })))
                    .await
                    .unwrap()
                    .is_applied()
            }));
        }

        let mut applied = 0;
        for handle in handles {
            if handle.await.unwrap() {
                applied += 1;
            }
        }
        assert_eq!(applied, 1);
    }
}
