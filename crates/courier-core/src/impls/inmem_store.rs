//! InMemoryCursorStore - 開発・テスト用の cursor store
//!
//! cursor record と destination config を 1 つの Mutex の下に置くので、
//! ペアの作成・削除は常に原子的です。

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::domain::{CursorId, CursorRecord, DatastoreError, DestinationConfig, FormId};
use crate::ports::CursorStore;

#[derive(Default)]
struct Tables {
    cursors: HashMap<CursorId, CursorRecord>,
    configs: HashMap<CursorId, DestinationConfig>,
}

#[derive(Default)]
pub struct InMemoryCursorStore {
    tables: Mutex<Tables>,
}

impl InMemoryCursorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of (cursor, config) rows, for pairing assertions in tests.
    pub async fn row_counts(&self) -> (usize, usize) {
        let tables = self.tables.lock().await;
        (tables.cursors.len(), tables.configs.len())
    }
}

#[async_trait]
impl CursorStore for InMemoryCursorStore {
    async fn insert_paired(
        &self,
        record: CursorRecord,
        config: DestinationConfig,
    ) -> Result<(), DatastoreError> {
        let mut tables = self.tables.lock().await;
        let id = record.id();
        if tables.cursors.contains_key(&id) || tables.configs.contains_key(&id) {
            return Err(DatastoreError::Conflict(id.to_string()));
        }
        tables.cursors.insert(id, record);
        tables.configs.insert(id, config);
        Ok(())
    }

    async fn get(&self, id: CursorId) -> Result<CursorRecord, DatastoreError> {
        let tables = self.tables.lock().await;
        tables
            .cursors
            .get(&id)
            .cloned()
            .ok_or_else(|| DatastoreError::NotFound(id.to_string()))
    }

    async fn save(&self, record: &CursorRecord) -> Result<(), DatastoreError> {
        let mut tables = self.tables.lock().await;
        // 削除済みの record を save で復活させない
        match tables.cursors.get_mut(&record.id()) {
            Some(slot) => {
                *slot = record.clone();
                Ok(())
            }
            None => Err(DatastoreError::NotFound(record.id().to_string())),
        }
    }

    async fn list_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<CursorRecord>, DatastoreError> {
        let tables = self.tables.lock().await;
        let mut found: Vec<_> = tables
            .cursors
            .values()
            .filter(|r| r.last_updated_at() < cutoff)
            .cloned()
            .collect();
        found.sort_by_key(|r| (r.last_updated_at(), r.id()));
        Ok(found)
    }

    async fn list_for_form(&self, form_id: &FormId) -> Result<Vec<CursorRecord>, DatastoreError> {
        let tables = self.tables.lock().await;
        let mut found: Vec<_> = tables
            .cursors
            .values()
            .filter(|r| r.form_id() == form_id)
            .cloned()
            .collect();
        found.sort_by_key(|r| r.id());
        Ok(found)
    }

    async fn get_config(&self, id: CursorId) -> Result<DestinationConfig, DatastoreError> {
        let tables = self.tables.lock().await;
        tables
            .configs
            .get(&id)
            .cloned()
            .ok_or_else(|| DatastoreError::NotFound(format!("config for {id}")))
    }

    async fn save_paired(
        &self,
        record: &CursorRecord,
        config: &DestinationConfig,
    ) -> Result<(), DatastoreError> {
        let mut tables = self.tables.lock().await;
        let id = record.id();
        if !tables.cursors.contains_key(&id) || !tables.configs.contains_key(&id) {
            return Err(DatastoreError::NotFound(id.to_string()));
        }
        tables.cursors.insert(id, record.clone());
        tables.configs.insert(id, config.clone());
        Ok(())
    }

    async fn delete_paired(&self, id: CursorId) -> Result<(), DatastoreError> {
        let mut tables = self.tables.lock().await;
        let cursor = tables.cursors.remove(&id);
        let config = tables.configs.remove(&id);
        if cursor.is_none() && config.is_none() {
            return Err(DatastoreError::NotFound(id.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ConnectorKind, DestinationId, PublicationMode};
    use chrono::{Duration, TimeZone};
    use ulid::Ulid;

    fn pair(form: &str, at: DateTime<Utc>) -> (CursorRecord, DestinationConfig) {
        let id = CursorId::from_ulid(Ulid::new());
        let dest = DestinationId::from_ulid(Ulid::new());
        let record = CursorRecord::new(
            id,
            dest,
            FormId::new(form),
            ConnectorKind::JsonServer,
            PublicationMode::UploadAndStream,
            at,
        );
        let config = DestinationConfig {
            id: dest,
            cursor_id: id,
            form_id: FormId::new(form),
            kind: ConnectorKind::JsonServer,
            settings: serde_json::json!({}),
            handle: None,
        };
        (record, config)
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn insert_and_delete_are_paired() {
        let store = InMemoryCursorStore::new();
        let (record, config) = pair("f", t0());
        let id = record.id();

        store.insert_paired(record, config).await.unwrap();
        assert_eq!(store.row_counts().await, (1, 1));
        assert!(store.get_config(id).await.is_ok());

        store.delete_paired(id).await.unwrap();
        assert_eq!(store.row_counts().await, (0, 0));
        assert!(matches!(store.get(id).await, Err(DatastoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn duplicate_insert_conflicts() {
        let store = InMemoryCursorStore::new();
        let (record, config) = pair("f", t0());
        store
            .insert_paired(record.clone(), config.clone())
            .await
            .unwrap();

        let err = store.insert_paired(record, config).await.unwrap_err();
        assert!(matches!(err, DatastoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn save_does_not_resurrect_deleted_records() {
        let store = InMemoryCursorStore::new();
        let (record, config) = pair("f", t0());
        store.insert_paired(record.clone(), config).await.unwrap();
        store.delete_paired(record.id()).await.unwrap();

        assert!(store.save(&record).await.is_err());
        assert_eq!(store.row_counts().await, (0, 0));
    }

    #[tokio::test]
    async fn list_queries_filter_and_order() {
        let store = InMemoryCursorStore::new();
        let (old, old_cfg) = pair("a", t0());
        let (new, new_cfg) = pair("a", t0() + Duration::hours(2));
        let (other, other_cfg) = pair("b", t0());
        store.insert_paired(new.clone(), new_cfg).await.unwrap();
        store.insert_paired(old.clone(), old_cfg).await.unwrap();
        store.insert_paired(other, other_cfg).await.unwrap();

        let stale = store
            .list_older_than(t0() + Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(stale.len(), 2);
        assert!(stale.iter().all(|r| r.last_updated_at() == t0()));

        let for_a = store.list_for_form(&FormId::new("a")).await.unwrap();
        let ids: Vec<_> = for_a.iter().map(|r| r.id()).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&old.id()) && ids.contains(&new.id()));
    }
}
