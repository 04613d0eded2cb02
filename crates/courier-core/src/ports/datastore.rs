//! CursorStore port - cursor record と対になる destination config の永続化
//!
//! Cursor record と connector 固有の destination config は常にペアで作成・削除します。
//! ペアを崩す操作（片方だけ insert / delete）はこの trait に存在しません。

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{CursorId, CursorRecord, DatastoreError, DestinationConfig, FormId};

/// Durable store for cursor records and their paired destination configs.
///
/// # 設計原則
/// - `save` は record 単位の last-writer-wins
/// - 同一 cursor の writer は同時に 1 つ（task lock と呼び出し側の規律で保証）
#[async_trait]
pub trait CursorStore: Send + Sync {
    /// Create a cursor record and its destination config together.
    async fn insert_paired(
        &self,
        record: CursorRecord,
        config: DestinationConfig,
    ) -> Result<(), DatastoreError>;

    async fn get(&self, id: CursorId) -> Result<CursorRecord, DatastoreError>;

    async fn save(&self, record: &CursorRecord) -> Result<(), DatastoreError>;

    /// Cursors whose `last_updated_at` is strictly before `cutoff`, oldest first.
    async fn list_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<CursorRecord>, DatastoreError>;

    async fn list_for_form(&self, form_id: &FormId) -> Result<Vec<CursorRecord>, DatastoreError>;

    async fn get_config(&self, id: CursorId) -> Result<DestinationConfig, DatastoreError>;

    /// Persist both halves of the pair in one write.
    async fn save_paired(
        &self,
        record: &CursorRecord,
        config: &DestinationConfig,
    ) -> Result<(), DatastoreError>;

    /// Delete the cursor record and its destination config together.
    async fn delete_paired(&self, id: CursorId) -> Result<(), DatastoreError>;
}
