//! TaskLock port - datastore が提供する名前付き分散ロック
//!
//! 1 回の publish / delete 呼び出しごとに `LockId` を 1 つ発行し、
//! resource 名（cursor id）に対して obtain → (renew) → release します。

use async_trait::async_trait;

use crate::domain::{DatastoreError, LockId};

/// Named, expiring mutual-exclusion primitive.
///
/// - `obtain` は即座に返る（待機とリトライは呼び出し側の `RetryPolicy` が担当）
/// - 期限切れのロックは他の holder が奪える
/// - 同じ holder による再 obtain は成功する
#[async_trait]
pub trait TaskLock: Send + Sync {
    /// Try once to take `resource` for `holder`. `Ok(false)` means someone else holds it.
    async fn obtain(&self, holder: LockId, resource: &str) -> Result<bool, DatastoreError>;

    /// Extend the lease. `Ok(false)` means `holder` no longer owns the lock.
    async fn renew(&self, holder: LockId, resource: &str) -> Result<bool, DatastoreError>;

    /// Give the lock up. `Ok(false)` means `holder` did not own it.
    async fn release(&self, holder: LockId, resource: &str) -> Result<bool, DatastoreError>;
}
