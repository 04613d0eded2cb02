//! DeletionCoordinator - task lock の下で destination を撤去する
//!
//! 1. cursor id の task lock を（有限回のリトライで）取得。取れなければ何も触らず `false`
//! 2. `Connector::teardown`
//! 3. cursor record と destination config をまとめて削除
//! 4. 結果にかかわらず lock を（有限回のリトライで）解放
//!
//! teardown の一時的な失敗では削除を中止し、後で再実行できるようにします。
//! 認証・恒久的な失敗はリトライしても直らないので、ログに残して削除を続けます。

use std::sync::Arc;

use tracing::{info, warn};

use super::locking::LockManager;
use super::registry::ConnectorRegistry;
use crate::domain::{CursorId, DatastoreError, FailureKind, PublishError};
use crate::ports::CursorStore;

pub struct DeletionCoordinator {
    store: Arc<dyn CursorStore>,
    connectors: Arc<ConnectorRegistry>,
    locks: Arc<LockManager>,
}

impl DeletionCoordinator {
    pub fn new(
        store: Arc<dyn CursorStore>,
        connectors: Arc<ConnectorRegistry>,
        locks: Arc<LockManager>,
    ) -> Self {
        Self {
            store,
            connectors,
            locks,
        }
    }

    /// Tear down and delete a destination.
    ///
    /// `Ok(false)` means the lock could not be obtained and nothing was touched.
    pub async fn delete_destination(&self, cursor_id: CursorId) -> Result<bool, PublishError> {
        let Some(lock) = self.locks.obtain(cursor_id).await? else {
            warn!(cursor_id = %cursor_id, "delete refused: task lock unavailable");
            return Ok(false);
        };

        let result = self.delete_locked(cursor_id).await;
        self.locks.release(lock).await;
        result.map(|()| true)
    }

    async fn delete_locked(&self, cursor_id: CursorId) -> Result<(), PublishError> {
        let record = self.store.get(cursor_id).await.map_err(|e| match e {
            DatastoreError::NotFound(_) => PublishError::NotFound(cursor_id),
            other => PublishError::Datastore(other),
        })?;

        match self.store.get_config(cursor_id).await {
            Ok(config) => match self.connectors.build(&config) {
                Some(Ok(connector)) => {
                    if let Err(failure) = connector.teardown(config.handle.as_ref()).await {
                        if failure.kind == FailureKind::Transient {
                            warn!(cursor_id = %cursor_id, reason = %failure.reason, "teardown failed; deletion aborted");
                            return Err(PublishError::from_connector(cursor_id, failure));
                        }
                        warn!(
                            cursor_id = %cursor_id,
                            kind = ?failure.kind,
                            reason = %failure.reason,
                            "teardown failed; deleting anyway"
                        );
                    }
                }
                Some(Err(failure)) => {
                    warn!(cursor_id = %cursor_id, reason = %failure.reason, "connector unavailable; skipping teardown");
                }
                None => {
                    warn!(cursor_id = %cursor_id, kind = %config.kind, "no connector registered; skipping teardown");
                }
            },
            Err(DatastoreError::NotFound(_)) => {
                warn!(cursor_id = %cursor_id, "destination config already missing");
            }
            Err(e) => return Err(e.into()),
        }

        self.store.delete_paired(cursor_id).await?;
        info!(
            cursor_id = %cursor_id,
            form_id = %record.form_id(),
            kind = %record.kind(),
            "destination deleted"
        );
        Ok(())
    }
}
