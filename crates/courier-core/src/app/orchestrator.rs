//! PublishOrchestrator - cursor record を読み、connector に配送し、結果を書き戻す
//!
//! # 処理の流れ（publish）
//! 1. task lock（resource = cursor id）を取得
//! 2. cursor record を読み、status が配送を許さなければ何もせず返す
//! 3. 未 prepare なら `Connector::prepare`
//! 4. 入力を (completion time, key) 順に並べ、watermark 以下を除外
//! 5. batch 対応 connector には 1 回、それ以外には submission ごとに deliver
//! 6. 成功した単位ごとに watermark を進め、`record_success`
//! 7. 失敗したらその単位で止まる（watermark は進めない）
//! 8. upload pass の後、backlog が尽きていれば `record_success` → `complete_if_upload_only`
//!
//! 同一 destination への publish を直列化するのは呼び出し側の責務です。
//! task lock は削除との排他のために取ります。

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::locking::{HeldLock, LockManager};
use super::registry::ConnectorRegistry;
use crate::domain::{
    ConnectorKind, CursorId, CursorRecord, DatastoreError, DestinationConfig,
    DestinationHandle, FailureKind, FormId, OperationalStatus, Pass, PublicationMode,
    PublishError, PublisherSummary, Submission, TransitionError,
};
use crate::ports::{Clock, Connector, CursorStore, IdGenerator, SubmissionQuery, SubmissionSource};

/// What one `publish` call did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishReport {
    pub cursor_id: CursorId,
    pub pass: Pass,
    /// Status after the call.
    pub status: OperationalStatus,
    /// False when the status (or mode) did not allow contacting the connector.
    pub attempted: bool,
    pub delivered: usize,
    /// Inputs at or below the watermark, dropped without delivery.
    pub skipped: usize,
    pub upload_completed: bool,
}

pub struct PublishOrchestrator {
    store: Arc<dyn CursorStore>,
    submissions: Arc<dyn SubmissionSource>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    connectors: Arc<ConnectorRegistry>,
    locks: Arc<LockManager>,
}

impl PublishOrchestrator {
    pub fn new(
        store: Arc<dyn CursorStore>,
        submissions: Arc<dyn SubmissionSource>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        connectors: Arc<ConnectorRegistry>,
        locks: Arc<LockManager>,
    ) -> Self {
        Self {
            store,
            submissions,
            clock,
            ids,
            connectors,
            locks,
        }
    }

    // ========================================
    // 作成と初期化
    // ========================================

    /// Configure a new destination for `form_id`. The cursor record and its destination
    /// config are written together.
    pub async fn create_destination(
        &self,
        form_id: FormId,
        kind: ConnectorKind,
        mode: PublicationMode,
        settings: serde_json::Value,
    ) -> Result<CursorRecord, PublishError> {
        if self.connectors.get(kind).is_none() {
            return Err(PublishError::UnknownKind(kind));
        }

        let now = self.clock.now();
        let cursor_id = self.ids.generate_cursor_id();
        let destination_id = self.ids.generate_destination_id();
        let record = CursorRecord::new(cursor_id, destination_id, form_id.clone(), kind, mode, now);
        let config = DestinationConfig {
            id: destination_id,
            cursor_id,
            form_id,
            kind,
            settings,
            handle: None,
        };

        // settings を先に検証して、壊れた destination を作らない
        self.connector_for(&config)?;
        self.store.insert_paired(record.clone(), config).await?;

        info!(
            cursor_id = %cursor_id,
            form_id = %record.form_id(),
            kind = %kind,
            mode = ?mode,
            "destination created"
        );
        Ok(record)
    }

    /// Prepare the destination if needed, moving it toward `Active`.
    pub async fn initiate(&self, cursor_id: CursorId) -> Result<OperationalStatus, PublishError> {
        let lock = self.obtain_lock(cursor_id).await?;
        let result = self.initiate_locked(cursor_id).await;
        self.locks.release(lock).await;
        result
    }

    async fn initiate_locked(&self, cursor_id: CursorId) -> Result<OperationalStatus, PublishError> {
        let mut record = self.load(cursor_id).await?;
        if record.is_prepared() || !record.status().permits_delivery() {
            debug!(cursor_id = %cursor_id, status = %record.status(), "initiate: nothing to do");
            return Ok(record.status());
        }
        let mut config = self.load_config(cursor_id).await?;
        let connector = self.connector_for(&config)?;
        self.ensure_prepared(&mut record, &mut config, connector.as_ref())
            .await?;
        Ok(record.status())
    }

    /// Run `Connector::prepare` and persist the handle with the cursor.
    async fn ensure_prepared(
        &self,
        record: &mut CursorRecord,
        config: &mut DestinationConfig,
        connector: &dyn Connector,
    ) -> Result<(), PublishError> {
        let cursor_id = record.id();
        let form = self.submissions.form_definition(record.form_id()).await?;

        match connector.prepare(&form).await {
            Ok(handle) => {
                config.handle = Some(handle);
                record.mark_prepared();
                record.record_success()?;
                record.touch(self.clock.now());
                self.store.save_paired(record, config).await?;
                info!(cursor_id = %cursor_id, target = %connector.describe_target(), "destination prepared");
                Ok(())
            }
            Err(failure) => {
                warn!(
                    cursor_id = %cursor_id,
                    kind = ?failure.kind,
                    reason = %failure.reason,
                    "destination prepare failed"
                );
                match failure.kind {
                    FailureKind::Credential => {
                        record.record_credential_failure()?;
                    }
                    FailureKind::Transient => {
                        record.record_retry()?;
                    }
                    FailureKind::Permanent => {}
                }
                record.touch(self.clock.now());
                self.store.save(record).await?;
                Err(PublishError::from_connector(cursor_id, failure))
            }
        }
    }

    // ========================================
    // 配送
    // ========================================

    /// Deliver `submissions` to the destination. `streaming` selects the stream watermark,
    /// otherwise the upload watermark.
    pub async fn publish(
        &self,
        cursor_id: CursorId,
        submissions: Vec<Submission>,
        streaming: bool,
    ) -> Result<PublishReport, PublishError> {
        let mut lock = self.obtain_lock(cursor_id).await?;
        let result = self
            .publish_locked(&mut lock, cursor_id, submissions, Pass::from_streaming(streaming))
            .await;
        self.locks.release(lock).await;
        result
    }

    async fn publish_locked(
        &self,
        lock: &mut HeldLock,
        cursor_id: CursorId,
        mut submissions: Vec<Submission>,
        pass: Pass,
    ) -> Result<PublishReport, PublishError> {
        let mut record = self.load(cursor_id).await?;
        let mut report = PublishReport {
            cursor_id,
            pass,
            status: record.status(),
            attempted: false,
            delivered: 0,
            skipped: 0,
            upload_completed: record.is_upload_completed(),
        };

        let pass_allowed = match pass {
            Pass::Upload => record.mode().uploads(),
            Pass::Stream => record.mode().streams(),
        };
        if !record.status().permits_delivery() || !pass_allowed {
            debug!(
                cursor_id = %cursor_id,
                status = %record.status(),
                pass = ?pass,
                "publish skipped"
            );
            return Ok(report);
        }
        report.attempted = true;

        let mut config = self.load_config(cursor_id).await?;
        let connector = self.connector_for(&config)?;
        if !record.is_prepared() {
            self.ensure_prepared(&mut record, &mut config, connector.as_ref())
                .await?;
        }
        let handle = config
            .handle
            .clone()
            .unwrap_or_else(|| DestinationHandle::new(connector.describe_target()));

        // 並べ替えて、配送済み（watermark 以下）を落とす
        submissions.sort_by_key(Submission::watermark);
        submissions.dedup_by(|a, b| a.key == b.key && a.completed_at == b.completed_at);
        let before = submissions.len();
        submissions.retain(|s| !record.covers(pass, &s.watermark()));
        report.skipped = before - submissions.len();

        let units: Vec<&[Submission]> = if submissions.is_empty() {
            Vec::new()
        } else if connector.accepts_batches() {
            vec![submissions.as_slice()]
        } else {
            submissions.chunks(1).collect()
        };

        for unit in units {
            let rows: Vec<_> = unit.iter().flat_map(|s| s.rows.iter().cloned()).collect();
            let outcome = connector.deliver(&handle, &rows).await;

            let Some(failure) = outcome.into_failure() else {
                if let Some(last) = unit.last() {
                    record.advance(pass, last.watermark())?;
                }
                record.record_success()?;
                record.touch(self.clock.now());
                self.store.save(&record).await?;
                report.delivered += unit.len();
                debug!(cursor_id = %cursor_id, count = unit.len(), pass = ?pass, "delivered");

                if !self.locks.renew_if_due(lock).await? {
                    return Err(PublishError::LockUnavailable {
                        resource: lock.resource().to_string(),
                    });
                }
                continue;
            };

            // 失敗した単位では止まる。watermark は動かさない
            warn!(
                cursor_id = %cursor_id,
                kind = ?failure.kind,
                reason = %failure.reason,
                delivered = report.delivered,
                "delivery failed"
            );
            match failure.kind {
                FailureKind::Transient => {
                    record.record_retry()?;
                }
                FailureKind::Credential => {
                    record.record_credential_failure()?;
                }
                FailureKind::Permanent => {}
            }
            record.touch(self.clock.now());
            self.store.save(&record).await?;
            return Err(PublishError::from_connector(cursor_id, failure));
        }

        if pass == Pass::Upload && !record.is_upload_completed() && self.backlog_drained(&record).await? {
            record.mark_upload_completed();
            info!(cursor_id = %cursor_id, "upload backlog drained");
        }
        // backlog が尽きたことを確認した upload pass は成功として記録する
        if pass == Pass::Upload && record.is_upload_completed() {
            record.record_success()?;
        }
        let status = record.complete_if_upload_only()?;
        record.touch(self.clock.now());
        self.store.save(&record).await?;
        if status == OperationalStatus::Completed {
            info!(cursor_id = %cursor_id, "upload-only destination completed");
        }

        report.status = record.status();
        report.upload_completed = record.is_upload_completed();
        Ok(report)
    }

    /// Is there nothing left after the upload watermark and before establishment?
    async fn backlog_drained(&self, record: &CursorRecord) -> Result<bool, PublishError> {
        let query = SubmissionQuery::new(record.form_id().clone(), 1)
            .after(record.upload_cursor().cloned())
            .before(record.established_at());
        Ok(self.submissions.query(&query).await?.is_empty())
    }

    // ========================================
    // status 操作
    // ========================================

    pub async fn abandon(&self, cursor_id: CursorId) -> Result<OperationalStatus, PublishError> {
        let status = self
            .transition_locked(cursor_id, |record| record.abandon())
            .await?;
        info!(cursor_id = %cursor_id, status = %status, "destination abandoned");
        Ok(status)
    }

    /// Takes effect before the next publish call; never interrupts one in flight.
    pub async fn request_pause(&self, cursor_id: CursorId) -> Result<OperationalStatus, PublishError> {
        let status = self
            .transition_locked(cursor_id, |record| record.request_pause())
            .await?;
        info!(cursor_id = %cursor_id, status = %status, "pause requested");
        Ok(status)
    }

    /// Watchdog resume for paused destinations.
    pub async fn resume_after_backoff(
        &self,
        cursor_id: CursorId,
    ) -> Result<OperationalStatus, PublishError> {
        self.transition_locked(cursor_id, |record| record.resume_after_backoff())
            .await
    }

    /// Replace the destination's settings (fresh credentials) and re-enter `Active`.
    ///
    /// A destination whose `prepare` was rejected is prepared again with the new settings.
    pub async fn update_credentials(
        &self,
        cursor_id: CursorId,
        settings: serde_json::Value,
    ) -> Result<OperationalStatus, PublishError> {
        let lock = self.obtain_lock(cursor_id).await?;
        let result: Result<OperationalStatus, PublishError> = async {
            let mut record = self.load(cursor_id).await?;
            let mut config = self.load_config(cursor_id).await?;
            config.settings = settings;
            let connector = self.connector_for(&config)?;
            record.record_success()?;
            record.touch(self.clock.now());
            self.store.save_paired(&record, &config).await?;
            info!(cursor_id = %cursor_id, "credentials updated");

            if !record.is_prepared() {
                self.ensure_prepared(&mut record, &mut config, connector.as_ref())
                    .await?;
            }
            Ok(record.status())
        }
        .await;
        self.locks.release(lock).await;
        result
    }

    async fn transition_locked<F>(
        &self,
        cursor_id: CursorId,
        apply: F,
    ) -> Result<OperationalStatus, PublishError>
    where
        F: FnOnce(&mut CursorRecord) -> Result<OperationalStatus, TransitionError> + Send,
    {
        let lock = self.obtain_lock(cursor_id).await?;
        let result: Result<OperationalStatus, PublishError> = async {
            let mut record = self.load(cursor_id).await?;
            let status = apply(&mut record)?;
            record.touch(self.clock.now());
            self.store.save(&record).await?;
            Ok(status)
        }
        .await;
        self.locks.release(lock).await;
        result
    }

    // ========================================
    // 参照系
    // ========================================

    pub async fn describe_target(&self, cursor_id: CursorId) -> Result<String, PublishError> {
        let config = self.load_config(cursor_id).await?;
        Ok(self.connector_for(&config)?.describe_target())
    }

    pub async fn summary(&self, cursor_id: CursorId) -> Result<PublisherSummary, PublishError> {
        let record = self.load(cursor_id).await?;
        let target = self.target_or_placeholder(&record).await;
        Ok(PublisherSummary::from_record(&record, target))
    }

    pub async fn summaries_for_form(
        &self,
        form_id: &FormId,
    ) -> Result<Vec<PublisherSummary>, PublishError> {
        let records = self.store.list_for_form(form_id).await?;
        let mut summaries = Vec::with_capacity(records.len());
        for record in &records {
            let target = self.target_or_placeholder(record).await;
            summaries.push(PublisherSummary::from_record(record, target));
        }
        Ok(summaries)
    }

    pub async fn load(&self, cursor_id: CursorId) -> Result<CursorRecord, PublishError> {
        self.store.get(cursor_id).await.map_err(|e| match e {
            DatastoreError::NotFound(_) => PublishError::NotFound(cursor_id),
            other => PublishError::Datastore(other),
        })
    }

    async fn load_config(&self, cursor_id: CursorId) -> Result<DestinationConfig, PublishError> {
        self.store.get_config(cursor_id).await.map_err(|e| match e {
            DatastoreError::NotFound(_) => PublishError::DestinationMissing(cursor_id),
            other => PublishError::Datastore(other),
        })
    }

    /// Dashboards list every destination even when one connector cannot be built.
    async fn target_or_placeholder(&self, record: &CursorRecord) -> String {
        let described = self.describe_target(record.id()).await;
        described.unwrap_or_else(|e| {
            warn!(cursor_id = %record.id(), error = %e, "describe_target failed");
            format!("{} (unavailable)", record.kind())
        })
    }

    pub(crate) fn connector_for(
        &self,
        config: &DestinationConfig,
    ) -> Result<Arc<dyn Connector>, PublishError> {
        match self.connectors.build(config) {
            None => Err(PublishError::UnknownKind(config.kind)),
            Some(built) => {
                built.map_err(|failure| PublishError::from_connector(config.cursor_id, failure))
            }
        }
    }

    async fn obtain_lock(&self, cursor_id: CursorId) -> Result<HeldLock, PublishError> {
        self.locks
            .obtain(cursor_id)
            .await?
            .ok_or_else(|| PublishError::LockUnavailable {
                resource: LockManager::resource_for(cursor_id),
            })
    }
}
