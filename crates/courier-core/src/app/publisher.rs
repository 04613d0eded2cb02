//! Publisher - 外部から使う入口
//!
//! orchestrator / deletion coordinator / upload worker / watchdog を 1 つにまとめます。
//! 組み立ては `PublisherBuilder` で行います。

use std::sync::Arc;

use tracing::{debug, warn};

use super::deletion::DeletionCoordinator;
use super::locking::LockManager;
use super::orchestrator::{PublishOrchestrator, PublishReport};
use super::registry::ConnectorRegistry;
use super::status::StatusReport;
use super::upload_worker::{PassReport, UploadWorker};
use super::watchdog::{SweepReport, Watchdog, WatchdogHandle};
use crate::config::PublisherConfig;
use crate::domain::{
    ConnectorKind, CursorId, CursorRecord, FormId, OperationalStatus, PublicationMode,
    PublishError, PublisherSummary, Submission,
};
use crate::ports::{Clock, CursorStore, IdGenerator, SubmissionSource, TaskLock};

pub struct Publisher {
    store: Arc<dyn CursorStore>,
    orchestrator: Arc<PublishOrchestrator>,
    deletion: DeletionCoordinator,
    worker: Arc<UploadWorker>,
    watchdog: Arc<Watchdog>,
    config: PublisherConfig,
}

impl Publisher {
    pub(crate) fn wire(
        store: Arc<dyn CursorStore>,
        locks: Arc<dyn TaskLock>,
        submissions: Arc<dyn SubmissionSource>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        registry: ConnectorRegistry,
        config: PublisherConfig,
    ) -> Self {
        let connectors = Arc::new(registry);
        let locks = Arc::new(LockManager::new(
            locks,
            ids.clone(),
            clock.clone(),
            config.lock.settings(),
        ));
        let orchestrator = Arc::new(PublishOrchestrator::new(
            store.clone(),
            submissions.clone(),
            clock.clone(),
            ids,
            connectors.clone(),
            locks.clone(),
        ));
        let deletion = DeletionCoordinator::new(store.clone(), connectors, locks);
        let worker = Arc::new(UploadWorker::new(
            orchestrator.clone(),
            submissions,
            config.batch.clone(),
        ));
        let watchdog = Arc::new(Watchdog::new(
            store.clone(),
            orchestrator.clone(),
            worker.clone(),
            clock,
            config.sweep.clone(),
        ));

        Self {
            store,
            orchestrator,
            deletion,
            worker,
            watchdog,
            config,
        }
    }

    pub fn config(&self) -> &PublisherConfig {
        &self.config
    }

    pub async fn create_destination(
        &self,
        form_id: FormId,
        kind: ConnectorKind,
        mode: PublicationMode,
        settings: serde_json::Value,
    ) -> Result<CursorRecord, PublishError> {
        self.orchestrator
            .create_destination(form_id, kind, mode, settings)
            .await
    }

    pub async fn initiate(&self, cursor_id: CursorId) -> Result<OperationalStatus, PublishError> {
        self.orchestrator.initiate(cursor_id).await
    }

    pub async fn publish(
        &self,
        cursor_id: CursorId,
        submissions: Vec<Submission>,
        streaming: bool,
    ) -> Result<PublishReport, PublishError> {
        self.orchestrator
            .publish(cursor_id, submissions, streaming)
            .await
    }

    pub async fn abandon(&self, cursor_id: CursorId) -> Result<OperationalStatus, PublishError> {
        self.orchestrator.abandon(cursor_id).await
    }

    pub async fn request_pause(
        &self,
        cursor_id: CursorId,
    ) -> Result<OperationalStatus, PublishError> {
        self.orchestrator.request_pause(cursor_id).await
    }

    pub async fn update_credentials(
        &self,
        cursor_id: CursorId,
        settings: serde_json::Value,
    ) -> Result<OperationalStatus, PublishError> {
        self.orchestrator
            .update_credentials(cursor_id, settings)
            .await
    }

    /// `Ok(false)` when the destination is locked by someone else; nothing was changed.
    pub async fn delete_destination(&self, cursor_id: CursorId) -> Result<bool, PublishError> {
        self.deletion.delete_destination(cursor_id).await
    }

    pub async fn describe_target(&self, cursor_id: CursorId) -> Result<String, PublishError> {
        self.orchestrator.describe_target(cursor_id).await
    }

    pub async fn summary(&self, cursor_id: CursorId) -> Result<PublisherSummary, PublishError> {
        self.orchestrator.summary(cursor_id).await
    }

    pub async fn status_report(&self, form_id: &FormId) -> Result<StatusReport, PublishError> {
        let summaries = self.orchestrator.summaries_for_form(form_id).await?;
        Ok(StatusReport::from_summaries(form_id.clone(), summaries))
    }

    /// A re-drive pass for one destination.
    pub async fn run_pass(
        &self,
        cursor_id: CursorId,
        background: bool,
    ) -> Result<PassReport, PublishError> {
        self.worker.run_once(cursor_id, background).await
    }

    /// A new submission arrived for `form_id`: run one foreground pass for every
    /// streaming destination of the form.
    ///
    /// 個々の submission を直接送らず、stream watermark からの続きとして送る。
    /// 失敗した destination は watchdog に任せる。
    pub async fn on_submission(&self, form_id: &FormId) -> Result<Vec<PassReport>, PublishError> {
        let records = self.store.list_for_form(form_id).await?;
        let mut passes = Vec::new();
        for record in records {
            if !record.mode().streams() || !record.status().permits_delivery() {
                continue;
            }
            match self.worker.run_once(record.id(), false).await {
                Ok(pass) => passes.push(pass),
                Err(e) => {
                    warn!(
                        cursor_id = %record.id(),
                        form_id = %form_id,
                        error = %e,
                        "foreground pass failed; leaving it to the watchdog"
                    );
                }
            }
        }
        debug!(form_id = %form_id, passes = passes.len(), "submission fan-out finished");
        Ok(passes)
    }

    pub async fn sweep(&self) -> Result<SweepReport, PublishError> {
        self.watchdog.sweep().await
    }

    /// Start the periodic watchdog on the current tokio runtime.
    pub fn spawn_watchdog(&self) -> WatchdogHandle {
        self.watchdog.clone().spawn()
    }
}
