//! Watchdog - しばらく触られていない destination を定期的に re-drive する
//!
//! # 1 回の sweep
//! 1. `list_older_than(now - publishing_delay)`
//! 2. 未 prepare の cursor は飛ばす（Active / ActiveRetry なら prepare を再試行）
//! 3. Paused / ActivePause は backoff が過ぎていれば ActiveRetry へ
//! 4. 配送可能な cursor には UploadWorker の pass を最大 `max_batches_per_sweep` 回
//!
//! 1 つの destination の失敗で sweep 全体を止めない。

use std::sync::Arc;

use chrono::Duration as ChronoDuration;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::orchestrator::PublishOrchestrator;
use super::upload_worker::UploadWorker;
use crate::config::SweepConfig;
use crate::domain::{CursorRecord, OperationalStatus, PublishError};
use crate::ports::{Clock, CursorStore};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub examined: usize,
    pub skipped: usize,
    pub resumed: usize,
    pub passes: usize,
    pub delivered: usize,
    pub failures: usize,
    /// Some destination still had a full page pending when its pass budget ran out.
    pub backlog: bool,
}

pub struct Watchdog {
    store: Arc<dyn CursorStore>,
    orchestrator: Arc<PublishOrchestrator>,
    worker: Arc<UploadWorker>,
    clock: Arc<dyn Clock>,
    sweep: SweepConfig,
}

impl Watchdog {
    pub fn new(
        store: Arc<dyn CursorStore>,
        orchestrator: Arc<PublishOrchestrator>,
        worker: Arc<UploadWorker>,
        clock: Arc<dyn Clock>,
        sweep: SweepConfig,
    ) -> Self {
        Self {
            store,
            orchestrator,
            worker,
            clock,
            sweep,
        }
    }

    pub async fn sweep(&self) -> Result<SweepReport, PublishError> {
        let now = self.clock.now();
        let cutoff = now
            .checked_sub_signed(to_chrono(self.sweep.publishing_delay()))
            .unwrap_or(now);
        let records = self.store.list_older_than(cutoff).await?;
        let mut report = SweepReport::default();

        for record in records {
            report.examined += 1;
            if let Err(e) = self.visit(&record, &mut report).await {
                report.failures += 1;
                warn!(
                    cursor_id = %record.id(),
                    form_id = %record.form_id(),
                    status = %record.status(),
                    error = %e,
                    retryable = e.is_retryable(),
                    "sweep failed for destination"
                );
            }
        }

        if report.passes > 0 || report.failures > 0 {
            info!(
                examined = report.examined,
                passes = report.passes,
                delivered = report.delivered,
                failures = report.failures,
                "watchdog sweep finished"
            );
        }
        Ok(report)
    }

    async fn visit(
        &self,
        record: &CursorRecord,
        report: &mut SweepReport,
    ) -> Result<(), PublishError> {
        let cursor_id = record.id();
        let mut status = record.status();

        // Established のままの cursor は initiate 待ち。それ以外は prepare をやり直す
        if !record.is_prepared() {
            if status == OperationalStatus::Established || !status.permits_delivery() {
                report.skipped += 1;
                return Ok(());
            }
            status = self.orchestrator.initiate(cursor_id).await?;
        }

        if status.is_paused() {
            let backoff = match status {
                OperationalStatus::ActivePause => self.sweep.active_pause_backoff(),
                _ => self.sweep.paused_backoff(),
            };
            let due = record
                .last_updated_at()
                .checked_add_signed(to_chrono(backoff));
            if due.is_none_or(|due| due > self.clock.now()) {
                debug!(cursor_id = %cursor_id, status = %status, "still backing off");
                report.skipped += 1;
                return Ok(());
            }
            status = self.orchestrator.resume_after_backoff(cursor_id).await?;
            report.resumed += 1;
            info!(cursor_id = %cursor_id, status = %status, "resumed after backoff");
        }

        if !status.permits_delivery() {
            report.skipped += 1;
            return Ok(());
        }

        for _ in 0..self.sweep.max_batches_per_sweep {
            let pass = self.worker.run_once(cursor_id, true).await?;
            report.passes += 1;
            report.delivered += pass.delivered();
            if !pass.more {
                return Ok(());
            }
        }
        report.backlog = true;
        Ok(())
    }

    /// Sweep every `interval` until shutdown is requested.
    pub fn spawn(self: Arc<Self>) -> WatchdogHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let interval = self.sweep.interval();

        let join = tokio::spawn(async move {
            loop {
                if *shutdown_rx.borrow() {
                    break;
                }
                if let Err(e) = self.sweep().await {
                    warn!(error = %e, "watchdog sweep failed");
                }
                tokio::select! {
                    _ = shutdown_rx.changed() => {}
                    _ = tokio::time::sleep(interval) => {}
                }
            }
            debug!("watchdog stopped");
        });

        WatchdogHandle { shutdown_tx, join }
    }
}

fn to_chrono(d: std::time::Duration) -> ChronoDuration {
    ChronoDuration::from_std(d).unwrap_or(ChronoDuration::MAX)
}

/// Running watchdog loop.
/// - `shutdown_and_join()` で次の sweep の前に止まる（実行中の sweep は最後まで走る）
pub struct WatchdogHandle {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl WatchdogHandle {
    pub fn request_shutdown(&self) {
        // ignore send error: the loop may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        let _ = self.join.await;
    }
}
