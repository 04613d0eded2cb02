//! UploadWorker - 1 destination に対する 1 回分の re-drive pass
//!
//! mode から pass を選び、次のページを問い合わせて publish します。
//! - UploadOnly: backlog が尽きるまで upload
//! - StreamOnly: stream のみ
//! - UploadAndStream: upload が終わったら stream へ切り替え

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use super::orchestrator::{PublishOrchestrator, PublishReport};
use crate::config::BatchConfig;
use crate::domain::{CursorId, CursorRecord, Pass, PublicationMode, PublishError};
use crate::ports::{SubmissionQuery, SubmissionSource};

/// What one pass did, and whether another one is worth running right away.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PassReport {
    /// `None` when the destination was not eligible for delivery.
    pub publish: Option<PublishReport>,
    pub fetched: usize,
    pub more: bool,
}

impl PassReport {
    fn idle() -> Self {
        Self {
            publish: None,
            fetched: 0,
            more: false,
        }
    }

    pub fn delivered(&self) -> usize {
        self.publish.as_ref().map_or(0, |r| r.delivered)
    }
}

pub struct UploadWorker {
    orchestrator: Arc<PublishOrchestrator>,
    submissions: Arc<dyn SubmissionSource>,
    batch: BatchConfig,
}

impl UploadWorker {
    pub fn new(
        orchestrator: Arc<PublishOrchestrator>,
        submissions: Arc<dyn SubmissionSource>,
        batch: BatchConfig,
    ) -> Self {
        Self {
            orchestrator,
            submissions,
            batch,
        }
    }

    /// Which pass the destination needs next.
    pub fn next_pass(record: &CursorRecord) -> Pass {
        match record.mode() {
            PublicationMode::UploadOnly => Pass::Upload,
            PublicationMode::StreamOnly => Pass::Stream,
            PublicationMode::UploadAndStream if record.is_upload_completed() => Pass::Stream,
            PublicationMode::UploadAndStream => Pass::Upload,
        }
    }

    /// The next page of submissions for `pass`.
    ///
    /// Upload covers everything completed before establishment; stream covers
    /// everything from establishment on.
    pub fn query_for(record: &CursorRecord, pass: Pass, limit: usize) -> SubmissionQuery {
        let query = SubmissionQuery::new(record.form_id().clone(), limit)
            .after(record.watermark(pass).cloned());
        match pass {
            Pass::Upload => query.before(record.established_at()),
            Pass::Stream => query.not_before(record.established_at()),
        }
    }

    /// Run one pass. `background` selects the larger page size.
    pub async fn run_once(
        &self,
        cursor_id: CursorId,
        background: bool,
    ) -> Result<PassReport, PublishError> {
        let record = self.orchestrator.load(cursor_id).await?;
        if !record.is_prepared() || !record.status().permits_delivery() {
            debug!(cursor_id = %cursor_id, status = %record.status(), "pass skipped");
            return Ok(PassReport::idle());
        }

        let pass = Self::next_pass(&record);
        let limit = self.batch.limit(background);
        let page = self
            .submissions
            .query(&Self::query_for(&record, pass, limit))
            .await?;
        let fetched = page.len();

        let report = self
            .orchestrator
            .publish(cursor_id, page, pass == Pass::Stream)
            .await?;

        // ページが埋まっていれば続きがある。upload が終わった直後なら stream に移る
        let switched_to_stream = pass == Pass::Upload
            && record.mode() == PublicationMode::UploadAndStream
            && report.upload_completed;
        let more = report.attempted && (fetched == limit || switched_to_stream);

        debug!(
            cursor_id = %cursor_id,
            pass = ?pass,
            fetched,
            delivered = report.delivered,
            more,
            "pass finished"
        );
        Ok(PassReport {
            publish: Some(report),
            fetched,
            more,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::testkit::{submission, t0, Harness};
    use crate::domain::{ConnectorKind, DestinationId, FormId};
    use rstest::rstest;
    use ulid::Ulid;

    fn worker(h: &Harness) -> UploadWorker {
        UploadWorker::new(
            h.orchestrator.clone(),
            h.submissions.clone(),
            BatchConfig {
                foreground_limit: 2,
                background_multiplier: 2,
            },
        )
    }

    #[rstest]
    #[case(PublicationMode::UploadOnly, false, Pass::Upload)]
    #[case(PublicationMode::StreamOnly, false, Pass::Stream)]
    #[case(PublicationMode::UploadAndStream, false, Pass::Upload)]
    #[case(PublicationMode::UploadAndStream, true, Pass::Stream)]
    fn next_pass_follows_mode(
        #[case] mode: PublicationMode,
        #[case] upload_completed: bool,
        #[case] expected: Pass,
    ) {
        let mut record = CursorRecord::new(
            CursorId::from_ulid(Ulid::new()),
            DestinationId::from_ulid(Ulid::new()),
            FormId::new("household"),
            ConnectorKind::JsonServer,
            mode,
            t0(),
        );
        if upload_completed {
            record.mark_upload_completed();
        }
        assert_eq!(UploadWorker::next_pass(&record), expected);
    }

    #[tokio::test]
    async fn upload_then_stream() {
        let h = Harness::new().await;
        for s in [submission("a", -30), submission("b", -20), submission("s", 5)] {
            h.add(s).await;
        }
        let record = h.active_destination(PublicationMode::UploadAndStream).await;
        let worker = worker(&h);

        let first = worker.run_once(record.id(), false).await.unwrap();
        assert_eq!(first.fetched, 2);
        assert_eq!(first.delivered(), 2);
        assert!(first.publish.as_ref().unwrap().upload_completed);
        assert!(first.more);

        let second = worker.run_once(record.id(), false).await.unwrap();
        assert_eq!(second.publish.as_ref().unwrap().pass, Pass::Stream);
        assert_eq!(second.delivered(), 1);
        assert!(!second.more);

        let stored = h.orchestrator.load(record.id()).await.unwrap();
        assert_eq!(stored.stream_cursor(), Some(&submission("s", 5).watermark()));
        assert_eq!(stored.upload_cursor(), Some(&submission("b", -20).watermark()));
    }

    #[tokio::test]
    async fn full_page_asks_for_more() {
        let h = Harness::new().await;
        for (i, key) in ["a", "b", "c"].into_iter().enumerate() {
            h.add(submission(key, 1 + i as i64)).await;
        }
        let record = h.active_destination(PublicationMode::StreamOnly).await;
        let worker = worker(&h);

        let first = worker.run_once(record.id(), false).await.unwrap();
        assert!(first.more);
        let second = worker.run_once(record.id(), false).await.unwrap();
        assert_eq!(second.fetched, 1);
        assert!(!second.more);
        assert_eq!(h.connector.delivered().await.len(), 3);
    }

    #[tokio::test]
    async fn paused_destination_is_idle() {
        let h = Harness::new().await;
        h.add(submission("s", 5)).await;
        let record = h.active_destination(PublicationMode::StreamOnly).await;
        h.orchestrator.request_pause(record.id()).await.unwrap();

        let pass = worker(&h).run_once(record.id(), true).await.unwrap();
        assert!(pass.publish.is_none());
        assert_eq!(h.connector.deliver_calls().await, 0);
    }
}
