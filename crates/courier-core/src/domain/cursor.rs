//! Cursor Record - destination ごとの複製位置と稼働状態
//!
//! 1 レコード = 1 (form, destination)。
//! - `upload_cursor` / `stream_cursor` は (timestamp, key) 順で単調増加する watermark
//! - `status` は `status::transition` 経由でのみ変化する（フィールドは private）
//! - `kind` は作成後に変更できない

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::CursorError;
use super::ids::{CursorId, DestinationId};
use super::kind::{ConnectorKind, PublicationMode};
use super::status::{transition, OperationalStatus, StatusEvent, TransitionContext, TransitionError};
use super::submission::{FormId, SubmissionKey};

/// Replication position: the last delivered submission's (completion time, key).
///
/// Field order matters: the derived `Ord` compares timestamp first, then key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Watermark {
    pub timestamp: DateTime<Utc>,
    pub key: SubmissionKey,
}

impl Watermark {
    pub fn new(timestamp: DateTime<Utc>, key: SubmissionKey) -> Self {
        Self { timestamp, key }
    }
}

impl fmt::Display for Watermark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.timestamp.to_rfc3339(), self.key)
    }
}

/// Which replication pass a delivery belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pass {
    /// One-shot drain of the backlog that existed at establishment.
    Upload,
    /// Submissions completed after establishment, as they arrive.
    Stream,
}

impl Pass {
    pub fn from_streaming(streaming: bool) -> Self {
        if streaming { Pass::Stream } else { Pass::Upload }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CursorRecord {
    id: CursorId,
    destination_id: DestinationId,
    form_id: FormId,
    kind: ConnectorKind,
    mode: PublicationMode,
    prepared: bool,
    status: OperationalStatus,
    established_at: DateTime<Utc>,
    upload_cursor: Option<Watermark>,
    stream_cursor: Option<Watermark>,
    upload_completed: bool,
    last_updated_at: DateTime<Utc>,
}

impl CursorRecord {
    /// A freshly configured destination: `Established`, unprepared, no watermarks.
    pub fn new(
        id: CursorId,
        destination_id: DestinationId,
        form_id: FormId,
        kind: ConnectorKind,
        mode: PublicationMode,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            destination_id,
            form_id,
            kind,
            mode,
            prepared: false,
            status: OperationalStatus::Established,
            established_at: now,
            upload_cursor: None,
            stream_cursor: None,
            upload_completed: false,
            last_updated_at: now,
        }
    }

    pub fn id(&self) -> CursorId {
        self.id
    }

    pub fn destination_id(&self) -> DestinationId {
        self.destination_id
    }

    pub fn form_id(&self) -> &FormId {
        &self.form_id
    }

    pub fn kind(&self) -> ConnectorKind {
        self.kind
    }

    pub fn mode(&self) -> PublicationMode {
        self.mode
    }

    pub fn is_prepared(&self) -> bool {
        self.prepared
    }

    pub fn status(&self) -> OperationalStatus {
        self.status
    }

    pub fn established_at(&self) -> DateTime<Utc> {
        self.established_at
    }

    pub fn upload_cursor(&self) -> Option<&Watermark> {
        self.upload_cursor.as_ref()
    }

    pub fn stream_cursor(&self) -> Option<&Watermark> {
        self.stream_cursor.as_ref()
    }

    pub fn is_upload_completed(&self) -> bool {
        self.upload_completed
    }

    pub fn last_updated_at(&self) -> DateTime<Utc> {
        self.last_updated_at
    }

    pub fn watermark(&self, pass: Pass) -> Option<&Watermark> {
        match pass {
            Pass::Upload => self.upload_cursor.as_ref(),
            Pass::Stream => self.stream_cursor.as_ref(),
        }
    }

    /// Has `wm` already been delivered on this pass?
    pub fn covers(&self, pass: Pass, wm: &Watermark) -> bool {
        self.watermark(pass).is_some_and(|current| wm <= current)
    }

    /// Move a watermark forward. Re-applying the current position is accepted.
    pub fn advance(&mut self, pass: Pass, wm: Watermark) -> Result<(), CursorError> {
        let slot = match pass {
            Pass::Upload => &mut self.upload_cursor,
            Pass::Stream => &mut self.stream_cursor,
        };
        if let Some(current) = slot.as_ref() {
            if wm < *current {
                return Err(CursorError::Regression {
                    pass,
                    current: current.clone(),
                    proposed: wm,
                });
            }
        }
        *slot = Some(wm);
        Ok(())
    }

    pub fn mark_prepared(&mut self) {
        self.prepared = true;
    }

    pub fn mark_upload_completed(&mut self) {
        self.upload_completed = true;
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_updated_at = now;
    }

    // ========================================
    // status transitions
    // ========================================

    fn apply(&mut self, event: StatusEvent) -> Result<OperationalStatus, TransitionError> {
        let ctx = TransitionContext {
            mode: self.mode,
            upload_completed: self.upload_completed,
        };
        self.status = transition(self.status, event, ctx)?;
        Ok(self.status)
    }

    pub fn request_pause(&mut self) -> Result<OperationalStatus, TransitionError> {
        self.apply(StatusEvent::RequestPause)
    }

    pub fn record_success(&mut self) -> Result<OperationalStatus, TransitionError> {
        self.apply(StatusEvent::RecordSuccess)
    }

    pub fn record_retry(&mut self) -> Result<OperationalStatus, TransitionError> {
        self.apply(StatusEvent::RecordRetry)
    }

    pub fn record_credential_failure(&mut self) -> Result<OperationalStatus, TransitionError> {
        self.apply(StatusEvent::RecordCredentialFailure)
    }

    pub fn complete_if_upload_only(&mut self) -> Result<OperationalStatus, TransitionError> {
        self.apply(StatusEvent::CompleteIfUploadOnly)
    }

    pub fn resume_after_backoff(&mut self) -> Result<OperationalStatus, TransitionError> {
        self.apply(StatusEvent::ResumeAfterBackoff)
    }

    pub fn abandon(&mut self) -> Result<OperationalStatus, TransitionError> {
        self.apply(StatusEvent::Abandon)
    }
}
