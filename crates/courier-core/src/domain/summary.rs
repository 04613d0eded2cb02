//! Read-only operator view of a destination.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::cursor::CursorRecord;
use super::ids::CursorId;
use super::kind::{ConnectorKind, PublicationMode};
use super::status::OperationalStatus;
use super::submission::FormId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublisherSummary {
    pub cursor_id: CursorId,
    pub form_id: FormId,
    pub kind: ConnectorKind,
    pub mode: PublicationMode,
    pub status: OperationalStatus,
    pub established_at: DateTime<Utc>,
    pub last_upload_at: Option<DateTime<Utc>>,
    pub last_stream_at: Option<DateTime<Utc>>,
    pub upload_completed: bool,
    pub target: String,
}

impl PublisherSummary {
    pub fn from_record(record: &CursorRecord, target: String) -> Self {
        Self {
            cursor_id: record.id(),
            form_id: record.form_id().clone(),
            kind: record.kind(),
            mode: record.mode(),
            status: record.status(),
            established_at: record.established_at(),
            last_upload_at: record.upload_cursor().map(|wm| wm.timestamp),
            last_stream_at: record.stream_cursor().map(|wm| wm.timestamp),
            upload_completed: record.is_upload_completed(),
            target,
        }
    }
}
