//! Operational Status - destination の稼働状態マシン
//!
//! `transition(current, event, ctx)` は純粋関数で、ストレージに触れません。
//! 呼び出すのは `CursorRecord` だけなので、status はこの関数経由でしか変化しません。
//!
//! 状態遷移:
//! - Established -> Active（prepare 成功）
//! - Active <-> ActiveRetry（一時的な失敗 / 次の成功）
//! - Active -> ActivePause、それ以外の live な状態 -> Paused（pause 要求）
//! - Paused | ActivePause -> ActiveRetry（watchdog の backoff 経過）
//! - live な状態 -> BadCredentials（認証情報の拒否）
//! - Active -> Completed（upload-only の backlog が尽きた）
//! - Completed 以外 -> Abandoned

use std::fmt;

use serde::{Deserialize, Serialize};

use super::kind::PublicationMode;

/// Health / lifecycle state of a destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationalStatus {
    /// Just configured, not yet prepared.
    Established,

    /// Healthy, deliveries flowing.
    Active,

    /// A transient failure occurred; the next re-drive retries.
    ActiveRetry,

    /// Paused by a user or by the system.
    Paused,

    /// Paused while delivery was mid-flight; resumes to Active.
    ActivePause,

    /// Destination rejected the stored authorization. Needs a human.
    BadCredentials,

    /// Upload-only backlog drained (terminal).
    Completed,

    /// Cancelled by the user (terminal).
    Abandoned,
}

impl OperationalStatus {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OperationalStatus::Completed | OperationalStatus::Abandoned
        )
    }

    /// May the orchestrator contact the connector in this state?
    pub fn permits_delivery(self) -> bool {
        matches!(
            self,
            OperationalStatus::Established
                | OperationalStatus::Active
                | OperationalStatus::ActiveRetry
        )
    }

    /// Is this one of the paused states the watchdog may resume?
    pub fn is_paused(self) -> bool {
        matches!(
            self,
            OperationalStatus::Paused | OperationalStatus::ActivePause
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OperationalStatus::Established => "ESTABLISHED",
            OperationalStatus::Active => "ACTIVE",
            OperationalStatus::ActiveRetry => "ACTIVE_RETRY",
            OperationalStatus::Paused => "PAUSED",
            OperationalStatus::ActivePause => "ACTIVE_PAUSE",
            OperationalStatus::BadCredentials => "BAD_CREDENTIALS",
            OperationalStatus::Completed => "COMPLETED",
            OperationalStatus::Abandoned => "ABANDONED",
        }
    }
}

impl fmt::Display for OperationalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs to the status machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusEvent {
    RequestPause,
    RecordSuccess,
    RecordRetry,
    RecordCredentialFailure,
    CompleteIfUploadOnly,
    ResumeAfterBackoff,
    Abandon,
}

impl fmt::Display for StatusEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StatusEvent::RequestPause => "request_pause",
            StatusEvent::RecordSuccess => "record_success",
            StatusEvent::RecordRetry => "record_retry",
            StatusEvent::RecordCredentialFailure => "record_credential_failure",
            StatusEvent::CompleteIfUploadOnly => "complete_if_upload_only",
            StatusEvent::ResumeAfterBackoff => "resume_after_backoff",
            StatusEvent::Abandon => "abandon",
        };
        f.write_str(name)
    }
}

/// Cursor facts the `CompleteIfUploadOnly` guard needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionContext {
    pub mode: PublicationMode,
    pub upload_completed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("{event} rejected: status {status} is terminal")]
    Terminal {
        status: OperationalStatus,
        event: StatusEvent,
    },
}

/// Compute the next status.
///
/// Events that do not apply to the current (non-terminal) state leave it unchanged.
/// Abandon is idempotent on both terminal states.
pub fn transition(
    current: OperationalStatus,
    event: StatusEvent,
    ctx: TransitionContext,
) -> Result<OperationalStatus, TransitionError> {
    use OperationalStatus::*;

    if current.is_terminal() {
        return match event {
            StatusEvent::Abandon => Ok(current),
            _ => Err(TransitionError::Terminal {
                status: current,
                event,
            }),
        };
    }

    let next = match event {
        StatusEvent::RequestPause => match current {
            Active => ActivePause,
            _ => Paused,
        },
        StatusEvent::RecordSuccess => Active,
        StatusEvent::RecordRetry => match current {
            BadCredentials => BadCredentials,
            _ => ActiveRetry,
        },
        StatusEvent::RecordCredentialFailure => BadCredentials,
        StatusEvent::CompleteIfUploadOnly => {
            if current == Active
                && ctx.mode == PublicationMode::UploadOnly
                && ctx.upload_completed
            {
                Completed
            } else {
                current
            }
        }
        StatusEvent::ResumeAfterBackoff => {
            if current.is_paused() {
                ActiveRetry
            } else {
                current
            }
        }
        StatusEvent::Abandon => Abandoned,
    };
    Ok(next)
}
