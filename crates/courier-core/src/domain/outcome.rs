//! Delivery Outcome - connector が `deliver` の後に返す結果
//!
//! retry や status のことは知りません。
//! outcome を status 遷移に対応させ、watermark を進めるか決めるのは orchestrator です。

use serde::{Deserialize, Serialize};

use super::errors::{ConnectorFailure, FailureKind};

/// Result of delivering one unit (a submission, or a whole batch).
///
/// - `Success`: every row of the unit was durably accepted.
/// - `TransientFailure`: nothing should be considered delivered; try again later.
/// - `CredentialFailure`: the destination rejected the stored authorization.
/// - `PermanentFailure`: retrying the same rows will not help.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "reason", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryOutcome {
    Success,
    TransientFailure(String),
    CredentialFailure(String),
    PermanentFailure(String),
}

impl DeliveryOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, DeliveryOutcome::Success)
    }

    /// The failure half of the outcome, if any.
    pub fn into_failure(self) -> Option<ConnectorFailure> {
        let (kind, reason) = match self {
            DeliveryOutcome::Success => return None,
            DeliveryOutcome::TransientFailure(r) => (FailureKind::Transient, r),
            DeliveryOutcome::CredentialFailure(r) => (FailureKind::Credential, r),
            DeliveryOutcome::PermanentFailure(r) => (FailureKind::Permanent, r),
        };
        Some(ConnectorFailure { kind, reason })
    }
}

impl From<ConnectorFailure> for DeliveryOutcome {
    fn from(failure: ConnectorFailure) -> Self {
        match failure.kind {
            FailureKind::Transient => DeliveryOutcome::TransientFailure(failure.reason),
            FailureKind::Credential => DeliveryOutcome::CredentialFailure(failure.reason),
            FailureKind::Permanent => DeliveryOutcome::PermanentFailure(failure.reason),
        }
    }
}
