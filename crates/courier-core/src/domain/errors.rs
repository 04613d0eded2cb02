//! Errors - エラー型と分類
//!
//! - `ConnectorFailure`: connector が返す失敗（prepare / teardown / factory）
//! - `DatastoreError`: 永続化層の失敗
//! - `CursorError`: watermark の巻き戻しなど、cursor の不変条件違反
//! - `PublishError`: orchestrator / coordinator が呼び出し元に返すエラー
//!
//! `PublishError::kind()` で運用分類（`ErrorKind`）に落とし込みます。

use thiserror::Error;

use super::cursor::{Pass, Watermark};
use super::ids::CursorId;
use super::kind::ConnectorKind;
use super::status::TransitionError;

/// ErrorKind は実行エラーの運用分類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// ネットワーク断・レート制限など。後で再実行すれば直る
    Transient,
    /// 認証情報が拒否された。人の対応が必要
    Credential,
    /// 再試行しても直らない
    Permanent,
    /// task lock を取得できなかった
    LockUnavailable,
    /// datastore の障害
    Datastore,
    NotFound,
    Configuration,
}

/// Failure classification shared by connectors and delivery outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    Transient,
    Credential,
    Permanent,
}

/// A connector operation other than `deliver` failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind:?} connector failure: {reason}")]
pub struct ConnectorFailure {
    pub kind: FailureKind,
    pub reason: String,
}

impl ConnectorFailure {
    pub fn transient(reason: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Transient,
            reason: reason.into(),
        }
    }

    pub fn credential(reason: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Credential,
            reason: reason.into(),
        }
    }

    pub fn permanent(reason: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Permanent,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DatastoreError {
    #[error("entity not found: {0}")]
    NotFound(String),

    #[error("entity already exists: {0}")]
    Conflict(String),

    #[error("datastore unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CursorError {
    #[error("{pass:?} cursor would move backwards from {current} to {proposed}")]
    Regression {
        pass: Pass,
        current: Watermark,
        proposed: Watermark,
    },
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("cursor not found: {0}")]
    NotFound(CursorId),

    #[error("destination config missing for cursor {0}")]
    DestinationMissing(CursorId),

    #[error("task lock unavailable for {resource}")]
    LockUnavailable { resource: String },

    #[error("no connector registered for kind={0}")]
    UnknownKind(ConnectorKind),

    #[error("transient failure on {cursor_id}: {reason}")]
    Transient { cursor_id: CursorId, reason: String },

    #[error("credentials rejected for {cursor_id}: {reason}")]
    Credential { cursor_id: CursorId, reason: String },

    #[error("permanent failure on {cursor_id}: {reason}")]
    Permanent { cursor_id: CursorId, reason: String },

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error(transparent)]
    Cursor(#[from] CursorError),

    #[error(transparent)]
    Datastore(#[from] DatastoreError),
}

impl PublishError {
    /// Lift a connector failure into the publish taxonomy.
    pub fn from_connector(cursor_id: CursorId, failure: ConnectorFailure) -> Self {
        let reason = failure.reason;
        match failure.kind {
            FailureKind::Transient => PublishError::Transient { cursor_id, reason },
            FailureKind::Credential => PublishError::Credential { cursor_id, reason },
            FailureKind::Permanent => PublishError::Permanent { cursor_id, reason },
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            PublishError::NotFound(_) | PublishError::DestinationMissing(_) => ErrorKind::NotFound,
            PublishError::LockUnavailable { .. } => ErrorKind::LockUnavailable,
            PublishError::UnknownKind(_) => ErrorKind::Configuration,
            PublishError::Transient { .. } => ErrorKind::Transient,
            PublishError::Credential { .. } => ErrorKind::Credential,
            PublishError::Permanent { .. }
            | PublishError::Transition(_)
            | PublishError::Cursor(_) => ErrorKind::Permanent,
            PublishError::Datastore(DatastoreError::NotFound(_)) => ErrorKind::NotFound,
            PublishError::Datastore(_) => ErrorKind::Datastore,
        }
    }

    /// Will re-invoking the same operation later plausibly succeed?
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Transient | ErrorKind::LockUnavailable | ErrorKind::Datastore
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use ulid::Ulid;

    fn cursor_id() -> CursorId {
        CursorId::from_ulid(Ulid::nil())
    }

    #[rstest]
    #[case::transient(ConnectorFailure::transient("timeout"), ErrorKind::Transient, true)]
    #[case::credential(ConnectorFailure::credential("401"), ErrorKind::Credential, false)]
    #[case::permanent(ConnectorFailure::permanent("bad schema"), ErrorKind::Permanent, false)]
    fn connector_failures_keep_their_class(
        #[case] failure: ConnectorFailure,
        #[case] kind: ErrorKind,
        #[case] retryable: bool,
    ) {
        let err = PublishError::from_connector(cursor_id(), failure);
        assert_eq!(err.kind(), kind);
        assert_eq!(err.is_retryable(), retryable);
    }

    #[test]
    fn lock_and_datastore_errors_are_retryable() {
        let lock = PublishError::LockUnavailable {
            resource: "fsc-x".into(),
        };
        assert!(lock.is_retryable());

        let down = PublishError::from(DatastoreError::Unavailable("pg".into()));
        assert_eq!(down.kind(), ErrorKind::Datastore);
        assert!(down.is_retryable());

        let missing = PublishError::from(DatastoreError::NotFound("fsc-x".into()));
        assert_eq!(missing.kind(), ErrorKind::NotFound);
        assert!(!missing.is_retryable());
    }
}
