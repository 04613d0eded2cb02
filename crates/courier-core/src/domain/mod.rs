//! Domain model (IDs, cursor record, status machine, submissions, outcomes, errors).
//!
//! ストレージやネットワークに依存しない純粋なモデルのみを置きます。
//! - ids: 型付き ULID
//! - kind: connector の種類と publication mode
//! - status: operational status machine
//! - cursor: cursor record と watermark
//! - destination: cursor と対になる connector 固有レコード
//! - submission: form / submission の読み取り専用モデル

pub mod cursor;
pub mod destination;
pub mod errors;
pub mod ids;
pub mod kind;
pub mod outcome;
pub mod status;
pub mod submission;
pub mod summary;

// 主要な型を再エクスポート
pub use self::cursor::{CursorRecord, Pass, Watermark};
pub use self::destination::{DestinationConfig, DestinationHandle};
pub use self::errors::{
    ConnectorFailure, CursorError, DatastoreError, ErrorKind, FailureKind, PublishError,
};
pub use self::ids::{CursorId, DestinationId, LockId};
pub use self::kind::{ConnectorKind, PublicationMode};
pub use self::outcome::DeliveryOutcome;
pub use self::status::{OperationalStatus, StatusEvent, TransitionContext, TransitionError};
pub use self::submission::{
    ElementId, FormDefinition, FormElement, FormId, Row, Submission, SubmissionKey,
};
pub use self::summary::PublisherSummary;
