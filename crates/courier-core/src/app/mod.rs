//! App - アプリケーション層
//!
//! このモジュールは、ports を組み合わせてアプリケーションロジックを実装します。
//!
//! # 主要コンポーネント
//! - **PublisherBuilder / Publisher**: 構築とワイヤリング、外部向けの入口
//! - **PublishOrchestrator**: cursor record に沿った配送と status 遷移
//! - **DeletionCoordinator**: task lock の下での撤去
//! - **UploadWorker**: 1 回分の re-drive pass
//! - **Watchdog**: 放置された destination の定期 sweep
//! - **ConnectorRegistry**: `ConnectorKind` ごとの factory

pub mod builder;
pub mod deletion;
pub mod locking;
pub mod orchestrator;
pub mod publisher;
pub mod registry;
pub mod retry;
pub mod status;
pub mod upload_worker;
pub mod watchdog;

#[cfg(test)]
pub(crate) mod testkit;

// 主要な型を再エクスポート
pub use self::builder::{BuildError, PublisherBuilder};
pub use self::deletion::DeletionCoordinator;
pub use self::locking::{HeldLock, LockManager, LockSettings};
pub use self::orchestrator::{PublishOrchestrator, PublishReport};
pub use self::publisher::Publisher;
pub use self::registry::{ConnectorRegistry, RegistryError};
pub use self::retry::RetryPolicy;
pub use self::status::{StatusCounts, StatusReport};
pub use self::upload_worker::{PassReport, UploadWorker};
pub use self::watchdog::{SweepReport, Watchdog, WatchdogHandle};
