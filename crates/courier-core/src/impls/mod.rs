//! Impls - 実装（開発用・テスト用）
//!
//! このモジュールには ports の実装を含めます。
//!
//! # 含まれる実装
//! - **InMemoryCursorStore**: cursor record と destination config のペアを保持
//! - **InMemoryTaskLock**: 期限付きの名前付きロック
//! - **InMemorySubmissionSource**: form 定義と submission
//! - **MemoryConnector**: スクリプト可能な connector
//! - **JsonServerConnector**: HTTP で JSON を POST する connector
//!
//! # 本番用実装
//! datastore 側の実装（CursorStore / TaskLock / SubmissionSource）は別クレートに置き、
//! `PublisherBuilder` に差し込みます。

pub mod inmem_lock;
pub mod inmem_store;
pub mod inmem_submissions;
pub mod json_server;
pub mod memory_connector;

// 主要な型を再エクスポート
pub use self::inmem_lock::InMemoryTaskLock;
pub use self::inmem_store::InMemoryCursorStore;
pub use self::inmem_submissions::InMemorySubmissionSource;
pub use self::json_server::{JsonServerConnector, JsonServerConnectorFactory, JsonServerSettings};
pub use self::memory_connector::{DeliveredRow, MemoryConnector, MemoryConnectorFactory};
