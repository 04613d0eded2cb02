//! Ports - 抽象化レイヤー
//!
//! このモジュールは Hexagonal Architecture の「ポート」を定義します。
//! 各 trait は外部の協調者（datastore, 分散ロック, submission モデル, 配送先）への
//! インターフェースを提供し、実装の詳細を隠蔽します。
//!
//! # 設計原則
//! - datastore が cursor record の正本（source of truth）
//! - プロセス間の調整は datastore と task lock だけで行う（共有メモリなし）
//! - connector は destination 種別ごとの差し替え可能な実装

pub mod clock;
pub mod connector;
pub mod datastore;
pub mod id_generator;
pub mod submission_source;
pub mod task_lock;

// 主要な trait を再エクスポート
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::connector::{Connector, ConnectorFactory};
pub use self::datastore::CursorStore;
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::submission_source::{SubmissionQuery, SubmissionSource};
pub use self::task_lock::TaskLock;
