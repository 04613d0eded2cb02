//! courier-core
//!
//! Form submission を外部サービス（スプレッドシート、JSON サーバーなど）へ複製する
//! publication engine のコア。
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, status machine, cursor record, submission, outcome, errors）
//! - **ports**: 抽象化レイヤー（CursorStore, TaskLock, SubmissionSource, Connector, Clock）
//! - **app**: アプリケーションロジック（orchestrator, deletion, upload worker, watchdog, builder）
//! - **impls**: 実装（in-memory ports、MemoryConnector、JsonServerConnector）
//! - **config**: 階層化された設定

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;
