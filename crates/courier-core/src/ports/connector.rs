//! Connector port - destination 種別ごとの配送能力
//!
//! 1 つの `ConnectorKind` につき 1 つの `ConnectorFactory` を登録し、
//! factory が destination config から `Connector` を組み立てます。

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{
    ConnectorFailure, ConnectorKind, DeliveryOutcome, DestinationConfig, DestinationHandle,
    FormDefinition, Row,
};

/// Capability implemented once per destination type.
///
/// # 契約
/// - `prepare` は冪等。top-level と repeating group ごとの sub-resource を作り、
///   element → sub-resource の対応を `DestinationHandle` に記録する
/// - `deliver` は all-or-nothing。失敗を返したバッチは未配送として扱われる
/// - `teardown` は `prepare` の逆（grant の取り消しなど）
#[async_trait]
pub trait Connector: Send + Sync {
    /// Batch-capable connectors receive all rows of a call at once.
    fn accepts_batches(&self) -> bool {
        false
    }

    async fn prepare(&self, form: &FormDefinition) -> Result<DestinationHandle, ConnectorFailure>;

    async fn deliver(&self, handle: &DestinationHandle, rows: &[Row]) -> DeliveryOutcome;

    /// Human-readable pointer to the destination (a URL, a sheet name, ...).
    fn describe_target(&self) -> String;

    /// `handle` is `None` when the destination was never prepared.
    async fn teardown(&self, handle: Option<&DestinationHandle>) -> Result<(), ConnectorFailure>;
}

/// Builds a connector for one destination from its stored config.
pub trait ConnectorFactory: Send + Sync {
    fn kind(&self) -> ConnectorKind;

    fn build(&self, config: &DestinationConfig) -> Result<Arc<dyn Connector>, ConnectorFailure>;
}
