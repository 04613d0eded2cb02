//! MemoryConnector - プロセス内に行を溜めるだけの connector（開発・テスト用）
//!
//! deliver / prepare / teardown の結果をスクリプトで差し込めます。
//! クローンは状態を共有するので、factory に渡した後もテストから中身を観察できます。

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{
    ConnectorFailure, ConnectorKind, DeliveryOutcome, DestinationConfig, DestinationHandle,
    FormDefinition, Row,
};
use crate::ports::{Connector, ConnectorFactory};

/// One accepted row and the sub-resource it was routed to.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveredRow {
    pub resource: String,
    pub row: Row,
}

#[derive(Default)]
struct State {
    delivered: Vec<DeliveredRow>,
    deliver_calls: usize,
    prepare_calls: usize,
    teardown_calls: usize,
    deliver_script: VecDeque<DeliveryOutcome>,
    prepare_script: VecDeque<ConnectorFailure>,
    teardown_script: VecDeque<ConnectorFailure>,
}

#[derive(Clone)]
pub struct MemoryConnector {
    name: String,
    batches: bool,
    deliver_delay: Option<Duration>,
    state: Arc<Mutex<State>>,
}

impl MemoryConnector {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            batches: false,
            deliver_delay: None,
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    pub fn with_batches(mut self, batches: bool) -> Self {
        self.batches = batches;
        self
    }

    /// Hold every `deliver` call for `delay` (simulates a slow destination).
    pub fn with_deliver_delay(mut self, delay: Duration) -> Self {
        self.deliver_delay = Some(delay);
        self
    }

    /// Queue outcomes for upcoming `deliver` calls. Once drained, deliveries succeed.
    pub async fn script_deliveries(&self, outcomes: impl IntoIterator<Item = DeliveryOutcome>) {
        self.state.lock().await.deliver_script.extend(outcomes);
    }

    /// Make the next `prepare` call fail.
    pub async fn fail_next_prepare(&self, failure: ConnectorFailure) {
        self.state.lock().await.prepare_script.push_back(failure);
    }

    /// Make the next `teardown` call fail.
    pub async fn fail_next_teardown(&self, failure: ConnectorFailure) {
        self.state.lock().await.teardown_script.push_back(failure);
    }

    pub async fn delivered(&self) -> Vec<DeliveredRow> {
        self.state.lock().await.delivered.clone()
    }

    pub async fn deliver_calls(&self) -> usize {
        self.state.lock().await.deliver_calls
    }

    pub async fn prepare_calls(&self) -> usize {
        self.state.lock().await.prepare_calls
    }

    pub async fn teardown_calls(&self) -> usize {
        self.state.lock().await.teardown_calls
    }

    fn target(&self) -> String {
        format!("memory://{}", self.name)
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    fn accepts_batches(&self) -> bool {
        self.batches
    }

    async fn prepare(&self, form: &FormDefinition) -> Result<DestinationHandle, ConnectorFailure> {
        let mut state = self.state.lock().await;
        state.prepare_calls += 1;
        if let Some(failure) = state.prepare_script.pop_front() {
            return Err(failure);
        }

        let target = self.target();
        let handle = form
            .repeat_groups
            .iter()
            .fold(DestinationHandle::new(target.clone()), |handle, group| {
                let resource = format!("{target}/{}", group.id);
                handle.with_sub_resource(group.id.clone(), resource)
            });
        Ok(handle)
    }

    async fn deliver(&self, handle: &DestinationHandle, rows: &[Row]) -> DeliveryOutcome {
        if let Some(delay) = self.deliver_delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().await;
        state.deliver_calls += 1;
        let outcome = state
            .deliver_script
            .pop_front()
            .unwrap_or(DeliveryOutcome::Success);
        if outcome.is_success() {
            state.delivered.extend(rows.iter().map(|row| DeliveredRow {
                resource: handle.route(&row.element).to_string(),
                row: row.clone(),
            }));
        }
        outcome
    }

    fn describe_target(&self) -> String {
        self.target()
    }

    async fn teardown(&self, _handle: Option<&DestinationHandle>) -> Result<(), ConnectorFailure> {
        let mut state = self.state.lock().await;
        state.teardown_calls += 1;
        match state.teardown_script.pop_front() {
            Some(failure) => Err(failure),
            None => Ok(()),
        }
    }
}

/// Hands out clones of one `MemoryConnector` for every destination of `kind`.
pub struct MemoryConnectorFactory {
    kind: ConnectorKind,
    connector: MemoryConnector,
}

impl MemoryConnectorFactory {
    pub fn new(kind: ConnectorKind, connector: MemoryConnector) -> Self {
        Self { kind, connector }
    }
}

impl ConnectorFactory for MemoryConnectorFactory {
    fn kind(&self) -> ConnectorKind {
        self.kind
    }

    fn build(&self, _config: &DestinationConfig) -> Result<Arc<dyn Connector>, ConnectorFailure> {
        Ok(Arc::new(self.connector.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ElementId, FormElement, FormId, SubmissionKey};

    fn form() -> FormDefinition {
        let element = |id: &str| FormElement {
            id: ElementId::new(id),
            name: id.into(),
            columns: vec!["value".into()],
        };
        FormDefinition {
            form_id: FormId::new("household"),
            title: "Household".into(),
            top_level: element("household"),
            repeat_groups: vec![element("members")],
        }
    }

    fn row(element: &str) -> Row {
        Row {
            submission: SubmissionKey::new("s1"),
            element: ElementId::new(element),
            values: serde_json::Map::new(),
        }
    }

    #[tokio::test]
    async fn prepare_creates_one_sub_resource_per_repeat_group() {
        let connector = MemoryConnector::new("sink");
        let handle = connector.prepare(&form()).await.unwrap();

        assert_eq!(handle.target, "memory://sink");
        assert_eq!(
            handle.sub_resources.get(&ElementId::new("members")).map(String::as_str),
            Some("memory://sink/members")
        );
        assert_eq!(handle.sub_resources.len(), 1);
    }

    #[tokio::test]
    async fn deliver_routes_rows_and_follows_script() {
        let connector = MemoryConnector::new("sink");
        let handle = connector.prepare(&form()).await.unwrap();
        connector
            .script_deliveries([DeliveryOutcome::TransientFailure("503".into())])
            .await;

        let rows = [row("household"), row("members")];
        assert_eq!(
            connector.deliver(&handle, &rows).await,
            DeliveryOutcome::TransientFailure("503".into())
        );
        assert!(connector.delivered().await.is_empty());

        assert_eq!(connector.deliver(&handle, &rows).await, DeliveryOutcome::Success);
        let delivered = connector.delivered().await;
        assert_eq!(delivered[0].resource, "memory://sink");
        assert_eq!(delivered[1].resource, "memory://sink/members");
        assert_eq!(connector.deliver_calls().await, 2);
    }

    #[tokio::test]
    async fn clones_share_state() {
        let connector = MemoryConnector::new("sink");
        let factory = MemoryConnectorFactory::new(ConnectorKind::GoogleSpreadsheet, connector.clone());
        let config = DestinationConfig {
            id: crate::domain::DestinationId::from_ulid(ulid::Ulid::new()),
            cursor_id: crate::domain::CursorId::from_ulid(ulid::Ulid::new()),
            form_id: FormId::new("household"),
            kind: ConnectorKind::GoogleSpreadsheet,
            settings: serde_json::Value::Null,
            handle: None,
        };

        let built = factory.build(&config).unwrap();
        built.teardown(None).await.unwrap();
        assert_eq!(connector.teardown_calls().await, 1);
    }
}
