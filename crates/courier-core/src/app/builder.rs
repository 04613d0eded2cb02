//! PublisherBuilder - ports と connector をワイヤリングして `Publisher` を作る
//!
//! # Fail-fast
//! - 必須の協調者（store, lock, submission source）が欠けていれば `build()` でエラー
//! - `expect_kinds()` で指定した connector kind が未登録ならエラー

use std::sync::Arc;

use super::publisher::Publisher;
use super::registry::{ConnectorRegistry, RegistryError};
use crate::config::PublisherConfig;
use crate::domain::ConnectorKind;
use crate::ports::{
    Clock, ConnectorFactory, CursorStore, IdGenerator, SubmissionSource, SystemClock, TaskLock,
    UlidGenerator,
};

/// # 使用例
/// ```ignore
/// let publisher = PublisherBuilder::new()
///     .store(store)
///     .task_lock(locks)
///     .submissions(source)
///     .register_connector(Arc::new(JsonServerConnectorFactory::new()?))?
///     .expect_kinds(&[ConnectorKind::JsonServer])
///     .build()?;
/// ```
pub struct PublisherBuilder {
    store: Option<Arc<dyn CursorStore>>,
    locks: Option<Arc<dyn TaskLock>>,
    submissions: Option<Arc<dyn SubmissionSource>>,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
    registry: ConnectorRegistry,
    expected_kinds: Option<Vec<ConnectorKind>>,
    config: PublisherConfig,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("missing collaborator: {0}")]
    MissingCollaborator(&'static str),

    #[error("missing connector kinds: {0:?}. These kinds were expected but not registered.")]
    MissingConnectors(Vec<ConnectorKind>),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl PublisherBuilder {
    pub fn new() -> Self {
        Self {
            store: None,
            locks: None,
            submissions: None,
            clock: None,
            ids: None,
            registry: ConnectorRegistry::new(),
            expected_kinds: None,
            config: PublisherConfig::default(),
        }
    }

    pub fn store(mut self, store: Arc<dyn CursorStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn task_lock(mut self, locks: Arc<dyn TaskLock>) -> Self {
        self.locks = Some(locks);
        self
    }

    pub fn submissions(mut self, submissions: Arc<dyn SubmissionSource>) -> Self {
        self.submissions = Some(submissions);
        self
    }

    /// Defaults to `SystemClock`.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Defaults to a `UlidGenerator` over the builder's clock.
    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn config(mut self, config: PublisherConfig) -> Self {
        self.config = config;
        self
    }

    pub fn register_connector(
        mut self,
        factory: Arc<dyn ConnectorFactory>,
    ) -> Result<Self, BuildError> {
        self.registry.register(factory)?;
        Ok(self)
    }

    pub fn expect_kinds(mut self, kinds: &[ConnectorKind]) -> Self {
        self.expected_kinds = Some(kinds.to_vec());
        self
    }

    pub fn build(self) -> Result<Publisher, BuildError> {
        if let Some(expected) = &self.expected_kinds {
            let registered = self.registry.registered_kinds();
            let missing: Vec<ConnectorKind> = expected
                .iter()
                .filter(|k| !registered.contains(k))
                .copied()
                .collect();
            if !missing.is_empty() {
                return Err(BuildError::MissingConnectors(missing));
            }
        }

        let store = self.store.ok_or(BuildError::MissingCollaborator("store"))?;
        let locks = self
            .locks
            .ok_or(BuildError::MissingCollaborator("task_lock"))?;
        let submissions = self
            .submissions
            .ok_or(BuildError::MissingCollaborator("submissions"))?;
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>);
        let ids = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(clock.clone())) as Arc<dyn IdGenerator>);

        Ok(Publisher::wire(
            store,
            locks,
            submissions,
            clock,
            ids,
            self.registry,
            self.config,
        ))
    }
}

impl Default for PublisherBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::{
        InMemoryCursorStore, InMemorySubmissionSource, InMemoryTaskLock, MemoryConnector,
        MemoryConnectorFactory,
    };

    fn with_ports() -> PublisherBuilder {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        PublisherBuilder::new()
            .store(Arc::new(InMemoryCursorStore::new()))
            .task_lock(Arc::new(InMemoryTaskLock::new(
                chrono::Duration::seconds(60),
                clock.clone(),
            )))
            .submissions(Arc::new(InMemorySubmissionSource::new()))
            .clock(clock)
    }

    fn memory_factory(kind: ConnectorKind) -> Arc<dyn ConnectorFactory> {
        Arc::new(MemoryConnectorFactory::new(kind, MemoryConnector::new("b")))
    }

    #[test]
    fn build_success() {
        let publisher = with_ports()
            .register_connector(memory_factory(ConnectorKind::JsonServer))
            .unwrap()
            .expect_kinds(&[ConnectorKind::JsonServer])
            .build();
        assert!(publisher.is_ok());
    }

    #[test]
    fn build_missing_connector_kinds() {
        let publisher = with_ports()
            .register_connector(memory_factory(ConnectorKind::JsonServer))
            .unwrap()
            .expect_kinds(&[ConnectorKind::JsonServer, ConnectorKind::GoogleSpreadsheet])
            .build();
        assert!(matches!(
            publisher,
            Err(BuildError::MissingConnectors(missing)) if missing == vec![ConnectorKind::GoogleSpreadsheet]
        ));
    }

    #[test]
    fn build_missing_store() {
        let publisher = PublisherBuilder::new()
            .submissions(Arc::new(InMemorySubmissionSource::new()))
            .build();
        assert!(matches!(
            publisher,
            Err(BuildError::MissingCollaborator("store"))
        ));
    }

    #[test]
    fn duplicate_connector_is_rejected() {
        let result = with_ports()
            .register_connector(memory_factory(ConnectorKind::JsonServer))
            .unwrap()
            .register_connector(memory_factory(ConnectorKind::JsonServer));
        assert!(matches!(result, Err(BuildError::Registry(_))));
    }
}
