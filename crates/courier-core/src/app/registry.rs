//! ConnectorRegistry - `ConnectorKind` をキーにした connector factory の dispatch table
//!
//! # 学習ポイント
//! - HashMap での型消去された trait object の管理
//! - Arc による共有所有権

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::{ConnectorFailure, ConnectorKind, DestinationConfig};
use crate::ports::{Connector, ConnectorFactory};

/// RegistryError は ConnectorRegistry の操作エラー
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("connector factory for kind '{0}' is already registered")]
    AlreadyRegistered(ConnectorKind),
}

#[derive(Default)]
pub struct ConnectorRegistry {
    factories: HashMap<ConnectorKind, Arc<dyn ConnectorFactory>>,
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, factory: Arc<dyn ConnectorFactory>) -> Result<(), RegistryError> {
        let kind = factory.kind();
        if self.factories.contains_key(&kind) {
            return Err(RegistryError::AlreadyRegistered(kind));
        }
        self.factories.insert(kind, factory);
        Ok(())
    }

    pub fn get(&self, kind: ConnectorKind) -> Option<Arc<dyn ConnectorFactory>> {
        self.factories.get(&kind).cloned()
    }

    /// Build the connector for one destination. `None` when the kind is unregistered.
    pub fn build(
        &self,
        config: &DestinationConfig,
    ) -> Option<Result<Arc<dyn Connector>, ConnectorFailure>> {
        self.factories.get(&config.kind).map(|f| f.build(config))
    }

    pub fn registered_kinds(&self) -> Vec<ConnectorKind> {
        let mut kinds: Vec<_> = self.factories.keys().copied().collect();
        kinds.sort();
        kinds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::{JsonServerConnectorFactory, MemoryConnector, MemoryConnectorFactory};

    #[test]
    fn duplicate_kind_is_rejected() {
        let mut registry = ConnectorRegistry::new();
        registry
            .register(Arc::new(JsonServerConnectorFactory::new().unwrap()))
            .unwrap();

        let err = registry
            .register(Arc::new(MemoryConnectorFactory::new(
                ConnectorKind::JsonServer,
                MemoryConnector::new("dup"),
            )))
            .unwrap_err();
        assert!(matches!(err, RegistryError::AlreadyRegistered(ConnectorKind::JsonServer)));
    }

    #[test]
    fn registered_kinds_are_sorted() {
        let mut registry = ConnectorRegistry::new();
        for kind in [ConnectorKind::RedcapServer, ConnectorKind::GoogleSpreadsheet] {
            registry
                .register(Arc::new(MemoryConnectorFactory::new(
                    kind,
                    MemoryConnector::new(kind.as_str()),
                )))
                .unwrap();
        }
        assert_eq!(
            registry.registered_kinds(),
            [ConnectorKind::GoogleSpreadsheet, ConnectorKind::RedcapServer]
        );
        assert!(registry.get(ConnectorKind::JsonServer).is_none());
    }
}
