//! Destination Config - connector 固有の設定。cursor record と 1:1 で対になる

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::ids::{CursorId, DestinationId};
use super::kind::ConnectorKind;
use super::submission::{ElementId, FormId};

/// What `Connector::prepare` produced: the remote top-level resource plus one
/// sub-resource per repeating group, keyed by form element.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DestinationHandle {
    pub target: String,
    #[serde(default)]
    pub sub_resources: BTreeMap<ElementId, String>,
}

impl DestinationHandle {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            sub_resources: BTreeMap::new(),
        }
    }

    pub fn with_sub_resource(mut self, element: ElementId, resource: impl Into<String>) -> Self {
        self.sub_resources.insert(element, resource.into());
        self
    }

    /// Resource that rows of `element` go to. Unknown elements fall back to the top level.
    pub fn route(&self, element: &ElementId) -> &str {
        self.sub_resources
            .get(element)
            .map(String::as_str)
            .unwrap_or(&self.target)
    }
}

/// Connector configuration (endpoint, credentials, ...) and prepared state.
///
/// `settings` is opaque to the engine; each connector factory decodes its own shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DestinationConfig {
    pub id: DestinationId,
    pub cursor_id: CursorId,
    pub form_id: FormId,
    pub kind: ConnectorKind,
    pub settings: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<DestinationHandle>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_prefers_sub_resource() {
        let handle = DestinationHandle::new("sheet-1")
            .with_sub_resource(ElementId::new("members"), "sheet-1/members");

        assert_eq!(handle.route(&ElementId::new("members")), "sheet-1/members");
        assert_eq!(handle.route(&ElementId::new("household")), "sheet-1");
    }
}
