//! Connector kind and publication mode.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Which connector variant owns a cursor record.
///
/// Closed set: adding a destination type means adding a variant here and registering
/// a factory for it in the `ConnectorRegistry`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectorKind {
    GoogleSpreadsheet,
    GoogleFusionTables,
    GoogleMapsEngine,
    JsonServer,
    OhmageJsonServer,
    RedcapServer,
}

impl ConnectorKind {
    pub const ALL: [ConnectorKind; 6] = [
        ConnectorKind::GoogleSpreadsheet,
        ConnectorKind::GoogleFusionTables,
        ConnectorKind::GoogleMapsEngine,
        ConnectorKind::JsonServer,
        ConnectorKind::OhmageJsonServer,
        ConnectorKind::RedcapServer,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ConnectorKind::GoogleSpreadsheet => "GOOGLE_SPREADSHEET",
            ConnectorKind::GoogleFusionTables => "GOOGLE_FUSION_TABLES",
            ConnectorKind::GoogleMapsEngine => "GOOGLE_MAPS_ENGINE",
            ConnectorKind::JsonServer => "JSON_SERVER",
            ConnectorKind::OhmageJsonServer => "OHMAGE_JSON_SERVER",
            ConnectorKind::RedcapServer => "REDCAP_SERVER",
        }
    }
}

impl fmt::Display for ConnectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which replication passes a destination runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PublicationMode {
    /// Drain the backlog that existed at establishment, then complete.
    UploadOnly,
    /// Only push submissions completed after establishment.
    StreamOnly,
    /// Drain the backlog, then keep streaming.
    UploadAndStream,
}

impl PublicationMode {
    /// Does this mode run the bulk upload pass?
    pub fn uploads(self) -> bool {
        matches!(
            self,
            PublicationMode::UploadOnly | PublicationMode::UploadAndStream
        )
    }

    /// Does this mode run the streaming pass?
    pub fn streams(self) -> bool {
        matches!(
            self,
            PublicationMode::StreamOnly | PublicationMode::UploadAndStream
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_serde_name() {
        for kind in ConnectorKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{kind}\""));
        }
    }

    #[test]
    fn mode_passes() {
        assert!(PublicationMode::UploadOnly.uploads());
        assert!(!PublicationMode::UploadOnly.streams());
        assert!(!PublicationMode::StreamOnly.uploads());
        assert!(PublicationMode::UploadAndStream.uploads());
        assert!(PublicationMode::UploadAndStream.streams());
    }
}
