//! JsonServerConnector - 1 submission ずつ JSON を POST する汎用 HTTP connector
//!
//! リクエスト本体: `{"token", "content": "record", "formId", "data"}`
//!
//! HTTP ステータスの分類:
//! - 2xx: 成功
//! - 401 / 403: 認証情報の拒否
//! - 408 / 429 / 5xx、接続エラー: 一時的な失敗
//! - それ以外: 恒久的な失敗

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::{
    ConnectorFailure, ConnectorKind, DeliveryOutcome, DestinationConfig, DestinationHandle,
    FormDefinition, FormId, Row,
};
use crate::ports::{Connector, ConnectorFactory};

fn default_timeout_secs() -> u64 {
    30
}

/// Shape of `DestinationConfig::settings` for a JSON server destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonServerSettings {
    pub url: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RecordRequest<'a> {
    token: Option<&'a str>,
    content: &'static str,
    form_id: &'a FormId,
    data: serde_json::Value,
}

/// Map an HTTP status onto the delivery taxonomy.
pub fn classify_status(status: StatusCode) -> DeliveryOutcome {
    let reason = format!(
        "{} ({})",
        status.canonical_reason().unwrap_or_default(),
        status.as_u16()
    );
    if status.is_success() {
        DeliveryOutcome::Success
    } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        DeliveryOutcome::CredentialFailure(reason)
    } else if status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
    {
        DeliveryOutcome::TransientFailure(reason)
    } else {
        DeliveryOutcome::PermanentFailure(reason)
    }
}

/// Show only a short prefix of a secret token: at most 4 characters, fewer for short tokens.
fn redact_token(token: &str) -> String {
    let chars = token.chars().count();
    let shown: String = token.chars().take(4.min(chars / 3)).collect();
    format!("{shown}...")
}

/// One submission's rows as a JSON document: the top-level row's values, plus one
/// array per repeating group under the key recorded in the handle.
fn submission_document(rows: &[&Row], handle: &DestinationHandle) -> serde_json::Value {
    let mut doc = serde_json::Map::new();
    let mut groups: BTreeMap<&str, Vec<serde_json::Value>> = BTreeMap::new();
    for row in rows {
        match handle.sub_resources.get(&row.element) {
            Some(key) => groups
                .entry(key.as_str())
                .or_default()
                .push(serde_json::Value::Object(row.values.clone())),
            None => doc.extend(row.values.clone()),
        }
    }
    for (element, values) in groups {
        doc.insert(element.to_string(), serde_json::Value::Array(values));
    }
    serde_json::Value::Object(doc)
}

pub struct JsonServerConnector {
    client: reqwest::Client,
    settings: JsonServerSettings,
    form_id: FormId,
}

impl JsonServerConnector {
    pub fn new(client: reqwest::Client, settings: JsonServerSettings, form_id: FormId) -> Self {
        Self {
            client,
            settings,
            form_id,
        }
    }

    async fn post(&self, data: serde_json::Value) -> DeliveryOutcome {
        let body = RecordRequest {
            token: self.settings.token.as_deref(),
            content: "record",
            form_id: &self.form_id,
            data,
        };

        let response = self
            .client
            .post(&self.settings.url)
            .timeout(Duration::from_secs(self.settings.timeout_secs))
            .json(&body)
            .send()
            .await;

        match response {
            Ok(response) => {
                let outcome = classify_status(response.status());
                if !outcome.is_success() {
                    let status = response.status();
                    let body = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "<unable to read body>".to_string());
                    warn!(status = %status, body = %body, url = %self.settings.url, "json server rejected record");
                }
                outcome
            }
            Err(e) => {
                warn!(error = %e, url = %self.settings.url, "json server request failed");
                DeliveryOutcome::TransientFailure(e.to_string())
            }
        }
    }
}

#[async_trait]
impl Connector for JsonServerConnector {
    async fn prepare(&self, form: &FormDefinition) -> Result<DestinationHandle, ConnectorFailure> {
        // 送信先は 1 つの URL だけ。repeating group は文書内の配列キーに対応させる
        let handle = form
            .repeat_groups
            .iter()
            .fold(DestinationHandle::new(self.settings.url.clone()), |handle, group| {
                handle.with_sub_resource(group.id.clone(), group.name.clone())
            });
        Ok(handle)
    }

    async fn deliver(&self, handle: &DestinationHandle, rows: &[Row]) -> DeliveryOutcome {
        let mut by_submission: Vec<(&str, Vec<&Row>)> = Vec::new();
        for row in rows {
            match by_submission.last_mut() {
                Some((key, group)) if *key == row.submission.as_str() => group.push(row),
                _ => by_submission.push((row.submission.as_str(), vec![row])),
            }
        }

        for (key, group) in by_submission {
            debug!(submission = key, url = %self.settings.url, "posting record");
            let outcome = self.post(submission_document(&group, handle)).await;
            if !outcome.is_success() {
                return outcome;
            }
        }
        DeliveryOutcome::Success
    }

    fn describe_target(&self) -> String {
        match self.settings.token.as_deref() {
            Some(token) if !token.is_empty() => {
                format!("{} token: {}", self.settings.url, redact_token(token))
            }
            _ => self.settings.url.clone(),
        }
    }

    async fn teardown(&self, _handle: Option<&DestinationHandle>) -> Result<(), ConnectorFailure> {
        Ok(())
    }
}

pub struct JsonServerConnectorFactory {
    client: reqwest::Client,
}

impl JsonServerConnectorFactory {
    /// Fails when the HTTP client cannot be built (e.g. no TLS backend available).
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(default_timeout_secs()))
            .build()
            .inspect_err(|e| warn!(error = %e, "failed to build json server http client"))?;
        Ok(Self::with_client(client))
    }

    /// Share an already configured client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl ConnectorFactory for JsonServerConnectorFactory {
    fn kind(&self) -> ConnectorKind {
        ConnectorKind::JsonServer
    }

    fn build(&self, config: &DestinationConfig) -> Result<Arc<dyn Connector>, ConnectorFailure> {
        let settings: JsonServerSettings = serde_json::from_value(config.settings.clone())
            .map_err(|e| ConnectorFailure::permanent(format!("invalid json server settings: {e}")))?;
        Ok(Arc::new(JsonServerConnector::new(
            self.client.clone(),
            settings,
            config.form_id.clone(),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ElementId, SubmissionKey};
    use rstest::rstest;

    #[rstest]
    #[case::ok(200, "SUCCESS")]
    #[case::created(201, "SUCCESS")]
    #[case::unauthorized(401, "CREDENTIAL_FAILURE")]
    #[case::forbidden(403, "CREDENTIAL_FAILURE")]
    #[case::timeout(408, "TRANSIENT_FAILURE")]
    #[case::rate_limited(429, "TRANSIENT_FAILURE")]
    #[case::unavailable(503, "TRANSIENT_FAILURE")]
    #[case::bad_request(400, "PERMANENT_FAILURE")]
    #[case::not_found(404, "PERMANENT_FAILURE")]
    fn classifies_http_status(#[case] code: u16, #[case] expected: &str) {
        let outcome = classify_status(StatusCode::from_u16(code).unwrap());
        let json = serde_json::to_value(outcome).unwrap();
        assert_eq!(json["kind"], expected);
    }

    #[rstest]
    #[case::long("abcdefghijkl", "abcd...")]
    #[case::short("abcdef", "ab...")]
    #[case::tiny("ab", "...")]
    fn token_prefix_is_short(#[case] token: &str, #[case] expected: &str) {
        assert_eq!(redact_token(token), expected);
    }

    fn connector(token: Option<&str>) -> JsonServerConnector {
        JsonServerConnector::new(
            reqwest::Client::new(),
            JsonServerSettings {
                url: "https://example.org/ingest".into(),
                token: token.map(String::from),
                timeout_secs: 5,
            },
            FormId::new("household"),
        )
    }

    #[test]
    fn describe_target_hides_token() {
        assert_eq!(
            connector(Some("secret-token")).describe_target(),
            "https://example.org/ingest token: secr..."
        );
        assert_eq!(connector(None).describe_target(), "https://example.org/ingest");
    }

    #[test]
    fn document_nests_repeat_groups() {
        let row = |element: &str, value: i64| Row {
            submission: SubmissionKey::new("s1"),
            element: ElementId::new(element),
            values: serde_json::json!({ "v": value }).as_object().cloned().unwrap(),
        };
        let rows = [row("household", 1), row("members", 2), row("members", 3)];
        let refs: Vec<&Row> = rows.iter().collect();
        let handle = DestinationHandle::new("https://example.org/ingest")
            .with_sub_resource(ElementId::new("members"), "members");

        let doc = submission_document(&refs, &handle);
        assert_eq!(
            doc,
            serde_json::json!({ "v": 1, "members": [{ "v": 2 }, { "v": 3 }] })
        );
    }

    #[test]
    fn factory_rejects_bad_settings() {
        let config = DestinationConfig {
            id: crate::domain::DestinationId::from_ulid(ulid::Ulid::new()),
            cursor_id: crate::domain::CursorId::from_ulid(ulid::Ulid::new()),
            form_id: FormId::new("household"),
            kind: ConnectorKind::JsonServer,
            settings: serde_json::json!({ "token": "x" }),
            handle: None,
        };
        let err = JsonServerConnectorFactory::new()
            .unwrap()
            .build(&config)
            .err()
            .unwrap();
        assert_eq!(err.kind, crate::domain::FailureKind::Permanent);
    }

    #[test]
    fn factory_builds_connector_from_settings() {
        let factory = JsonServerConnectorFactory::new().unwrap();
        let config = DestinationConfig {
            id: crate::domain::DestinationId::from_ulid(ulid::Ulid::new()),
            cursor_id: crate::domain::CursorId::from_ulid(ulid::Ulid::new()),
            form_id: FormId::new("household"),
            kind: ConnectorKind::JsonServer,
            settings: serde_json::json!({
                "url": "http://localhost:3000/records",
                "token": "abcdefghijkl"
            }),
            handle: None,
        };
        let connector = factory.build(&config).unwrap();
        assert!(!connector.accepts_batches());
        assert_eq!(
            connector.describe_target(),
            "http://localhost:3000/records token: abcd..."
        );
    }
}
