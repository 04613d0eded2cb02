//! Shared wiring for the app-layer unit tests.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};

use super::deletion::DeletionCoordinator;
use super::locking::{LockManager, LockSettings};
use super::orchestrator::PublishOrchestrator;
use super::registry::ConnectorRegistry;
use super::retry::RetryPolicy;
use crate::domain::{
    ConnectorKind, CursorRecord, ElementId, FormDefinition, FormElement, FormId,
    PublicationMode, Row, Submission, SubmissionKey,
};
use crate::impls::{
    InMemoryCursorStore, InMemorySubmissionSource, InMemoryTaskLock, MemoryConnector,
    MemoryConnectorFactory,
};
use crate::ports::{FixedClock, UlidGenerator};

pub(crate) const FORM: &str = "household";

pub(crate) fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
}

pub(crate) fn form() -> FormDefinition {
    let element = |id: &str| FormElement {
        id: ElementId::new(id),
        name: id.into(),
        columns: vec!["value".into()],
    };
    FormDefinition {
        form_id: FormId::new(FORM),
        title: "Household survey".into(),
        top_level: element("household"),
        repeat_groups: vec![element("members")],
    }
}

/// A submission completed `minutes` relative to `t0()`, with one top-level row.
pub(crate) fn submission(key: &str, minutes: i64) -> Submission {
    let mut values = serde_json::Map::new();
    values.insert("value".into(), serde_json::Value::String(key.into()));
    Submission {
        key: SubmissionKey::new(key),
        completed_at: t0() + chrono::Duration::minutes(minutes),
        rows: vec![Row {
            submission: SubmissionKey::new(key),
            element: ElementId::new("household"),
            values,
        }],
    }
}

pub(crate) struct Harness {
    pub clock: Arc<FixedClock>,
    pub store: Arc<InMemoryCursorStore>,
    pub submissions: Arc<InMemorySubmissionSource>,
    pub task_lock: Arc<InMemoryTaskLock>,
    pub connector: MemoryConnector,
    pub locks: Arc<LockManager>,
    pub connectors: Arc<ConnectorRegistry>,
    pub orchestrator: Arc<PublishOrchestrator>,
}

impl Harness {
    pub async fn new() -> Self {
        let clock = Arc::new(FixedClock::new(t0()));
        let store = Arc::new(InMemoryCursorStore::new());
        let submissions = Arc::new(InMemorySubmissionSource::new());
        submissions.add_form(form()).await;
        let task_lock = Arc::new(InMemoryTaskLock::new(
            chrono::Duration::seconds(60),
            clock.clone(),
        ));
        let ids = Arc::new(UlidGenerator::new(clock.clone()));

        let connector = MemoryConnector::new("sink");
        let mut registry = ConnectorRegistry::new();
        registry
            .register(Arc::new(MemoryConnectorFactory::new(
                ConnectorKind::JsonServer,
                connector.clone(),
            )))
            .unwrap();
        let connectors = Arc::new(registry);

        let locks = Arc::new(LockManager::new(
            task_lock.clone(),
            ids.clone(),
            clock.clone(),
            LockSettings {
                acquire: RetryPolicy::fixed(2, Duration::from_millis(1)),
                release: RetryPolicy::fixed(2, Duration::from_millis(1)),
                renew_after: Duration::from_secs(20),
            },
        ));
        let orchestrator = Arc::new(PublishOrchestrator::new(
            store.clone(),
            submissions.clone(),
            clock.clone(),
            ids,
            connectors.clone(),
            locks.clone(),
        ));

        Self {
            clock,
            store,
            submissions,
            task_lock,
            connector,
            locks,
            connectors,
            orchestrator,
        }
    }

    /// An orchestrator sharing this harness's store and locks, with `connector` registered
    /// as `kind` instead of the shared sink.
    pub fn orchestrator_with(
        &self,
        kind: ConnectorKind,
        connector: MemoryConnector,
    ) -> PublishOrchestrator {
        let mut registry = ConnectorRegistry::new();
        registry
            .register(Arc::new(MemoryConnectorFactory::new(kind, connector)))
            .unwrap();
        PublishOrchestrator::new(
            self.store.clone(),
            self.submissions.clone(),
            self.clock.clone(),
            Arc::new(UlidGenerator::new(self.clock.clone())),
            Arc::new(registry),
            self.locks.clone(),
        )
    }

    pub fn deletion(&self) -> DeletionCoordinator {
        DeletionCoordinator::new(self.store.clone(), self.connectors.clone(), self.locks.clone())
    }

    pub async fn add(&self, submission: Submission) {
        self.submissions
            .add_submission(&FormId::new(FORM), submission)
            .await;
    }

    pub async fn destination(&self, mode: PublicationMode) -> CursorRecord {
        self.orchestrator
            .create_destination(
                FormId::new(FORM),
                ConnectorKind::JsonServer,
                mode,
                serde_json::json!({}),
            )
            .await
            .unwrap()
    }

    /// Created and prepared, so the next publish goes straight to delivery.
    pub async fn active_destination(&self, mode: PublicationMode) -> CursorRecord {
        let record = self.destination(mode).await;
        self.orchestrator.initiate(record.id()).await.unwrap();
        self.orchestrator.load(record.id()).await.unwrap()
    }
}
