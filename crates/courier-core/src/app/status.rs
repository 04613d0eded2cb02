//! Status - form 単位の destination 状態の集計
//!
//! dashboard 用。destination ごとの summary と status 別の件数を返します。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{FormId, OperationalStatus, PublisherSummary};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub established: usize,
    pub active: usize,
    pub active_retry: usize,
    pub active_pause: usize,
    pub paused: usize,
    pub bad_credentials: usize,
    pub completed: usize,
    pub abandoned: usize,
}

impl StatusCounts {
    pub fn record(&mut self, status: OperationalStatus) {
        let slot = match status {
            OperationalStatus::Established => &mut self.established,
            OperationalStatus::Active => &mut self.active,
            OperationalStatus::ActiveRetry => &mut self.active_retry,
            OperationalStatus::ActivePause => &mut self.active_pause,
            OperationalStatus::Paused => &mut self.paused,
            OperationalStatus::BadCredentials => &mut self.bad_credentials,
            OperationalStatus::Completed => &mut self.completed,
            OperationalStatus::Abandoned => &mut self.abandoned,
        };
        *slot += 1;
    }

    /// Destinations that still need an operator (bad credentials, or paused).
    pub fn needs_attention(&self) -> usize {
        self.bad_credentials + self.paused + self.active_pause
    }
}

/// Status view of every destination configured for one form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub form_id: FormId,
    pub counts: StatusCounts,
    /// Per connector kind, e.g. `{"JSON_SERVER": 2}`.
    pub by_kind: BTreeMap<String, usize>,
    pub destinations: Vec<PublisherSummary>,
}

impl StatusReport {
    pub fn from_summaries(form_id: FormId, destinations: Vec<PublisherSummary>) -> Self {
        let mut counts = StatusCounts::default();
        let mut by_kind = BTreeMap::new();
        for summary in &destinations {
            counts.record(summary.status);
            *by_kind.entry(summary.kind.to_string()).or_insert(0) += 1;
        }
        Self {
            form_id,
            counts,
            by_kind,
            destinations,
        }
    }
}
