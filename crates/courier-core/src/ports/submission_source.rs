//! SubmissionSource port - form 定義と submission の読み取り
//!
//! 行のフォーマットは外部の責務で、ここでは整形済みの `Submission` を返します。

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{DatastoreError, FormDefinition, FormId, Submission, Watermark};

/// Completion-range query over a form's submissions.
///
/// Results are ordered by (completion time, key) and satisfy all bounds:
/// - strictly after `after`
/// - `completed_at >= not_before`
/// - `completed_at < before`
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionQuery {
    pub form_id: FormId,
    pub after: Option<Watermark>,
    pub not_before: Option<DateTime<Utc>>,
    pub before: Option<DateTime<Utc>>,
    pub limit: usize,
}

impl SubmissionQuery {
    pub fn new(form_id: FormId, limit: usize) -> Self {
        Self {
            form_id,
            after: None,
            not_before: None,
            before: None,
            limit,
        }
    }

    pub fn after(mut self, wm: Option<Watermark>) -> Self {
        self.after = wm;
        self
    }

    pub fn not_before(mut self, at: DateTime<Utc>) -> Self {
        self.not_before = Some(at);
        self
    }

    pub fn before(mut self, at: DateTime<Utc>) -> Self {
        self.before = Some(at);
        self
    }

    /// Does `submission` fall inside every bound of this query?
    pub fn matches(&self, submission: &Submission) -> bool {
        if let Some(after) = &self.after {
            if submission.watermark() <= *after {
                return false;
            }
        }
        if let Some(not_before) = self.not_before {
            if submission.completed_at < not_before {
                return false;
            }
        }
        if let Some(before) = self.before {
            if submission.completed_at >= before {
                return false;
            }
        }
        true
    }
}

#[async_trait]
pub trait SubmissionSource: Send + Sync {
    async fn form_definition(&self, form_id: &FormId) -> Result<FormDefinition, DatastoreError>;

    async fn query(&self, query: &SubmissionQuery) -> Result<Vec<Submission>, DatastoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SubmissionKey;
    use chrono::TimeZone;

    fn submission(minute: u32, key: &str) -> Submission {
        Submission {
            key: SubmissionKey::new(key),
            completed_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, minute, 0).unwrap(),
            rows: vec![],
        }
    }

    #[test]
    fn matches_respects_every_bound() {
        let s = submission(10, "b");
        let at = |m| Utc.with_ymd_and_hms(2024, 1, 1, 0, m, 0).unwrap();
        let base = SubmissionQuery::new(FormId::new("f"), 10);

        assert!(base.matches(&s));
        assert!(base.clone().after(Some(submission(10, "a").watermark())).matches(&s));
        assert!(!base.clone().after(Some(s.watermark())).matches(&s));
        assert!(base.clone().not_before(at(10)).matches(&s));
        assert!(!base.clone().not_before(at(11)).matches(&s));
        assert!(!base.clone().before(at(10)).matches(&s));
        assert!(base.before(at(11)).matches(&s));
    }
}
