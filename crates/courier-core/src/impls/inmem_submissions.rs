//! InMemorySubmissionSource - form 定義と submission の読み取り専用ストア（開発・テスト用）

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{DatastoreError, FormDefinition, FormId, Submission};
use crate::ports::{SubmissionQuery, SubmissionSource};

#[derive(Default)]
struct Forms {
    definitions: HashMap<FormId, FormDefinition>,
    submissions: HashMap<FormId, Vec<Submission>>,
}

#[derive(Default)]
pub struct InMemorySubmissionSource {
    forms: Mutex<Forms>,
}

impl InMemorySubmissionSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_form(&self, form: FormDefinition) {
        let mut forms = self.forms.lock().await;
        forms.definitions.insert(form.form_id.clone(), form);
    }

    /// Record a completed submission. Storage stays sorted by (completion time, key).
    pub async fn add_submission(&self, form_id: &FormId, submission: Submission) {
        let mut forms = self.forms.lock().await;
        let list = forms.submissions.entry(form_id.clone()).or_default();
        let wm = submission.watermark();
        let at = list.partition_point(|s| s.watermark() <= wm);
        list.insert(at, submission);
    }
}

#[async_trait]
impl SubmissionSource for InMemorySubmissionSource {
    async fn form_definition(&self, form_id: &FormId) -> Result<FormDefinition, DatastoreError> {
        let forms = self.forms.lock().await;
        forms
            .definitions
            .get(form_id)
            .cloned()
            .ok_or_else(|| DatastoreError::NotFound(format!("form {form_id}")))
    }

    async fn query(&self, query: &SubmissionQuery) -> Result<Vec<Submission>, DatastoreError> {
        let forms = self.forms.lock().await;
        let Some(list) = forms.submissions.get(&query.form_id) else {
            return Ok(Vec::new());
        };
        Ok(list
            .iter()
            .filter(|s| query.matches(s))
            .take(query.limit)
            .cloned()
            .collect())
    }
}
