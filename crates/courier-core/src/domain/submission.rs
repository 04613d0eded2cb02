//! Submission / Form - 配送対象となる submission と form 定義
//!
//! どちらもここでは読み取り専用です。
//! 行の整形は上流の責務で、`Submission` は JSON 値に変換済みの行を持って届きます。

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::cursor::Watermark;

macro_rules! string_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }
    };
}

string_newtype!(
    /// Identifier of a form definition.
    FormId
);

string_newtype!(
    /// Unique key of a submission. Breaks ties between equal completion timestamps.
    SubmissionKey
);

string_newtype!(
    /// Identity of a form element (the top-level element or a repeating group).
    ElementId
);

/// One formatted row. The top-level element produces one row per submission, each
/// repeating group one row per repeat instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub submission: SubmissionKey,
    pub element: ElementId,
    pub values: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub key: SubmissionKey,
    pub completed_at: DateTime<Utc>,
    pub rows: Vec<Row>,
}

impl Submission {
    /// The cursor position reached once this submission is delivered.
    pub fn watermark(&self) -> Watermark {
        Watermark::new(self.completed_at, self.key.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormElement {
    pub id: ElementId,
    pub name: String,
    pub columns: Vec<String>,
}

/// Schema of a form: the top-level element plus one entry per repeating group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormDefinition {
    pub form_id: FormId,
    pub title: String,
    pub top_level: FormElement,
    pub repeat_groups: Vec<FormElement>,
}

impl FormDefinition {
    /// Every element that needs its own destination sub-resource.
    pub fn elements(&self) -> impl Iterator<Item = &FormElement> {
        std::iter::once(&self.top_level).chain(self.repeat_groups.iter())
    }
}
