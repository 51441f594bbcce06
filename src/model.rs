use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Input kind the analyzer inferred for a form question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionType {
    Text,
    Textarea,
    Radio,
    Checkbox,
    Select,
    #[serde(other)]
    Unknown,
}

/// Normalized representation of one form question, produced by the analyzer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormQuestion {
    pub question: String,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    /// Wire-level `name` attribute of the input (e.g. `entry.123456789`).
    pub name: String,
    #[serde(default)]
    pub options: Vec<String>,
}

/// A generated answer: single-valued fields get one string, multi-select
/// fields get a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    One(String),
    Many(Vec<String>),
}

/// Field name -> generated answer. Ordered so serialized output is stable.
pub type AnswerMap = BTreeMap<String, AnswerValue>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionState {
    #[default]
    Unsubmitted,
    Submitting,
    Success,
    Error,
}

impl SubmissionState {
    pub fn as_str(self) -> &'static str {
        match self {
            SubmissionState::Unsubmitted => "unsubmitted",
            SubmissionState::Submitting => "submitting",
            SubmissionState::Success => "success",
            SubmissionState::Error => "error",
        }
    }
}

/// One generated response. Ids are run-scoped (1..N); submission fields are
/// mutated only by per-row submit attempts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerSet {
    pub id: u32,
    pub answers: AnswerMap,
    #[serde(default)]
    pub submission_state: SubmissionState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submission_error: Option<String>,
}

impl AnswerSet {
    pub fn new(id: u32, answers: AnswerMap) -> Self {
        Self {
            id,
            answers,
            submission_state: SubmissionState::Unsubmitted,
            submission_error: None,
        }
    }
}
