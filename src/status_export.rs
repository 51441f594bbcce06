use serde::{Deserialize, Serialize};

use crate::{
    model::{AnswerMap, AnswerSet},
    persistence::{RunMetadata, RunRecord, RunSummary},
};

/// One answer set as written to the export artifact: only `id` and `answers`,
/// submission-state fields always dropped.
#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
pub struct AnswerSetExport {
    pub id: u32,
    pub answers: AnswerMap,
}

impl From<&AnswerSet> for AnswerSetExport {
    fn from(value: &AnswerSet) -> Self {
        Self {
            id: value.id,
            answers: value.answers.clone(),
        }
    }
}

pub fn export_answer_sets(sets: &[AnswerSet]) -> Vec<AnswerSetExport> {
    sets.iter().map(AnswerSetExport::from).collect()
}

#[derive(Serialize, Deserialize, Clone)]
pub struct RunListExport {
    pub runs: Vec<RunSummaryExport>,
}

impl RunListExport {
    pub fn from_summaries(summaries: Vec<RunSummary>) -> Self {
        Self {
            runs: summaries.into_iter().map(RunSummaryExport::from).collect(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone)]
pub struct RunSummaryExport {
    pub run_id: String,
    pub status: String,
    pub provider: String,
    pub direction: String,
    pub updated_at: i64,
}

impl From<RunSummary> for RunSummaryExport {
    fn from(value: RunSummary) -> Self {
        Self {
            run_id: value.run_id,
            status: value.status.as_str().to_string(),
            provider: value.provider,
            direction: value.direction,
            updated_at: value.updated_at,
        }
    }
}

#[derive(Serialize, Deserialize, Clone)]
pub struct RunDetailExport {
    pub run_id: String,
    pub status: String,
    pub metadata: RunMetadata,
    pub action_url: Option<String>,
    pub question_count: usize,
    pub answer_sets: Vec<AnswerSet>,
    pub updated_at: i64,
}

impl RunDetailExport {
    pub fn from_record(record: &RunRecord) -> Self {
        let state = &record.envelope.state;
        Self {
            run_id: record.envelope.run_id.clone(),
            status: record.status.as_str().to_string(),
            metadata: record.envelope.metadata.clone(),
            action_url: state.action_url.clone(),
            question_count: state.structure.len(),
            answer_sets: state.answer_sets.clone(),
            updated_at: record.updated_at,
        }
    }
}
