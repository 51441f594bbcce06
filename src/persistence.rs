use std::{
    fs,
    path::PathBuf,
    time::{SystemTime, UNIX_EPOCH},
};

use anyhow::{Context as AnyhowContext, Result, anyhow};
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};

use crate::{paths::data_dir, runner::RunState};

/// Provider and input parameters captured alongside a persisted run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetadata {
    pub provider: String,
    pub model: String,
    pub direction: String,
    pub count: u32,
}

/// Stored payload: the full run state plus its metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunEnvelope {
    pub run_id: String,
    pub state: RunState,
    pub metadata: RunMetadata,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }

    fn from_str(value: &str) -> Option<Self> {
        match value {
            "completed" => Some(RunStatus::Completed),
            "failed" => Some(RunStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: String,
    pub status: RunStatus,
    pub provider: String,
    pub direction: String,
    pub updated_at: i64,
}

#[derive(Debug, Clone)]
pub struct RunRecord {
    pub envelope: RunEnvelope,
    pub status: RunStatus,
    pub updated_at: i64,
}

/// Simple SQLite-backed store for generated runs.
#[derive(Clone)]
pub struct RunStore {
    db_path: PathBuf,
}

impl RunStore {
    pub fn open(custom_root: Option<PathBuf>) -> Result<Self> {
        let base = custom_root.unwrap_or_else(data_dir);
        if !base.exists() {
            fs::create_dir_all(&base)
                .with_context(|| format!("Failed to create run directory {}", base.display()))?;
        }
        let db_path = base.join("runs.sqlite3");
        let store = Self { db_path };
        store.init_schema()?;
        Ok(store)
    }

    pub fn save(&self, envelope: &RunEnvelope, status: RunStatus) -> Result<()> {
        let conn = self.connect()?;
        let state_json = serde_json::to_string(&envelope.state)?;
        let metadata_json = serde_json::to_string(&envelope.metadata)?;
        let now = timestamp();
        conn.execute(
            r#"
            INSERT INTO runs (run_id, provider, direction, status, state_json, metadata_json, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(run_id)
            DO UPDATE SET
                provider=excluded.provider,
                direction=excluded.direction,
                status=excluded.status,
                state_json=excluded.state_json,
                metadata_json=excluded.metadata_json,
                updated_at=excluded.updated_at
            "#,
            params![
                envelope.run_id,
                envelope.metadata.provider,
                envelope.metadata.direction,
                status.as_str(),
                state_json,
                metadata_json,
                now
            ],
        )?;
        Ok(())
    }

    pub fn load(&self, run_id: &str) -> Result<RunRecord> {
        let conn = self.connect()?;
        let row = conn
            .query_row(
                r#"
                SELECT status, state_json, metadata_json, updated_at
                FROM runs
                WHERE run_id = ?1
                "#,
                params![run_id],
                |row| {
                    let status_str: String = row.get(0)?;
                    let state_json: String = row.get(1)?;
                    let metadata_json: String = row.get(2)?;
                    let updated_at: i64 = row.get(3)?;
                    Ok((status_str, state_json, metadata_json, updated_at))
                },
            )
            .with_context(|| format!("Run {run_id} not found"))?;

        let status = RunStatus::from_str(&row.0)
            .ok_or_else(|| anyhow!("Invalid status '{}' in store", row.0))?;
        let state: RunState = serde_json::from_str(&row.1)?;
        let metadata: RunMetadata = serde_json::from_str(&row.2)?;

        Ok(RunRecord {
            envelope: RunEnvelope {
                run_id: run_id.to_string(),
                state,
                metadata,
            },
            status,
            updated_at: row.3,
        })
    }

    pub fn list(&self, limit: usize) -> Result<Vec<RunSummary>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT run_id, provider, direction, status, updated_at
            FROM runs
            ORDER BY updated_at DESC
            LIMIT ?1
            "#,
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, i64>(4)?,
            ))
        })?;

        let mut summaries = Vec::new();
        for row in rows {
            let (run_id, provider, direction, status_str, updated_at) = row?;
            let status = RunStatus::from_str(&status_str)
                .ok_or_else(|| anyhow!("Invalid status '{status_str}' in store"))?;
            summaries.push(RunSummary {
                run_id,
                provider,
                direction,
                status,
                updated_at,
            });
        }
        Ok(summaries)
    }

    fn connect(&self) -> Result<Connection> {
        Connection::open(&self.db_path)
            .with_context(|| format!("Failed to open run database {}", self.db_path.display()))
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.connect()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS runs (
                run_id TEXT PRIMARY KEY,
                provider TEXT NOT NULL,
                direction TEXT NOT NULL,
                status TEXT NOT NULL,
                state_json TEXT NOT NULL,
                metadata_json TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );
            "#,
        )?;
        Ok(())
    }
}

fn timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|dur| dur.as_secs() as i64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AnswerMap, AnswerSet, AnswerValue, SubmissionState};
    use tempfile::tempdir;

    fn sample_envelope(run_id: &str) -> RunEnvelope {
        let mut answers = AnswerMap::new();
        answers.insert("entry.1".into(), AnswerValue::One("hi".into()));
        RunEnvelope {
            run_id: run_id.into(),
            state: RunState {
                action_url: Some("https://docs.google.com/forms/d/e/x/formResponse".into()),
                structure: Vec::new(),
                answer_sets: vec![AnswerSet::new(1, answers)],
            },
            metadata: RunMetadata {
                provider: "gemini".into(),
                model: "gemini-2.5-flash".into(),
                direction: "cheerful".into(),
                count: 1,
            },
        }
    }

    #[test]
    fn saves_and_loads_run() {
        let temp = tempdir().unwrap();
        let store = RunStore::open(Some(temp.path().to_path_buf())).unwrap();

        store
            .save(&sample_envelope("run-1"), RunStatus::Completed)
            .expect("saved");

        let record = store.load("run-1").expect("loaded");
        assert_eq!(record.status, RunStatus::Completed);
        assert_eq!(record.envelope.metadata.provider, "gemini");
        assert_eq!(record.envelope.state.answer_sets.len(), 1);
        assert_eq!(
            record.envelope.state.answer_sets[0].submission_state,
            SubmissionState::Unsubmitted
        );

        let list = store.list(10).expect("listed");
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].run_id, "run-1");
        assert_eq!(list[0].direction, "cheerful");
    }

    #[test]
    fn upsert_overwrites_row_states() {
        let temp = tempdir().unwrap();
        let store = RunStore::open(Some(temp.path().to_path_buf())).unwrap();

        let mut envelope = sample_envelope("run-2");
        store.save(&envelope, RunStatus::Completed).unwrap();

        envelope.state.answer_sets[0].submission_state = SubmissionState::Success;
        store.save(&envelope, RunStatus::Completed).unwrap();

        let record = store.load("run-2").unwrap();
        assert_eq!(
            record.envelope.state.answer_sets[0].submission_state,
            SubmissionState::Success
        );
    }

    #[test]
    fn loading_missing_run_fails() {
        let temp = tempdir().unwrap();
        let store = RunStore::open(Some(temp.path().to_path_buf())).unwrap();
        let err = store.load("nope").unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
