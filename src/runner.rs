use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::form;
use crate::llm::FormAssistant;
use crate::model::{AnswerSet, FormQuestion, SubmissionState};
use crate::submit::{Dispatcher, SubmitOutcome};

/// Everything one generation run accumulates. Serialized wholesale into the
/// run store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunState {
    pub action_url: Option<String>,
    pub structure: Vec<FormQuestion>,
    pub answer_sets: Vec<AnswerSet>,
}

/// User inputs for one generation run. `api_key` arrives already resolved
/// (flag, env var, or home `.env`) and may be empty, which validation rejects.
#[derive(Debug, Clone)]
pub struct RunInputs {
    pub html: String,
    pub direction: String,
    pub count: u32,
    pub api_key: String,
}

/// Orchestrates one run: validate -> parse form -> analyze structure ->
/// generate N answer sets, then routes per-row submissions. Owns all
/// user-visible run state.
#[derive(Debug, Default)]
pub struct FormRunner {
    state: RunState,
}

impl FormRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_state(state: RunState) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn into_state(self) -> RunState {
        self.state
    }

    pub fn answer_sets(&self) -> &[AnswerSet] {
        &self.state.answer_sets
    }

    /// Runs the full generation pipeline. All previous results are discarded
    /// up front; on any failure the run is abandoned wholesale and no partial
    /// answer sets remain visible.
    pub async fn generate(
        &mut self,
        assistant: &dyn FormAssistant,
        inputs: &RunInputs,
    ) -> Result<()> {
        self.state = RunState::default();
        validate(inputs, assistant.provider_name())?;

        let action_url = form::extract_action_url(&inputs.html)?;
        debug!(action_url, "form endpoint extracted");
        self.state.action_url = Some(action_url);

        println!(
            "Analyzing form structure with {}...",
            assistant.provider_name()
        );
        let structure = assistant.analyze_structure(&inputs.html).await?;
        if structure.is_empty() {
            return Err(Error::EmptyStructure);
        }
        info!(questions = structure.len(), "form structure analyzed");
        self.state.structure = structure;

        // Buffered locally so a mid-run failure publishes nothing.
        let mut generated = Vec::with_capacity(inputs.count as usize);
        for i in 1..=inputs.count {
            println!("Generating response {i} of {}...", inputs.count);
            let answers = assistant
                .generate_answer(&self.state.structure, &inputs.direction)
                .await?;
            generated.push(AnswerSet::new(i, answers));
        }

        self.state.answer_sets = generated;
        println!("Successfully generated {} responses!", inputs.count);
        Ok(())
    }

    /// Submits one row. The row moves unsubmitted -> submitting ->
    /// success|error; other rows are untouched and any row may be resubmitted.
    /// Err is returned only for an unknown row or a run without an endpoint;
    /// dispatch failures are stored on the row and reported in the outcome.
    pub async fn submit_row(
        &mut self,
        dispatcher: &dyn Dispatcher,
        row_id: u32,
    ) -> Result<SubmitOutcome> {
        let action_url = self
            .state
            .action_url
            .clone()
            .ok_or_else(|| Error::Validation("No form endpoint recorded for this run.".into()))?;
        let set = self
            .state
            .answer_sets
            .iter_mut()
            .find(|set| set.id == row_id)
            .ok_or_else(|| {
                Error::Validation(format!("No generated response with id {row_id}."))
            })?;

        set.submission_state = SubmissionState::Submitting;
        set.submission_error = None;

        let outcome = dispatcher.dispatch(&action_url, &set.answers).await;
        if outcome.success {
            set.submission_state = SubmissionState::Success;
            set.submission_error = None;
        } else {
            set.submission_state = SubmissionState::Error;
            set.submission_error = outcome.error.clone();
        }
        Ok(outcome)
    }
}

fn validate(inputs: &RunInputs, provider: &str) -> Result<()> {
    if inputs.html.trim().is_empty() || inputs.direction.trim().is_empty() || inputs.count == 0 {
        return Err(Error::Validation(
            "Please provide the form's HTML, a direction, and a valid number of submissions."
                .into(),
        ));
    }
    if inputs.api_key.trim().is_empty() {
        return Err(Error::Validation(format!(
            "Please provide your {provider} API key to use this model."
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::FormAssistant;
    use crate::model::{AnswerMap, AnswerValue, QuestionType};
    use async_trait::async_trait;
    use std::sync::{
        Mutex,
        atomic::{AtomicU32, Ordering},
    };

    const FORM_HTML: &str = r#"<html><body>
        <form action="https://docs.google.com/forms/d/e/1FAIpQL/formResponse" method="POST">
            <input name="entry.1">
        </form>
    </body></html>"#;

    fn question(name: &str) -> FormQuestion {
        FormQuestion {
            question: "Sample question".into(),
            question_type: QuestionType::Text,
            name: name.into(),
            options: Vec::new(),
        }
    }

    /// Scripted assistant: returns a fixed structure and numbered answers,
    /// optionally failing on a specific generation call.
    struct ScriptedAssistant {
        structure: Vec<FormQuestion>,
        fail_on_call: Option<u32>,
        analyze_calls: AtomicU32,
        generate_calls: AtomicU32,
    }

    impl ScriptedAssistant {
        fn new(structure: Vec<FormQuestion>) -> Self {
            Self {
                structure,
                fail_on_call: None,
                analyze_calls: AtomicU32::new(0),
                generate_calls: AtomicU32::new(0),
            }
        }

        fn failing_at(structure: Vec<FormQuestion>, call: u32) -> Self {
            Self {
                fail_on_call: Some(call),
                ..Self::new(structure)
            }
        }

        fn total_calls(&self) -> u32 {
            self.analyze_calls.load(Ordering::SeqCst) + self.generate_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl FormAssistant for ScriptedAssistant {
        fn provider_name(&self) -> &str {
            "Scripted"
        }

        async fn analyze_structure(&self, _html: &str) -> crate::Result<Vec<FormQuestion>> {
            self.analyze_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.structure.clone())
        }

        async fn generate_answer(
            &self,
            structure: &[FormQuestion],
            _direction: &str,
        ) -> crate::Result<AnswerMap> {
            let call = self.generate_calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_on_call == Some(call) {
                return Err(Error::Provider {
                    provider: "Scripted".into(),
                    details: "quota exhausted".into(),
                });
            }
            let mut answers = AnswerMap::new();
            for q in structure {
                answers.insert(q.name.clone(), AnswerValue::One(format!("answer {call}")));
            }
            Ok(answers)
        }
    }

    /// Dispatcher double that records calls and replies from a script.
    struct ScriptedDispatcher {
        outcomes: Mutex<Vec<SubmitOutcome>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedDispatcher {
        fn replying(outcomes: Vec<SubmitOutcome>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Dispatcher for ScriptedDispatcher {
        async fn dispatch(&self, action_url: &str, _answers: &AnswerMap) -> SubmitOutcome {
            self.calls.lock().unwrap().push(action_url.to_string());
            self.outcomes.lock().unwrap().remove(0)
        }
    }

    fn inputs(count: u32) -> RunInputs {
        RunInputs {
            html: FORM_HTML.into(),
            direction: "friendly college student".into(),
            count,
            api_key: "test-key".into(),
        }
    }

    #[tokio::test]
    async fn successful_run_yields_sequential_unsubmitted_ids() {
        let assistant = ScriptedAssistant::new(vec![question("entry.1")]);
        let mut runner = FormRunner::new();

        runner.generate(&assistant, &inputs(3)).await.unwrap();

        let ids: Vec<u32> = runner.answer_sets().iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert!(
            runner
                .answer_sets()
                .iter()
                .all(|s| s.submission_state == SubmissionState::Unsubmitted)
        );
        assert_eq!(
            runner.state().action_url.as_deref(),
            Some("https://docs.google.com/forms/d/e/1FAIpQL/formResponse")
        );
        assert_eq!(runner.state().structure.len(), 1);
        assert_eq!(assistant.generate_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn validation_failures_make_no_assistant_calls() {
        let assistant = ScriptedAssistant::new(vec![question("entry.1")]);
        let mut runner = FormRunner::new();

        let mut empty_html = inputs(3);
        empty_html.html = "   ".into();
        assert!(matches!(
            runner.generate(&assistant, &empty_html).await,
            Err(Error::Validation(_))
        ));

        let mut empty_direction = inputs(3);
        empty_direction.direction = String::new();
        assert!(matches!(
            runner.generate(&assistant, &empty_direction).await,
            Err(Error::Validation(_))
        ));

        let zero_count = inputs(0);
        assert!(matches!(
            runner.generate(&assistant, &zero_count).await,
            Err(Error::Validation(_))
        ));

        let mut no_key = inputs(3);
        no_key.api_key = String::new();
        let err = runner.generate(&assistant, &no_key).await.unwrap_err();
        assert!(err.to_string().contains("Scripted API key"));

        assert_eq!(assistant.total_calls(), 0);
    }

    #[tokio::test]
    async fn invalid_form_html_fails_before_analysis() {
        let assistant = ScriptedAssistant::new(vec![question("entry.1")]);
        let mut runner = FormRunner::new();

        let mut bad = inputs(2);
        bad.html = "<html><body>no form</body></html>".into();
        assert!(matches!(
            runner.generate(&assistant, &bad).await,
            Err(Error::InvalidForm(_))
        ));
        assert_eq!(assistant.total_calls(), 0);
    }

    #[tokio::test]
    async fn empty_structure_aborts_the_run() {
        let assistant = ScriptedAssistant::new(Vec::new());
        let mut runner = FormRunner::new();

        let err = runner.generate(&assistant, &inputs(2)).await.unwrap_err();
        assert!(matches!(err, Error::EmptyStructure));
        assert!(runner.answer_sets().is_empty());
        assert_eq!(assistant.generate_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn midrun_failure_discards_all_partial_results() {
        let assistant = ScriptedAssistant::failing_at(vec![question("entry.1")], 2);
        let mut runner = FormRunner::new();

        let err = runner.generate(&assistant, &inputs(3)).await.unwrap_err();
        assert!(err.to_string().contains("quota exhausted"));
        assert!(runner.answer_sets().is_empty(), "full-run rollback");
        // The failing call was the second of three; the third never ran.
        assert_eq!(assistant.generate_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn rerun_clears_previous_results_before_validating() {
        let assistant = ScriptedAssistant::new(vec![question("entry.1")]);
        let mut runner = FormRunner::new();
        runner.generate(&assistant, &inputs(2)).await.unwrap();
        assert_eq!(runner.answer_sets().len(), 2);

        let mut invalid = inputs(2);
        invalid.html = String::new();
        let _ = runner.generate(&assistant, &invalid).await;

        assert!(runner.answer_sets().is_empty());
        assert!(runner.state().action_url.is_none());
        assert!(runner.state().structure.is_empty());
    }

    #[tokio::test]
    async fn submit_row_transitions_only_the_target_row() {
        let assistant = ScriptedAssistant::new(vec![question("entry.1")]);
        let mut runner = FormRunner::new();
        runner.generate(&assistant, &inputs(2)).await.unwrap();

        let dispatcher = ScriptedDispatcher::replying(vec![SubmitOutcome::dispatched()]);
        let outcome = runner.submit_row(&dispatcher, 1).await.unwrap();
        assert!(outcome.success);

        assert_eq!(
            runner.answer_sets()[0].submission_state,
            SubmissionState::Success
        );
        assert_eq!(
            runner.answer_sets()[1].submission_state,
            SubmissionState::Unsubmitted
        );
        assert_eq!(
            dispatcher.calls.lock().unwrap().as_slice(),
            ["https://docs.google.com/forms/d/e/1FAIpQL/formResponse"]
        );
    }

    #[tokio::test]
    async fn failed_submission_is_stored_and_retryable() {
        let assistant = ScriptedAssistant::new(vec![question("entry.1")]);
        let mut runner = FormRunner::new();
        runner.generate(&assistant, &inputs(1)).await.unwrap();

        let dispatcher = ScriptedDispatcher::replying(vec![
            SubmitOutcome::failed("Submission failed: connection refused"),
            SubmitOutcome::dispatched(),
        ]);

        let outcome = runner.submit_row(&dispatcher, 1).await.unwrap();
        assert!(!outcome.success);
        let row = &runner.answer_sets()[0];
        assert_eq!(row.submission_state, SubmissionState::Error);
        assert_eq!(
            row.submission_error.as_deref(),
            Some("Submission failed: connection refused")
        );

        // Resubmitting the same row succeeds and clears the stored error.
        runner.submit_row(&dispatcher, 1).await.unwrap();
        let row = &runner.answer_sets()[0];
        assert_eq!(row.submission_state, SubmissionState::Success);
        assert!(row.submission_error.is_none());
    }

    #[tokio::test]
    async fn submitting_unknown_row_or_without_endpoint_errs() {
        let dispatcher = ScriptedDispatcher::replying(Vec::new());

        let mut fresh = FormRunner::new();
        assert!(matches!(
            fresh.submit_row(&dispatcher, 1).await,
            Err(Error::Validation(_))
        ));

        let assistant = ScriptedAssistant::new(vec![question("entry.1")]);
        let mut runner = FormRunner::new();
        runner.generate(&assistant, &inputs(1)).await.unwrap();
        let err = runner.submit_row(&dispatcher, 9).await.unwrap_err();
        assert!(err.to_string().contains("id 9"));
    }
}
