use anyhow::{Result as AnyResult, anyhow};
use async_trait::async_trait;
use tracing::debug;

use crate::error::Error;
use crate::model::{AnswerMap, AnswerValue};

/// Result of one dispatch attempt. `success` means only that the request left
/// without a transport error; the server's verdict is unobservable.
#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    pub success: bool,
    pub error: Option<String>,
}

impl SubmitOutcome {
    pub fn dispatched() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Fire-and-forget delivery of one answer set to a form endpoint.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, action_url: &str, answers: &AnswerMap) -> SubmitOutcome;
}

/// Flattens an answer map into urlencoded key/value pairs. List values repeat
/// the key once per element, matching the multi-select convention of form
/// endpoints.
pub fn encode_answers(answers: &AnswerMap) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for (name, value) in answers {
        match value {
            AnswerValue::One(text) => pairs.push((name.clone(), text.clone())),
            AnswerValue::Many(items) => {
                for item in items {
                    pairs.push((name.clone(), item.clone()));
                }
            }
        }
    }
    pairs
}

/// [`Dispatcher`] that POSTs `application/x-www-form-urlencoded` bodies with
/// `reqwest`.
pub struct HttpDispatcher {
    client: reqwest::Client,
}

impl HttpDispatcher {
    pub fn new() -> AnyResult<Self> {
        Ok(Self {
            client: build_http_client()?,
        })
    }
}

#[async_trait]
impl Dispatcher for HttpDispatcher {
    async fn dispatch(&self, action_url: &str, answers: &AnswerMap) -> SubmitOutcome {
        let pairs = encode_answers(answers);
        debug!(action_url, fields = pairs.len(), "dispatching submission");
        // The response status and body are never inspected: a cross-origin
        // form POST cannot verify delivery, only that the request went out.
        match self.client.post(action_url).form(&pairs).send().await {
            Ok(_) => SubmitOutcome::dispatched(),
            Err(err) => SubmitOutcome::failed(Error::Submission(err.to_string()).to_string()),
        }
    }
}

fn build_http_client() -> AnyResult<reqwest::Client> {
    // Same proxy opt-out as the LLM client; see llm::build_http_client.
    let mut builder = reqwest::Client::builder();
    if std::env::var_os("FORMFILL_ENABLE_SYSTEM_PROXY").is_none() {
        builder = builder.no_proxy();
    }
    builder
        .build()
        .map_err(|err| anyhow!("Failed to build HTTP client: {err}"))
}
