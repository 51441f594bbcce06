use anyhow::{Result as AnyResult, anyhow};
use async_trait::async_trait;
use regex::RegexBuilder;
use rig::{
    client::CompletionClient,
    completion::Prompt,
    providers::{gemini, openai},
};
use tracing::debug;

use crate::cli::LlmProvider;
use crate::error::{Error, Result};
use crate::model::{AnswerMap, FormQuestion};

/// Near-zero sampling so repeated analysis of the same HTML stays stable.
const ANALYZE_TEMPERATURE: f64 = 0.0;
/// Higher sampling so N identical prompts yield N distinct answer sets.
const GENERATE_TEMPERATURE: f64 = 0.8;

/// The two capability methods every provider backend must offer.
#[async_trait]
pub trait FormAssistant: Send + Sync {
    /// Label used in progress output and error messages.
    fn provider_name(&self) -> &str;

    /// One model round-trip: HTML in, normalized question descriptors out.
    async fn analyze_structure(&self, html: &str) -> Result<Vec<FormQuestion>>;

    /// One model round-trip producing a single answer set. Never batched:
    /// callers wanting N sets issue N independent calls.
    async fn generate_answer(
        &self,
        structure: &[FormQuestion],
        direction: &str,
    ) -> Result<AnswerMap>;
}

/// Concrete [`FormAssistant`] backed by `rig`'s Gemini or OpenAI provider.
pub struct RigFormAssistant {
    provider: LlmProvider,
    model: String,
    api_key: String,
    http_client: reqwest::Client,
}

impl RigFormAssistant {
    /// An empty `api_key` is accepted here; the capability methods refuse to
    /// issue a request with it.
    pub fn new(
        provider: LlmProvider,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> AnyResult<Self> {
        Ok(Self {
            provider,
            model: model.into(),
            api_key: api_key.into(),
            http_client: build_http_client()?,
        })
    }

    fn ensure_credential(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(Error::MissingCredential {
                provider: self.provider.display_name().to_string(),
            });
        }
        Ok(())
    }

    fn provider_error(&self, details: impl std::fmt::Display) -> Error {
        Error::Provider {
            provider: self.provider.display_name().to_string(),
            details: details.to_string(),
        }
    }

    async fn prompt_once(
        &self,
        prompt: &str,
        preamble: Option<&str>,
        temperature: f64,
    ) -> Result<String> {
        debug!(
            provider = self.provider.as_str(),
            model = %self.model,
            temperature,
            "issuing model request"
        );
        match self.provider {
            LlmProvider::Gemini => {
                let client: gemini::Client<reqwest::Client> =
                    gemini::Client::<reqwest::Client>::builder()
                        .api_key(&self.api_key)
                        .http_client(self.http_client.clone())
                        .build()
                        .map_err(|err| self.provider_error(err))?;

                let mut agent_builder = client.agent(&self.model).temperature(temperature);
                if let Some(preamble) = preamble {
                    agent_builder = agent_builder.preamble(preamble);
                }
                agent_builder
                    .build()
                    .prompt(prompt)
                    .await
                    .map_err(|err| self.provider_error(err))
            }
            LlmProvider::Openai => {
                let client: openai::Client<reqwest::Client> =
                    openai::Client::<reqwest::Client>::builder()
                        .api_key(&self.api_key)
                        .http_client(self.http_client.clone())
                        .build()
                        .map_err(|err| self.provider_error(err))?;

                let mut agent_builder = client.agent(&self.model).temperature(temperature);
                if let Some(preamble) = preamble {
                    agent_builder = agent_builder.preamble(preamble);
                }
                agent_builder
                    .build()
                    .prompt(prompt)
                    .await
                    .map_err(|err| self.provider_error(err))
            }
        }
    }
}

#[async_trait]
impl FormAssistant for RigFormAssistant {
    fn provider_name(&self) -> &str {
        self.provider.display_name()
    }

    async fn analyze_structure(&self, html: &str) -> Result<Vec<FormQuestion>> {
        self.ensure_credential()?;
        let raw = match self.provider {
            // Gemini's JSON mode returns a bare array.
            LlmProvider::Gemini => {
                let prompt = format!("{ANALYZE_INSTRUCTIONS}\n{ARRAY_OUTPUT_CONTRACT}\n\nHTML to analyze:\n{html}");
                self.prompt_once(&prompt, None, ANALYZE_TEMPERATURE).await?
            }
            // OpenAI's JSON mode wants a top-level object, so the array is
            // wrapped under a "questions" key.
            LlmProvider::Openai => {
                let preamble =
                    format!("{ANALYZE_INSTRUCTIONS}\n{WRAPPED_OUTPUT_CONTRACT}");
                let prompt = format!("HTML to analyze:\n\n{html}");
                self.prompt_once(&prompt, Some(&preamble), ANALYZE_TEMPERATURE)
                    .await?
            }
        };
        parse_question_list(&raw, self.provider.display_name())
    }

    async fn generate_answer(
        &self,
        structure: &[FormQuestion],
        direction: &str,
    ) -> Result<AnswerMap> {
        self.ensure_credential()?;
        let structure_json =
            serde_json::to_string_pretty(structure).expect("form structure serializes");
        let prompt = format!(
            "{GENERATE_INSTRUCTIONS}\n\nForm structure:\n{structure_json}\n\nDirection for this submission:\n\"{direction}\"\n\nGenerate the JSON answer object now."
        );
        let raw = self
            .prompt_once(&prompt, None, GENERATE_TEMPERATURE)
            .await?;
        parse_answer_map(&raw, self.provider.display_name())
    }
}

const ANALYZE_INSTRUCTIONS: &str = "\
You are analyzing the HTML of a web form. Identify every user-fillable field and \
for each one extract:
1. \"question\": the question text or label associated with the input.
2. \"type\": one of 'text', 'textarea', 'radio', 'checkbox', 'select'. Use 'unknown' if it cannot be determined.
3. \"name\": the 'name' attribute of the input element (e.g. 'entry.123456789'). This is the most critical piece of information.
4. \"options\": for 'radio', 'checkbox' or 'select' types, an array of the possible option labels. An empty array for text inputs.
Exclude submit buttons and non-question fields.";

const ARRAY_OUTPUT_CONTRACT: &str = "\
Return the result as a single, minified JSON array of these objects. Do not \
include any explanatory text, markdown, or comments. Only output the raw JSON array.";

const WRAPPED_OUTPUT_CONTRACT: &str = "\
Return the result as a JSON object with a single key \"questions\" containing the \
array of these objects. Do not include any explanatory text, markdown, or \
comments. Only output the raw JSON object.";

const GENERATE_INSTRUCTIONS: &str = "\
You are filling out a form on behalf of a persona described by a \"direction\". \
Produce a single, realistic set of answers that follows the direction.
- For radio buttons, pick exactly one option.
- For checkboxes, pick one or more options that make sense together.
- For text fields, provide a concise but realistic answer.
- Adhere strictly to the direction.
Return the answers as a single, minified JSON object. Keys must be the 'name' \
attributes from the form structure. For checkboxes the value must be an array of \
strings; for all other types a single string. Do not include any explanatory \
text, markdown, or comments.
Example output for a form with a text input and a checkbox group:
{\"entry.123\": \"My answer here\", \"entry.456\": [\"Option 1\", \"Option 3\"]}";

/// Removes the ```json fence some models wrap their output in.
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let fence = RegexBuilder::new(r"^```(?:json)?\s*\n?(.*?)\n?\s*```$")
        .dot_matches_new_line(true)
        .build()
        .expect("valid regex");
    fence
        .captures(trimmed)
        .and_then(|cap| cap.get(1))
        .map(|m| m.as_str().trim())
        .unwrap_or(trimmed)
}

/// Parses an analyzer response into question descriptors. Accepts either a
/// bare array or an object wrapping the array under `questions`, independent
/// of which provider produced it.
pub fn parse_question_list(raw: &str, provider: &str) -> Result<Vec<FormQuestion>> {
    let malformed = || Error::MalformedAiResponse {
        provider: provider.to_string(),
    };
    let body = strip_code_fence(raw);
    let value: serde_json::Value = serde_json::from_str(body).map_err(|_| malformed())?;
    let list = match value {
        serde_json::Value::Array(_) => value,
        serde_json::Value::Object(mut map) => map.remove("questions").ok_or_else(malformed)?,
        _ => return Err(malformed()),
    };
    serde_json::from_value(list).map_err(|_| malformed())
}

/// Parses a generator response into one field-name -> answer mapping.
pub fn parse_answer_map(raw: &str, provider: &str) -> Result<AnswerMap> {
    let body = strip_code_fence(raw);
    serde_json::from_str(body).map_err(|_| Error::MalformedAiResponse {
        provider: provider.to_string(),
    })
}

fn build_http_client() -> AnyResult<reqwest::Client> {
    // `reqwest::Client::default()` can consult OS-level proxy settings, which
    // has been observed to panic in sandboxed environments. Opt back in with
    // `FORMFILL_ENABLE_SYSTEM_PROXY=1`.
    let mut builder = reqwest::Client::builder();
    if std::env::var_os("FORMFILL_ENABLE_SYSTEM_PROXY").is_none() {
        builder = builder.no_proxy();
    }
    builder
        .build()
        .map_err(|err| anyhow!("Failed to build HTTP client: {err}"))
}
