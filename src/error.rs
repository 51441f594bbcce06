use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    /// Bad or missing user input, caught before any network call.
    Validation(String),
    /// No recognizable submission endpoint in the pasted HTML.
    InvalidForm(String),
    /// The selected provider was asked to work without a credential.
    MissingCredential { provider: String },
    /// The model responded with content that does not parse as JSON.
    MalformedAiResponse { provider: String },
    /// Transport, auth, or rate-limit failure surfaced by the provider.
    Provider { provider: String, details: String },
    /// The analyzer recognized zero questions in the form.
    EmptyStructure,
    /// A submission POST could not be dispatched.
    Submission(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Validation(msg) => write!(f, "{msg}"),
            Error::InvalidForm(msg) => write!(f, "{msg}"),
            Error::MissingCredential { provider } => {
                write!(f, "{provider} API key is required.")
            }
            Error::MalformedAiResponse { provider } => {
                write!(
                    f,
                    "{provider} returned a response that was not valid JSON. Please try again."
                )
            }
            Error::Provider { provider, details } => {
                write!(f, "{provider} API error: {details}")
            }
            Error::EmptyStructure => {
                write!(
                    f,
                    "AI could not identify any questions in the provided HTML. \
                     Please ensure it's the full source code of the form."
                )
            }
            Error::Submission(msg) => write!(f, "Submission failed: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_errors_carry_the_provider_label() {
        let err = Error::Provider {
            provider: "Gemini".into(),
            details: "429 rate limited".into(),
        };
        let rendered = err.to_string();
        assert!(rendered.contains("Gemini"));
        assert!(rendered.contains("429 rate limited"));
    }

    #[test]
    fn malformed_response_message_is_user_facing() {
        let err = Error::MalformedAiResponse {
            provider: "OpenAI".into(),
        };
        assert!(err.to_string().contains("was not valid JSON"));
    }
}
