use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Formfill CLI definition.
#[derive(Debug, Parser)]
#[command(name = "formfill")]
#[command(about = "Generate and submit synthetic form responses with an LLM", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, help = "Verbose diagnostic logging")]
    pub verbose: bool,

    #[arg(long, global = true, help = "Emit stdout logs as JSON")]
    pub log_json: bool,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Analyze a form and generate N synthetic answer sets.
    Run(RunArgs),
    /// Submit individual generated rows to the form endpoint.
    Submit(SubmitArgs),
    /// Inspect stored runs.
    Status(StatusArgs),
    /// Write the generated answer sets of a run to a JSON file.
    Export(ExportArgs),
}

#[derive(Debug, Args, Clone)]
pub struct RunArgs {
    #[arg(long, help = "Path to a file containing the form page HTML source")]
    pub html: PathBuf,

    #[arg(
        long,
        help = "Free-text direction describing the desired tone or persona"
    )]
    pub direction: String,

    #[arg(long, default_value_t = 10, help = "Number of answer sets to generate")]
    pub count: u32,

    #[arg(
        long,
        default_value_t = LlmProvider::Gemini,
        value_enum,
        help = "LLM provider backend (gemini, openai)"
    )]
    pub provider: LlmProvider,

    #[arg(long, help = "Provider API key (can also come from env vars)")]
    pub api_key: Option<String>,

    #[arg(long, help = "Model identifier (defaults per provider)")]
    pub model: Option<String>,
}

#[derive(Debug, Args, Clone)]
pub struct SubmitArgs {
    #[arg(long, help = "Run identifier holding the generated rows")]
    pub run_id: String,

    #[arg(
        long = "row",
        required = true,
        help = "Row id to submit (repeatable; rows are submitted one at a time)"
    )]
    pub rows: Vec<u32>,
}

#[derive(Debug, Args, Clone, Default)]
pub struct StatusArgs {
    #[arg(long, help = "Optional run identifier to inspect")]
    pub run_id: Option<String>,

    #[arg(long, help = "Emit machine-readable JSON")]
    pub json: bool,

    #[arg(long, default_value_t = 10, help = "Maximum runs to list")]
    pub limit: usize,
}

#[derive(Debug, Args, Clone)]
pub struct ExportArgs {
    #[arg(long, help = "Run identifier to export")]
    pub run_id: String,

    #[arg(long, help = "Output path (defaults to responses-<run-id>.json)")]
    pub output: Option<PathBuf>,
}

/// Supported LLM providers surfaced via the CLI.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
#[clap(rename_all = "lower")]
pub enum LlmProvider {
    Gemini,
    Openai,
}

impl LlmProvider {
    pub fn env_var(self) -> &'static str {
        match self {
            LlmProvider::Gemini => "GEMINI_API_KEY",
            LlmProvider::Openai => "OPENAI_API_KEY",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LlmProvider::Gemini => "gemini",
            LlmProvider::Openai => "openai",
        }
    }

    /// Human-facing provider label used in progress and error messages.
    pub fn display_name(self) -> &'static str {
        match self {
            LlmProvider::Gemini => "Gemini",
            LlmProvider::Openai => "OpenAI",
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            LlmProvider::Gemini => "gemini-2.5-flash",
            LlmProvider::Openai => "gpt-4o-mini",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn parses_run_command() {
        let cli = Cli::parse_from([
            "formfill",
            "run",
            "--html",
            "./form.html",
            "--direction",
            "enthusiastic first-year student",
            "--count",
            "5",
            "--provider",
            "openai",
        ]);

        match cli.command {
            Commands::Run(run) => {
                assert_eq!(run.html, PathBuf::from("./form.html"));
                assert_eq!(run.direction, "enthusiastic first-year student");
                assert_eq!(run.count, 5);
                assert_eq!(run.provider, LlmProvider::Openai);
                assert!(run.api_key.is_none());
            }
            _ => panic!("expected run command"),
        }
    }

    #[test]
    fn parses_submit_with_repeated_rows() {
        let cli = Cli::parse_from([
            "formfill", "submit", "--run-id", "abc", "--row", "1", "--row", "3",
        ]);

        match cli.command {
            Commands::Submit(submit) => {
                assert_eq!(submit.run_id, "abc");
                assert_eq!(submit.rows, vec![1, 3]);
            }
            _ => panic!("expected submit command"),
        }
    }

    #[test]
    fn provider_helpers_expose_stable_names() {
        assert_eq!(LlmProvider::Gemini.as_str(), "gemini");
        assert_eq!(LlmProvider::Gemini.env_var(), "GEMINI_API_KEY");
        assert_eq!(LlmProvider::Openai.display_name(), "OpenAI");
        for provider in [LlmProvider::Gemini, LlmProvider::Openai] {
            assert!(!provider.default_model().is_empty());
        }
    }
}
