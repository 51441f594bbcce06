mod tracing_setup;

use std::{
    fs,
    path::PathBuf,
    sync::OnceLock,
};

use anyhow::{Context as AnyhowContext, Result, anyhow};
use clap::Parser;
use uuid::Uuid;

use formfill::{
    cli::{Cli, Commands, ExportArgs, LlmProvider, RunArgs, StatusArgs, SubmitArgs},
    error::Error,
    llm::RigFormAssistant,
    paths::home_env_path,
    persistence::{RunEnvelope, RunMetadata, RunStatus, RunStore},
    runner::{FormRunner, RunInputs},
    status_export::{RunDetailExport, RunListExport, export_answer_sets},
    submit::HttpDispatcher,
};

static HOME_ENV_ONCE: OnceLock<()> = OnceLock::new();

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = tracing_setup::init(cli.verbose, cli.log_json);
    match cli.command {
        Commands::Run(args) => run_command(args).await?,
        Commands::Submit(args) => submit_command(args).await?,
        Commands::Status(args) => status_command(args)?,
        Commands::Export(args) => export_command(args)?,
    }
    Ok(())
}

async fn run_command(args: RunArgs) -> Result<()> {
    let html = fs::read_to_string(&args.html)
        .with_context(|| format!("Failed to read HTML file {}", args.html.display()))?;
    let api_key = resolve_api_key(args.api_key.clone(), args.provider);
    let model = args
        .model
        .clone()
        .unwrap_or_else(|| args.provider.default_model().to_string());

    let assistant = RigFormAssistant::new(args.provider, api_key.clone(), model.clone())?;
    let inputs = RunInputs {
        html,
        direction: args.direction.clone(),
        count: args.count,
        api_key,
    };

    let store = RunStore::open(None)?;
    let run_id = new_run_id();
    let metadata = RunMetadata {
        provider: args.provider.as_str().to_string(),
        model,
        direction: args.direction.clone(),
        count: args.count,
    };

    let mut runner = FormRunner::new();
    match runner.generate(&assistant, &inputs).await {
        Ok(()) => {
            let envelope = RunEnvelope {
                run_id: run_id.clone(),
                state: runner.into_state(),
                metadata,
            };
            store.save(&envelope, RunStatus::Completed)?;
            println!("Run {run_id} stored with {} responses.", args.count);
            println!("Use `formfill submit --run-id {run_id} --row <id>` to submit a row.");
            Ok(())
        }
        // Validation failures never become a run and surface their message
        // bare; only post-validation pipeline errors get the generic prefix.
        Err(err @ Error::Validation(_)) => Err(anyhow!("{err}")),
        Err(err) => {
            // Recorded as failed (with zero answer sets) so `status` lists it.
            let envelope = RunEnvelope {
                run_id: run_id.clone(),
                state: runner.into_state(),
                metadata,
            };
            store.save(&envelope, RunStatus::Failed)?;
            Err(anyhow!("Failed to generate responses. {err}"))
        }
    }
}

async fn submit_command(args: SubmitArgs) -> Result<()> {
    let store = RunStore::open(None)?;
    let record = store.load(&args.run_id)?;
    let mut envelope = record.envelope;
    let mut runner = FormRunner::from_state(envelope.state);
    let dispatcher = HttpDispatcher::new()?;

    // Rows go out strictly one at a time; each attempt is persisted before
    // the next row starts.
    for row_id in &args.rows {
        match runner.submit_row(&dispatcher, *row_id).await {
            Ok(outcome) if outcome.success => {
                println!("Row {row_id}: request dispatched (delivery not verifiable).");
            }
            Ok(outcome) => {
                println!(
                    "Row {row_id}: {}",
                    outcome.error.as_deref().unwrap_or("submission failed")
                );
            }
            Err(err) => println!("Row {row_id}: {err}"),
        }
        envelope.state = runner.state().clone();
        store.save(&envelope, record.status)?;
    }

    Ok(())
}

fn status_command(args: StatusArgs) -> Result<()> {
    let store = RunStore::open(None)?;
    if let Some(run_id) = args.run_id {
        let record = store.load(&run_id)?;
        if args.json {
            let detail = RunDetailExport::from_record(&record);
            println!("{}", serde_json::to_string_pretty(&detail)?);
        } else {
            println!("Run: {run_id}");
            println!("Status: {}", record.status.as_str());
            println!(
                "Provider: {} ({})",
                record.envelope.metadata.provider, record.envelope.metadata.model
            );
            println!("Direction: {}", record.envelope.metadata.direction);
            if let Some(url) = &record.envelope.state.action_url {
                println!("Endpoint: {url}");
            }
            println!("Questions: {}", record.envelope.state.structure.len());
            for set in &record.envelope.state.answer_sets {
                match &set.submission_error {
                    Some(error) => {
                        println!("- row {} [{}] {error}", set.id, set.submission_state.as_str())
                    }
                    None => println!("- row {} [{}]", set.id, set.submission_state.as_str()),
                }
            }
        }
    } else {
        let limit = args.limit.max(1);
        let summaries = store.list(limit)?;
        if args.json {
            let payload = RunListExport::from_summaries(summaries);
            println!("{}", serde_json::to_string_pretty(&payload)?);
        } else if summaries.is_empty() {
            println!("No runs recorded yet.");
        } else {
            println!("Recent runs:");
            for summary in summaries {
                println!(
                    "- {} [{}] provider={} updated={} direction={}",
                    summary.run_id,
                    summary.status.as_str(),
                    summary.provider,
                    summary.updated_at,
                    summary.direction
                );
            }
        }
    }
    Ok(())
}

fn export_command(args: ExportArgs) -> Result<()> {
    let store = RunStore::open(None)?;
    let record = store.load(&args.run_id)?;
    let exported = export_answer_sets(&record.envelope.state.answer_sets);
    let json = serde_json::to_string_pretty(&exported)?;

    let output = args
        .output
        .unwrap_or_else(|| PathBuf::from(format!("responses-{}.json", args.run_id)));
    fs::write(&output, json)
        .with_context(|| format!("Failed to write export file {}", output.display()))?;
    println!(
        "Exported {} answer sets to {}",
        exported.len(),
        output.display()
    );
    Ok(())
}

/// Resolves the provider credential: CLI flag, then the provider's env var,
/// then assignments in the home `.env` file. Empty means "not provided" and
/// is rejected by run validation.
fn resolve_api_key(cli_value: Option<String>, provider: LlmProvider) -> String {
    ensure_home_env_loaded();
    pick_api_key(cli_value, std::env::var(provider.env_var()).ok()).unwrap_or_default()
}

fn pick_api_key(cli_value: Option<String>, env_value: Option<String>) -> Option<String> {
    normalize_key(cli_value).or_else(|| normalize_key(env_value))
}

fn normalize_key(value: Option<String>) -> Option<String> {
    value.and_then(|candidate| {
        let trimmed = candidate.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn ensure_home_env_loaded() {
    HOME_ENV_ONCE.get_or_init(|| {
        if let Some(path) = home_env_path()
            && let Ok(contents) = fs::read_to_string(&path)
        {
            apply_env_contents(&contents);
        }
    });
}

fn apply_env_contents(contents: &str) {
    for line in contents.lines() {
        if let Some((key, value)) = parse_env_assignment(line)
            && std::env::var_os(&key).is_none()
        {
            unsafe {
                std::env::set_var(&key, &value);
            }
        }
    }
}

fn parse_env_assignment(line: &str) -> Option<(String, String)> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }

    let trimmed = trimmed.strip_prefix("export ").unwrap_or(trimmed).trim();

    let (key, value) = trimmed.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }

    let value = normalize_env_value(value.trim());
    Some((key.to_string(), value))
}

fn normalize_env_value(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.len() >= 2
        && ((trimmed.starts_with('"') && trimmed.ends_with('"'))
            || (trimmed.starts_with('\'') && trimmed.ends_with('\'')))
    {
        return trimmed[1..trimmed.len() - 1].to_string();
    }
    trimmed.to_string()
}

fn new_run_id() -> String {
    Uuid::new_v4().to_string()
}
