//! triage-llm - CLI entry point.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::{Value, json};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use triage_llm::llm::repair;
use triage_llm::triage::Role;
use triage_llm::{ChatTurn, MemoryStore, Settings, SummaryItem, TriageOutcome, TriageService};

/// ENT call triage with a local Ollama model.
#[derive(Parser, Debug)]
#[command(name = "triage-llm")]
#[command(about = "ENT call triage with a local Ollama model")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ask for the next interview question given the conversation so far
    Chat {
        /// Latest patient message
        #[arg(short, long)]
        message: String,

        /// Earlier turns as role:content (role is user or assistant)
        #[arg(long = "turn", value_parser = parse_turn)]
        turns: Vec<ChatTurn>,
    },

    /// Summarize a call transcript
    Summarize {
        /// Transcript file, or - for stdin
        #[arg(short, long)]
        transcript: PathBuf,
    },

    /// Rank case summaries by urgency
    Rank {
        /// JSON array of case summaries, or - for stdin
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Produce a triage assessment for a call transcript
    ///
    /// Assessments are cached in memory for a single run only; repeated
    /// invocations of this command always call the model.
    Assess {
        /// Transcript file, or - for stdin
        #[arg(short, long)]
        transcript: PathBuf,

        /// Patient context as a JSON object
        #[arg(short, long)]
        context: Option<String>,
    },

    /// Print the caller verification questions
    Verify,

    /// Repair near-JSON text and print the parsed value
    Repair {
        /// Input file, or - for stdin
        #[arg(default_value = "-")]
        input: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Verify => print_json(&json!({
            "questions": triage_llm::triage::prompts::verification_questions()
        })),
        Commands::Repair { input } => {
            let text = read_input(&input)?;
            let repaired = repair(&text).context("Input is not repairable JSON")?;
            print_json(&json!({
                "strategy": repaired.strategy.as_str(),
                "extracted": repaired.extracted,
                "value": repaired.value,
            }))
        }
        Commands::Chat { message, mut turns } => {
            turns.push(ChatTurn::user(message));
            let outcome = build_service()?
                .chat(&turns)
                .await
                .context("Failed to get next interview step")?;
            print_outcome(outcome)
        }
        Commands::Summarize { transcript } => {
            let transcript = read_input(&transcript)?;
            let outcome = build_service()?
                .summarize(&transcript)
                .await
                .context("Failed to summarize transcript")?;
            print_outcome(outcome)
        }
        Commands::Rank { input } => {
            let text = read_input(&input)?;
            let summaries: Vec<SummaryItem> =
                serde_json::from_str(&text).context("Input must be a JSON array of case summaries")?;
            let outcome = build_service()?
                .rank(&summaries)
                .await
                .context("Failed to rank cases")?;
            print_outcome(outcome)
        }
        Commands::Assess {
            transcript,
            context,
        } => {
            let transcript = read_input(&transcript)?;
            let context = context
                .map(|c| serde_json::from_str::<Value>(&c))
                .transpose()
                .context("--context must be valid JSON")?;
            let assessment = build_service()?
                .assess(&transcript, context.as_ref())
                .await
                .context("Failed to assess call")?;
            print_json(&assessment)
        }
    }
}

/// Build the triage service for the configured model server.
fn build_service() -> Result<TriageService> {
    let settings = Settings::load();
    TriageService::from_settings(&settings, Arc::new(MemoryStore::new()))
        .context("Invalid configuration")
}

/// Parse a `role:content` conversation turn.
fn parse_turn(s: &str) -> Result<ChatTurn, String> {
    let (role, content) = s
        .split_once(':')
        .ok_or_else(|| format!("expected role:content, got '{s}'"))?;
    let role = match role.trim() {
        "user" => Role::User,
        "assistant" => Role::Assistant,
        other => return Err(format!("unknown role '{other}', expected user or assistant")),
    };
    Ok(ChatTurn {
        role,
        content: content.trim().to_string(),
    })
}

/// Read a file, or stdin when `path` is `-`.
fn read_input(path: &Path) -> Result<String> {
    let text = if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read stdin")?;
        buf
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?
    };

    if text.trim().is_empty() {
        bail!("Input is empty");
    }
    Ok(text)
}

fn print_outcome<T: Serialize>(outcome: TriageOutcome<T>) -> Result<()> {
    match outcome {
        TriageOutcome::Parsed(value) => print_json(&value),
        TriageOutcome::Unstructured(value) => print_json(&value),
        TriageOutcome::Degraded { raw } => print_json(&json!({
            "raw_response": raw,
            "error": "unable to parse JSON",
        })),
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("Failed to render output")?;
    println!("{}", rendered);
    Ok(())
}
