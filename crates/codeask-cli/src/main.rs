//! `codeask`: answer a question about a local codebase.
//!
//! Reads the API key from `CODEASK_API_KEY` (or `--api-key`). Works with any
//! OpenAI-compatible endpoint via `--base-url` / `CODEASK_BASE_URL`.
//!
//! # Examples
//!
//! ```sh
//! codeask "How does the cache get invalidated?"
//! echo "What does main() do?" | codeask --json
//! codeask -vv --model openai/gpt-4o --workspace ../api "Where is auth checked?"
//! ```
//!
//! Exit status: 0 on an answer, 1 on error, 130 when interrupted.

use std::io::{IsTerminal, Read};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use codeask::agent::{AskLoop, AskStatus, CompositeSink, LoggingSink, abort_pair};
use codeask::{DEFAULT_BASE_URL, DEFAULT_MODEL, Error, MAX_TOOL_ROUNDS};
use codeask_cli::{AskConfig, ProgressSink, outcome_json};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Answer questions about a local codebase with a bounded tool-use loop.
#[derive(Parser)]
#[command(name = "codeask", version)]
struct Cli {
    /// The question. Read from stdin when omitted and stdin is not a terminal.
    question: Vec<String>,

    /// API key for the model endpoint.
    #[arg(long, env = "CODEASK_API_KEY", default_value = "", hide_env_values = true)]
    api_key: String,

    /// OpenAI-compatible base URL.
    #[arg(long, env = "CODEASK_BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Model driving the rounds.
    #[arg(short, long, env = "CODEASK_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    /// Model for planner, summarizer and critic calls (defaults to --model).
    #[arg(long)]
    aux_model: Option<String>,

    /// Workspace root the tools operate in.
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Maximum model/tool rounds (capped at 15).
    #[arg(long, default_value_t = MAX_TOOL_ROUNDS)]
    max_rounds: u32,

    /// Maximum tokens per model response.
    #[arg(long, default_value_t = 2048)]
    max_tokens: u32,

    /// Sampling temperature.
    #[arg(long, default_value_t = 0.2)]
    temperature: f32,

    /// Retries for transient provider errors.
    #[arg(long, default_value_t = 2)]
    retries: u32,

    /// Offer the write_file tool.
    #[arg(long)]
    allow_writes: bool,

    /// Offer the run_command tool.
    #[arg(long)]
    allow_shell: bool,

    /// Don't read or update .codeask/notes.md.
    #[arg(long)]
    no_notes: bool,

    /// Skip the search planner call.
    #[arg(long)]
    no_planner: bool,

    /// Ask the planner for a structured JSON plan.
    #[arg(long, conflicts_with = "no_planner")]
    execution_plan: bool,

    /// Skip the critic call on candidate answers.
    #[arg(long)]
    no_critic: bool,

    /// Print the outcome as JSON.
    #[arg(long)]
    json: bool,

    /// Hide progress lines.
    #[arg(short, long)]
    quiet: bool,

    /// Log verbosity (-v info, -vv debug). RUST_LOG overrides.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn ask_config(&self, workspace: PathBuf) -> AskConfig {
        AskConfig {
            api_key: self.api_key.clone(),
            base_url: self.base_url.clone(),
            model: self.model.clone(),
            aux_model: self.aux_model.clone(),
            workspace,
            max_rounds: self.max_rounds,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            retries: self.retries,
            allow_writes: self.allow_writes,
            allow_shell: self.allow_shell,
            notes: !self.no_notes,
            planner: !self.no_planner,
            execution_plan: self.execution_plan,
            critic: !self.no_critic,
        }
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();
}

/// Question from the arguments, or from piped stdin.
fn read_question(words: &[String]) -> Result<String, Error> {
    let mut question = words.join(" ");
    if question.trim().is_empty() && !std::io::stdin().is_terminal() {
        std::io::stdin()
            .read_to_string(&mut question)
            .map_err(|e| Error::InputMissing {
                what: format!("question (failed to read stdin: {e})"),
            })?;
    }
    if question.trim().is_empty() {
        return Err(Error::InputMissing {
            what: "question (pass it as an argument or on stdin)".into(),
        });
    }
    Ok(question.trim().to_string())
}

async fn run(cli: Cli) -> Result<AskStatus, Error> {
    let question = read_question(&cli.question)?;
    let workspace = std::fs::canonicalize(&cli.workspace).unwrap_or_else(|_| cli.workspace.clone());
    let config = cli.ask_config(workspace);
    config.validate()?;

    let provider = config.provider()?;
    let tools = config.tools();
    let notes = config.notes_store();
    let sink = CompositeSink::new()
        .with_if(!cli.quiet, ProgressSink)
        .with_if(cli.verbose > 0, LoggingSink);

    let (handle, signal) = abort_pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.abort();
        }
    });

    info!("Asking {} in {}", config.model, config.workspace.display());
    let outcome = AskLoop::new(&provider, &tools, config.agent_config())
        .with_status_sink(&sink)
        .with_notes_store(notes.as_ref())
        .with_abort(signal)
        .with_workspace_root(config.workspace.clone())
        .run(&question)
        .await?;

    if cli.json {
        println!("{:#}", outcome_json(&outcome));
    } else if !outcome.answer.is_empty() {
        println!("{}", outcome.answer);
    }
    if outcome.status == AskStatus::Interrupted {
        eprintln!("Interrupted.");
    }
    Ok(outcome.status)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(AskStatus::Interrupted) => ExitCode::from(130),
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!(code = e.code(), "{e}");
            eprintln!("Error: {e}");
            ExitCode::from(1)
        }
    }
}
