//! Ask one question about the current directory.
//!
//! Runs the full loop (planner, tools, critic, fallback) with read-only
//! tools and prints progress to stderr.
//!
//! # Usage
//!
//! ```bash
//! CODEASK_API_KEY=sk-or-... cargo run --example ask -- "What does this crate do?"
//! ```

use codeask::prelude::*;

#[tokio::main]
async fn main() -> Result<(), Error> {
    let question = std::env::args()
        .skip(1)
        .collect::<Vec<_>>()
        .join(" ");
    let api_key = std::env::var("CODEASK_API_KEY").unwrap_or_default();

    let provider = RetryingProvider::new(ChatClient::new(api_key)?, RetryConfig::default());
    let tools = WorkspaceTools::new(".");
    let config = AgentConfig::new(codeask::DEFAULT_MODEL).with_max_rounds(8);

    let progress = FnSink::new(|event: &StatusEvent<'_>| eprintln!("  · {}", event.message()));
    let outcome = AskLoop::new(&provider, &tools, config)
        .with_status_sink(&progress)
        .run(&question)
        .await?;

    println!("\n{}", outcome.answer);
    println!(
        "\n--- {:?} | {} rounds | {} tool calls | {} tokens ---",
        outcome.status,
        outcome.rounds_used,
        outcome.tool_calls,
        outcome.total_tokens()
    );
    Ok(())
}
