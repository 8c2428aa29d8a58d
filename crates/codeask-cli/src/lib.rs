//! Ask questions about a local codebase from the terminal.
//!
//! The `codeask` binary wires flags into the `codeask` library: an
//! [`AskConfig`] builds the provider, tools and loop config, a
//! [`ProgressSink`] prints status lines on stderr, and the answer goes to
//! stdout (as Markdown, or JSON with `--json`).
//!
//! ```sh
//! export CODEASK_API_KEY=sk-or-...
//! codeask "Where is the retry backoff configured?"
//! codeask -w ../service --allow-writes "Add a doc comment to parse_config"
//! ```

pub mod config;

pub use config::AskConfig;

use codeask::agent::{AskOutcome, StatusEvent, StatusSink};
use serde_json::{Value, json};

/// Short progress lines on stderr.
pub struct ProgressSink;

impl StatusSink for ProgressSink {
    fn on_event(&self, event: &StatusEvent<'_>) {
        if let Some(line) = progress_line(event) {
            eprintln!("{line}");
        }
    }
}

/// The line shown for an event, or `None` for events too noisy to print.
pub fn progress_line(event: &StatusEvent<'_>) -> Option<String> {
    match event {
        StatusEvent::TokenUsage { .. } | StatusEvent::ToolFinished { is_error: false, .. } => None,
        StatusEvent::Finished { .. } => None,
        _ => Some(format!("  · {}", event.message())),
    }
}

/// Machine-readable summary for `--json`.
pub fn outcome_json(outcome: &AskOutcome) -> Value {
    json!({
        "answer": outcome.answer,
        "status": outcome.status,
        "rounds_used": outcome.rounds_used,
        "tool_calls": outcome.tool_calls,
        "duplicate_calls": outcome.duplicate_calls,
        "cache_hits": outcome.cache_hits,
        "files_read": outcome.access_log.files_read,
        "search_queries": outcome.access_log.search_queries,
        "plan": outcome.plan.as_ref().map(|p| p.render()),
        "usage": {
            "prompt_tokens": outcome.prompt_tokens,
            "completion_tokens": outcome.completion_tokens,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use codeask::agent::AskStatus;
    use codeask::context::AccessLog;

    #[test]
    fn noisy_events_are_hidden() {
        assert!(
            progress_line(&StatusEvent::TokenUsage {
                prompt_tokens: 1,
                completion_tokens: 1
            })
            .is_none()
        );
        assert!(
            progress_line(&StatusEvent::ToolFinished {
                name: "read_file",
                bytes: 10,
                is_error: false
            })
            .is_none()
        );
        let line = progress_line(&StatusEvent::DuplicateSkipped { name: "search_text" }).unwrap();
        assert!(line.contains("Skipped duplicate search_text"));
    }

    #[test]
    fn json_summary() {
        let mut access_log = AccessLog::new();
        access_log.files_read.insert("src/main.rs".into());
        let outcome = AskOutcome {
            answer: "It is in src/main.rs.".into(),
            status: AskStatus::Fallback,
            rounds_used: 15,
            tool_calls: 20,
            duplicate_calls: 2,
            cache_hits: 1,
            transcript: Vec::new(),
            access_log,
            plan: None,
            prompt_tokens: 100,
            completion_tokens: 20,
        };
        let value = outcome_json(&outcome);
        assert_eq!(value["status"], "fallback");
        assert_eq!(value["files_read"][0], "src/main.rs");
        assert_eq!(value["usage"]["prompt_tokens"], 100);
        assert!(value["plan"].is_null());
    }
}
