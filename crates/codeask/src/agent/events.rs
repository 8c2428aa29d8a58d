//! Status events, sinks, and the loop outcome.
//!
//! The loop reports progress through [`StatusEvent`] values sent to an
//! injected [`StatusSink`]. The loop has no opinion on where they go: a
//! terminal, a log file, or nowhere.
//!
//! | Sink | Use case |
//! |------|----------|
//! | [`NoopSink`] | Tests or silent runs |
//! | [`LoggingSink`] | Structured logging via `tracing` |
//! | [`FnSink`] | Quick closures |
//! | [`CompositeSink`] | Fan out to several sinks in order |

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::Message;
use crate::agent::planner::Plan;
use crate::context::AccessLog;

// ── Events ─────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum StatusEvent<'a> {
    PlanningStarted,
    /// The planner produced a plan (`None` when it failed or was skipped).
    PlanReady { plan: Option<&'a Plan> },
    RoundStart {
        round: u32,
        max_rounds: u32,
        transcript_tokens: usize,
        budget: usize,
    },
    ToolInvoked { name: &'a str, arguments: &'a str },
    ToolFinished {
        name: &'a str,
        bytes: usize,
        is_error: bool,
    },
    DuplicateSkipped { name: &'a str },
    CacheHit { name: &'a str },
    /// Compaction is starting on a transcript of `turns` turns.
    Compacting { turns: usize, tokens: usize },
    Compacted { compressed: usize, summarized: bool },
    ScratchpadInjected { round: u32 },
    CorrectionHint { hint: &'a str },
    /// A candidate answer failed the heuristic check.
    AnswerRejected { reason: &'a str },
    CriticVerdict {
        pass: bool,
        confidence: f32,
        reason: &'a str,
    },
    SynthesisReminder,
    TokenUsage {
        prompt_tokens: u32,
        completion_tokens: u32,
    },
    /// Rounds exhausted; running the no-tool completion.
    FallbackStarted { rounds: u32 },
    Interrupted,
    Finished { status: AskStatus },
}

impl StatusEvent<'_> {
    /// One-line human-readable description.
    pub fn message(&self) -> String {
        match self {
            StatusEvent::PlanningStarted => "Planning search strategy".into(),
            StatusEvent::PlanReady { plan: Some(p) } => format!("Plan ready ({})", p.label()),
            StatusEvent::PlanReady { plan: None } => "No plan, searching directly".into(),
            StatusEvent::RoundStart {
                round,
                max_rounds,
                transcript_tokens,
                budget,
            } => format!(
                "Round {}/{} (~{transcript_tokens}/{budget} tokens)",
                round + 1,
                max_rounds
            ),
            StatusEvent::ToolInvoked { name, arguments } => {
                let preview: String = arguments.chars().take(80).collect();
                format!("{name} {preview}")
            }
            StatusEvent::ToolFinished {
                name,
                bytes,
                is_error,
            } => {
                if *is_error {
                    format!("{name} failed")
                } else {
                    format!("{name} returned {bytes} bytes")
                }
            }
            StatusEvent::DuplicateSkipped { name } => format!("Skipped duplicate {name} call"),
            StatusEvent::CacheHit { name } => format!("{name} served from cache"),
            StatusEvent::Compacting { turns, tokens } => {
                format!("Compacting transcript ({turns} turns, ~{tokens} tokens)")
            }
            StatusEvent::Compacted {
                compressed,
                summarized,
            } => format!(
                "Compressed {compressed} turns{}",
                if *summarized { "" } else { " (placeholder)" }
            ),
            StatusEvent::ScratchpadInjected { round } => {
                format!("Working memory checkpoint after round {}", round + 1)
            }
            StatusEvent::CorrectionHint { hint } => format!("Correction: {hint}"),
            StatusEvent::AnswerRejected { reason } => format!("Answer rejected: {reason}"),
            StatusEvent::CriticVerdict {
                pass,
                confidence,
                reason,
            } => format!(
                "Critic: {} ({confidence:.2}) {reason}",
                if *pass { "PASS" } else { "FAIL" }
            ),
            StatusEvent::SynthesisReminder => "Asking for a synthesized answer".into(),
            StatusEvent::TokenUsage {
                prompt_tokens,
                completion_tokens,
            } => format!("Tokens: prompt={prompt_tokens}, completion={completion_tokens}"),
            StatusEvent::FallbackStarted { rounds } => {
                format!("Round limit ({rounds}) reached, producing fallback answer")
            }
            StatusEvent::Interrupted => "Interrupted".into(),
            StatusEvent::Finished { status } => format!("Finished: {status:?}"),
        }
    }
}

/// Receiver for status events.
pub trait StatusSink: Send + Sync {
    fn on_event(&self, event: &StatusEvent<'_>);
}

/// Discards every event.
pub struct NoopSink;
impl StatusSink for NoopSink {
    fn on_event(&self, _event: &StatusEvent<'_>) {}
}

/// Forwards events to `tracing`: lifecycle at INFO, per-call detail at DEBUG,
/// degraded paths at WARN.
pub struct LoggingSink;

impl StatusSink for LoggingSink {
    fn on_event(&self, event: &StatusEvent<'_>) {
        let msg = event.message();
        match event {
            StatusEvent::PlanningStarted
            | StatusEvent::PlanReady { .. }
            | StatusEvent::RoundStart { .. }
            | StatusEvent::Compacted { .. }
            | StatusEvent::CriticVerdict { .. }
            | StatusEvent::Finished { .. } => info!("{msg}"),
            StatusEvent::FallbackStarted { .. }
            | StatusEvent::Interrupted
            | StatusEvent::AnswerRejected { .. }
            | StatusEvent::CorrectionHint { .. } => warn!("{msg}"),
            _ => debug!("{msg}"),
        }
    }
}

/// Sink backed by a closure.
///
/// ```ignore
/// let sink = FnSink::new(|event| eprintln!("{}", event.message()));
/// ```
pub struct FnSink<F>(F)
where
    F: Fn(&StatusEvent<'_>) + Send + Sync;

impl<F> FnSink<F>
where
    F: Fn(&StatusEvent<'_>) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> StatusSink for FnSink<F>
where
    F: Fn(&StatusEvent<'_>) + Send + Sync,
{
    fn on_event(&self, event: &StatusEvent<'_>) {
        (self.0)(event)
    }
}

/// Dispatches each event to every inner sink in registration order.
#[derive(Default)]
pub struct CompositeSink {
    sinks: Vec<Box<dyn StatusSink>>,
}

impl CompositeSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: impl StatusSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    /// Conditionally add a sink without breaking the builder chain.
    pub fn with_if(self, condition: bool, sink: impl StatusSink + 'static) -> Self {
        if condition { self.with(sink) } else { self }
    }
}

impl StatusSink for CompositeSink {
    fn on_event(&self, event: &StatusEvent<'_>) {
        for sink in &self.sinks {
            sink.on_event(event);
        }
    }
}

// ── Outcome ────────────────────────────────────────────────────────

/// How the loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AskStatus {
    /// The model produced an answer within the round limit.
    Answered,
    /// Rounds ran out (or the final answer was empty) and the no-tool
    /// completion supplied the answer.
    Fallback,
    /// The caller aborted; `answer` holds the best partial answer.
    Interrupted,
}

/// Everything a caller needs after one question.
#[derive(Debug, Clone)]
pub struct AskOutcome {
    pub answer: String,
    pub status: AskStatus,
    pub rounds_used: u32,
    pub tool_calls: usize,
    pub duplicate_calls: usize,
    pub cache_hits: usize,
    /// Final transcript, without the system prompt.
    pub transcript: Vec<Message>,
    pub access_log: AccessLog,
    pub plan: Option<Plan>,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl AskOutcome {
    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens as u64 + self.completion_tokens as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn fn_sink_receives_events() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        let sink = FnSink::new(move |e| s.lock().unwrap().push(e.message()));
        sink.on_event(&StatusEvent::CacheHit { name: "read_file" });
        sink.on_event(&StatusEvent::SynthesisReminder);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], "read_file served from cache");
    }

    #[test]
    fn composite_fans_out_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (a, b) = (seen.clone(), seen.clone());
        let sink = CompositeSink::new()
            .with(FnSink::new(move |_| a.lock().unwrap().push("a")))
            .with_if(false, NoopSink)
            .with(FnSink::new(move |_| b.lock().unwrap().push("b")));
        sink.on_event(&StatusEvent::Interrupted);
        assert_eq!(*seen.lock().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn round_messages_are_one_based() {
        let msg = StatusEvent::RoundStart {
            round: 0,
            max_rounds: 15,
            transcript_tokens: 10,
            budget: 100,
        }
        .message();
        assert!(msg.starts_with("Round 1/15"));
    }
}
