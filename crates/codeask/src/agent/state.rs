//! Loop state and its transitions.
//!
//! The controller performs I/O (model calls, tool execution, summarization)
//! and turns each result into a [`LoopEvent`]. [`LoopState::apply`] is the
//! only place the transcript and tracker change, so every branch of a round
//! can be tested without a provider.

use serde_json::{Map, Value};

use super::prompt::{SCRATCHPAD_PROMPT, SYNTHESIS_REMINDER, answer_correction, duplicate_call_guidance};
use crate::tools::invocation::canonicalize;
use crate::tools::tracker::ToolCallTracker;
use crate::{Message, ToolCall};

/// Which candidate gate rejected an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    /// First evaluation after tools were used.
    Synthesis,
    /// The single critic pass after the synthesis gate.
    PostCritic,
}

#[derive(Debug, Clone)]
pub enum LoopEvent {
    /// The model asked for tools. `content` may be empty.
    AssistantToolCalls {
        content: Option<String>,
        calls: Vec<ToolCall>,
    },
    DuplicateSkipped {
        call_id: String,
        name: String,
        arguments: Map<String, Value>,
    },
    CacheHit {
        call_id: String,
        name: String,
        arguments: Map<String, Value>,
        output: String,
    },
    /// `output` is already capped by working memory.
    ToolSucceeded {
        call_id: String,
        name: String,
        arguments: Map<String, Value>,
        output: String,
    },
    ToolFailed {
        call_id: String,
        name: String,
        arguments: Map<String, Value>,
        message: String,
    },
    Compacted { turns: Vec<Message> },
    Scratchpad,
    CorrectionHint { hint: String },
    CandidateRejected {
        answer: String,
        reason: String,
        gate: Gate,
    },
    /// The candidate was empty; ask for a synthesized answer.
    SynthesisReminder,
}

#[derive(Debug, Default)]
pub struct LoopState {
    pub transcript: Vec<Message>,
    pub tracker: ToolCallTracker,
    /// At least one tool call has been answered.
    pub had_tool_calls: bool,
    pub synthesis_injected: bool,
    pub post_critic_used: bool,
    /// Calls executed or served from cache (duplicates excluded).
    pub tool_calls: usize,
    pub cache_hits: usize,
    /// Most recent non-empty candidate, returned on interrupt.
    pub last_candidate: Option<String>,
}

impl LoopState {
    /// Start from the enriched first user turn.
    pub fn new(first_turn: impl Into<String>) -> Self {
        Self {
            transcript: vec![Message::user(first_turn)],
            ..Default::default()
        }
    }

    pub fn apply(mut self, event: LoopEvent) -> Self {
        match event {
            LoopEvent::AssistantToolCalls { content, calls } => {
                self.transcript
                    .push(Message::assistant_tool_calls(content, calls));
            }
            LoopEvent::DuplicateSkipped {
                call_id,
                name,
                arguments,
            } => {
                let guidance = duplicate_call_guidance(&name, &canonicalize(&arguments));
                self.transcript.push(Message::tool_result(call_id, guidance));
                self.tracker.record_duplicate(&name, &arguments);
            }
            LoopEvent::CacheHit {
                call_id,
                name,
                arguments,
                output,
            } => {
                self.transcript.push(Message::tool_result(call_id, output));
                self.tracker.record(&name, &arguments, false);
                self.had_tool_calls = true;
                self.tool_calls += 1;
                self.cache_hits += 1;
            }
            LoopEvent::ToolSucceeded {
                call_id,
                name,
                arguments,
                output,
            } => {
                self.transcript.push(Message::tool_result(call_id, output));
                self.tracker.record(&name, &arguments, false);
                self.had_tool_calls = true;
                self.tool_calls += 1;
            }
            LoopEvent::ToolFailed {
                call_id,
                name,
                arguments,
                message,
            } => {
                self.transcript
                    .push(Message::tool_result(call_id, format!("Tool error: {message}")));
                self.tracker.record(&name, &arguments, true);
                self.had_tool_calls = true;
                self.tool_calls += 1;
            }
            LoopEvent::Compacted { turns } => {
                self.transcript = turns;
            }
            LoopEvent::Scratchpad => {
                self.transcript.push(Message::user(SCRATCHPAD_PROMPT));
            }
            LoopEvent::CorrectionHint { hint } => {
                self.transcript.push(Message::user(hint));
            }
            LoopEvent::CandidateRejected {
                answer,
                reason,
                gate,
            } => {
                if !answer.trim().is_empty() {
                    self.transcript.push(Message::assistant_text(answer.clone()));
                    self.last_candidate = Some(answer);
                }
                self.transcript.push(Message::user(answer_correction(&reason)));
                match gate {
                    Gate::Synthesis => self.synthesis_injected = true,
                    Gate::PostCritic => self.post_critic_used = true,
                }
            }
            LoopEvent::SynthesisReminder => {
                self.transcript.push(Message::user(SYNTHESIS_REMINDER));
                self.synthesis_injected = true;
            }
        }
        self
    }

    /// True while the synthesis gate still applies to a candidate.
    pub fn at_synthesis_gate(&self) -> bool {
        self.had_tool_calls && !self.synthesis_injected
    }
}
