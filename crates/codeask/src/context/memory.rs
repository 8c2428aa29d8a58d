//! Working memory: tool output capping, scratchpad cadence and transcript
//! compaction.
//!
//! Every tool result is capped *before* it enters the transcript. When the
//! transcript crosses the compaction threshold, the middle of it is replaced
//! by one summary turn. The first turn (the question) and the most recent
//! turns are always kept verbatim.

use tracing::{debug, warn};

use super::access_log::AccessLog;
use super::budget::{context_budget, estimate_transcript_tokens, truncate_tool_output};
use super::summarizer::{
    MIN_SUMMARY_CHARS, build_summarization_request, placeholder_turn, summary_turn,
};
use crate::Message;
use crate::agent::config::MemoryConfig;
use crate::api::provider::{ModelProvider, complete};
use crate::tools::invocation::ToolInvocation;

/// Result of a compaction attempt.
#[derive(Debug, Clone)]
pub struct Compaction {
    pub turns: Vec<Message>,
    /// Number of turns folded into the summary (0 when nothing changed).
    pub compressed: usize,
    /// Whether the model produced the summary (vs. the placeholder).
    pub summarized: bool,
}

#[derive(Debug)]
pub struct WorkingMemory {
    model: String,
    aux_model: String,
    config: MemoryConfig,
    access_log: AccessLog,
}

impl WorkingMemory {
    pub fn new(model: impl Into<String>, aux_model: impl Into<String>, config: MemoryConfig) -> Self {
        Self {
            model: model.into(),
            aux_model: aux_model.into(),
            config,
            access_log: AccessLog::new(),
        }
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    pub fn access_log(&self) -> &AccessLog {
        &self.access_log
    }

    pub fn into_access_log(self) -> AccessLog {
        self.access_log
    }

    /// Record the access and cap the output for the transcript.
    pub fn process_tool_result(&mut self, invocation: &ToolInvocation, output: &str) -> String {
        self.access_log.record(&invocation.name, &invocation.arguments);
        truncate_tool_output(&invocation.name, output, self.config.tool_output_cap)
    }

    /// True on rounds 3, 6, 9, ... (with the default interval).
    pub fn should_scratchpad(&self, round: u32) -> bool {
        let every = self.config.scratchpad_interval;
        every > 0 && round > 0 && round % every == 0
    }

    /// True when the transcript crossed the threshold and has a middle to
    /// fold (more than the question plus `keep_recent` plus one turn).
    pub fn should_compact(&self, turns: &[Message]) -> bool {
        let limit = context_budget(&self.model) as f64 * self.config.compaction_threshold;
        self.can_compact(turns) && estimate_transcript_tokens(turns) as f64 > limit
    }

    pub fn can_compact(&self, turns: &[Message]) -> bool {
        turns.len() > self.config.keep_recent + 2
    }

    /// Replace the middle of the transcript with a summary. Never fails: an
    /// unavailable or degenerate summarizer yields a placeholder turn.
    pub async fn compact<P: ModelProvider + ?Sized>(
        &self,
        provider: &P,
        turns: &[Message],
    ) -> Compaction {
        let keep = self.config.keep_recent;
        if !self.can_compact(turns) {
            return Compaction {
                turns: turns.to_vec(),
                compressed: 0,
                summarized: false,
            };
        }

        let middle = &turns[1..turns.len() - keep];
        let request = build_summarization_request(&self.aux_model, middle);
        let (bridge, summarized) = match complete(provider, &request).await {
            Ok(done) if done.text.trim().chars().count() >= MIN_SUMMARY_CHARS => {
                (summary_turn(&done.text, middle.len()), true)
            }
            Ok(done) => {
                warn!(
                    "Summarizer returned a degenerate result ({} chars), using placeholder",
                    done.text.trim().len()
                );
                (placeholder_turn(middle.len()), false)
            }
            Err(e) => {
                warn!("Summarizer call failed, using placeholder: {e}");
                (placeholder_turn(middle.len()), false)
            }
        };

        let mut out = Vec::with_capacity(keep + 2);
        out.push(turns[0].clone());
        out.push(bridge);
        out.extend_from_slice(&turns[turns.len() - keep..]);
        debug!(
            "Compacted {} turns into one ({} -> {} turns)",
            middle.len(),
            turns.len(),
            out.len()
        );

        Compaction {
            turns: out,
            compressed: middle.len(),
            summarized,
        }
    }
}
