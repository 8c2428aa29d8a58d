//! Keeping the transcript inside the model's context window.
//!
//! 1. **[`budget`]**: character-heuristic token estimates, the per-model
//!    context table, and truncation strategies.
//! 2. **[`memory`]**: [`WorkingMemory`]: caps each tool result, decides
//!    when to inject a scratchpad checkpoint, and compacts the transcript.
//! 3. **[`summarizer`]**: the summarization request used by compaction.
//! 4. **[`access_log`]**: files read and searches run, for project notes.

pub mod access_log;
pub mod budget;
pub mod memory;
pub mod summarizer;

pub use access_log::AccessLog;
pub use budget::{
    context_budget, estimate_tokens, estimate_transcript_tokens, is_over_budget,
    truncate_to_budget, truncate_tool_output,
};
pub use memory::{Compaction, WorkingMemory};
