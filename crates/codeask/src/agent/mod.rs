//! The ask loop and its supporting modules.
//!
//! - [`controller::AskLoop`]: the bounded model/tool loop. Start here.
//! - [`config`]: [`AgentConfig`] with [`Toggle`]d planner and critic.
//! - [`state`]: [`LoopState`] and the [`LoopEvent`] reducer every transcript
//!   change goes through.
//! - [`planner`]: free-text or structured search plans.
//! - [`critic`]: heuristic answer validation and the critic call.
//! - [`events`]: [`StatusEvent`], [`StatusSink`] implementations and the
//!   [`AskOutcome`].
//! - [`notes`]: per-workspace project notes.
//! - [`abort`]: cooperative cancellation.
//! - [`prompt`]: fixed prompt text and [`SystemPromptBuilder`].

pub mod abort;
pub mod config;
pub mod controller;
pub mod critic;
pub mod events;
pub mod notes;
pub mod planner;
pub mod prompt;
pub mod state;

pub use abort::{AbortHandle, AbortSignal, abort_pair};
pub use config::{AgentConfig, CriticConfig, MemoryConfig, PlannerConfig, Toggle};
pub use controller::AskLoop;
pub use critic::{AnswerIssue, CriticVerdict, critic_evaluate, validate_answer};
pub use events::{
    AskOutcome, AskStatus, CompositeSink, FnSink, LoggingSink, NoopSink, StatusEvent, StatusSink,
};
pub use notes::{FileNotesStore, NoopNotesStore, ProjectNotesStore};
pub use planner::{ExecutionPlan, Plan, PlanStep, parse_execution_plan};
pub use prompt::SystemPromptBuilder;
pub use state::{Gate, LoopEvent, LoopState};
