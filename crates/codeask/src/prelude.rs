//! Convenience re-exports for common `codeask` types.
//!
//! ```ignore
//! use codeask::prelude::*;
//! ```
//!
//! Pulls in what a caller needs to run one question: the provider client
//! and retry wrapper, the tool executor, [`AskLoop`] with its config, status
//! sinks and the outcome. Reducer events, budget helpers and parsers stay
//! in their modules.

// ── Core types ──────────────────────────────────────────────────────
pub use crate::{ChatRequest, Error, Message, ToolDef};

// ── Provider ────────────────────────────────────────────────────────
pub use crate::api::{ChatClient, ModelProvider, RetryConfig, RetryingProvider};

// ── Agent runtime ───────────────────────────────────────────────────
pub use crate::agent::{
    AbortHandle, AbortSignal, AgentConfig, AskLoop, AskOutcome, AskStatus, CompositeSink,
    FileNotesStore, FnSink, LoggingSink, NoopNotesStore, NoopSink, ProjectNotesStore,
    StatusEvent, StatusSink, Toggle, abort_pair,
};

// ── Tools ───────────────────────────────────────────────────────────
pub use crate::tools::{ToolExecutor, ToolKind, WorkspaceTools};
