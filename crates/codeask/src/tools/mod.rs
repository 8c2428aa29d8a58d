//! The tool layer: a closed vocabulary, its executor, and the bookkeeping
//! the loop keeps around tool calls.
//!
//! - [`kind`]: [`ToolKind`] and the static table mapping each kind to its
//!   name, schema, capability and handler.
//! - [`handlers`]: the tool implementations (file reads, grep, find, git).
//! - [`executor`]: [`ToolExecutor`] trait and [`WorkspaceTools`], which adds
//!   schema validation, path checks, the write policy and timeouts.
//! - [`invocation`]: parsed calls and argument canonicalization.
//! - [`tracker`]: duplicate detection and correction hints.
//! - [`cache`]: TTL result cache with write invalidation.

pub mod cache;
pub mod executor;
pub mod handlers;
pub mod invocation;
pub mod kind;
pub mod tracker;

pub use cache::ToolResultCache;
pub use executor::{ToolExecutor, ToolFuture, WorkspaceTools, WritePolicy};
pub use invocation::{ToolInvocation, canonicalize};
pub use kind::{Capability, ToolKind};
pub use tracker::{ToolCallRecord, ToolCallTracker};
