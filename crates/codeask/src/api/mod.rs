//! Model access: the provider seam, the HTTP adapter, SSE streaming and retry.
//!
//! - [`provider`]: [`ModelProvider`] trait, [`StreamChunk`], and the
//!   [`complete`] helper that drains a stream into text.
//! - [`client`]: [`ChatClient`] for OpenAI-compatible endpoints.
//! - [`streaming`]: incremental SSE parser.
//! - [`retry`]: [`RetryConfig`] and the [`RetryingProvider`] decorator.
//!   Only transient failures (unavailable, rate limited) are retried.

pub mod client;
pub mod provider;
pub mod retry;
pub mod streaming;

pub use client::ChatClient;
pub use provider::{
    Completed, CompletionStream, ModelProvider, ProviderFuture, StreamChunk, complete,
};
pub use retry::{RetryConfig, RetryingProvider};
