//! The model provider seam.
//!
//! [`ModelProvider`] is the only way the loop talks to a model. The HTTP
//! adapter lives in [`client`](super::client); tests drive the loop with
//! scripted stubs.

use std::future::Future;
use std::pin::Pin;

use futures::{Stream, StreamExt};
use tracing::debug;

use crate::{ChatCompletion, ChatRequest, Error, UsageInfo};

/// Boxed future returned by provider calls, so the trait stays object-safe.
pub type ProviderFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, Error>> + Send + 'a>>;

/// Boxed stream of completion chunks.
pub type CompletionStream<'a> = Pin<Box<dyn Stream<Item = Result<StreamChunk, Error>> + Send + 'a>>;

/// One increment of a streamed completion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamChunk {
    pub delta: String,
    pub done: bool,
    pub usage: Option<UsageInfo>,
}

/// A chat-completion backend. Local or remote makes no difference to the loop.
pub trait ModelProvider: Send + Sync {
    /// One non-streaming request that may return tool calls.
    fn chat_with_tools<'a>(&'a self, request: &'a ChatRequest) -> ProviderFuture<'a, ChatCompletion>;

    /// A streamed, tool-less completion.
    fn stream_completion<'a>(&'a self, request: &'a ChatRequest) -> CompletionStream<'a>;
}

impl<P: ModelProvider + ?Sized> ModelProvider for &P {
    fn chat_with_tools<'a>(&'a self, request: &'a ChatRequest) -> ProviderFuture<'a, ChatCompletion> {
        (**self).chat_with_tools(request)
    }

    fn stream_completion<'a>(&'a self, request: &'a ChatRequest) -> CompletionStream<'a> {
        (**self).stream_completion(request)
    }
}

/// Text and usage collected from a completion stream.
#[derive(Debug, Clone, Default)]
pub struct Completed {
    pub text: String,
    pub usage: Option<UsageInfo>,
}

/// Drain `stream_completion` into a single string. Used by the no-tool
/// fallback and the auxiliary planner/summarizer/critic calls.
pub async fn complete<P: ModelProvider + ?Sized>(
    provider: &P,
    request: &ChatRequest,
) -> Result<Completed, Error> {
    let mut stream = provider.stream_completion(request);
    let mut out = Completed::default();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        out.text.push_str(&chunk.delta);
        if chunk.usage.is_some() {
            out.usage = chunk.usage;
        }
        if chunk.done {
            break;
        }
    }
    debug!("Completion collected: {} chars", out.text.len());
    Ok(out)
}
