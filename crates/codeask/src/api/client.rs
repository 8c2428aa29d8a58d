//! HTTP adapter for OpenAI-compatible `/chat/completions` endpoints.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tracing::{debug, trace};

use super::provider::{CompletionStream, ModelProvider, ProviderFuture};
use super::streaming::sse_stream;
use crate::{
    ChatCompletion, ChatRequest, DEFAULT_BASE_URL, Error, Message, MessageRole, ToolCall,
    UsageInfo,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Async client for any OpenAI-compatible chat completions API
/// (OpenRouter, OpenAI, Ollama's `/v1`, vLLM, ...).
#[derive(Clone)]
pub struct ChatClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl std::fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct RawChatResponse {
    choices: Option<Vec<RawChoice>>,
    error: Option<ApiErrorResponse>,
    #[serde(default)]
    usage: Option<UsageInfo>,
}

#[derive(Deserialize)]
struct RawChoice {
    message: RawResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct RawResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Deserialize)]
struct ApiErrorResponse {
    message: String,
}

impl ChatClient {
    /// Client for the default endpoint.
    pub fn new(api_key: impl Into<String>) -> Result<Self, Error> {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    /// Client for a custom endpoint, e.g. `http://localhost:11434/v1`.
    pub fn with_base_url(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("codeask/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn post(&self, body: &serde_json::Value) -> reqwest::RequestBuilder {
        let mut req = self.client.post(self.endpoint()).json(body);
        if !self.api_key.is_empty() {
            req = req.bearer_auth(&self.api_key);
        }
        req
    }

    fn wire_body(request: &ChatRequest, stream: bool) -> Result<serde_json::Value, Error> {
        let wire = ChatRequest {
            messages: sanitize_transcript(&request.messages),
            ..request.clone()
        };
        let mut body = serde_json::to_value(&wire).map_err(|e| Error::ProviderStream {
            reason: format!("failed to serialize request: {e}"),
        })?;
        if stream {
            body["stream"] = serde_json::Value::Bool(true);
        }
        Ok(body)
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatCompletion, Error> {
        let model = request.model.as_deref().unwrap_or("(none)");
        debug!(
            "LLM request: model={}, messages={}, tools={}, max_tokens={}, temp={}",
            model,
            request.messages.len(),
            request.tools.as_ref().map_or(0, Vec::len),
            request.max_tokens,
            request.temperature,
        );
        let body = Self::wire_body(request, false)?;
        trace!("Request payload size: {} bytes", body.to_string().len());

        let start = Instant::now();
        let resp = self.post(&body).send().await?;
        let status = resp.status();
        let text = resp.text().await?;
        debug!(
            "LLM response: HTTP {} in {:.1}s ({} bytes)",
            status,
            start.elapsed().as_secs_f64(),
            text.len()
        );

        if !status.is_success() {
            return Err(Error::from_status(status.as_u16(), text, model));
        }

        let parsed: RawChatResponse =
            serde_json::from_str(&text).map_err(|e| Error::ProviderStream {
                reason: format!("failed to parse response: {e}"),
            })?;
        if let Some(err) = parsed.error {
            return Err(Error::ProviderUnavailable {
                reason: format!("API error: {}", err.message),
            });
        }

        let Some(choice) = parsed.choices.and_then(|c| c.into_iter().next()) else {
            debug!("LLM output: empty (no choices)");
            return Ok(ChatCompletion {
                usage: parsed.usage,
                ..Default::default()
            });
        };
        debug!(
            "LLM output: {} chars text, {} tool call(s)",
            choice.message.content.as_ref().map_or(0, String::len),
            choice.message.tool_calls.as_ref().map_or(0, Vec::len),
        );
        Ok(ChatCompletion {
            content: choice.message.content,
            tool_calls: choice.message.tool_calls.unwrap_or_default(),
            usage: parsed.usage,
            finish_reason: choice.finish_reason,
        })
    }

    async fn open_stream(&self, request: &ChatRequest) -> Result<reqwest::Response, Error> {
        let model = request.model.as_deref().unwrap_or("(none)");
        debug!("Sending streaming chat request: model={model}");
        let body = Self::wire_body(request, true)?;
        let resp = self.post(&body).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(Error::from_status(status.as_u16(), text, model));
        }
        Ok(resp)
    }
}

impl ModelProvider for ChatClient {
    fn chat_with_tools<'a>(&'a self, request: &'a ChatRequest) -> ProviderFuture<'a, ChatCompletion> {
        Box::pin(self.chat(request))
    }

    fn stream_completion<'a>(&'a self, request: &'a ChatRequest) -> CompletionStream<'a> {
        use futures::StreamExt;

        Box::pin(
            futures::stream::once(self.open_stream(request)).flat_map(|opened| match opened {
                Ok(resp) => sse_stream(resp),
                Err(e) => {
                    Box::pin(futures::stream::once(async move { Err(e) })) as CompletionStream<'static>
                }
            }),
        )
    }
}

/// Rewrite tool-result turns whose assistant tool-call turn is no longer in
/// the transcript (compaction removed it) as plain user turns. APIs reject
/// tool results without a matching call.
pub fn sanitize_transcript(messages: &[Message]) -> Vec<Message> {
    let mut known_ids: HashSet<&str> = HashSet::new();
    messages
        .iter()
        .map(|msg| {
            for call in msg.tool_calls.iter().flatten() {
                known_ids.insert(call.id.as_str());
            }
            match (&msg.role, msg.tool_call_id.as_deref()) {
                (MessageRole::Tool, Some(id)) if known_ids.contains(id) => msg.clone(),
                (MessageRole::Tool, _) => Message::user(format!("[Tool result]\n{}", msg.text())),
                _ => msg.clone(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orphan_tool_results_become_user_turns() {
        let call = ToolCall::new("c2", "read_file", "{}");
        let messages = vec![
            Message::user("question"),
            Message::tool_result("c1", "orphaned output"),
            Message::assistant_tool_calls(None, vec![call]),
            Message::tool_result("c2", "matched output"),
        ];
        let out = sanitize_transcript(&messages);
        assert_eq!(out[1].role, MessageRole::User);
        assert!(out[1].text().contains("orphaned output"));
        assert!(out[1].tool_call_id.is_none());
        assert_eq!(out[3].role, MessageRole::Tool);
        assert_eq!(out[3].tool_call_id.as_deref(), Some("c2"));
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client = ChatClient::with_base_url("k", "http://localhost:11434/v1/").unwrap();
        assert_eq!(client.endpoint(), "http://localhost:11434/v1/chat/completions");
    }

    #[test]
    fn stream_body_sets_flag() {
        let req = ChatRequest {
            model: Some("m".into()),
            messages: vec![Message::user("hi")],
            ..Default::default()
        };
        let body = ChatClient::wire_body(&req, true).unwrap();
        assert_eq!(body["stream"], true);
        assert_eq!(body["model"], "m");
    }
}
