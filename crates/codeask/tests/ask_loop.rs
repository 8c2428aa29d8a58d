//! End-to-end runs of the ask loop against scripted collaborators.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use codeask::agent::{AgentConfig, AskLoop, AskStatus, FnSink};
use codeask::api::{CompletionStream, ModelProvider, ProviderFuture, StreamChunk};
use codeask::tools::{ToolExecutor, ToolFuture, ToolInvocation, ToolKind};
use codeask::{ChatCompletion, ChatRequest, MAX_TOOL_ROUNDS, MessageRole, ToolCall, ToolDef};

/// Produces round `n`'s completion from a closure; every streamed
/// (auxiliary or fallback) call returns `stream_text`.
struct ScriptedProvider<F> {
    next: F,
    stream_text: &'static str,
    chat_calls: AtomicUsize,
    stream_calls: AtomicUsize,
}

impl<F> ScriptedProvider<F>
where
    F: Fn(usize) -> ChatCompletion + Send + Sync,
{
    fn new(next: F, stream_text: &'static str) -> Self {
        Self {
            next,
            stream_text,
            chat_calls: AtomicUsize::new(0),
            stream_calls: AtomicUsize::new(0),
        }
    }
}

impl<F> ModelProvider for ScriptedProvider<F>
where
    F: Fn(usize) -> ChatCompletion + Send + Sync,
{
    fn chat_with_tools<'a>(&'a self, _request: &'a ChatRequest) -> ProviderFuture<'a, ChatCompletion> {
        let n = self.chat_calls.fetch_add(1, Ordering::SeqCst);
        let reply = (self.next)(n);
        Box::pin(async move { Ok(reply) })
    }

    fn stream_completion<'a>(&'a self, _request: &'a ChatRequest) -> CompletionStream<'a> {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(futures::stream::iter([Ok(StreamChunk {
            delta: self.stream_text.to_string(),
            done: true,
            usage: None,
        })]))
    }
}

/// Counts executions per canonical call.
#[derive(Default)]
struct CountingExecutor {
    calls: Mutex<Vec<String>>,
}

impl CountingExecutor {
    fn count(&self, name: &str, canonical_args: &str) -> usize {
        let key = format!("{name}:{canonical_args}");
        self.calls.lock().unwrap().iter().filter(|c| **c == key).count()
    }

    fn total(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl ToolExecutor for CountingExecutor {
    fn definitions(&self) -> Vec<ToolDef> {
        vec![
            ToolKind::SearchText.definition(),
            ToolKind::ReadFile.definition(),
        ]
    }

    fn execute<'a>(&'a self, invocation: &'a ToolInvocation) -> ToolFuture<'a> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{}:{}", invocation.name, invocation.canonical_key()));
        Box::pin(async move {
            Ok(format!(
                "src/factory.ts:3:export function createProvider(kind) {{ /* {} */ }}",
                invocation.canonical_key()
            ))
        })
    }
}

fn search(id: &str, query: &str) -> ChatCompletion {
    ChatCompletion::with_tool_calls(vec![ToolCall::new(
        id,
        "search_text",
        format!(r#"{{"query":"{query}"}}"#),
    )])
}

fn quiet_config() -> AgentConfig {
    AgentConfig::new("test-model")
        .with_planner(false)
        .with_critic(false)
}

const QUESTION: &str = "Where is createProvider defined?";
const ANSWER: &str = "`createProvider` is defined in `src/factory.ts` at line 3.";

#[tokio::test]
async fn duplicate_call_executes_once() {
    let provider = ScriptedProvider::new(
        |n| match n {
            0 => search("call_1", "createProvider"),
            1 => search("call_2", "createProvider"),
            _ => ChatCompletion::text(ANSWER),
        },
        "unused",
    );
    let tools = CountingExecutor::default();

    let outcome = AskLoop::new(&provider, &tools, quiet_config())
        .run(QUESTION)
        .await
        .unwrap();

    assert_eq!(outcome.status, AskStatus::Answered);
    assert_eq!(outcome.answer, ANSWER);
    assert_eq!(tools.count("search_text", r#"{"query":"createProvider"}"#), 1);
    assert_eq!(outcome.duplicate_calls, 1);
    assert_eq!(outcome.tool_calls, 1);
    assert_eq!(outcome.rounds_used, 3);

    // Both call ids got a tool-result turn; the second one is guidance.
    let results: Vec<_> = outcome
        .transcript
        .iter()
        .filter(|m| m.role == MessageRole::Tool)
        .collect();
    assert_eq!(results.len(), 2);
    assert_eq!(results[1].tool_call_id.as_deref(), Some("call_2"));
    assert!(results[1].text().contains("already made this call"));
}

#[tokio::test]
async fn never_answering_provider_falls_back_at_round_limit() {
    let provider = ScriptedProvider::new(
        |n| search(&format!("call_{n}"), &format!("query number {n}")),
        "Best-effort answer without tools: see src/factory.ts.",
    );
    let tools = CountingExecutor::default();

    let outcome = AskLoop::new(&provider, &tools, quiet_config())
        .run(QUESTION)
        .await
        .unwrap();

    assert_eq!(outcome.status, AskStatus::Fallback);
    assert_eq!(outcome.rounds_used, MAX_TOOL_ROUNDS);
    assert_eq!(provider.chat_calls.load(Ordering::SeqCst), MAX_TOOL_ROUNDS as usize);
    assert_eq!(outcome.answer, "Best-effort answer without tools: see src/factory.ts.");
    assert_eq!(tools.total(), MAX_TOOL_ROUNDS as usize);
    assert_eq!(outcome.duplicate_calls, 0);
}

#[tokio::test]
async fn round_limit_above_cap_is_clamped() {
    let provider = ScriptedProvider::new(
        |n| search(&format!("call_{n}"), &format!("query number {n}")),
        "Best-effort answer without tools: see src/factory.ts.",
    );
    let tools = CountingExecutor::default();
    // Set through the public field, bypassing `with_max_rounds`.
    let config = AgentConfig {
        max_rounds: 40,
        ..quiet_config()
    };

    let outcome = AskLoop::new(&provider, &tools, config)
        .run(QUESTION)
        .await
        .unwrap();

    assert_eq!(outcome.status, AskStatus::Fallback);
    assert_eq!(outcome.rounds_used, MAX_TOOL_ROUNDS);
    assert_eq!(provider.chat_calls.load(Ordering::SeqCst), MAX_TOOL_ROUNDS as usize);
    assert_eq!(tools.total(), MAX_TOOL_ROUNDS as usize);
}

#[tokio::test]
async fn failing_critic_cannot_loop_forever() {
    let provider = ScriptedProvider::new(
        |n| match n {
            0 => search("call_1", "createProvider"),
            _ => ChatCompletion::text(ANSWER),
        },
        "FAIL\nCONFIDENCE: 0.9\nREASON: Does not show the function body.",
    );
    let tools = CountingExecutor::default();
    let config = AgentConfig::new("test-model").with_planner(false);

    let events = Mutex::new(Vec::new());
    let sink = FnSink::new(|e| events.lock().unwrap().push(e.message()));
    let outcome = AskLoop::new(&provider, &tools, config)
        .with_status_sink(&sink)
        .run(QUESTION)
        .await
        .unwrap();

    // Synthesis gate rejects, the single post-gate critic pass rejects, then
    // the answer is returned regardless.
    assert_eq!(outcome.status, AskStatus::Answered);
    assert_eq!(outcome.rounds_used, 4);
    assert_eq!(provider.stream_calls.load(Ordering::SeqCst), 2);
    let critic_lines = events
        .lock()
        .unwrap()
        .iter()
        .filter(|m| m.starts_with("Critic: FAIL"))
        .count();
    assert_eq!(critic_lines, 2);
}

#[tokio::test]
async fn planner_output_enriches_first_turn() {
    let provider = ScriptedProvider::new(
        |_| ChatCompletion::text(ANSWER),
        "1. search_text for createProvider\n2. read_file the definition",
    );
    let tools = CountingExecutor::default();
    let config = AgentConfig::new("test-model").with_critic(false);

    let outcome = AskLoop::new(&provider, &tools, config)
        .run(QUESTION)
        .await
        .unwrap();

    assert!(outcome.plan.is_some());
    let first = outcome.transcript[0].text();
    assert!(first.starts_with(QUESTION));
    assert!(first.contains("## Search plan"));
    assert!(first.contains("read_file the definition"));
}
