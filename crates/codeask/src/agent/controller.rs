//! The ask loop: plan, run bounded model/tool rounds, validate, answer.
//!
//! [`AskLoop`] borrows its collaborators (model provider, tool executor,
//! status sink, notes store) and owns everything scoped to one question:
//! the [`LoopState`], the result cache and working memory. It performs the
//! I/O and feeds each result to [`LoopState::apply`].
//!
//! Per round:
//! 1. compact the transcript if it crossed the threshold;
//! 2. call the model with the transcript and tool schemas;
//! 3. no tool calls: evaluate the candidate answer (synthesis gate, then at
//!    most one more critic pass) and return it or inject a correction;
//! 4. tool calls: dispatch each in order through the tracker, cache and
//!    working memory, then inject the scratchpad checkpoint and any
//!    correction hint.
//!
//! After [`MAX_TOOL_ROUNDS`](crate::MAX_TOOL_ROUNDS) rounds (or an empty
//! final answer) a single no-tool completion produces the answer.

use std::future::Future;
use std::path::PathBuf;

use serde_json::Map;
use tracing::{debug, info, warn};

use super::abort::AbortSignal;
use super::config::AgentConfig;
use super::critic::{MIN_CRITIC_CHARS, critic_evaluate, validate_answer};
use super::events::{AskOutcome, AskStatus, NoopSink, StatusEvent, StatusSink};
use super::notes::{NoopNotesStore, ProjectNotesStore};
use super::planner::{Plan, enrich_user_prompt, generate_plan};
use super::prompt::{FALLBACK_INSTRUCTION, build_system_prompt};
use super::state::{Gate, LoopEvent, LoopState};
use crate::api::provider::{ModelProvider, complete};
use crate::context::{WorkingMemory, context_budget, estimate_transcript_tokens};
use crate::tools::cache::ToolResultCache;
use crate::tools::executor::ToolExecutor;
use crate::tools::invocation::ToolInvocation;
use crate::tools::kind::ToolKind;
use crate::{ChatRequest, Error, MAX_TOOL_ROUNDS, Message, ToolCall, ToolDef, UsageInfo};

/// One question, answered with bounded tool use.
///
/// ```ignore
/// let client = RetryingProvider::new(ChatClient::new(api_key)?, RetryConfig::default());
/// let tools = WorkspaceTools::new(".");
/// let sink = LoggingSink;
///
/// let outcome = AskLoop::new(&client, &tools, AgentConfig::new("openai/gpt-4o-mini"))
///     .with_status_sink(&sink)
///     .with_workspace_root(".")
///     .run("Where is the retry backoff configured?")
///     .await?;
/// println!("{}", outcome.answer);
/// ```
pub struct AskLoop<'a> {
    provider: &'a dyn ModelProvider,
    tools: &'a dyn ToolExecutor,
    config: AgentConfig,
    sink: &'a dyn StatusSink,
    notes: &'a dyn ProjectNotesStore,
    abort: AbortSignal,
    workspace_root: Option<PathBuf>,
}

/// Token usage summed across the primary calls.
#[derive(Debug, Default, Clone, Copy)]
struct Usage {
    prompt: u32,
    completion: u32,
}

impl<'a> AskLoop<'a> {
    pub fn new(
        provider: &'a dyn ModelProvider,
        tools: &'a dyn ToolExecutor,
        config: AgentConfig,
    ) -> Self {
        Self {
            provider,
            tools,
            config,
            sink: &NoopSink,
            notes: &NoopNotesStore,
            abort: AbortSignal::never(),
            workspace_root: None,
        }
    }

    pub fn with_status_sink(mut self, sink: &'a dyn StatusSink) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_notes_store(mut self, notes: &'a dyn ProjectNotesStore) -> Self {
        self.notes = notes;
        self
    }

    pub fn with_abort(mut self, signal: AbortSignal) -> Self {
        self.abort = signal;
        self
    }

    /// Workspace the notes store reads from and writes to. Also named in
    /// the system prompt.
    pub fn with_workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = Some(root.into());
        self
    }

    /// Answer `question`. Only errors from the primary model call (and bad
    /// input or config) are returned; every other failure degrades.
    pub async fn run(self, question: &str) -> Result<AskOutcome, Error> {
        let question = question.trim();
        if question.is_empty() {
            return Err(Error::InputMissing {
                what: "question".into(),
            });
        }
        self.config.validate()?;

        let model = self.config.model.as_str();
        let max_rounds = self.config.max_rounds.min(MAX_TOOL_ROUNDS);
        info!("Ask loop started: model={model}, max_rounds={max_rounds}");

        let notes = self
            .workspace_root
            .as_deref()
            .and_then(|root| self.notes.load(root));
        let workspace = self
            .workspace_root
            .as_ref()
            .map(|p| p.display().to_string());
        let system_prompt = build_system_prompt(
            self.config.system_prompt.as_deref(),
            workspace.as_deref(),
            notes.as_deref(),
        );

        let mut memory = WorkingMemory::new(
            model,
            self.config.aux_model(),
            self.config.memory.clone(),
        );
        let mut cache = ToolResultCache::new(self.config.cache_ttl);
        let mut usage = Usage::default();

        // ── Planning ──
        let plan = if self.config.planner.enabled {
            self.sink.on_event(&StatusEvent::PlanningStarted);
            let planned = self
                .unless_aborted(generate_plan(
                    self.provider,
                    self.config.aux_model(),
                    &self.config.planner.config,
                    question,
                    notes.as_deref(),
                ))
                .await;
            let Some(plan) = planned else {
                let state = LoopState::new(question.to_string());
                return Ok(self.interrupted(state, memory, 0, None, usage, None));
            };
            self.sink.on_event(&StatusEvent::PlanReady {
                plan: plan.as_ref(),
            });
            plan
        } else {
            None
        };

        let mut state = LoopState::new(enrich_user_prompt(question, plan.as_ref()));
        let tool_defs = self.tools.definitions();
        let tools_option: Option<Vec<ToolDef>> = (!tool_defs.is_empty()).then_some(tool_defs);
        let budget = context_budget(model);
        let mut rounds_used = 0;

        for round in 0..max_rounds {
            if self.abort.is_aborted() {
                return Ok(self.interrupted(state, memory, rounds_used, plan, usage, None));
            }
            rounds_used = round + 1;

            // ── Compaction ──
            if memory.should_compact(&state.transcript) {
                self.sink.on_event(&StatusEvent::Compacting {
                    turns: state.transcript.len(),
                    tokens: estimate_transcript_tokens(&state.transcript),
                });
                let compacted = self
                    .unless_aborted(memory.compact(self.provider, &state.transcript))
                    .await;
                let Some(compaction) = compacted else {
                    return Ok(self.interrupted(state, memory, rounds_used, plan, usage, None));
                };
                if compaction.compressed > 0 {
                    self.sink.on_event(&StatusEvent::Compacted {
                        compressed: compaction.compressed,
                        summarized: compaction.summarized,
                    });
                    state = state.apply(LoopEvent::Compacted {
                        turns: compaction.turns,
                    });
                }
            }

            self.sink.on_event(&StatusEvent::RoundStart {
                round,
                max_rounds,
                transcript_tokens: estimate_transcript_tokens(&state.transcript),
                budget,
            });

            // ── Model call ──
            let request = ChatRequest {
                model: Some(model.to_string()),
                messages: with_system(&system_prompt, &state.transcript),
                max_tokens: self.config.max_tokens,
                temperature: self.config.temperature,
                tools: tools_option.clone(),
            };
            let completion = tokio::select! {
                biased;
                _ = self.abort.aborted() => {
                    return Ok(self.interrupted(state, memory, rounds_used, plan, usage, None));
                }
                result = self.provider.chat_with_tools(&request) => result?,
            };
            self.record_usage(&mut usage, completion.usage.as_ref());

            // ── Candidate answer ──
            if completion.tool_calls.is_empty() {
                let answer = completion.content.unwrap_or_default().trim().to_string();
                let rounds_remain = round + 1 < max_rounds;

                if state.at_synthesis_gate() && rounds_remain {
                    if answer.is_empty() {
                        self.sink.on_event(&StatusEvent::SynthesisReminder);
                        state = state.apply(LoopEvent::SynthesisReminder);
                        continue;
                    }
                    let verdict = self
                        .unless_aborted(self.evaluate(question, &answer, state.had_tool_calls))
                        .await;
                    let Some(verdict) = verdict else {
                        return Ok(self.interrupted(
                            state, memory, rounds_used, plan, usage, Some(answer),
                        ));
                    };
                    match verdict {
                        Ok(()) => {
                            return Ok(self.finish(
                                state, memory, answer, AskStatus::Answered, rounds_used, plan, usage,
                            ));
                        }
                        Err(reason) => {
                            state = state.apply(LoopEvent::CandidateRejected {
                                answer,
                                reason,
                                gate: Gate::Synthesis,
                            });
                            continue;
                        }
                    }
                }

                if answer.is_empty() {
                    debug!("Empty final answer, falling back");
                    break;
                }
                if rounds_remain
                    && !state.post_critic_used
                    && answer.chars().count() > MIN_CRITIC_CHARS
                {
                    let verdict = self
                        .unless_aborted(self.evaluate(question, &answer, state.had_tool_calls))
                        .await;
                    match verdict {
                        None => {
                            return Ok(self.interrupted(
                                state, memory, rounds_used, plan, usage, Some(answer),
                            ));
                        }
                        Some(Err(reason)) => {
                            state = state.apply(LoopEvent::CandidateRejected {
                                answer,
                                reason,
                                gate: Gate::PostCritic,
                            });
                            continue;
                        }
                        Some(Ok(())) => {}
                    }
                }
                return Ok(self.finish(
                    state, memory, answer, AskStatus::Answered, rounds_used, plan, usage,
                ));
            }

            // ── Tool dispatch ──
            let calls = completion.tool_calls;
            state = state.apply(LoopEvent::AssistantToolCalls {
                content: completion.content,
                calls: calls.clone(),
            });
            for call in &calls {
                if self.abort.is_aborted() {
                    return Ok(self.interrupted(state, memory, rounds_used, plan, usage, None));
                }
                let event = self.dispatch(call, &state, &mut cache, &mut memory).await;
                state = state.apply(event);
            }

            if memory.should_scratchpad(round) {
                self.sink.on_event(&StatusEvent::ScratchpadInjected { round });
                state = state.apply(LoopEvent::Scratchpad);
            }
            if let Some(hint) = state.tracker.correction_hint() {
                self.sink.on_event(&StatusEvent::CorrectionHint { hint });
                state = state.apply(LoopEvent::CorrectionHint { hint: hint.into() });
            }
        }

        // ── Fallback ──
        self.sink.on_event(&StatusEvent::FallbackStarted {
            rounds: rounds_used,
        });
        let request = ChatRequest::one_shot(
            model,
            format!("{system_prompt}\n\n{FALLBACK_INSTRUCTION}"),
            question,
            self.config.max_tokens,
            self.config.temperature,
        );
        let done = tokio::select! {
            biased;
            _ = self.abort.aborted() => {
                return Ok(self.interrupted(state, memory, rounds_used, plan, usage, None));
            }
            result = complete(self.provider, &request) => result?,
        };
        self.record_usage(&mut usage, done.usage.as_ref());
        let answer = done.text.trim().to_string();
        Ok(self.finish(
            state, memory, answer, AskStatus::Fallback, rounds_used, plan, usage,
        ))
    }

    /// Turn one tool call into a loop event. Never fails: errors become
    /// [`LoopEvent::ToolFailed`].
    async fn dispatch(
        &self,
        call: &ToolCall,
        state: &LoopState,
        cache: &mut ToolResultCache,
        memory: &mut WorkingMemory,
    ) -> LoopEvent {
        let call_id = call.id.clone();
        let invocation = match ToolInvocation::from_call(call) {
            Ok(inv) => inv,
            Err(e) => {
                warn!("Malformed tool call {}: {e}", call.function.name);
                self.sink.on_event(&StatusEvent::ToolFinished {
                    name: &call.function.name,
                    bytes: 0,
                    is_error: true,
                });
                return LoopEvent::ToolFailed {
                    call_id,
                    name: call.function.name.clone(),
                    arguments: Map::new(),
                    message: e.to_string(),
                };
            }
        };
        let ToolInvocation { name, arguments } = &invocation;

        // A call whose earlier result a write or shell command invalidated
        // may run again.
        if state.tracker.is_duplicate(name, arguments) && !cache.was_invalidated(name, arguments) {
            self.sink.on_event(&StatusEvent::DuplicateSkipped { name });
            return LoopEvent::DuplicateSkipped {
                call_id,
                name: name.clone(),
                arguments: arguments.clone(),
            };
        }

        if let Some(output) = cache.get(name, arguments) {
            self.sink.on_event(&StatusEvent::CacheHit { name });
            return LoopEvent::CacheHit {
                call_id,
                name: name.clone(),
                arguments: arguments.clone(),
                output: memory.process_tool_result(&invocation, &output),
            };
        }

        self.sink.on_event(&StatusEvent::ToolInvoked {
            name,
            arguments: &call.function.arguments,
        });
        match self.tools.execute(&invocation).await {
            Ok(output) => {
                self.sink.on_event(&StatusEvent::ToolFinished {
                    name,
                    bytes: output.len(),
                    is_error: false,
                });
                match ToolKind::from_name(name) {
                    Ok(ToolKind::WriteFile) => {
                        if let Some(path) = invocation.str_arg("path") {
                            cache.invalidate_path(path);
                        }
                    }
                    Ok(ToolKind::RunCommand) => cache.clear(),
                    Ok(kind) if !kind.is_write() => cache.set(name, arguments, output.as_str()),
                    _ => {}
                }
                LoopEvent::ToolSucceeded {
                    call_id,
                    name: name.clone(),
                    arguments: arguments.clone(),
                    output: memory.process_tool_result(&invocation, &output),
                }
            }
            Err(e) => {
                warn!("Tool {name} failed ({}): {e}", e.code());
                self.sink.on_event(&StatusEvent::ToolFinished {
                    name,
                    bytes: 0,
                    is_error: true,
                });
                LoopEvent::ToolFailed {
                    call_id,
                    name: name.clone(),
                    arguments: arguments.clone(),
                    message: e.to_string(),
                }
            }
        }
    }

    /// Heuristic check first, then the critic when enabled. `Err` carries
    /// the rejection reason.
    async fn evaluate(&self, question: &str, answer: &str, had_tool_calls: bool) -> Result<(), String> {
        let relevance_question = self.config.check_relevance.then_some(question);
        if let Err(issue) = validate_answer(answer, had_tool_calls, relevance_question) {
            let reason = issue.to_string();
            self.sink.on_event(&StatusEvent::AnswerRejected { reason: &reason });
            return Err(reason);
        }
        if !self.config.critic.enabled {
            return Ok(());
        }
        let verdict = critic_evaluate(
            self.provider,
            self.config.aux_model(),
            &self.config.critic.config,
            question,
            answer,
        )
        .await;
        self.sink.on_event(&StatusEvent::CriticVerdict {
            pass: verdict.pass,
            confidence: verdict.confidence,
            reason: &verdict.reason,
        });
        if verdict.pass {
            Ok(())
        } else {
            Err(verdict.reason)
        }
    }

    /// Await `fut` unless the abort signal fires first.
    async fn unless_aborted<T>(&self, fut: impl Future<Output = T>) -> Option<T> {
        tokio::select! {
            biased;
            _ = self.abort.aborted() => None,
            out = fut => Some(out),
        }
    }

    fn record_usage(&self, usage: &mut Usage, info: Option<&UsageInfo>) {
        let Some(info) = info else {
            return;
        };
        let prompt_tokens = info.prompt_tokens.unwrap_or(0);
        let completion_tokens = info.completion_tokens.unwrap_or(0);
        usage.prompt += prompt_tokens;
        usage.completion += completion_tokens;
        self.sink.on_event(&StatusEvent::TokenUsage {
            prompt_tokens,
            completion_tokens,
        });
    }

    #[allow(clippy::too_many_arguments)]
    fn finish(
        &self,
        state: LoopState,
        memory: WorkingMemory,
        answer: String,
        status: AskStatus,
        rounds_used: u32,
        plan: Option<Plan>,
        usage: Usage,
    ) -> AskOutcome {
        if let Some(root) = self.workspace_root.as_deref()
            && !answer.is_empty()
            && let Err(e) = self.notes.update(root, memory.access_log())
        {
            warn!("Failed to update project notes: {e}");
        }
        self.sink.on_event(&StatusEvent::Finished { status });
        info!(
            "Ask loop finished: status={status:?}, rounds={rounds_used}, tool_calls={}, duplicates={}",
            state.tool_calls,
            state.tracker.duplicate_count()
        );
        AskOutcome {
            answer,
            status,
            rounds_used,
            tool_calls: state.tool_calls,
            duplicate_calls: state.tracker.duplicate_count(),
            cache_hits: state.cache_hits,
            transcript: state.transcript,
            access_log: memory.into_access_log(),
            plan,
            prompt_tokens: usage.prompt,
            completion_tokens: usage.completion,
        }
    }

    /// Outcome after an abort: the candidate under evaluation, else the best
    /// one seen so far. No notes update.
    #[allow(clippy::too_many_arguments)]
    fn interrupted(
        &self,
        state: LoopState,
        memory: WorkingMemory,
        rounds_used: u32,
        plan: Option<Plan>,
        usage: Usage,
        candidate: Option<String>,
    ) -> AskOutcome {
        self.sink.on_event(&StatusEvent::Interrupted);
        self.sink.on_event(&StatusEvent::Finished {
            status: AskStatus::Interrupted,
        });
        AskOutcome {
            answer: candidate
                .filter(|c| !c.is_empty())
                .or_else(|| state.last_candidate.clone())
                .unwrap_or_default(),
            status: AskStatus::Interrupted,
            rounds_used,
            tool_calls: state.tool_calls,
            duplicate_calls: state.tracker.duplicate_count(),
            cache_hits: state.cache_hits,
            transcript: state.transcript,
            access_log: memory.into_access_log(),
            plan,
            prompt_tokens: usage.prompt,
            completion_tokens: usage.completion,
        }
    }
}

fn with_system(system_prompt: &str, transcript: &[Message]) -> Vec<Message> {
    let mut messages = Vec::with_capacity(transcript.len() + 1);
    messages.push(Message::system(system_prompt));
    messages.extend_from_slice(transcript);
    messages
}
