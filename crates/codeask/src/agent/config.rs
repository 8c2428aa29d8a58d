//! Configuration for the [`AskLoop`](super::controller::AskLoop).
//!
//! The optional subsystems (planner, critic) are **enabled by default**.
//! Override them through the [`AgentConfig`] struct fields, or use the
//! builder methods for common settings.
//!
//! ```ignore
//! let config = AgentConfig::new("openai/gpt-4o-mini")
//!     .with_max_rounds(10)
//!     .with_aux_model("openai/gpt-4o-mini")
//!     .with_execution_plan(true);
//!
//! let quiet = AgentConfig {
//!     critic: Toggle::disabled(),
//!     ..AgentConfig::new("llama3.1:8b")
//! };
//! ```

use std::time::Duration;

use crate::tools::cache::DEFAULT_TTL;
use crate::{DEFAULT_MODEL, Error, MAX_TOOL_ROUNDS};

// ── Generic toggle ────────────────────────────────────────────────

/// Enabled/disabled wrapper for an optional subsystem. When `enabled` is
/// `false` the subsystem is skipped regardless of its config values.
#[derive(Debug, Clone)]
pub struct Toggle<T: Default> {
    pub enabled: bool,
    pub config: T,
}

impl<T: Default> Toggle<T> {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            config: T::default(),
        }
    }
}

impl<T: Default> Default for Toggle<T> {
    fn default() -> Self {
        Self {
            enabled: true,
            config: T::default(),
        }
    }
}

// ── Subsystem configs ─────────────────────────────────────────────

/// Search planner call settings.
#[derive(Debug, Clone)]
pub struct PlannerConfig {
    pub temperature: f32,
    pub max_tokens: u32,
    /// Request a structured JSON execution plan instead of free text.
    pub structured: bool,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            max_tokens: 400,
            structured: false,
        }
    }
}

/// Critic call settings.
#[derive(Debug, Clone)]
pub struct CriticConfig {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for CriticConfig {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            max_tokens: 150,
        }
    }
}

/// Working memory thresholds.
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Turns kept verbatim at the end of the transcript on compaction.
    pub keep_recent: usize,
    /// Token cap applied to every tool result before it enters the transcript.
    pub tool_output_cap: usize,
    /// Inject a scratchpad checkpoint every N rounds (0 disables).
    pub scratchpad_interval: u32,
    /// Compact once the transcript exceeds this share of the context budget.
    pub compaction_threshold: f64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            keep_recent: 6,
            tool_output_cap: 1500,
            scratchpad_interval: 3,
            compaction_threshold: 0.70,
        }
    }
}

// ── AgentConfig ───────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Model driving the rounds.
    pub model: String,
    /// Model for planner, summarizer and critic calls. Defaults to `model`.
    pub aux_model: Option<String>,
    /// Upper bound on model ↔ tool rounds.
    pub max_rounds: u32,
    /// Maximum tokens per primary response.
    pub max_tokens: u32,
    pub temperature: f32,
    /// Replaces the built-in system prompt when set.
    pub system_prompt: Option<String>,
    /// Tool result cache lifetime.
    pub cache_ttl: Duration,
    /// Run the keyword-overlap relevance check on candidate answers.
    pub check_relevance: bool,
    pub memory: MemoryConfig,
    pub planner: Toggle<PlannerConfig>,
    pub critic: Toggle<CriticConfig>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            aux_model: None,
            max_rounds: MAX_TOOL_ROUNDS,
            max_tokens: 2048,
            temperature: 0.2,
            system_prompt: None,
            cache_ttl: DEFAULT_TTL,
            check_relevance: true,
            memory: MemoryConfig::default(),
            planner: Toggle::default(),
            critic: Toggle::default(),
        }
    }
}

impl AgentConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }

    /// Set the round limit. Values above [`MAX_TOOL_ROUNDS`] are clamped.
    pub fn with_max_rounds(mut self, max_rounds: u32) -> Self {
        self.max_rounds = max_rounds.min(MAX_TOOL_ROUNDS);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_aux_model(mut self, model: impl Into<String>) -> Self {
        self.aux_model = Some(model.into());
        self
    }

    pub fn with_keep_recent(mut self, keep_recent: usize) -> Self {
        self.memory.keep_recent = keep_recent;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Ask the planner for a structured execution plan.
    pub fn with_execution_plan(mut self, structured: bool) -> Self {
        self.planner.config.structured = structured;
        self
    }

    pub fn with_planner(mut self, enabled: bool) -> Self {
        self.planner.enabled = enabled;
        self
    }

    pub fn with_critic(mut self, enabled: bool) -> Self {
        self.critic.enabled = enabled;
        self
    }

    /// Model for auxiliary calls.
    pub fn aux_model(&self) -> &str {
        self.aux_model.as_deref().unwrap_or(&self.model)
    }

    /// Reject values the loop can't run with.
    pub fn validate(&self) -> Result<(), Error> {
        if self.model.trim().is_empty() {
            return Err(Error::config("model must not be empty"));
        }
        if self.max_rounds == 0 {
            return Err(Error::config("max_rounds must be at least 1"));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(Error::config(format!(
                "temperature must be within 0-2, got {}",
                self.temperature
            )));
        }
        if !(0.0..=1.0).contains(&self.memory.compaction_threshold) {
            return Err(Error::config("compaction_threshold must be within 0-1"));
        }
        Ok(())
    }
}
