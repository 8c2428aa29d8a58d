//! CLI-side configuration.
//!
//! [`AskConfig`] captures what the `codeask` binary collects from flags and
//! environment variables, and converts it into library types via
//! [`agent_config`](AskConfig::agent_config), [`tools`](AskConfig::tools)
//! and [`provider`](AskConfig::provider).

use std::path::PathBuf;

use codeask::agent::AgentConfig;
use codeask::agent::notes::{FileNotesStore, NoopNotesStore, ProjectNotesStore};
use codeask::api::{ChatClient, RetryConfig, RetryingProvider};
use codeask::tools::WorkspaceTools;
use codeask::{DEFAULT_BASE_URL, DEFAULT_MODEL, Error, MAX_TOOL_ROUNDS};

#[derive(Debug, Clone)]
pub struct AskConfig {
    /// Bearer token for the endpoint. May be empty for local servers.
    pub api_key: String,
    /// OpenAI-compatible base URL. Default: OpenRouter.
    pub base_url: String,
    pub model: String,
    /// Model for planner, summarizer and critic calls.
    pub aux_model: Option<String>,
    /// Workspace the tools operate in. Default: `"."`.
    pub workspace: PathBuf,
    pub max_rounds: u32,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Retries for transient provider errors. Default: `2`.
    pub retries: u32,
    pub allow_writes: bool,
    pub allow_shell: bool,
    /// Read and update `.codeask/notes.md`. Default: `true`.
    pub notes: bool,
    pub planner: bool,
    /// Ask the planner for a structured JSON plan.
    pub execution_plan: bool,
    pub critic: bool,
}

impl Default for AskConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            aux_model: None,
            workspace: PathBuf::from("."),
            max_rounds: MAX_TOOL_ROUNDS,
            max_tokens: 2048,
            temperature: 0.2,
            retries: 2,
            allow_writes: false,
            allow_shell: false,
            notes: true,
            planner: true,
            execution_plan: false,
            critic: true,
        }
    }
}

impl AskConfig {
    /// Reject values the loop can't run with.
    pub fn validate(&self) -> Result<(), Error> {
        if self.max_rounds == 0 {
            return Err(Error::ConfigInvalid {
                reason: "--max-rounds must be at least 1".into(),
            });
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(Error::ConfigInvalid {
                reason: format!("--temperature must be within 0-2, got {}", self.temperature),
            });
        }
        if !self.workspace.is_dir() {
            return Err(Error::ConfigInvalid {
                reason: format!("workspace {} is not a directory", self.workspace.display()),
            });
        }
        if self.model.trim().is_empty() {
            return Err(Error::ConfigInvalid {
                reason: "model must not be empty".into(),
            });
        }
        if self.base_url.trim().is_empty() {
            return Err(Error::ConfigInvalid {
                reason: "base URL must not be empty".into(),
            });
        }
        Ok(())
    }

    pub fn agent_config(&self) -> AgentConfig {
        let mut config = AgentConfig::new(self.model.clone())
            .with_max_rounds(self.max_rounds)
            .with_max_tokens(self.max_tokens)
            .with_temperature(self.temperature)
            .with_planner(self.planner)
            .with_execution_plan(self.execution_plan)
            .with_critic(self.critic);
        if let Some(aux) = &self.aux_model {
            config = config.with_aux_model(aux.clone());
        }
        config
    }

    pub fn tools(&self) -> WorkspaceTools {
        WorkspaceTools::new(self.workspace.clone())
            .allow_writes(self.allow_writes)
            .allow_shell(self.allow_shell)
    }

    /// HTTP client wrapped with retry for transient failures.
    pub fn provider(&self) -> Result<RetryingProvider<ChatClient>, Error> {
        let client = ChatClient::with_base_url(self.api_key.clone(), self.base_url.clone())?;
        Ok(RetryingProvider::new(
            client,
            RetryConfig::with_retries(self.retries),
        ))
    }

    pub fn notes_store(&self) -> Box<dyn ProjectNotesStore> {
        if self.notes {
            Box::new(FileNotesStore)
        } else {
            Box::new(NoopNotesStore)
        }
    }
}
