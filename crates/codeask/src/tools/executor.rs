//! The tool executor seam and the workspace-backed implementation.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, trace};

use super::invocation::ToolInvocation;
use super::kind::{Capability, ToolKind};
use crate::{Error, ToolDef};

/// Future returned by [`ToolExecutor::execute`].
pub type ToolFuture<'a> = Pin<Box<dyn Future<Output = Result<String, Error>> + Send + 'a>>;

/// Default per-call timeout.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

/// Default blocked shell command patterns (lowercased substrings).
pub const DEFAULT_BLOCKED_COMMANDS: &[&str] = &[
    "rm -rf /",
    "rm -rf ~",
    "mkfs",
    "> /dev/",
    "dd if=",
    "shutdown",
    "reboot",
    ":(){",
    "git push",
    "sudo ",
];

/// Runs tools on behalf of the loop. Every tool returns text; failures are
/// typed errors the loop turns into `"Tool error: ..."` transcript text.
pub trait ToolExecutor: Send + Sync {
    /// Tool schemas offered to the model.
    fn definitions(&self) -> Vec<ToolDef>;

    fn execute<'a>(&'a self, invocation: &'a ToolInvocation) -> ToolFuture<'a>;
}

/// Which write-capable tools may run.
#[derive(Debug, Clone)]
pub struct WritePolicy {
    pub allow_writes: bool,
    pub allow_shell: bool,
    pub blocked_commands: Vec<String>,
}

impl Default for WritePolicy {
    fn default() -> Self {
        Self {
            allow_writes: false,
            allow_shell: false,
            blocked_commands: DEFAULT_BLOCKED_COMMANDS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl WritePolicy {
    fn permits(&self, capability: Capability) -> bool {
        match capability {
            Capability::Read => true,
            Capability::Write => self.allow_writes,
            Capability::Shell => self.allow_shell,
        }
    }

    fn blocked_pattern(&self, command: &str) -> Option<&str> {
        let lower = command.to_lowercase();
        self.blocked_commands
            .iter()
            .find(|p| lower.contains(p.as_str()))
            .map(String::as_str)
    }
}

/// Executes the [`ToolKind`] vocabulary against a workspace directory.
///
/// # Example
///
/// ```ignore
/// let tools = WorkspaceTools::new("/path/to/repo")
///     .allow_writes(true)
///     .timeout(Duration::from_secs(10));
/// ```
#[derive(Debug, Clone)]
pub struct WorkspaceTools {
    root: PathBuf,
    policy: WritePolicy,
    timeout: Duration,
}

impl WorkspaceTools {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            policy: WritePolicy::default(),
            timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }

    pub fn allow_writes(mut self, allow: bool) -> Self {
        self.policy.allow_writes = allow;
        self
    }

    pub fn allow_shell(mut self, allow: bool) -> Self {
        self.policy.allow_shell = allow;
        self
    }

    /// Add a blocked `run_command` pattern (case-insensitive substring).
    pub fn block_command(mut self, pattern: impl Into<String>) -> Self {
        self.policy.blocked_commands.push(pattern.into().to_lowercase());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Kinds the model is offered: read tools always, write tools only when
    /// the policy enables them.
    pub fn enabled_kinds(&self) -> impl Iterator<Item = ToolKind> + '_ {
        ToolKind::ALL
            .into_iter()
            .filter(|k| self.policy.permits(k.capability()))
    }

    fn check_policy(&self, kind: ToolKind, invocation: &ToolInvocation) -> Result<(), Error> {
        if !self.policy.permits(kind.capability()) {
            let flag = match kind.capability() {
                Capability::Shell => "--allow-shell",
                _ => "--allow-writes",
            };
            return Err(Error::ToolDenied {
                tool: kind.name().to_string(),
                reason: format!("write-capable tools are disabled (enable with {flag})"),
            });
        }
        if kind == ToolKind::RunCommand
            && let Some(pattern) = invocation
                .str_arg("command")
                .and_then(|c| self.policy.blocked_pattern(c))
        {
            return Err(Error::ToolDenied {
                tool: kind.name().to_string(),
                reason: format!("command matches blocked pattern '{pattern}'"),
            });
        }
        Ok(())
    }
}

/// Validate arguments against the kind's JSON Schema. The error lists every
/// violation so the model can fix all of them at once.
pub fn validate_arguments(kind: ToolKind, invocation: &ToolInvocation) -> Result<(), Error> {
    let schema = kind.schema();
    let Ok(validator) = jsonschema::validator_for(&schema) else {
        return Ok(());
    };
    let instance = Value::Object(invocation.arguments.clone());
    let errors: Vec<String> = validator
        .iter_errors(&instance)
        .map(|e| format!("{}: {e}", e.instance_path()))
        .collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(Error::tool(
            kind.name(),
            format!("argument validation failed: {}", errors.join("; ")),
        ))
    }
}

/// Log a tool call at INFO level with a truncated preview of arguments.
pub fn log_tool_call(invocation: &ToolInvocation) {
    let arguments = invocation.canonical_key();
    let preview: String = arguments.chars().take(120).collect();
    info!(
        "[tool] {}({preview}{})",
        invocation.name,
        if arguments.chars().count() > 120 { "..." } else { "" }
    );
    trace!("[tool] {} arguments: {arguments}", invocation.name);
}

impl ToolExecutor for WorkspaceTools {
    fn definitions(&self) -> Vec<ToolDef> {
        self.enabled_kinds().map(ToolKind::definition).collect()
    }

    fn execute<'a>(&'a self, invocation: &'a ToolInvocation) -> ToolFuture<'a> {
        Box::pin(async move {
            let kind = ToolKind::from_name(&invocation.name)?;
            self.check_policy(kind, invocation)?;
            validate_arguments(kind, invocation)?;
            log_tool_call(invocation);

            let handler = kind.entry().handler;
            let fut = handler(self.root.clone(), invocation.arguments.clone());
            match tokio::time::timeout(self.timeout, fut).await {
                Ok(result) => {
                    if let Ok(ref text) = result {
                        debug!("[tool] {} returned {} bytes", kind, text.len());
                    }
                    result
                }
                Err(_) => Err(Error::tool(
                    kind.name(),
                    format!("timed out after {}s", self.timeout.as_secs()),
                )),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn inv(name: &str, v: Value) -> ToolInvocation {
        ToolInvocation::new(name, v.as_object().cloned().unwrap())
    }

    #[test]
    fn read_only_by_default() {
        let tools = WorkspaceTools::new(".");
        let names: Vec<String> = tools.definitions().into_iter().map(|d| d.function.name).collect();
        assert!(names.contains(&"read_file".to_string()));
        assert!(!names.contains(&"write_file".to_string()));
        assert!(!names.contains(&"run_command".to_string()));

        let all = WorkspaceTools::new(".").allow_writes(true).allow_shell(true);
        assert_eq!(all.definitions().len(), ToolKind::ALL.len());
    }

    #[tokio::test]
    async fn write_denied_without_policy() {
        let dir = TempDir::new().unwrap();
        let tools = WorkspaceTools::new(dir.path());
        let err = tools
            .execute(&inv("write_file", json!({"path": "a.txt", "content": "x"})))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "TOOL_DENIED");
        assert!(err.to_string().contains("--allow-writes"));
        assert!(!dir.path().join("a.txt").exists());
    }

    #[tokio::test]
    async fn blocked_command_denied() {
        let dir = TempDir::new().unwrap();
        let tools = WorkspaceTools::new(dir.path()).allow_shell(true);
        let err = tools
            .execute(&inv("run_command", json!({"command": "SUDO reboot"})))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "TOOL_DENIED");
    }

    #[tokio::test]
    async fn unknown_tool_rejected() {
        let tools = WorkspaceTools::new(".");
        let err = tools.execute(&inv("fetch_url", json!({}))).await.unwrap_err();
        assert_eq!(err.code(), "TOOL_NOT_FOUND");
    }

    #[tokio::test]
    async fn schema_violation_is_exec_error() {
        let tools = WorkspaceTools::new(".");
        let err = tools
            .execute(&inv("read_file", json!({"file": "a.rs"})))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "TOOL_EXEC_ERROR");
        assert!(err.to_string().contains("validation failed"));
    }

    #[tokio::test]
    async fn slow_command_times_out() {
        let dir = TempDir::new().unwrap();
        let tools = WorkspaceTools::new(dir.path())
            .allow_shell(true)
            .timeout(Duration::from_millis(100));
        let err = tools
            .execute(&inv("run_command", json!({"command": "sleep 5"})))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn run_command_in_workspace() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "").unwrap();
        let tools = WorkspaceTools::new(dir.path()).allow_shell(true);
        let out = tools
            .execute(&inv("run_command", json!({"command": "ls"})))
            .await
            .unwrap();
        assert!(out.contains("marker.txt"));
    }
}
