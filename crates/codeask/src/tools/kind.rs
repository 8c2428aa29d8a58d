//! The closed tool vocabulary.
//!
//! Every tool the model may call is a [`ToolKind`]. A static table maps each
//! kind to its wire name, argument schema, capability and handler, so an
//! unknown name is rejected once at the boundary instead of falling through
//! a string match at dispatch time.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Map, Value};

use super::handlers;
use crate::{Error, ToolDef, json_schema_for};

/// Future returned by a tool handler.
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<String, Error>> + Send>>;

/// Handler signature: workspace root plus raw (already schema-validated) arguments.
pub type Handler = fn(PathBuf, Map<String, Value>) -> HandlerFuture;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    ReadFile,
    SearchText,
    ListFiles,
    FindFiles,
    GitStatus,
    WriteFile,
    RunCommand,
}

/// What a tool may do to the workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Read,
    /// Writes files. Gated by the write policy.
    Write,
    /// Runs arbitrary shell commands. Gated by the shell policy.
    Shell,
}

/// One row of the tool table.
pub struct ToolEntry {
    pub kind: ToolKind,
    pub name: &'static str,
    pub purpose: &'static str,
    pub when_to_use: &'static str,
    pub when_not_to_use: &'static str,
    pub capability: Capability,
    pub schema: fn() -> Value,
    pub handler: Handler,
}

// ── Argument types ─────────────────────────────────────────────────

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ReadFileArgs {
    /// File path relative to the workspace root (e.g. 'src/main.rs').
    pub path: String,
    /// First line to return, 1-based. Defaults to the start of the file.
    #[serde(default)]
    pub start_line: Option<usize>,
    /// Last line to return, inclusive. Defaults to the end of the file.
    #[serde(default)]
    pub end_line: Option<usize>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SearchTextArgs {
    /// Text or basic regex to search for (e.g. 'createProvider').
    pub query: String,
    /// Directory or file to search, relative to the workspace root. Defaults to '.'.
    #[serde(default)]
    pub path: Option<String>,
    /// Case-insensitive match.
    #[serde(default)]
    pub case_insensitive: Option<bool>,
    /// Only search files matching this glob (e.g. '*.rs').
    #[serde(default)]
    pub glob: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListFilesArgs {
    /// Directory relative to the workspace root. Defaults to '.'.
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct FindFilesArgs {
    /// File name glob ('*.toml') or path glob ('src/**/mod.rs').
    pub pattern: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GitStatusArgs {}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct WriteFileArgs {
    /// File path relative to the workspace root. Parent directories are created.
    pub path: String,
    /// Full new file content.
    pub content: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct RunCommandArgs {
    /// Shell command, run with `sh -c` in the workspace root.
    pub command: String,
}

// ── Table ──────────────────────────────────────────────────────────

static TOOL_TABLE: [ToolEntry; 7] = [
    ToolEntry {
        kind: ToolKind::ReadFile,
        name: "read_file",
        purpose: "Read a file with line numbers, optionally a line range",
        when_to_use: "When you know the path of a file you need to inspect",
        when_not_to_use: "When looking for where something is defined; use search_text first",
        capability: Capability::Read,
        schema: json_schema_for::<ReadFileArgs>,
        handler: |root, args| Box::pin(handlers::read_file(root, args)),
    },
    ToolEntry {
        kind: ToolKind::SearchText,
        name: "search_text",
        purpose: "Search file contents recursively, returning path:line:text matches",
        when_to_use: "When you need to find where an identifier or string appears",
        when_not_to_use: "When you need files by name; use find_files instead",
        capability: Capability::Read,
        schema: json_schema_for::<SearchTextArgs>,
        handler: |root, args| Box::pin(handlers::search_text(root, args)),
    },
    ToolEntry {
        kind: ToolKind::ListFiles,
        name: "list_files",
        purpose: "List the entries of one directory",
        when_to_use: "When exploring the layout of a directory",
        when_not_to_use: "When searching nested directories by pattern; use find_files instead",
        capability: Capability::Read,
        schema: json_schema_for::<ListFilesArgs>,
        handler: |root, args| Box::pin(handlers::list_files(root, args)),
    },
    ToolEntry {
        kind: ToolKind::FindFiles,
        name: "find_files",
        purpose: "Find files by name or path glob across the workspace",
        when_to_use: "When you know roughly what a file is called but not where it is",
        when_not_to_use: "When searching file content; use search_text instead",
        capability: Capability::Read,
        schema: json_schema_for::<FindFilesArgs>,
        handler: |root, args| Box::pin(handlers::find_files(root, args)),
    },
    ToolEntry {
        kind: ToolKind::GitStatus,
        name: "git_status",
        purpose: "Show the current branch and changed files",
        when_to_use: "When the question concerns uncommitted or recent changes",
        when_not_to_use: "When you need file contents; use read_file instead",
        capability: Capability::Read,
        schema: json_schema_for::<GitStatusArgs>,
        handler: |root, args| Box::pin(handlers::git_status(root, args)),
    },
    ToolEntry {
        kind: ToolKind::WriteFile,
        name: "write_file",
        purpose: "Create or overwrite a file",
        when_to_use: "Only when the user explicitly asked for a file change",
        when_not_to_use: "When answering a question; reading is enough",
        capability: Capability::Write,
        schema: json_schema_for::<WriteFileArgs>,
        handler: |root, args| Box::pin(handlers::write_file(root, args)),
    },
    ToolEntry {
        kind: ToolKind::RunCommand,
        name: "run_command",
        purpose: "Run a shell command in the workspace root",
        when_to_use: "When you must run a build, test, or inspection command",
        when_not_to_use: "When a read-only tool can answer; prefer search_text and read_file",
        capability: Capability::Shell,
        schema: json_schema_for::<RunCommandArgs>,
        handler: |root, args| Box::pin(handlers::run_command(root, args)),
    },
];

impl ToolKind {
    pub const ALL: [ToolKind; 7] = [
        ToolKind::ReadFile,
        ToolKind::SearchText,
        ToolKind::ListFiles,
        ToolKind::FindFiles,
        ToolKind::GitStatus,
        ToolKind::WriteFile,
        ToolKind::RunCommand,
    ];

    /// Resolve a wire name. Unknown names are [`Error::ToolNotFound`].
    pub fn from_name(name: &str) -> Result<Self, Error> {
        TOOL_TABLE
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.kind)
            .ok_or_else(|| Error::ToolNotFound {
                name: name.to_string(),
            })
    }

    pub fn entry(self) -> &'static ToolEntry {
        // The table is ordered like the enum.
        &TOOL_TABLE[self as usize]
    }

    pub fn name(self) -> &'static str {
        self.entry().name
    }

    pub fn capability(self) -> Capability {
        self.entry().capability
    }

    /// Whether the tool can change the workspace.
    pub fn is_write(self) -> bool {
        self.capability() != Capability::Read
    }

    pub fn schema(self) -> Value {
        (self.entry().schema)()
    }

    pub fn description(self) -> String {
        let e = self.entry();
        format!(
            "{}.\nWhen to use: {}\nWhen NOT to use: {}",
            e.purpose, e.when_to_use, e.when_not_to_use
        )
    }

    pub fn definition(self) -> ToolDef {
        ToolDef::new(self.name(), self.description(), self.schema())
    }
}

impl std::fmt::Display for ToolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_matches_enum_order() {
        for kind in ToolKind::ALL {
            assert_eq!(kind.entry().kind, kind);
            assert_eq!(ToolKind::from_name(kind.name()).unwrap(), kind);
        }
    }

    #[test]
    fn unknown_name_is_tool_not_found() {
        let err = ToolKind::from_name("delete_repo").unwrap_err();
        assert_eq!(err.code(), "TOOL_NOT_FOUND");
        assert!(err.to_string().contains("delete_repo"));
    }

    #[test]
    fn write_capabilities() {
        assert!(!ToolKind::ReadFile.is_write());
        assert!(!ToolKind::GitStatus.is_write());
        assert!(ToolKind::WriteFile.is_write());
        assert!(ToolKind::RunCommand.is_write());
    }

    #[test]
    fn schemas_require_expected_fields() {
        let schema = ToolKind::SearchText.schema();
        assert_eq!(schema["type"], "object");
        let required = schema["required"].as_array().unwrap();
        assert!(required.contains(&"query".into()));
        assert!(!required.contains(&"path".into()));
    }

    #[test]
    fn definition_carries_guidance() {
        let def = ToolKind::FindFiles.definition();
        assert_eq!(def.function.name, "find_files");
        assert!(def.function.description.contains("When NOT to use"));
    }
}
