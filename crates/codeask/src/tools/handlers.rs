//! Tool implementations. Each handler receives the workspace root and
//! schema-validated arguments and returns text for the transcript.

use std::path::{Component, Path, PathBuf};

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio::fs;
use tokio::process::Command;

use super::kind::{
    FindFilesArgs, GitStatusArgs, ListFilesArgs, ReadFileArgs, RunCommandArgs, SearchTextArgs,
    WriteFileArgs,
};
use crate::Error;

/// Directories never searched or listed by `search_text`/`find_files`.
pub const EXCLUDED_DIRS: &[&str] = &[".git", "target", "node_modules"];

const MAX_SEARCH_MATCHES: u32 = 200;
const MAX_FIND_RESULTS: usize = 200;
const MAX_LIST_ENTRIES: usize = 500;

fn parse<T: DeserializeOwned>(tool: &str, args: Map<String, Value>) -> Result<T, Error> {
    serde_json::from_value(Value::Object(args))
        .map_err(|e| Error::tool(tool, format!("invalid arguments: {e}")))
}

/// Join `rel` onto `root`, rejecting absolute paths and `..` components.
pub fn resolve(tool: &str, root: &Path, rel: &str) -> Result<PathBuf, Error> {
    let rel_path = Path::new(rel);
    if rel_path.is_absolute() || rel.starts_with('/') || rel.starts_with('\\') {
        return Err(Error::tool(tool, format!("absolute paths are not allowed: {rel}")));
    }
    if rel_path.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(Error::tool(tool, "path traversal not allowed"));
    }
    Ok(root.join(rel_path))
}

/// Stdout (plus stderr if any) of a finished process. Exit codes listed in
/// `lenient_exit_codes` count as success.
fn format_output(output: &std::process::Output, lenient_exit_codes: &[i32]) -> (bool, String) {
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let ok = output.status.success()
        || output
            .status
            .code()
            .is_some_and(|c| lenient_exit_codes.contains(&c));
    let text = if stderr.trim().is_empty() {
        stdout
    } else {
        format!("{stdout}\n[stderr]\n{stderr}")
    };
    (ok, text)
}

async fn run(
    tool: &str,
    root: &Path,
    program: &str,
    args: &[String],
) -> Result<std::process::Output, Error> {
    Command::new(program)
        .args(args)
        .current_dir(root)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| Error::tool(tool, format!("failed to run {program}: {e}")))
}

pub async fn read_file(root: PathBuf, args: Map<String, Value>) -> Result<String, Error> {
    let args: ReadFileArgs = parse("read_file", args)?;
    let full = resolve("read_file", &root, &args.path)?;

    if let Ok(meta) = fs::metadata(&full).await
        && meta.is_dir()
    {
        return Err(Error::tool(
            "read_file",
            format!("'{}' is a directory. Use list_files to browse it.", args.path),
        ));
    }

    let content = fs::read_to_string(&full)
        .await
        .map_err(|e| Error::tool("read_file", format!("cannot read '{}': {e}", args.path)))?;

    let total = content.lines().count();
    let start = args.start_line.unwrap_or(1).max(1);
    let end = args.end_line.unwrap_or(total).min(total);
    if total == 0 {
        return Ok(format!("{} is empty", args.path));
    }
    if start > end {
        return Err(Error::tool(
            "read_file",
            format!("line range {start}-{end} is outside the file ({total} lines)"),
        ));
    }

    let width = end.to_string().len();
    let numbered: Vec<String> = content
        .lines()
        .enumerate()
        .skip(start - 1)
        .take(end + 1 - start)
        .map(|(i, line)| format!("{:>width$} | {line}", i + 1))
        .collect();
    Ok(numbered.join("\n"))
}

pub async fn search_text(root: PathBuf, args: Map<String, Value>) -> Result<String, Error> {
    let args: SearchTextArgs = parse("search_text", args)?;
    if args.query.trim().is_empty() {
        return Err(Error::tool("search_text", "query must not be empty"));
    }
    let path = args.path.as_deref().unwrap_or(".");
    resolve("search_text", &root, path)?;

    let mut cmd_args = vec![
        "-rnI".to_string(),
        "--color=never".to_string(),
        format!("--max-count={MAX_SEARCH_MATCHES}"),
    ];
    for dir in EXCLUDED_DIRS {
        cmd_args.push(format!("--exclude-dir={dir}"));
    }
    if args.case_insensitive.unwrap_or(false) {
        cmd_args.push("-i".to_string());
    }
    if let Some(glob) = &args.glob {
        cmd_args.push(format!("--include={glob}"));
    }
    cmd_args.push("-e".to_string());
    cmd_args.push(args.query.clone());
    cmd_args.push(path.to_string());

    let output = run("search_text", &root, "grep", &cmd_args).await?;
    // grep exits 1 for "no matches".
    if output.status.code() == Some(1) {
        return Ok(format!("No matches for '{}'", args.query));
    }
    let (ok, text) = format_output(&output, &[]);
    if !ok {
        return Err(Error::tool("search_text", text.trim().to_string()));
    }
    Ok(text
        .lines()
        .map(|l| l.strip_prefix("./").unwrap_or(l))
        .collect::<Vec<_>>()
        .join("\n"))
}

pub async fn list_files(root: PathBuf, args: Map<String, Value>) -> Result<String, Error> {
    let args: ListFilesArgs = parse("list_files", args)?;
    let rel = args.path.as_deref().unwrap_or(".");
    let dir = resolve("list_files", &root, rel)?;

    let mut reader = fs::read_dir(&dir)
        .await
        .map_err(|e| Error::tool("list_files", format!("cannot list '{rel}': {e}")))?;
    let mut entries = Vec::new();
    while let Some(entry) = reader
        .next_entry()
        .await
        .map_err(|e| Error::tool("list_files", e.to_string()))?
    {
        let name = entry.file_name().to_string_lossy().to_string();
        let is_dir = entry.file_type().await.is_ok_and(|t| t.is_dir());
        entries.push(if is_dir { format!("{name}/") } else { name });
    }
    entries.sort();

    if entries.is_empty() {
        return Ok(format!("{rel} is empty"));
    }
    let total = entries.len();
    entries.truncate(MAX_LIST_ENTRIES);
    let mut out = entries.join("\n");
    if total > MAX_LIST_ENTRIES {
        out.push_str(&format!("\n[... {} more entries]", total - MAX_LIST_ENTRIES));
    }
    Ok(out)
}

pub async fn find_files(root: PathBuf, args: Map<String, Value>) -> Result<String, Error> {
    let args: FindFilesArgs = parse("find_files", args)?;
    let pattern = args.pattern.trim().trim_start_matches("./");
    if pattern.is_empty() {
        return Err(Error::tool("find_files", "pattern must not be empty"));
    }
    if pattern.split('/').any(|part| part == "..") {
        return Err(Error::tool("find_files", "path traversal not allowed"));
    }

    let mut cmd_args = vec![".".to_string(), "(".to_string()];
    for (i, dir) in EXCLUDED_DIRS.iter().enumerate() {
        if i > 0 {
            cmd_args.push("-o".to_string());
        }
        cmd_args.extend(["-name".to_string(), dir.to_string()]);
    }
    cmd_args.extend([")".into(), "-prune".into(), "-o".into(), "-type".into(), "f".into()]);
    if pattern.contains('/') {
        cmd_args.extend(["-path".to_string(), format!("./{pattern}")]);
    } else {
        cmd_args.extend(["-name".to_string(), pattern.to_string()]);
    }
    cmd_args.push("-print".to_string());

    let output = run("find_files", &root, "find", &cmd_args).await?;
    let (_, text) = format_output(&output, &[1]);
    let mut paths: Vec<&str> = text
        .lines()
        .filter(|l| l.starts_with("./"))
        .map(|l| l.trim_start_matches("./"))
        .collect();
    paths.sort_unstable();

    if paths.is_empty() {
        return Ok(format!("No files found matching '{pattern}'"));
    }
    let total = paths.len();
    paths.truncate(MAX_FIND_RESULTS);
    let mut out = paths.join("\n");
    if total > MAX_FIND_RESULTS {
        out.push_str(&format!("\n[... {} more files]", total - MAX_FIND_RESULTS));
    }
    Ok(out)
}

pub async fn git_status(root: PathBuf, args: Map<String, Value>) -> Result<String, Error> {
    let _: GitStatusArgs = parse("git_status", args)?;
    let cmd_args = ["status", "--short", "--branch"].map(String::from);
    let output = run("git_status", &root, "git", &cmd_args).await?;
    let (ok, text) = format_output(&output, &[]);
    if !ok {
        return Err(Error::tool("git_status", text.trim().to_string()));
    }
    Ok(text)
}

pub async fn write_file(root: PathBuf, args: Map<String, Value>) -> Result<String, Error> {
    let args: WriteFileArgs = parse("write_file", args)?;
    let full = resolve("write_file", &root, &args.path)?;
    if let Some(parent) = full.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| Error::tool("write_file", format!("cannot create directories: {e}")))?;
    }
    fs::write(&full, args.content.as_bytes())
        .await
        .map_err(|e| Error::tool("write_file", format!("cannot write '{}': {e}", args.path)))?;
    Ok(format!("Wrote {} bytes to {}", args.content.len(), args.path))
}

pub async fn run_command(root: PathBuf, args: Map<String, Value>) -> Result<String, Error> {
    let args: RunCommandArgs = parse("run_command", args)?;
    let cmd_args = ["-c".to_string(), args.command];
    let output = run("run_command", &root, "sh", &cmd_args).await?;
    let (ok, text) = format_output(&output, &[]);
    if ok {
        Ok(text)
    } else {
        Ok(format!("Command failed ({}):\n{text}", output.status))
    }
}
