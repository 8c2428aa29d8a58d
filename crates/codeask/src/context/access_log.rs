//! Files read and searches run during one ask loop.
//!
//! The log feeds the project notes store at the end of a successful answer
//! and plays no part in the loop's own decisions.

use std::collections::BTreeSet;

use serde::Serialize;
use serde_json::{Map, Value};

/// Paths read and search queries issued, deduplicated and sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AccessLog {
    pub files_read: BTreeSet<String>,
    pub search_queries: BTreeSet<String>,
}

impl AccessLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one tool invocation. Tools that neither read a file nor
    /// search are ignored.
    pub fn record(&mut self, tool_name: &str, arguments: &Map<String, Value>) {
        let field = |key: &str| {
            arguments
                .get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
        };

        match tool_name {
            "read_file" => {
                if let Some(path) = field("path") {
                    self.files_read.insert(normalize_path(path));
                }
            }
            "search_text" => {
                if let Some(query) = field("query") {
                    self.search_queries.insert(query.to_string());
                }
            }
            "find_files" => {
                if let Some(pattern) = field("pattern") {
                    self.search_queries.insert(format!("files:{pattern}"));
                }
            }
            _ => {}
        }
    }

    pub fn is_empty(&self) -> bool {
        self.files_read.is_empty() && self.search_queries.is_empty()
    }
}

/// Strip a leading `./` so `./src/a.rs` and `src/a.rs` count once.
pub fn normalize_path(path: &str) -> String {
    path.trim_start_matches("./").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn records_reads_and_searches() {
        let mut log = AccessLog::new();
        log.record("read_file", &args(json!({"path": "./src/main.rs"})));
        log.record("read_file", &args(json!({"path": "src/main.rs"})));
        log.record("search_text", &args(json!({"query": "createProvider"})));
        log.record("find_files", &args(json!({"pattern": "*.toml"})));

        assert_eq!(log.files_read.len(), 1);
        assert!(log.files_read.contains("src/main.rs"));
        assert!(log.search_queries.contains("createProvider"));
        assert!(log.search_queries.contains("files:*.toml"));
    }

    #[test]
    fn ignores_other_tools_and_blank_args() {
        let mut log = AccessLog::new();
        log.record("git_status", &Map::new());
        log.record("read_file", &args(json!({"path": "  "})));
        log.record("search_text", &args(json!({"query": 42})));
        assert!(log.is_empty());
    }
}
