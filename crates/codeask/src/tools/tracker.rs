//! Tool call ledger with duplicate detection and correction hints.
//!
//! This is a tally over the calls made so far, not a loop detector. It
//! catches exact repeats and obvious ruts; a model that varies one character
//! per call slips past it.

use super::invocation::canonicalize;
use serde_json::{Map, Value};

/// One recorded call. Never mutated after it is appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCallRecord {
    pub name: String,
    pub canonical_args: String,
    pub was_error: bool,
}

/// Hint injected when ≥2 calls have failed.
pub const MALFORMED_ARGS_HINT: &str = "Several tool calls have failed. Check the tool \
schemas: argument names are case-sensitive, paths are relative to the workspace root, \
and required arguments must be present.";

/// Hint injected when the same call has been repeated ≥2 times.
pub const DIVERSIFY_HINT: &str = "You keep repeating identical tool calls. Use different \
search terms (synonyms, partial identifiers, file names) or read a file you found instead.";

/// Hint injected when the last three calls used one tool.
pub const SWITCH_TOOL_HINT: &str = "Your last three calls used the same tool. Switch tool \
types: find_files or list_files to locate candidates, read_file to inspect them, \
search_text to find usages.";

#[derive(Debug, Default)]
pub struct ToolCallTracker {
    records: Vec<ToolCallRecord>,
    errors: usize,
    duplicates: usize,
}

impl ToolCallTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a call. `was_error` counts toward the malformed-arguments hint.
    pub fn record(&mut self, name: &str, args: &Map<String, Value>, was_error: bool) {
        if was_error {
            self.errors += 1;
        }
        self.records.push(ToolCallRecord {
            name: name.to_string(),
            canonical_args: canonicalize(args),
            was_error,
        });
    }

    /// Append a skipped duplicate. Recorded as error-flagged, but counted
    /// toward the diversify hint rather than the malformed-arguments hint.
    pub fn record_duplicate(&mut self, name: &str, args: &Map<String, Value>) {
        self.duplicates += 1;
        self.records.push(ToolCallRecord {
            name: name.to_string(),
            canonical_args: canonicalize(args),
            was_error: true,
        });
    }

    /// Exact match on name and canonical arguments against every prior record.
    pub fn is_duplicate(&self, name: &str, args: &Map<String, Value>) -> bool {
        let key = canonicalize(args);
        self.records
            .iter()
            .any(|r| r.name == name && r.canonical_args == key)
    }

    pub fn duplicate_count(&self) -> usize {
        self.duplicates
    }

    pub fn error_count(&self) -> usize {
        self.errors
    }

    pub fn records(&self) -> &[ToolCallRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// A remediation hint, checked in priority order: repeated failures,
    /// repeated duplicates, then a three-call rut on one tool.
    pub fn correction_hint(&self) -> Option<&'static str> {
        if self.errors >= 2 {
            return Some(MALFORMED_ARGS_HINT);
        }
        if self.duplicates >= 2 {
            return Some(DIVERSIFY_HINT);
        }
        if let [a, b, c] = self.records.as_slice().last_chunk::<3>()?
            && a.name == b.name
            && b.name == c.name
        {
            return Some(SWITCH_TOOL_HINT);
        }
        None
    }

    /// Clear all state for a new logical turn.
    pub fn reset(&mut self) {
        self.records.clear();
        self.errors = 0;
        self.duplicates = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn duplicate_requires_exact_match() {
        let mut t = ToolCallTracker::new();
        t.record("search_text", &args(json!({"query": "a", "path": "src"})), false);

        assert!(t.is_duplicate("search_text", &args(json!({"path": "src", "query": "a"}))));
        assert!(!t.is_duplicate("search_text", &args(json!({"query": "b", "path": "src"}))));
        assert!(!t.is_duplicate("find_files", &args(json!({"query": "a", "path": "src"}))));
    }

    #[test]
    fn errors_trigger_malformed_hint_first() {
        let mut t = ToolCallTracker::new();
        t.record("read_file", &args(json!({"file": "a"})), true);
        assert_eq!(t.correction_hint(), None);
        t.record("read_file", &args(json!({"file": "b"})), true);
        assert_eq!(t.correction_hint(), Some(MALFORMED_ARGS_HINT));
    }

    #[test]
    fn duplicates_trigger_diversify_hint() {
        let mut t = ToolCallTracker::new();
        let a = args(json!({"query": "x"}));
        t.record("search_text", &a, false);
        t.record_duplicate("search_text", &a);
        assert_eq!(t.duplicate_count(), 1);
        t.record("read_file", &args(json!({"path": "a.rs"})), false);
        t.record_duplicate("search_text", &a);
        assert_eq!(t.error_count(), 0);
        assert_eq!(t.correction_hint(), Some(DIVERSIFY_HINT));
    }

    #[test]
    fn same_tool_three_times_triggers_switch_hint() {
        let mut t = ToolCallTracker::new();
        t.record("search_text", &args(json!({"query": "a"})), false);
        t.record("search_text", &args(json!({"query": "b"})), false);
        assert_eq!(t.correction_hint(), None);
        t.record("search_text", &args(json!({"query": "c"})), false);
        assert_eq!(t.correction_hint(), Some(SWITCH_TOOL_HINT));
        t.record("read_file", &args(json!({"path": "a"})), false);
        assert_eq!(t.correction_hint(), None);
    }

    #[test]
    fn reset_clears_everything() {
        let mut t = ToolCallTracker::new();
        let a = args(json!({"query": "x"}));
        t.record("search_text", &a, true);
        t.record_duplicate("search_text", &a);
        t.reset();
        assert!(t.is_empty());
        assert!(!t.is_duplicate("search_text", &a));
        assert_eq!(t.duplicate_count(), 0);
        assert_eq!(t.correction_hint(), None);
    }
}
