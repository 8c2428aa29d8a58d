//! Short-lived tool result cache.
//!
//! Results are keyed by `(tool_name, canonical_args)` and expire after a TTL.
//! Invalidation after writes is deliberately coarse: a stale hit after a
//! write is worse than a miss.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use serde_json::{Map, Value};

use super::invocation::canonicalize;
use crate::context::access_log::normalize_path;

/// Default entry lifetime.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// Tools whose output depends on the whole workspace rather than one file.
/// Any write may change them.
const WORKSPACE_WIDE_TOOLS: &[&str] = &["search_text", "find_files", "list_files", "git_status"];

#[derive(Debug, Clone)]
struct CacheEntry {
    output: String,
    stored_at: Instant,
    path: Option<String>,
}

#[derive(Debug)]
pub struct ToolResultCache {
    entries: HashMap<(String, String), CacheEntry>,
    /// Keys dropped by a write since they were last stored.
    invalidated: HashSet<(String, String)>,
    ttl: Duration,
    hits: u64,
    misses: u64,
}

impl Default for ToolResultCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl ToolResultCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            invalidated: HashSet::new(),
            ttl,
            hits: 0,
            misses: 0,
        }
    }

    /// Cached output, unless absent or older than the TTL. Stale entries are
    /// evicted on lookup.
    pub fn get(&mut self, name: &str, args: &Map<String, Value>) -> Option<String> {
        let key = (name.to_string(), canonicalize(args));
        let fresh = match self.entries.get(&key) {
            Some(entry) if entry.stored_at.elapsed() <= self.ttl => Some(entry.output.clone()),
            Some(_) => {
                self.entries.remove(&key);
                None
            }
            None => None,
        };
        match fresh {
            Some(_) => self.hits += 1,
            None => self.misses += 1,
        }
        fresh
    }

    pub fn set(&mut self, name: &str, args: &Map<String, Value>, output: impl Into<String>) {
        let path = args
            .get("path")
            .and_then(Value::as_str)
            .map(normalize_path);
        let key = (name.to_string(), canonicalize(args));
        self.invalidated.remove(&key);
        self.entries.insert(
            key,
            CacheEntry {
                output: output.into(),
                stored_at: Instant::now(),
                path,
            },
        );
    }

    /// Drop every `read_file` entry for `path` and every workspace-wide entry
    /// (searches, listings, git status).
    pub fn invalidate_path(&mut self, path: &str) {
        let path = normalize_path(path);
        let invalidated = &mut self.invalidated;
        self.entries.retain(|key, entry| {
            let (name, _) = key;
            let stale = WORKSPACE_WIDE_TOOLS.contains(&name.as_str())
                || (name == "read_file" && entry.path.as_deref() == Some(path.as_str()));
            if stale {
                invalidated.insert(key.clone());
            }
            !stale
        });
    }

    /// Drop everything, e.g. after a shell command.
    pub fn clear(&mut self) {
        self.invalidated.extend(self.entries.drain().map(|(key, _)| key));
    }

    /// Whether a stored result for this call was dropped by a write and has
    /// not been stored again since. Repeating such a call is not redundant.
    pub fn was_invalidated(&self, name: &str, args: &Map<String, Value>) -> bool {
        self.invalidated.contains(&(name.to_string(), canonicalize(args)))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }
}
