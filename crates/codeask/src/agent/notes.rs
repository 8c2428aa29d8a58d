//! Per-workspace project notes.
//!
//! After a successful answer the loop hands its [`AccessLog`] to a
//! [`ProjectNotesStore`]. [`FileNotesStore`] keeps `.codeask/notes.md` in
//! the workspace: usage counts for files read and searches run, which the
//! next question loads into the system prompt and the planner context.
//!
//! ```text
//! # Project notes
//!
//! Updated: 2026-01-05 14:02 UTC
//!
//! ## Frequently read files
//!
//! - src/api/client.rs (4)
//!
//! ## Recent searches
//!
//! - createProvider (2)
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::debug;

use crate::context::AccessLog;

pub const NOTES_DIR: &str = ".codeask";
pub const NOTES_FILE: &str = "notes.md";
pub const MAX_ENTRIES_PER_SECTION: usize = 40;
/// Lines returned by [`FileNotesStore::load`].
pub const MAX_LOADED_LINES: usize = 200;

const FILES_HEADING: &str = "## Frequently read files";
const SEARCHES_HEADING: &str = "## Recent searches";

pub trait ProjectNotesStore: Send + Sync {
    /// Notes for `root`, or `None` when there are none.
    fn load(&self, root: &Path) -> Option<String>;

    /// Merge one loop's accesses into the notes.
    fn update(&self, root: &Path, log: &AccessLog) -> io::Result<()>;
}

/// Persistence disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotesStore;

impl ProjectNotesStore for NoopNotesStore {
    fn load(&self, _root: &Path) -> Option<String> {
        None
    }

    fn update(&self, _root: &Path, _log: &AccessLog) -> io::Result<()> {
        Ok(())
    }
}

/// Markdown notes under `<root>/.codeask/notes.md`.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileNotesStore;

impl FileNotesStore {
    pub fn path(root: &Path) -> PathBuf {
        root.join(NOTES_DIR).join(NOTES_FILE)
    }
}

impl ProjectNotesStore for FileNotesStore {
    fn load(&self, root: &Path) -> Option<String> {
        let content = fs::read_to_string(Self::path(root)).ok()?;
        let text = content
            .lines()
            .take(MAX_LOADED_LINES)
            .collect::<Vec<_>>()
            .join("\n");
        (!text.trim().is_empty()).then_some(text)
    }

    fn update(&self, root: &Path, log: &AccessLog) -> io::Result<()> {
        if log.is_empty() {
            return Ok(());
        }
        let path = Self::path(root);
        let mut notes = match fs::read_to_string(&path) {
            Ok(content) => Notes::parse(&content),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Notes::default(),
            Err(e) => return Err(e),
        };
        notes.merge(log);

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&path, notes.render())?;
        debug!(
            "Updated {} ({} files, {} searches)",
            path.display(),
            notes.files.len(),
            notes.searches.len()
        );
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    name: String,
    count: u32,
}

#[derive(Debug, Default)]
struct Notes {
    /// Sorted by count, most-read first.
    files: Vec<Entry>,
    /// Most recent first.
    searches: Vec<Entry>,
}

impl Notes {
    fn parse(content: &str) -> Self {
        let mut notes = Notes::default();
        let mut section: Option<&mut Vec<Entry>> = None;
        for line in content.lines() {
            let line = line.trim();
            if line.starts_with("## ") {
                section = match line {
                    FILES_HEADING => Some(&mut notes.files),
                    SEARCHES_HEADING => Some(&mut notes.searches),
                    _ => None,
                };
                continue;
            }
            if let (Some(entries), Some(item)) = (section.as_deref_mut(), line.strip_prefix("- ")) {
                entries.push(parse_entry(item));
            }
        }
        notes
    }

    fn merge(&mut self, log: &AccessLog) {
        for file in &log.files_read {
            bump(&mut self.files, file);
        }
        self.files
            .sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
        self.files.truncate(MAX_ENTRIES_PER_SECTION);

        for query in &log.search_queries {
            let count = match self.searches.iter().position(|e| &e.name == query) {
                Some(i) => self.searches.remove(i).count + 1,
                None => 1,
            };
            self.searches.insert(
                0,
                Entry {
                    name: query.clone(),
                    count,
                },
            );
        }
        self.searches.truncate(MAX_ENTRIES_PER_SECTION);
    }

    fn render(&self) -> String {
        let mut out = format!(
            "# Project notes\n\nUpdated: {}\n",
            Utc::now().format("%Y-%m-%d %H:%M UTC")
        );
        for (heading, entries) in [(FILES_HEADING, &self.files), (SEARCHES_HEADING, &self.searches)] {
            if entries.is_empty() {
                continue;
            }
            out.push_str(&format!("\n{heading}\n\n"));
            for e in entries {
                out.push_str(&format!("- {} ({})\n", e.name, e.count));
            }
        }
        out
    }
}

fn bump(entries: &mut Vec<Entry>, name: &str) {
    match entries.iter_mut().find(|e| e.name == name) {
        Some(e) => e.count += 1,
        None => entries.push(Entry {
            name: name.to_string(),
            count: 1,
        }),
    }
}

/// `name (3)` → (`name`, 3). A missing or unparsable count is 1.
fn parse_entry(item: &str) -> Entry {
    let parsed = item.rsplit_once(" (").and_then(|(name, rest)| {
        let count = rest.strip_suffix(')')?.parse().ok()?;
        Some((name, count))
    });
    match parsed {
        Some((name, count)) => Entry {
            name: name.to_string(),
            count,
        },
        None => Entry {
            name: item.to_string(),
            count: 1,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log(files: &[&str], searches: &[&str]) -> AccessLog {
        AccessLog {
            files_read: files.iter().map(|s| s.to_string()).collect(),
            search_queries: searches.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn load_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(FileNotesStore.load(dir.path()).is_none());
    }

    #[test]
    fn update_merges_counts() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileNotesStore;
        store
            .update(dir.path(), &log(&["src/a.rs", "src/b.rs"], &["createProvider"]))
            .unwrap();
        store
            .update(dir.path(), &log(&["src/b.rs"], &["route"]))
            .unwrap();

        let text = store.load(dir.path()).unwrap();
        assert!(text.starts_with("# Project notes"));
        assert!(text.contains("- src/b.rs (2)\n- src/a.rs (1)"));
        assert!(text.contains("- route (1)\n- createProvider (1)"));
    }

    #[test]
    fn sections_are_capped() {
        let dir = tempfile::tempdir().unwrap();
        let files: Vec<String> = (0..60).map(|i| format!("src/f{i}.rs")).collect();
        let refs: Vec<&str> = files.iter().map(String::as_str).collect();
        FileNotesStore.update(dir.path(), &log(&refs, &[])).unwrap();

        let raw = fs::read_to_string(FileNotesStore::path(dir.path())).unwrap();
        let notes = Notes::parse(&raw);
        assert_eq!(notes.files.len(), MAX_ENTRIES_PER_SECTION);
        assert!(notes.searches.is_empty());
    }

    #[test]
    fn load_truncates_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = FileNotesStore::path(dir.path());
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let long: String = (0..500).map(|i| format!("line {i}\n")).collect();
        fs::write(&path, long).unwrap();
        let text = FileNotesStore.load(dir.path()).unwrap();
        assert_eq!(text.lines().count(), MAX_LOADED_LINES);
    }

    #[test]
    fn entry_parsing() {
        assert_eq!(parse_entry("src/a (b).rs (3)").name, "src/a (b).rs");
        assert_eq!(parse_entry("src/a (b).rs (3)").count, 3);
        assert_eq!(parse_entry("plain").count, 1);
    }

    #[test]
    fn noop_store() {
        let dir = tempfile::tempdir().unwrap();
        NoopNotesStore.update(dir.path(), &log(&["a"], &[])).unwrap();
        assert!(!FileNotesStore::path(dir.path()).exists());
    }
}
