// SPDX-License-Identifier: MIT

//! The per-invocation state bundle, replacing the reference implementation's
//! process-wide globals (see SPEC_FULL.md §9).

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::SystemTime;

use crate::config::Config;
use crate::manifest::IncludeEntry;

/// Insertion-ordered, dedup-by-path collection of include files seen during
/// one compilation. A `Vec` plus a `HashSet` for membership, not a full map —
/// matching the teacher's avoidance of an extra dependency when this
/// suffices.
#[derive(Debug, Default, Clone)]
pub struct IncludedFiles {
    seen: HashSet<String>,
    entries: Vec<IncludeEntry>,
}

impl IncludedFiles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry, keeping the first-seen record for a given path.
    pub fn insert(&mut self, entry: IncludeEntry) {
        if self.seen.insert(entry.path.clone()) {
            self.entries.push(entry);
        }
    }

    pub fn contains(&self, path: &str) -> bool {
        self.seen.contains(path)
    }

    pub fn entries(&self) -> &[IncludeEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Everything one invocation needs, owned exclusively by the orchestrator
/// and passed by reference to each subsystem.
pub struct Context {
    pub config: Config,
    pub cwd: PathBuf,
    pub compile_start: SystemTime,
    pub included_files: IncludedFiles,
    /// Set once argument splitting determines the real compiler path.
    pub compiler: Option<PathBuf>,
}

impl Context {
    pub fn new(config: Config, cwd: PathBuf) -> Self {
        Self {
            config,
            cwd,
            compile_start: SystemTime::now(),
            included_files: IncludedFiles::new(),
            compiler: None,
        }
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;
