//! Ignore predicate for the watcher.
//!
//! A path is ignored when its basename starts with `.`, it is a dotted
//! tooling directory, an editor backup, a binary/log, a Go test file, or a
//! file some builder declared it writes.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashSet;

/// Directories never walked, even if the dot rule were relaxed.
const IGNORED_DIRS: &[&str] = &[".git", ".vscode", ".devcontainer"];

/// Extensions of build products and logs.
const IGNORED_EXTS: &[&str] = &["exe", "log"];

/// Editor temp / backup extensions.
const BACKUP_EXTS: &[&str] = &["bck", "bak", "backup", "swp", "swo", "tmp"];

/// Shared ignore list; builders declare their outputs before the first walk.
#[derive(Debug, Clone, Default)]
pub struct IgnoreList {
    unobserved: Arc<RwLock<FxHashSet<PathBuf>>>,
}

impl IgnoreList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare files the watcher must never report.
    pub fn declare<I: IntoIterator<Item = PathBuf>>(&self, paths: I) {
        self.unobserved.write().extend(paths);
    }

    pub fn is_ignored(&self, path: &Path) -> bool {
        is_ignored_name(path) || self.unobserved.read().contains(path)
    }
}

/// Name-based part of the predicate (no shared state).
pub fn is_ignored_name(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    name.starts_with('.')
        || IGNORED_DIRS.contains(&name)
        || name.ends_with('~')
        || name.ends_with("_test.go")
        || IGNORED_EXTS.iter().any(|e| ext.eq_ignore_ascii_case(e))
        || BACKUP_EXTS.iter().any(|e| ext.eq_ignore_ascii_case(e))
}
