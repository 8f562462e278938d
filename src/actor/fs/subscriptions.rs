use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use jwalk::WalkDir;
use notify::{RecursiveMode, Watcher};
use rustc_hash::FxHashSet;

use super::ignore::IgnoreList;

/// Result of walking a directory tree.
#[derive(Debug, Default)]
pub(super) struct Walk {
    pub(super) dirs: Vec<PathBuf>,
    pub(super) files: Vec<PathBuf>,
}

/// Walk `dir`, pruning ignored entries (ignored directories are not entered).
///
/// Errors only if `dir` itself cannot be read; unreadable subdirectories are
/// logged and skipped.
pub(super) fn walk(dir: &Path, ignore: &IgnoreList) -> Result<Walk> {
    std::fs::read_dir(dir).with_context(|| format!("cannot read `{}`", dir.display()))?;

    let filter = ignore.clone();
    let walker = WalkDir::new(dir)
        .skip_hidden(false)
        .sort(true)
        // `depth` is `None` for the listing that yields `dir` itself: the
        // root is walked even when its own name would be ignored.
        .process_read_dir(move |depth, _, _, children| {
            if depth.is_none() {
                return;
            }
            children.retain(|entry| {
                entry
                    .as_ref()
                    .map_or(true, |e| !filter.is_ignored(&e.path()))
            });
        });

    let mut out = Walk::default();
    for entry in walker {
        match entry {
            Ok(e) if e.file_type().is_dir() => out.dirs.push(e.path()),
            Ok(e) if e.file_type().is_file() => out.files.push(e.path()),
            Ok(_) => {}
            Err(e) => crate::warn!("watch"; "skipping unreadable entry: {}", e),
        }
    }
    Ok(out)
}

/// Per-directory, non-recursive watch handles.
pub(super) struct Subscriptions {
    dirs: FxHashSet<PathBuf>,
}

impl Subscriptions {
    pub(super) fn new() -> Self {
        Self {
            dirs: FxHashSet::default(),
        }
    }

    pub(super) fn is_subscribed(&self, dir: &Path) -> bool {
        self.dirs.contains(dir)
    }

    pub(super) fn len(&self) -> usize {
        self.dirs.len()
    }

    /// Subscribe one directory. Failures are logged, never fatal.
    pub(super) fn subscribe<W: Watcher>(&mut self, watcher: &mut W, dir: &Path) -> bool {
        if self.dirs.contains(dir) {
            return true;
        }
        match watcher.watch(dir, RecursiveMode::NonRecursive) {
            Ok(()) => {
                self.dirs.insert(dir.to_path_buf());
                true
            }
            Err(e) => {
                crate::warn!("watch"; "cannot watch {}: {}", dir.display(), e);
                false
            }
        }
    }

    /// Drop `dir` and every subscribed descendant.
    ///
    /// The directory is usually gone already, so unwatch errors are expected.
    pub(super) fn unsubscribe_tree<W: Watcher>(&mut self, watcher: &mut W, dir: &Path) -> usize {
        let gone: Vec<_> = self
            .dirs
            .iter()
            .filter(|d| d.starts_with(dir))
            .cloned()
            .collect();
        for d in &gone {
            let _ = watcher.unwatch(d);
            self.dirs.remove(d);
        }
        gone.len()
    }

    pub(super) fn clear<W: Watcher>(&mut self, watcher: &mut W) {
        for d in self.dirs.drain() {
            let _ = watcher.unwatch(&d);
        }
    }
}
