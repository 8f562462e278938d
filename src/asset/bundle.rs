//! Ordered CSS / JS bundles.
//!
//! Each bundle maps a root-relative logical path to the file's content.
//! Insertion order is concatenation order; rewriting a file keeps its slot.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;

use crate::core::MediaType;

/// Inserted between the loader and the project scripts.
pub const STRICT_PRELUDE: &str = "\"use strict\";";

#[derive(Debug, Clone)]
pub struct Bundle {
    media: MediaType,
    entries: IndexMap<PathBuf, String>,
}

impl Bundle {
    pub fn new(media: MediaType) -> Self {
        Self {
            media,
            entries: IndexMap::new(),
        }
    }

    pub const fn media(&self) -> MediaType {
        self.media
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append a file seen for the first time. Returns false if already present.
    pub fn insert_new(&mut self, path: PathBuf, content: String) -> bool {
        if self.entries.contains_key(&path) {
            return false;
        }
        self.entries.insert(path, content);
        true
    }

    /// Replace in place, or append. Returns whether the content changed.
    pub fn upsert(&mut self, path: PathBuf, content: String) -> bool {
        match self.entries.get_mut(&path) {
            Some(existing) if *existing == content => false,
            Some(existing) => {
                *existing = content;
                true
            }
            None => {
                self.entries.insert(path, content);
                true
            }
        }
    }

    /// Drop a file, keeping the order of the rest.
    pub fn remove(&mut self, path: &Path) -> bool {
        self.entries.shift_remove(path).is_some()
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.entries.keys().map(PathBuf::as_path)
    }

    /// Entries concatenated in order.
    ///
    /// JS entries are separated by `;` so a file ending without one cannot
    /// merge with the next file's first expression.
    pub fn concat(&self) -> String {
        let separator = match self.media {
            MediaType::Css => "\n",
            MediaType::Js => "\n;\n",
        };
        self.entries
            .values()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(separator)
    }

    /// Unminified bundle text.
    ///
    /// JS: loader, strict prelude, project scripts, runtime initializer.
    pub fn render(&self, loader: &str, runtime: &str) -> String {
        match self.media {
            MediaType::Css => self.concat(),
            MediaType::Js => format!(
                "{loader}\n{STRICT_PRELUDE}\n{}\n;\n{runtime}",
                self.concat()
            ),
        }
    }
}
