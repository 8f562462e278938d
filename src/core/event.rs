use std::path::{Path, PathBuf};
use std::time::Instant;

/// Kind of a debounced file change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileEventKind {
    Create,
    Write,
    Remove,
    RenameIn,
    RenameOut,
}

impl FileEventKind {
    /// Get display label for logging.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Write => "write",
            Self::Remove => "remove",
            Self::RenameIn => "rename-in",
            Self::RenameOut => "rename-out",
        }
    }

    /// The file is gone after this event.
    pub const fn is_removal(self) -> bool {
        matches!(self, Self::Remove | Self::RenameOut)
    }

    /// The file appeared at this path.
    pub const fn is_arrival(self) -> bool {
        matches!(self, Self::Create | Self::RenameIn)
    }
}

/// A normalized filesystem event, produced by the watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvent {
    pub path: PathBuf,
    pub name: String,
    /// Lowercase with leading dot, empty if none.
    pub ext: String,
    pub kind: FileEventKind,
    pub at: Instant,
}

impl FileEvent {
    pub fn new(path: PathBuf, kind: FileEventKind, at: Instant) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let ext = extension_of(&path);
        Self {
            path,
            name,
            ext,
            kind,
            at,
        }
    }

    pub fn now(path: PathBuf, kind: FileEventKind) -> Self {
        Self::new(path, kind, Instant::now())
    }

    pub fn media(&self) -> Option<MediaType> {
        MediaType::from_ext(&self.ext)
    }
}

/// Lowercased `.ext` of a path, or empty.
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_ascii_lowercase()))
        .unwrap_or_default()
}

/// Bundled asset media type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Css,
    Js,
}

impl MediaType {
    pub const ALL: [Self; 2] = [Self::Css, Self::Js];

    pub fn from_ext(ext: &str) -> Option<Self> {
        match ext {
            ".css" => Some(Self::Css),
            ".js" => Some(Self::Js),
            _ => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Css => "css",
            Self::Js => "js",
        }
    }
}
