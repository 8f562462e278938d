use std::fmt;
use std::path::PathBuf;

/// Which entry point a build root compiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RootKind {
    Server,
    Wasm,
}

impl RootKind {
    pub const ALL: [Self; 2] = [Self::Server, Self::Wasm];

    pub const fn label(self) -> &'static str {
        match self {
            Self::Server => "server",
            Self::Wasm => "wasm",
        }
    }
}

impl fmt::Display for RootKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A compilable entry point and where its artifact lands.
///
/// Immutable after startup. Switching the WASM mode only changes which
/// toolchain compiles the root, never the paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRoot {
    pub kind: RootKind,
    pub source_dir: PathBuf,
    pub main_file: String,
    pub output_dir: PathBuf,
    pub output_file: String,
}

impl BuildRoot {
    pub fn main_path(&self) -> PathBuf {
        self.source_dir.join(&self.main_file)
    }

    pub fn output_path(&self) -> PathBuf {
        self.output_dir.join(&self.output_file)
    }

    /// Compiler output before the atomic rename.
    pub fn temp_path(&self) -> PathBuf {
        self.output_dir.join(format!(".{}.tmp", stem(&self.output_file)))
    }

    /// Artifact built for a pending mode change, not yet committed.
    pub fn staged_path(&self) -> PathBuf {
        self.output_dir.join(format!(".{}.staged", stem(&self.output_file)))
    }

    pub fn has_main(&self) -> bool {
        self.main_path().is_file()
    }

    /// Files this root writes; the watcher must never report them.
    pub fn unobserved(&self) -> [PathBuf; 3] {
        [self.output_path(), self.temp_path(), self.staged_path()]
    }
}

fn stem(file: &str) -> &str {
    file.strip_suffix(".exe").unwrap_or(file)
}
