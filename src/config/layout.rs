//! The `web/` project layout convention.
//!
//! ```text
//! <root>/go.mod, go.sum
//! <root>/web/server.go            server entry (optional: internal server)
//! <root>/web/server               server binary
//! <root>/web/client.go            WASM entry
//! <root>/web/public/              served directory
//! <root>/web/public/client.wasm
//! <root>/web/public/script.js     JS bundle
//! <root>/web/public/style.css     CSS bundle
//! <root>/.wasmdev                 persisted state
//! ```

use std::path::{Path, PathBuf};

use crate::core::{BuildRoot, MediaType, RootKind};

pub const WEB_DIR: &str = "web";
pub const PUBLIC_DIR: &str = "public";
pub const SERVER_MAIN: &str = "server.go";
pub const CLIENT_MAIN: &str = "client.go";
pub const WASM_FILE: &str = "client.wasm";
pub const SCRIPT_BUNDLE: &str = "script.js";
pub const STYLE_BUNDLE: &str = "style.css";
pub const STATE_FILE: &str = ".wasmdev";

#[cfg(windows)]
const SERVER_BINARY: &str = "server.exe";
#[cfg(not(windows))]
const SERVER_BINARY: &str = "server";

/// Resolved project paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub root: PathBuf,
    pub web_dir: PathBuf,
    pub public_dir: PathBuf,
}

impl Layout {
    pub fn new(root: &Path) -> Self {
        let web_dir = root.join(WEB_DIR);
        let public_dir = web_dir.join(PUBLIC_DIR);
        Self {
            root: root.to_path_buf(),
            web_dir,
            public_dir,
        }
    }

    pub fn go_mod(&self) -> PathBuf {
        self.root.join("go.mod")
    }

    pub fn go_sum(&self) -> PathBuf {
        self.root.join("go.sum")
    }

    pub fn state_file(&self) -> PathBuf {
        self.root.join(STATE_FILE)
    }

    /// Module metadata: a change invalidates every build root.
    pub fn is_module_file(&self, path: &Path) -> bool {
        path == self.go_mod() || path == self.go_sum()
    }

    pub fn server_root(&self) -> BuildRoot {
        BuildRoot {
            kind: RootKind::Server,
            source_dir: self.web_dir.clone(),
            main_file: SERVER_MAIN.into(),
            output_dir: self.web_dir.clone(),
            output_file: SERVER_BINARY.into(),
        }
    }

    pub fn wasm_root(&self) -> BuildRoot {
        BuildRoot {
            kind: RootKind::Wasm,
            source_dir: self.web_dir.clone(),
            main_file: CLIENT_MAIN.into(),
            output_dir: self.public_dir.clone(),
            output_file: WASM_FILE.into(),
        }
    }

    pub fn root(&self, kind: RootKind) -> BuildRoot {
        match kind {
            RootKind::Server => self.server_root(),
            RootKind::Wasm => self.wasm_root(),
        }
    }

    pub fn bundle_path(&self, media: MediaType) -> PathBuf {
        match media {
            MediaType::Css => self.public_dir.join(STYLE_BUNDLE),
            MediaType::Js => self.public_dir.join(SCRIPT_BUNDLE),
        }
    }

    /// Every file the builders write, for the watcher's ignore list.
    pub fn builder_outputs(&self) -> Vec<PathBuf> {
        let mut outputs: Vec<_> = RootKind::ALL
            .iter()
            .flat_map(|&kind| self.root(kind).unobserved())
            .collect();
        outputs.extend(MediaType::ALL.iter().map(|&m| self.bundle_path(m)));
        outputs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_paths() {
        let layout = Layout::new(Path::new("/p"));
        assert_eq!(layout.public_dir, PathBuf::from("/p/web/public"));
        assert_eq!(layout.state_file(), PathBuf::from("/p/.wasmdev"));
        assert_eq!(
            layout.bundle_path(MediaType::Js),
            PathBuf::from("/p/web/public/script.js")
        );
        assert_eq!(layout.wasm_root().main_path(), PathBuf::from("/p/web/client.go"));
    }

    #[test]
    fn test_module_files() {
        let layout = Layout::new(Path::new("/p"));
        assert!(layout.is_module_file(Path::new("/p/go.sum")));
        assert!(!layout.is_module_file(Path::new("/p/web/go.mod")));
    }

    #[test]
    fn test_builder_outputs_cover_artifacts() {
        let layout = Layout::new(Path::new("/p"));
        let outputs = layout.builder_outputs();
        assert!(outputs.contains(&PathBuf::from("/p/web/public/client.wasm")));
        assert!(outputs.contains(&PathBuf::from("/p/web/public/.client.wasm.staged")));
        assert!(outputs.contains(&PathBuf::from("/p/web/public/style.css")));
        assert!(outputs.contains(&layout.server_root().output_path()));
    }
}
