//! `wasm_exec.js` lookup.
//!
//! The loader defines the `Go` class the runtime initializer instantiates.
//! Go and TinyGo ship incompatible loaders, so the bundle must always carry
//! the one matching the toolchain that built `client.wasm`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use rustc_hash::FxHashMap;

use crate::config::ToolchainConfig;
use crate::core::{Shutdown, WasmMode};
use crate::utils::exec::{Cmd, find_program};

const LOADER_FILE: &str = "wasm_exec.js";

/// Candidate loader locations under `GOROOT` (Go 1.24 moved it to `lib/`).
const GO_LOADER_DIRS: &[&str] = &["lib/wasm", "misc/wasm"];
const TINYGO_LOADER_DIR: &str = "targets";

/// Loader scripts, read once per toolchain.
pub struct LoaderCache {
    go: String,
    tinygo: String,
    cache: FxHashMap<bool, Arc<str>>,
}

impl LoaderCache {
    pub fn new(toolchain: &ToolchainConfig) -> Self {
        Self {
            go: toolchain.go.clone(),
            tinygo: toolchain.tinygo.clone(),
            cache: FxHashMap::default(),
        }
    }

    /// Loader for `mode`'s toolchain.
    pub async fn get(&mut self, mode: WasmMode, shutdown: &Shutdown) -> Result<Arc<str>> {
        let tinygo = mode.uses_tinygo();
        if let Some(loader) = self.cache.get(&tinygo) {
            return Ok(Arc::clone(loader));
        }

        let path = if tinygo {
            let root = toolchain_root(&self.tinygo, "TINYGOROOT", shutdown).await?;
            tinygo_loader(&root)
        } else {
            let root = toolchain_root(&self.go, "GOROOT", shutdown).await?;
            go_loader(&root)
        }
        .with_context(|| format!("{LOADER_FILE} not found for mode {mode}"))?;

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        crate::debug!("wasm"; "loader {} for mode {}", path.display(), mode);

        let loader: Arc<str> = content.into();
        self.cache.insert(tinygo, Arc::clone(&loader));
        Ok(loader)
    }
}

/// `<tool> env <VAR>`, trimmed.
async fn toolchain_root(program: &str, var: &str, shutdown: &Shutdown) -> Result<PathBuf> {
    let program = find_program(program)?;
    let output = Cmd::new(&program).args(["env", var]).run(shutdown).await?;
    let root = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if root.is_empty() {
        anyhow::bail!("`{} env {}` printed nothing", program.display(), var);
    }
    Ok(PathBuf::from(root))
}

fn go_loader(goroot: &Path) -> Option<PathBuf> {
    GO_LOADER_DIRS
        .iter()
        .map(|dir| goroot.join(dir).join(LOADER_FILE))
        .find(|p| p.is_file())
}

fn tinygo_loader(root: &Path) -> Option<PathBuf> {
    Some(root.join(TINYGO_LOADER_DIR).join(LOADER_FILE)).filter(|p| p.is_file())
}
