//! Persisted key-value state (`.wasmdev` at the project root).
//!
//! Newline-delimited `key=value`; blank lines and `#` comments are ignored.
//! Survives restarts so the last WASM mode and output target stick.
//!
//! ```text
//! wasm_mode=S
//! build_on_disk=false
//! browser_geometry=1280x800+0+0
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::core::{OutputTarget, WasmMode};
use crate::utils::fs::write_atomic;

pub const KEY_WASM_MODE: &str = "wasm_mode";
pub const KEY_BUILD_ON_DISK: &str = "build_on_disk";
pub const KEY_BROWSER_GEOMETRY: &str = "browser_geometry";

/// Shared handle to the state file; writes are serialized.
#[derive(Debug, Clone)]
pub struct Store {
    path: PathBuf,
    entries: Arc<Mutex<IndexMap<String, String>>>,
}

impl Store {
    /// Open the store, reading existing entries. A missing file is empty.
    pub fn open(path: &Path) -> Self {
        let entries = match std::fs::read_to_string(path) {
            Ok(content) => parse(&content),
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    crate::warn!("store"; "cannot read {}: {}", path.display(), e);
                }
                IndexMap::new()
            }
        };
        Self {
            path: path.to_path_buf(),
            entries: Arc::new(Mutex::new(entries)),
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    /// Set a key and rewrite the file atomically.
    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.lock();
        entries.insert(key.to_string(), value.to_string());
        // Lock held across the write: one writer at a time.
        write_atomic(&self.path, render(&entries).as_bytes())
    }

    pub fn wasm_mode(&self) -> WasmMode {
        self.get(KEY_WASM_MODE)
            .and_then(|v| match v.parse() {
                Ok(mode) => Some(mode),
                Err(e) => {
                    crate::warn!("store"; "{}, using L", e);
                    None
                }
            })
            .unwrap_or_default()
    }

    pub fn set_wasm_mode(&self, mode: WasmMode) -> Result<()> {
        self.set(KEY_WASM_MODE, mode.code())
    }

    pub fn output_target(&self) -> OutputTarget {
        let on_disk = self
            .get(KEY_BUILD_ON_DISK)
            .is_none_or(|v| !matches!(v.trim(), "false" | "0" | "no"));
        OutputTarget::from_on_disk(on_disk)
    }

    pub fn set_output_target(&self, target: OutputTarget) -> Result<()> {
        self.set(KEY_BUILD_ON_DISK, if target.is_disk() { "true" } else { "false" })
    }

    pub fn browser_geometry(&self) -> Option<String> {
        self.get(KEY_BROWSER_GEOMETRY)
    }
}

fn parse(content: &str) -> IndexMap<String, String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect()
}

fn render(entries: &IndexMap<String, String>) -> String {
    entries
        .iter()
        .map(|(k, v)| format!("{k}={v}\n"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_when_missing() {
        let temp = TempDir::new().unwrap();
        let store = Store::open(&temp.path().join(".wasmdev"));

        assert_eq!(store.wasm_mode(), WasmMode::Large);
        assert_eq!(store.output_target(), OutputTarget::Disk);
        assert!(store.browser_geometry().is_none());
    }

    #[test]
    fn test_persists_across_open() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".wasmdev");

        let store = Store::open(&path);
        store.set_wasm_mode(WasmMode::Small).unwrap();
        store.set_output_target(OutputTarget::Memory).unwrap();

        let reopened = Store::open(&path);
        assert_eq!(reopened.wasm_mode(), WasmMode::Small);
        assert_eq!(reopened.output_target(), OutputTarget::Memory);
    }

    #[test]
    fn test_parse_ignores_comments_and_keeps_unknown_keys() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".wasmdev");
        std::fs::write(
            &path,
            "# state\n\nbrowser_geometry = 800x600\nwasm_mode=M\nnot a pair\n",
        )
        .unwrap();

        let store = Store::open(&path);
        assert_eq!(store.wasm_mode(), WasmMode::Medium);
        assert_eq!(store.browser_geometry().as_deref(), Some("800x600"));

        store.set_wasm_mode(WasmMode::Large).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "browser_geometry=800x600\nwasm_mode=L\n");
    }

    #[test]
    fn test_invalid_mode_falls_back() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".wasmdev");
        std::fs::write(&path, "wasm_mode=XL\n").unwrap();

        assert_eq!(Store::open(&path).wasm_mode(), WasmMode::Large);
    }
}
