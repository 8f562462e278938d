//! Atomic file replacement.
//!
//! Readers of a builder output (the browser, the internal server) must see
//! either the old file or the new one, never a partial write. Content goes to
//! a temp file in the destination directory and is renamed into place.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};

/// Write `content` to `target` atomically.
///
/// The temp file is dot-prefixed, so the watcher never reports it.
pub fn write_atomic(target: &Path, content: &[u8]) -> Result<()> {
    let dir = target
        .parent()
        .with_context(|| format!("`{}` has no parent directory", target.display()))?;
    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".wasmdev-")
        .tempfile_in(dir)
        .with_context(|| format!("failed to create temp file in `{}`", dir.display()))?;
    tmp.write_all(content)?;
    tmp.as_file().flush()?;
    tmp.persist(target)
        .with_context(|| format!("failed to replace `{}`", target.display()))?;
    Ok(())
}

/// Move a finished artifact into place (same filesystem).
pub fn promote(from: &Path, to: &Path) -> Result<()> {
    std::fs::rename(from, to)
        .with_context(|| format!("failed to move `{}` to `{}`", from.display(), to.display()))
}

/// Remove a file, treating "already gone" as success.
pub fn remove_if_exists(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}
