//! Configuration utility functions.

use std::path::{Path, PathBuf};

use super::ConfigError;

/// Find the project root by searching upward from the current directory
///
/// The root is the first directory holding a `go.mod`.
///
/// # Example
/// ```text
/// /home/user/app/web/public/  ← cwd
/// /home/user/app/go.mod       ← found, root = /home/user/app
/// ```
pub fn find_project_root() -> Result<PathBuf, ConfigError> {
    let cwd = std::env::current_dir().map_err(|e| ConfigError::Io(PathBuf::from("."), e))?;
    find_module_root(&cwd).ok_or(ConfigError::NoProject(cwd))
}

pub fn find_module_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join("go.mod").is_file())
        .map(Path::to_path_buf)
}
