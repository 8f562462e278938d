//! Project configuration for `wasmdev.toml`.
//!
//! # Module Structure
//!
//! ```text
//! config/
//! ├── section/       # [serve], [toolchain]
//! ├── error          # ConfigError
//! ├── layout         # web/ directory convention -> BuildRoots
//! ├── util           # project root discovery
//! └── mod.rs         # DevConfig (this file)
//! ```
//!
//! The config file is optional: a bare Go module with a `web/` directory runs
//! with defaults. `PORT` in the environment overrides `serve.port`.

mod error;
pub mod layout;
pub mod section;
mod util;

pub use error::ConfigError;
pub use layout::Layout;
pub use section::{ServeConfig, ToolchainConfig};

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::cli::{Cli, Commands};

/// Config file name, looked up in the project root.
pub const CONFIG_FILE: &str = "wasmdev.toml";

/// Root configuration structure representing wasmdev.toml
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct DevConfig {
    /// Project root directory, holding go.mod (internal use only)
    #[serde(skip)]
    pub root: PathBuf,

    /// Development server settings
    #[serde(default)]
    pub serve: ServeConfig,

    /// Go / TinyGo binaries and extra arguments
    #[serde(default)]
    pub toolchain: ToolchainConfig,
}

impl DevConfig {
    /// Load configuration for the CLI invocation.
    ///
    /// The project root is `-C <dir>` when given, otherwise the nearest
    /// ancestor of the cwd holding a `go.mod`.
    pub fn load(cli: &Cli) -> Result<Self> {
        let root = match &cli.root {
            Some(dir) => fs::canonicalize(dir)
                .with_context(|| format!("project root `{}` not found", dir.display()))?,
            None => util::find_project_root()?,
        };

        let config_path = root.join(CONFIG_FILE);
        let mut config = if config_path.is_file() {
            Self::from_path(&config_path)?
        } else {
            Self::default()
        };

        config.root = root;
        config.apply_env();
        config.apply_command_options(cli);
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from TOML string
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    fn from_path(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;
        Self::from_str(&content).with_context(|| format!("in {}", path.display()))
    }

    fn apply_env(&mut self) {
        if let Ok(port) = std::env::var("PORT") {
            match port.trim().parse() {
                Ok(port) => self.serve.port = port,
                Err(_) => crate::warn!("config"; "ignoring invalid PORT `{}`", port),
            }
        }
    }

    /// CLI flags win over file and environment.
    fn apply_command_options(&mut self, cli: &Cli) {
        if let Commands::Serve { port, interface } = &cli.command {
            Self::update_option(&mut self.serve.port, port.as_ref());
            Self::update_option(&mut self.serve.interface, interface.as_ref());
        }
    }

    fn update_option<T: Clone>(target: &mut T, value: Option<&T>) {
        if let Some(v) = value {
            *target = v.clone();
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.serve.port == 0 {
            return Err(ConfigError::Validation("[serve] port must not be 0".into()));
        }
        if self.serve.port == self.serve.livereload_port {
            return Err(ConfigError::Validation(format!(
                "[serve] port and livereload_port are both {}",
                self.serve.port
            )));
        }
        if self.toolchain.go.trim().is_empty() || self.toolchain.tinygo.trim().is_empty() {
            return Err(ConfigError::Validation(
                "[toolchain] binary names must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Directory layout derived from the project root.
    pub fn layout(&self) -> Layout {
        Layout::new(&self.root)
    }

    /// Get path relative to the project root
    pub fn root_relative(&self, path: impl AsRef<Path>) -> PathBuf {
        path.as_ref()
            .strip_prefix(&self.root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| path.as_ref().to_path_buf())
    }

    /// Config rooted at `root` with defaults (tests, one-shot builds).
    pub fn for_root(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
pub(crate) fn test_parse_config(content: &str) -> DevConfig {
    DevConfig::from_str(content).unwrap()
}
