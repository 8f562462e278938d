//! `[toolchain]` section configuration.
//!
//! # Example
//!
//! ```toml
//! [toolchain]
//! go = "go"                       # binary for server builds and Large WASM
//! tinygo = "tinygo"               # binary for Medium / Small WASM
//! build_flags = ["-trimpath"]     # extra flags for every `go build`
//! server_args = ["-dev"]          # arguments for the running server
//! ```

use serde::{Deserialize, Serialize};

/// Toolchain binaries and extra arguments.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolchainConfig {
    pub go: String,
    pub tinygo: String,
    pub build_flags: Vec<String>,
    pub server_args: Vec<String>,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            go: "go".into(),
            tinygo: "tinygo".into(),
            build_flags: Vec::new(),
            server_args: Vec::new(),
        }
    }
}
