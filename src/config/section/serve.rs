//! `[serve]` section configuration.
//!
//! Contains development server settings.
//!
//! # Example
//!
//! ```toml
//! [serve]
//! interface = "127.0.0.1"     # Network interface (127.0.0.1 = localhost only)
//! port = 6060                 # App port (internal server or PORT for the user server)
//! livereload_port = 35729     # WebSocket port the page connects to for reloads
//! https = false               # Open the browser on https://
//! ```
//!
//! Use `interface = "0.0.0.0"` to make the internal server accessible from LAN.

use std::net::{IpAddr, Ipv4Addr};

use serde::{Deserialize, Serialize};

/// Development server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServeConfig {
    /// Network interface to bind.
    /// - `127.0.0.1` (default): localhost only
    /// - `0.0.0.0`: all interfaces (LAN accessible)
    pub interface: IpAddr,

    /// HTTP port number.
    pub port: u16,

    /// Live reload WebSocket port (next free port is used on conflict).
    pub livereload_port: u16,

    /// The user server terminates TLS itself.
    pub https: bool,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            interface: IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)),
            port: 6060,
            livereload_port: 35729,
            https: false,
        }
    }
}
