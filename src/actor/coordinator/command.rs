//! Control commands.
//!
//! The console, a UI or an MCP bridge all speak these words:
//!
//! ```text
//! rebuild-all
//! set-wasm-mode L|M|S
//! toggle-build-on-disk
//! restart-server
//! set-server-mode internal|external
//! reload
//! status
//! quit
//! ```

use std::fmt;
use std::str::FromStr;

use crate::core::{ServerMode, WasmMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    RebuildAll,
    SetWasmMode(WasmMode),
    ToggleBuildOnDisk,
    RestartServer,
    SetServerMode(ServerMode),
    Reload,
    Status,
    Quit,
    Help,
}

pub const USAGE: &str = "\
commands:
  rebuild-all                          rebuild server, wasm and bundles
  set-wasm-mode L|M|S                  switch the wasm toolchain
  toggle-build-on-disk                 serve client.wasm from disk or memory
  restart-server                       stop, rebuild and start the server
  set-server-mode internal|external    switch who serves the app port
  reload                               reload the browser
  status                               print pipeline status as JSON
  quit                                 stop wasmdev";

impl FromStr for Command {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let Some(name) = words.next() else {
            return Err("empty command".into());
        };
        let arg = words.next();
        if words.next().is_some() {
            return Err(format!("too many arguments for `{name}`"));
        }

        let lower = name.to_ascii_lowercase();
        let command = match (lower.as_str(), arg) {
            ("rebuild-all" | "rebuild", None) => Self::RebuildAll,
            ("set-wasm-mode" | "mode", Some(mode)) => Self::SetWasmMode(mode.parse()?),
            ("toggle-build-on-disk" | "disk", None) => Self::ToggleBuildOnDisk,
            ("restart-server" | "restart", None) => Self::RestartServer,
            ("set-server-mode" | "server", Some(mode)) => Self::SetServerMode(mode.parse()?),
            ("reload" | "r", None) => Self::Reload,
            ("status" | "s", None) => Self::Status,
            ("quit" | "exit" | "q", None) => Self::Quit,
            ("help" | "h" | "?", None) => Self::Help,
            ("set-wasm-mode" | "mode" | "set-server-mode" | "server", None) => {
                return Err(format!("`{name}` needs an argument"));
            }
            (_, Some(_)) if is_known(&lower) => {
                return Err(format!("`{name}` takes no argument"));
            }
            _ => return Err(format!("unknown command `{name}` (try `help`)")),
        };
        Ok(command)
    }
}

fn is_known(name: &str) -> bool {
    matches!(
        name,
        "rebuild-all"
            | "rebuild"
            | "toggle-build-on-disk"
            | "disk"
            | "restart-server"
            | "restart"
            | "reload"
            | "r"
            | "status"
            | "s"
            | "quit"
            | "exit"
            | "q"
            | "help"
            | "h"
            | "?"
    )
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RebuildAll => f.write_str("rebuild-all"),
            Self::SetWasmMode(mode) => write!(f, "set-wasm-mode {mode}"),
            Self::ToggleBuildOnDisk => f.write_str("toggle-build-on-disk"),
            Self::RestartServer => f.write_str("restart-server"),
            Self::SetServerMode(mode) => write!(f, "set-server-mode {mode}"),
            Self::Reload => f.write_str("reload"),
            Self::Status => f.write_str("status"),
            Self::Quit => f.write_str("quit"),
            Self::Help => f.write_str("help"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!("rebuild-all".parse(), Ok(Command::RebuildAll));
        assert_eq!(
            "set-wasm-mode S".parse(),
            Ok(Command::SetWasmMode(WasmMode::Small))
        );
        assert_eq!(
            "  set-server-mode   external ".parse(),
            Ok(Command::SetServerMode(ServerMode::External))
        );
        assert_eq!("Toggle-Build-On-Disk".parse(), Ok(Command::ToggleBuildOnDisk));
        assert_eq!("q".parse(), Ok(Command::Quit));
    }

    #[test]
    fn test_parse_errors() {
        assert!("".parse::<Command>().unwrap_err().contains("empty"));
        assert!("set-wasm-mode".parse::<Command>().unwrap_err().contains("needs"));
        assert!("set-wasm-mode XL".parse::<Command>().unwrap_err().contains("unknown wasm mode"));
        assert!("reload now".parse::<Command>().unwrap_err().contains("no argument"));
        assert!("deploy".parse::<Command>().unwrap_err().contains("unknown command"));
        assert!("set-wasm-mode S M".parse::<Command>().unwrap_err().contains("too many"));
    }

    #[test]
    fn test_display_parses_back() {
        for command in [
            Command::SetWasmMode(WasmMode::Medium),
            Command::SetServerMode(ServerMode::Internal),
            Command::RestartServer,
        ] {
            assert_eq!(command.to_string().parse(), Ok(command));
        }
    }
}
