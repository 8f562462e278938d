//! Command-line interface definitions.

use clap::{ColorChoice, Parser, Subcommand};
use std::net::IpAddr;
use std::path::PathBuf;

/// Reactive dev loop for Go + WebAssembly web projects
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Control colored output (auto, always, never)
    #[arg(long, global = true, default_value = "auto")]
    pub color: ColorChoice,

    /// Project root (default: nearest ancestor holding go.mod)
    #[arg(short = 'C', long = "root", global = true, value_hint = clap::ValueHint::DirPath)]
    pub root: Option<PathBuf>,

    /// Show debug output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// subcommands (default: serve)
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Watch, rebuild, restart and reload on save
    #[command(visible_alias = "s")]
    Serve {
        /// Port number of the app (overrides PORT and wasmdev.toml)
        #[arg(short, long)]
        port: Option<u16>,

        /// Network interface for the internal server (e.g., 127.0.0.1, 0.0.0.0)
        #[arg(short, long)]
        interface: Option<IpAddr>,
    },

    /// Build server, client.wasm and both bundles once, then exit
    #[command(visible_alias = "b")]
    Build,
}

impl Cli {
    /// Parse arguments; a bare `wasmdev` means `wasmdev serve`.
    pub fn parse_or_serve() -> Self {
        let mut args: Vec<std::ffi::OsString> = std::env::args_os().collect();
        if !has_subcommand(&args) {
            args.push("serve".into());
        }
        Self::parse_from(args)
    }

    pub const fn is_serve(&self) -> bool {
        matches!(self.command, Commands::Serve { .. })
    }
}

/// Whether any non-flag word (other than a flag's value) follows argv[0].
fn has_subcommand(args: &[std::ffi::OsString]) -> bool {
    let mut skip_value = false;
    for arg in args.iter().skip(1) {
        let arg = arg.to_string_lossy();
        if skip_value {
            skip_value = false;
            continue;
        }
        match arg.as_ref() {
            "-C" | "--root" | "--color" => skip_value = true,
            "-h" | "--help" | "-V" | "--version" => return true,
            a if a.starts_with('-') => {}
            _ => return true,
        }
    }
    false
}
