//! wasmdev - reactive dev loop for Go + WebAssembly web projects.

mod actor;
mod asset;
mod browser;
mod cli;
mod config;
mod core;
mod deps;
mod embed;
mod logger;
mod serve;
mod store;
mod utils;

use anyhow::Result;
use clap::ColorChoice;
use cli::{Cli, Commands};
use config::DevConfig;
use core::Shutdown;

fn main() -> Result<()> {
    let cli = Cli::parse_or_serve();

    // Set global color override based on CLI option
    match cli.color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto => {} // owo-colors auto-detects TTY
    }
    logger::set_verbose(cli.verbose);

    // Setup global Ctrl+C handler (before any blocking operations)
    let shutdown = Shutdown::new();
    core::setup_shutdown_handler(shutdown.clone())?;

    let config = DevConfig::load(&cli)?;

    match &cli.command {
        Commands::Serve { .. } => cli::serve::serve(&config, shutdown),
        Commands::Build => cli::build::build(&config, shutdown),
    }
}
