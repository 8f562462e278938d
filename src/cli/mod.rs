//! Command-line interface module.

mod args;
pub mod build;
pub mod console;
pub mod serve;

pub use args::{Cli, Commands};

use std::time::Duration;

use anyhow::{Context, Result};
use tokio::runtime::Runtime;

/// Time blocking tasks (the stdin reader) get once a command finishes.
const RUNTIME_SHUTDOWN: Duration = Duration::from_millis(200);

fn runtime() -> Result<Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("wasmdev")
        .build()
        .context("failed to start async runtime")
}
