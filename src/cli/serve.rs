//! `wasmdev serve`: the reactive dev loop.

use anyhow::Result;

use crate::actor::{Pipeline, PipelineMode};
use crate::browser::LiveReload;
use crate::config::DevConfig;
use crate::core::Shutdown;

use super::{RUNTIME_SHUTDOWN, console, runtime};

/// Run until Ctrl+C or `quit`. Fatal startup errors return `Err`.
pub fn serve(config: &DevConfig, shutdown: Shutdown) -> Result<()> {
    let runtime = runtime()?;
    let result = runtime.block_on(async {
        let browser = LiveReload::start(config.serve.livereload_port)?;
        let livereload_port = browser.port();
        crate::log!("serve"; "watching {}", config.root.display());

        let pipeline = Pipeline::start(
            config,
            PipelineMode::Serve,
            browser,
            livereload_port,
            shutdown.clone(),
        )?;
        let console = tokio::spawn(console::run(pipeline.handle(), shutdown.clone()));

        let result = pipeline.join().await;
        console.abort();
        result
    });
    // The stdin reader sits in a blocking read that only a newline ends.
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN);
    result
}
