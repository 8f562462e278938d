//! `wasmdev build`: every artifact once, then exit.

use std::time::Instant;

use anyhow::Result;

use crate::actor::{Pipeline, PipelineMode};
use crate::browser::Headless;
use crate::config::DevConfig;
use crate::core::Shutdown;

use super::{RUNTIME_SHUTDOWN, runtime};

/// Build the server binary, client.wasm and both bundles.
///
/// Fails if any of them fails; the others are still built.
pub fn build(config: &DevConfig, shutdown: Shutdown) -> Result<()> {
    let started = Instant::now();
    let runtime = runtime()?;
    let result = runtime.block_on(async {
        let pipeline = Pipeline::start(
            config,
            PipelineMode::Once,
            Headless,
            config.serve.livereload_port,
            shutdown,
        )?;
        pipeline.join().await
    });
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN);

    result?;
    crate::ok!("build"; "done in {:.2?}", started.elapsed());
    Ok(())
}
