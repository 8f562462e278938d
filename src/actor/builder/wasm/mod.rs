//! WASM Builder
//!
//! Compiles `web/client.go` to `client.wasm` with the toolchain of the
//! current `WasmMode`, and owns the disk/memory output target.
//!
//! A mode switch is staged: the new binary is built next to the live one,
//! the coordinator re-emits the JS bundle with the matching loader, and only
//! then is the binary committed. Either both change or neither does.
//!
//! ```text
//! SetMode(S) ─> build .client.wasm.staged ─> LoaderStaged ─┬─ commit ─> rename, persist, ModeSettled(true)
//!                     │                                    └─ abort ──> delete,          ModeSettled(false)
//!                     └─ failure ─> BuildResult(false)
//! ```

mod loader;


pub use loader::LoaderCache;

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::sync::{mpsc, oneshot};

use super::{Inbox, Reporter, output_tail};
use crate::actor::messages::{Builder, CoordinatorMsg, WasmMsg};
use crate::config::{Layout, ToolchainConfig};
use crate::core::{
    BuildRoot, MemoryArtifact, OpCounter, OpId, OutputTarget, ServerMode, Shutdown, WasmMode,
};
use crate::store::Store;
use crate::utils::exec::{Cmd, GO_FILTER, find_program};
use crate::utils::fs::{promote, remove_if_exists};

pub struct WasmBuilder {
    root: BuildRoot,
    project_root: PathBuf,
    toolchain: ToolchainConfig,
    store: Store,
    memory: MemoryArtifact,
    mode: WasmMode,
    output: OutputTarget,
    server_mode: ServerMode,
    loaders: LoaderCache,
    ops: OpCounter,
    inbox: Inbox<WasmMsg>,
    report: Reporter,
    shutdown: Shutdown,
}

impl WasmBuilder {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        layout: &Layout,
        toolchain: &ToolchainConfig,
        store: Store,
        memory: MemoryArtifact,
        server_mode: ServerMode,
        rx: mpsc::Receiver<WasmMsg>,
        coord: mpsc::Sender<CoordinatorMsg>,
        shutdown: Shutdown,
    ) -> Self {
        let mode = store.wasm_mode();
        let output = store.output_target();
        Self {
            root: layout.wasm_root(),
            project_root: layout.root.clone(),
            toolchain: toolchain.clone(),
            loaders: LoaderCache::new(toolchain),
            store,
            memory,
            mode,
            output,
            server_mode,
            ops: OpCounter::new(),
            inbox: Inbox::new(rx),
            report: Reporter::new(Builder::Wasm, coord),
            shutdown,
        }
    }

    pub async fn run(mut self) {
        self.announce_loader().await;
        if self.server_mode == ServerMode::External && !self.output.is_disk() {
            crate::warn!("wasm"; "external server reads client.wasm from disk, building on disk");
        }

        let shutdown = self.shutdown.clone();
        while let Some(msg) = self.inbox.recv(&shutdown).await {
            match msg {
                WasmMsg::Build { trigger } => self.build(trigger.as_deref()).await,
                WasmMsg::SetMode(mode) => self.set_mode(mode).await,
                WasmMsg::SetOutput(target) => self.set_output(target).await,
                WasmMsg::ServerMode(mode) => self.set_server_mode(mode).await,
            }
        }
        crate::debug!("wasm"; "stopped");
    }

    /// Loader of the persisted mode, so the first bundle already carries it.
    async fn announce_loader(&mut self) {
        let loader = match self.loaders.get(self.mode, &self.shutdown).await {
            Ok(loader) => loader,
            Err(e) => {
                crate::warn!("wasm"; "{:#}; script.js will not load client.wasm", e);
                "".into()
            }
        };
        self.report
            .send(CoordinatorMsg::LoaderReady {
                mode: self.mode,
                loader,
            })
            .await;
    }

    /// Where a finished binary goes; external servers only see the disk.
    fn effective_output(&self) -> OutputTarget {
        match self.server_mode {
            ServerMode::External => OutputTarget::Disk,
            ServerMode::Internal => self.output,
        }
    }

    async fn build(&mut self, trigger: Option<&Path>) {
        if !self.root.has_main() {
            crate::debug!("wasm"; "no {}, skipping build", self.root.main_file);
            return;
        }

        let op = self.ops.next();
        self.report.started(op).await;
        if let Some(path) = trigger {
            crate::debug!("wasm"; "{} build for {}", op, path.display());
        }

        let started = Instant::now();
        let temp = self.root.temp_path();
        let result = match self.compile(self.mode, &temp, op).await {
            Ok(()) => self.publish(&temp),
            Err(e) => Err(e),
        };

        let success = match result {
            Ok(size) => {
                crate::ok!("wasm"; "{} {} ({}, {:.1?}, mode {})",
                    op, self.root.output_file, format_size(size), started.elapsed(), self.mode);
                true
            }
            Err(e) => {
                let _ = remove_if_exists(&temp);
                crate::err!("wasm"; "{} build failed\n{}", op, output_tail(&e));
                false
            }
        };
        self.report.finished(op, success).await;
    }

    async fn compile(&self, mode: WasmMode, out: &Path, op: OpId) -> Result<()> {
        let program = if mode.uses_tinygo() {
            &self.toolchain.tinygo
        } else {
            &self.toolchain.go
        };
        let program = find_program(program)?;

        let cmd = Cmd::new(&program)
            .arg("build")
            .arg("-o")
            .arg(out)
            .cwd(&self.project_root)
            .filter(&GO_FILTER);
        let cmd = match mode {
            WasmMode::Large => cmd
                .envs([("GOOS", "js"), ("GOARCH", "wasm")])
                .args(&self.toolchain.build_flags),
            WasmMode::Medium => cmd.args(["-target", "wasm", "-opt=1"]),
            WasmMode::Small => cmd.args(["-target", "wasm", "-no-debug", "-opt=z", "-panic=trap"]),
        };
        crate::debug!("wasm"; "{} {}", op, cmd.display());

        cmd.arg(self.root.main_path()).run(&self.shutdown).await?;
        Ok(())
    }

    /// Move a finished binary to its target. Returns its size.
    fn publish(&self, built: &Path) -> Result<u64> {
        match self.effective_output() {
            OutputTarget::Disk => {
                let size = std::fs::metadata(built)
                    .with_context(|| format!("compiler produced no {}", built.display()))?
                    .len();
                promote(built, &self.root.output_path())?;
                self.memory.clear();
                Ok(size)
            }
            OutputTarget::Memory => {
                let bytes = std::fs::read(built)
                    .with_context(|| format!("compiler produced no {}", built.display()))?;
                let size = bytes.len() as u64;
                self.memory.store(bytes);
                remove_if_exists(built)?;
                Ok(size)
            }
        }
    }

    async fn set_mode(&mut self, mode: WasmMode) {
        if mode == self.mode {
            crate::log!("wasm"; "already in mode {}", mode);
            return;
        }
        if !self.root.has_main() {
            crate::warn!("wasm"; "no {}, mode stays {}", self.root.main_file, self.mode);
            return;
        }

        let op = self.ops.next();
        self.report.started(op).await;
        crate::log!("wasm"; "{} switching mode {} -> {}", op, self.mode, mode);

        let staged = self.root.staged_path();
        let prepared = match self.compile(mode, &staged, op).await {
            Ok(()) => self.loaders.get(mode, &self.shutdown).await,
            Err(e) => Err(e),
        };
        let loader = match prepared {
            Ok(loader) => loader,
            Err(e) => {
                let _ = remove_if_exists(&staged);
                crate::err!("wasm"; "{} mode {} failed, staying in {}\n{}", op, mode, self.mode, output_tail(&e));
                self.report.finished(op, false).await;
                return;
            }
        };

        let (commit_tx, commit_rx) = oneshot::channel();
        self.report
            .send(CoordinatorMsg::LoaderStaged {
                mode,
                loader,
                commit: commit_tx,
            })
            .await;

        let commit = tokio::select! {
            decision = commit_rx => decision.unwrap_or(false),
            _ = self.shutdown.wait() => false,
        };

        let committed = commit && self.commit_mode(mode, &staged, op);
        if !committed {
            let _ = remove_if_exists(&staged);
            crate::warn!("wasm"; "{} mode change to {} rolled back", op, mode);
        }
        self.report
            .send(CoordinatorMsg::ModeSettled { mode, committed })
            .await;
    }

    fn commit_mode(&mut self, mode: WasmMode, staged: &Path, op: OpId) -> bool {
        match self.publish(staged) {
            Ok(size) => {
                self.mode = mode;
                if let Err(e) = self.store.set_wasm_mode(mode) {
                    crate::warn!("wasm"; "mode {} active but not persisted: {:#}", mode, e);
                }
                crate::ok!("wasm"; "{} mode {} ({})", op, mode, format_size(size));
                true
            }
            Err(e) => {
                crate::err!("wasm"; "{} cannot commit mode {}: {:#}", op, mode, e);
                false
            }
        }
    }

    async fn set_output(&mut self, target: OutputTarget) {
        if let Err(e) = self.store.set_output_target(target) {
            crate::warn!("wasm"; "build_on_disk not persisted: {:#}", e);
        }
        self.output = target;
        crate::log!("wasm"; "output: {}", if target.is_disk() { "disk" } else { "memory" });
        self.report.send(CoordinatorMsg::OutputChanged(target)).await;
        if target == OutputTarget::Memory && self.server_mode == ServerMode::External {
            crate::warn!("wasm"; "external server reads client.wasm from disk, building on disk");
        }
        self.build(None).await;
    }

    async fn set_server_mode(&mut self, mode: ServerMode) {
        let before = self.effective_output();
        self.server_mode = mode;
        if self.effective_output() != before {
            // The new server looks elsewhere for the binary.
            self.build(None).await;
        }
    }
}

fn format_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    let b = bytes as f64;
    if b >= KB * KB {
        format!("{:.1} MB", b / (KB * KB))
    } else if b >= KB {
        format!("{:.1} KB", b / KB)
    } else {
        format!("{bytes} B")
    }
}
