//! Server Builder
//!
//! Owns whatever answers on the app port.
//!
//! - **External** (`web/server.go` exists): compile with `go build`, run the
//!   binary with `PORT` set and report ready once the port accepts a dial.
//! - **Internal**: serve `web/public` with the built-in static server.
//!
//! A failed build never touches the running child; the previous binary keeps
//! serving until a build succeeds.

mod probe;
mod supervisor;

#[cfg(all(test, unix))]
mod tests;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::sync::mpsc;

use self::probe::{PROBE_DEADLINE, Probe, wait_ready};
use self::supervisor::{Launch, Supervised};
use super::{Inbox, Reporter, output_tail};
use crate::actor::messages::{Builder, CoordinatorMsg, ServerMsg};
use crate::config::{Layout, ServeConfig, ToolchainConfig};
use crate::core::{BuildRoot, MemoryArtifact, OpCounter, OpId, ServerMode, Shutdown};
use crate::serve::StaticServer;
use crate::utils::exec::{Cmd, GO_FILTER, find_program};
use crate::utils::fs::{promote, remove_if_exists};

/// What currently holds the app port.
enum Running {
    Nothing,
    Static(StaticServer),
    Child(Supervised),
}

pub struct ServerBuilder {
    root: BuildRoot,
    project_root: PathBuf,
    public_dir: PathBuf,
    serve: ServeConfig,
    toolchain: ToolchainConfig,
    memory: MemoryArtifact,
    mode: ServerMode,
    /// Start what was built. Off for one-shot builds.
    supervise: bool,
    running: Running,
    ops: OpCounter,
    inbox: Inbox<ServerMsg>,
    /// Own inbox, handed to children for exit reports.
    exits: mpsc::Sender<ServerMsg>,
    report: Reporter,
    shutdown: Shutdown,
}

impl ServerBuilder {
    /// Mode follows the layout: external iff `web/server.go` exists.
    ///
    /// In internal mode the static server is bound here, so a taken port is
    /// a startup error.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        layout: &Layout,
        serve: &ServeConfig,
        toolchain: &ToolchainConfig,
        memory: MemoryArtifact,
        supervise: bool,
        rx: mpsc::Receiver<ServerMsg>,
        exits: mpsc::Sender<ServerMsg>,
        coord: mpsc::Sender<CoordinatorMsg>,
        shutdown: Shutdown,
    ) -> Result<Self> {
        let root = layout.server_root();
        let mode = if root.has_main() {
            ServerMode::External
        } else {
            ServerMode::Internal
        };

        let mut builder = Self {
            root,
            project_root: layout.root.clone(),
            public_dir: layout.public_dir.clone(),
            serve: serve.clone(),
            toolchain: toolchain.clone(),
            memory,
            mode,
            supervise,
            running: Running::Nothing,
            ops: OpCounter::new(),
            inbox: Inbox::new(rx),
            exits,
            report: Reporter::new(Builder::Server, coord),
            shutdown,
        };
        if mode == ServerMode::Internal && supervise {
            builder.running = Running::Static(builder.start_static()?);
        }
        Ok(builder)
    }

    pub fn mode(&self) -> ServerMode {
        self.mode
    }

    pub async fn run(mut self) {
        if let Running::Static(server) = &self.running {
            crate::ok!("server"; "serving {} on http://{}", self.public_dir.display(), server.addr());
            let op = self.ops.next();
            self.report
                .send(CoordinatorMsg::ServerReady {
                    op,
                    mode: ServerMode::Internal,
                    rebuilt: true,
                })
                .await;
        }

        let shutdown = self.shutdown.clone();
        while let Some(msg) = self.inbox.recv(&shutdown).await {
            match msg {
                ServerMsg::Build { trigger } => self.build(trigger).await,
                ServerMsg::Restart => self.restart().await,
                ServerMsg::SetMode(mode) => self.set_mode(mode).await,
                ServerMsg::ChildExited { op, status } => self.child_exited(op, status).await,
            }
        }

        self.stop().await;
        crate::debug!("server"; "stopped");
    }

    // =========================================================================
    // Build
    // =========================================================================

    async fn build(&mut self, trigger: Option<PathBuf>) {
        if self.mode == ServerMode::Internal {
            crate::log!("server"; "internal mode, ignoring build request");
            return;
        }

        let op = self.ops.next();
        if let Some(path) = &trigger {
            crate::debug!("server"; "{} build for {}", op, path.display());
        }
        if !self.compile_reported(op).await {
            // The running child keeps serving the previous binary.
            return;
        }
        if self.supervise {
            self.stop().await;
            self.start(op, true).await;
        }
    }

    /// Compile and report the result. Returns success.
    async fn compile_reported(&mut self, op: OpId) -> bool {
        self.report.started(op).await;
        let started = Instant::now();
        let success = match self.compile(op).await {
            Ok(()) => {
                crate::ok!("server"; "{} {} built ({:.1?})", op, self.root.output_file, started.elapsed());
                true
            }
            Err(e) => {
                let _ = remove_if_exists(&self.root.temp_path());
                crate::err!("server"; "{} build failed\n{}", op, output_tail(&e));
                false
            }
        };
        self.report.finished(op, success).await;
        success
    }

    async fn compile(&self, op: OpId) -> Result<()> {
        let program = find_program(&self.toolchain.go)?;
        let temp = self.root.temp_path();
        let cmd = Cmd::new(&program)
            .arg("build")
            .args(&self.toolchain.build_flags)
            .arg("-o")
            .arg(&temp)
            .arg(self.root.main_path())
            .cwd(&self.project_root)
            .filter(&GO_FILTER);
        crate::debug!("server"; "{} {}", op, cmd.display());
        cmd.run(&self.shutdown).await?;

        if !temp.is_file() {
            anyhow::bail!("compiler produced no {}", temp.display());
        }
        promote(&temp, &self.root.output_path())
    }

    // =========================================================================
    // Process lifecycle
    // =========================================================================

    /// Launch the built binary and wait until it answers.
    ///
    /// `rebuilt` is false when `op`'s compile failed and the previous binary
    /// is started instead.
    async fn start(&mut self, op: OpId, rebuilt: bool) {
        let program = self.root.output_path();
        let launch = Launch {
            program: &program,
            args: &self.toolchain.server_args,
            cwd: &self.project_root,
            port: self.serve.port,
        };
        let child = match Supervised::spawn(&launch, op, self.exits.clone()) {
            Ok(child) => child,
            Err(e) => {
                crate::err!("server"; "{} {:#}", op, e);
                self.down(op, format!("{e:#}")).await;
                return;
            }
        };
        let exited = child.exited();
        self.running = Running::Child(child);
        crate::log!("server"; "{} started, waiting for port {}", op, self.serve.port);

        match wait_ready(self.serve.port, exited, &self.shutdown, PROBE_DEADLINE).await {
            Probe::Ready => {
                crate::ok!("server"; "{} ready on {}", op, self.url());
                self.report
                    .send(CoordinatorMsg::ServerReady {
                        op,
                        mode: ServerMode::External,
                        rebuilt,
                    })
                    .await;
            }
            Probe::Exited => {
                crate::err!("server"; "{} exited before listening on port {}", op, self.serve.port);
                self.running = Running::Nothing;
                self.down(op, "exited before ready".into()).await;
            }
            Probe::TimedOut => {
                crate::err!("server"; "{} not listening on port {} after {:?}", op, self.serve.port, PROBE_DEADLINE);
                self.down(op, "readiness probe timed out".into()).await;
            }
            Probe::Cancelled => {}
        }
    }

    async fn stop(&mut self) {
        match std::mem::replace(&mut self.running, Running::Nothing) {
            Running::Nothing => {}
            Running::Static(server) => server.stop(),
            Running::Child(child) => {
                crate::debug!("server"; "stopping {}", child.op);
                child.stop().await;
            }
        }
    }

    async fn restart(&mut self) {
        if !self.supervise {
            return;
        }
        let op = self.ops.next();
        crate::log!("server"; "{} restarting", op);
        self.stop().await;

        match self.mode {
            ServerMode::Internal => self.serve_static(op).await,
            ServerMode::External => {
                let built = self.compile_reported(op).await;
                if built || self.root.output_path().is_file() {
                    self.start(op, built).await;
                } else {
                    self.down(op, "no server binary".into()).await;
                }
            }
        }
    }

    async fn set_mode(&mut self, mode: ServerMode) {
        if mode == self.mode {
            crate::log!("server"; "already in {} mode", mode);
            return;
        }
        if mode == ServerMode::External && !self.root.has_main() {
            crate::warn!("server"; "no {}, staying in internal mode", self.root.main_path().display());
            return;
        }

        let op = self.ops.next();
        self.stop().await;

        if mode == ServerMode::External && !self.compile_reported(op).await {
            crate::warn!("server"; "{} back to internal mode", op);
            if self.supervise {
                self.serve_static(op).await;
            }
            return;
        }

        self.mode = mode;
        crate::log!("server"; "{} {} mode", op, mode);
        self.report.send(CoordinatorMsg::ServerModeChanged(mode)).await;
        if !self.supervise {
            return;
        }
        match mode {
            ServerMode::Internal => self.serve_static(op).await,
            ServerMode::External => self.start(op, true).await,
        }
    }

    async fn child_exited(&mut self, op: OpId, status: String) {
        let current = matches!(&self.running, Running::Child(child) if child.op == op);
        if !current {
            crate::debug!("server"; "ignoring exit of stale {} ({})", op, status);
            return;
        }
        self.running = Running::Nothing;
        crate::err!("server"; "{} exited: {}", op, status);
        self.down(op, status).await;
    }

    fn start_static(&self) -> Result<StaticServer> {
        StaticServer::start(
            self.serve.interface,
            self.serve.port,
            &self.public_dir,
            self.memory.clone(),
        )
        .context("internal server")
    }

    async fn serve_static(&mut self, op: OpId) {
        match self.start_static() {
            Ok(server) => {
                crate::ok!("server"; "{} serving {} on http://{}", op, self.public_dir.display(), server.addr());
                self.running = Running::Static(server);
                self.report
                    .send(CoordinatorMsg::ServerReady {
                        op,
                        mode: ServerMode::Internal,
                        rebuilt: true,
                    })
                    .await;
            }
            Err(e) => {
                crate::err!("server"; "{} {:#}", op, e);
                self.down(op, format!("{e:#}")).await;
            }
        }
    }

    async fn down(&self, op: OpId, reason: String) {
        self.report
            .send(CoordinatorMsg::ServerDown { op, reason })
            .await;
    }

    fn url(&self) -> String {
        let scheme = if self.serve.https { "https" } else { "http" };
        format!("{scheme}://localhost:{}", self.serve.port)
    }
}
