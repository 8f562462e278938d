//! Coordinator
//!
//! Collects builder results and decides when the browser may reload. The
//! central rule: the page is only reloaded once the artifacts it loads belong
//! together.
//!
//! ```text
//! BuildStarted ──> hold reloads while building
//! BuildResult  ──> wasm ok: request reload | server ok (external): await ready
//! ServerReady  ──> first: Browser::open | later: request reload
//! LoaderStaged ──> txn: Refresh(js, loader) ─> AssetsEmitted ─> commit / abort
//! ModeSettled  ──> committed: request reload | emitted but aborted: restore loader
//! ```
//!
//! Reload requests coalesce in `ReloadGate`; a due reload waits until no
//! builder is building, no server awaits ready and no mode change is open.

mod command;
mod reload;
mod status;


pub use command::{Command, USAGE};
pub use status::{BuilderStatus, Status};

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use rustc_hash::FxHashSet;
use tokio::sync::{mpsc, oneshot, watch};

use self::reload::ReloadGate;
use super::builder::BuilderState;
use super::messages::{
    AssetMsg, Builder, CoordinatorMsg, EmitCause, RouterMsg, ServerMsg, TxnId, WasmMsg,
};
use crate::browser::{Browser, app_url};
use crate::core::{MediaType, OpId, OutputTarget, ServerMode, Shutdown, WasmMode};

/// Upper bound on one loop sleep when no reload is pending.
const IDLE_WAKE: Duration = Duration::from_secs(3600);

/// Senders to the actors the coordinator drives.
#[derive(Clone)]
pub struct CoordinatorOutputs {
    pub router: mpsc::Sender<RouterMsg>,
    pub server: mpsc::Sender<ServerMsg>,
    pub wasm: mpsc::Sender<WasmMsg>,
    pub assets: mpsc::Sender<AssetMsg>,
}

/// Startup facts the coordinator cannot learn from messages.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub app_port: u16,
    pub https: bool,
    pub livereload_port: u16,
    pub server_mode: ServerMode,
    pub wasm_mode: WasmMode,
    pub output: OutputTarget,
    /// One-shot build: stop once every expected artifact has been built.
    pub oneshot: Option<Expect>,
}

/// Artifacts a one-shot build waits for (bundles are always expected).
#[derive(Debug, Clone, Copy)]
pub struct Expect {
    pub server: bool,
    pub wasm: bool,
}

/// Cheap handle for command sources and status readers.
#[derive(Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::Sender<CoordinatorMsg>,
    status: watch::Receiver<Status>,
}

impl CoordinatorHandle {
    /// Run a command; the reply is human-readable text.
    pub async fn command(&self, command: Command) -> String {
        let (reply, rx) = oneshot::channel();
        if self
            .tx
            .send(CoordinatorMsg::Command { command, reply })
            .await
            .is_err()
        {
            return "pipeline stopped".into();
        }
        rx.await.unwrap_or_else(|_| "pipeline stopped".into())
    }

    pub fn status(&self) -> Status {
        self.status.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<Status> {
        self.status.clone()
    }
}

/// An open WASM mode transaction.
struct Txn {
    id: TxnId,
    mode: WasmMode,
    loader: Arc<str>,
    commit: Option<oneshot::Sender<bool>>,
    /// The JS bundle already carries the new loader.
    emitted: bool,
}

/// What a one-shot build still waits for.
#[derive(Debug, Default)]
struct Pending {
    items: FxHashSet<&'static str>,
    failed: Vec<&'static str>,
}

impl Pending {
    fn new(expect: Expect) -> Self {
        let mut items: FxHashSet<_> = ["style.css", "script.js"].into_iter().collect();
        if expect.server {
            items.insert("server");
        }
        if expect.wasm {
            items.insert("client.wasm");
        }
        Self {
            items,
            failed: Vec::new(),
        }
    }

    fn done(&mut self, item: &'static str, success: bool) {
        if self.items.remove(item) && !success {
            self.failed.push(item);
        }
    }
}

pub struct Coordinator<B: Browser> {
    rx: mpsc::Receiver<CoordinatorMsg>,
    out: CoordinatorOutputs,
    browser: B,
    config: CoordinatorConfig,
    gate: ReloadGate,
    building: FxHashSet<Builder>,
    /// Successful external server build waiting for its probe.
    awaiting_ready: Option<OpId>,
    opened: bool,
    /// Loader currently in the JS bundle, restored if a commit fails late.
    loader: Arc<str>,
    txn: Option<Txn>,
    next_txn: u64,
    pending: Option<Pending>,
    status: Status,
    status_tx: watch::Sender<Status>,
    shutdown: Shutdown,
}

impl<B: Browser> Coordinator<B> {
    pub fn new(
        config: CoordinatorConfig,
        out: CoordinatorOutputs,
        browser: B,
        tx: mpsc::Sender<CoordinatorMsg>,
        rx: mpsc::Receiver<CoordinatorMsg>,
        shutdown: Shutdown,
    ) -> (Self, CoordinatorHandle) {
        let status = Status {
            server: BuilderStatus::default(),
            wasm: BuilderStatus::default(),
            assets: BuilderStatus::default(),
            server_mode: config.server_mode,
            wasm_mode: config.wasm_mode,
            wasm_mode_pending: None,
            build_on_disk: config.output.is_disk(),
            url: None,
            livereload_port: config.livereload_port,
            reloads: 0,
        };
        let (status_tx, status_rx) = watch::channel(status.clone());
        let handle = CoordinatorHandle {
            tx,
            status: status_rx,
        };

        let coordinator = Self {
            rx,
            out,
            browser,
            gate: ReloadGate::default(),
            building: FxHashSet::default(),
            awaiting_ready: None,
            opened: false,
            loader: "".into(),
            txn: None,
            next_txn: 0,
            pending: config.oneshot.map(Pending::new),
            config,
            status,
            status_tx,
            shutdown,
        };
        (coordinator, handle)
    }

    /// Run until shutdown. In one-shot mode, fails if any artifact failed.
    pub async fn run(mut self) -> Result<()> {
        let shutdown = self.shutdown.clone();
        loop {
            let wait = self.reload_wait(Instant::now());
            tokio::select! {
                biased;
                _ = shutdown.wait() => break,
                msg = self.rx.recv() => match msg {
                    Some(msg) => self.handle(msg).await,
                    None => break,
                },
                _ = tokio::time::sleep(wait.unwrap_or(IDLE_WAKE)), if wait.is_some() => {
                    self.fire_reload(Instant::now());
                }
            }
            self.publish();
            if self.check_oneshot() {
                break;
            }
        }

        if let Some(txn) = self.txn.take()
            && let Some(commit) = txn.commit
        {
            let _ = commit.send(false);
        }
        self.browser.close();
        crate::debug!("coord"; "stopped");

        match self.pending.take() {
            Some(pending) if !pending.failed.is_empty() => {
                anyhow::bail!("build failed: {}", pending.failed.join(", "))
            }
            Some(pending) if !pending.items.is_empty() => {
                let mut missing: Vec<_> = pending.items.into_iter().collect();
                missing.sort_unstable();
                anyhow::bail!("interrupted before {} finished", missing.join(", "))
            }
            _ => Ok(()),
        }
    }

    // =========================================================================
    // Reload gating
    // =========================================================================

    fn held(&self) -> bool {
        !self.building.is_empty() || self.awaiting_ready.is_some() || self.txn.is_some()
    }

    /// Sleep until the pending reload is due, unless something holds it.
    fn reload_wait(&self, now: Instant) -> Option<Duration> {
        if self.held() {
            return None;
        }
        self.gate.sleep_duration(now)
    }

    fn request_reload(&mut self, why: &str) {
        crate::debug!("coord"; "reload requested: {}", why);
        self.gate.request(Instant::now());
    }

    fn fire_reload(&mut self, now: Instant) {
        if self.held() || !self.gate.take_due(now) {
            return;
        }
        if !self.opened {
            crate::debug!("coord"; "browser not open yet, reload skipped");
            return;
        }
        self.browser.reload();
        self.status.reloads += 1;
        crate::log!("reload"; "browser reloaded");
    }

    // =========================================================================
    // Messages
    // =========================================================================

    async fn handle(&mut self, msg: CoordinatorMsg) {
        match msg {
            CoordinatorMsg::BuildStarted { builder, op } => {
                self.building.insert(builder);
                let entry = self.status.builder_mut(builder);
                entry.state = BuilderState::Building;
                entry.last_op = Some(op);
            }
            CoordinatorMsg::BuildResult {
                builder,
                op,
                success,
            } => self.on_build_result(builder, op, success),
            CoordinatorMsg::ServerReady { op, mode, rebuilt } => {
                self.on_server_ready(op, mode, rebuilt);
            }
            CoordinatorMsg::ServerDown { op, reason } => {
                crate::debug!("coord"; "server {} down: {}", op, reason);
                if self.awaiting_ready.is_some_and(|awaited| awaited <= op) {
                    self.awaiting_ready = None;
                }
                self.status.server.state = BuilderState::Failed;
            }
            CoordinatorMsg::LoaderReady { mode, loader } => {
                crate::debug!("coord"; "loader for mode {} ready", mode);
                self.status.wasm_mode = mode;
                self.loader = Arc::clone(&loader);
                let _ = self.out.assets.send(AssetMsg::SetLoader(loader)).await;
            }
            CoordinatorMsg::LoaderStaged {
                mode,
                loader,
                commit,
            } => self.on_loader_staged(mode, loader, commit).await,
            CoordinatorMsg::ModeSettled { mode, committed } => {
                self.on_mode_settled(mode, committed).await;
            }
            CoordinatorMsg::AssetsEmitted {
                media,
                op,
                success,
                cause,
            } => self.on_assets_emitted(media, op, success, cause),
            CoordinatorMsg::OutputChanged(target) => {
                self.status.build_on_disk = target.is_disk();
            }
            CoordinatorMsg::ServerModeChanged(mode) => {
                self.status.server_mode = mode;
                self.config.server_mode = mode;
                let _ = self.out.wasm.send(WasmMsg::ServerMode(mode)).await;
            }
            CoordinatorMsg::Command { command, reply } => {
                let text = self.on_command(command).await;
                let _ = reply.send(text);
            }
        }
    }

    fn on_build_result(&mut self, builder: Builder, op: OpId, success: bool) {
        self.building.remove(&builder);
        let entry = self.status.builder_mut(builder);
        entry.state = if success {
            BuilderState::Idle
        } else {
            BuilderState::Failed
        };
        entry.last_op = Some(op);
        entry.last_success = Some(success);

        if let Some(pending) = &mut self.pending {
            let item = match builder {
                Builder::Server => "server",
                Builder::Wasm => "client.wasm",
                Builder::Assets => return,
            };
            pending.done(item, success);
            return;
        }
        if !success {
            return;
        }
        match builder {
            Builder::Server if self.config.server_mode == ServerMode::External => {
                self.awaiting_ready = Some(op);
            }
            Builder::Server => {}
            Builder::Wasm => self.request_reload("client.wasm rebuilt"),
            Builder::Assets => {}
        }
    }

    fn on_server_ready(&mut self, op: OpId, mode: ServerMode, rebuilt: bool) {
        if self.awaiting_ready.is_some_and(|awaited| awaited <= op) {
            self.awaiting_ready = None;
        }
        self.status.server.state = BuilderState::Running;
        self.status.server_mode = mode;

        if self.opened {
            if rebuilt {
                self.request_reload("server ready");
            } else {
                crate::debug!("coord"; "server {} back on the previous binary, no reload", op);
            }
            return;
        }
        self.opened = true;
        self.status.url = Some(app_url(self.config.app_port, self.config.https));
        self.browser.open(self.config.app_port, self.config.https);
    }

    async fn on_loader_staged(
        &mut self,
        mode: WasmMode,
        loader: Arc<str>,
        commit: oneshot::Sender<bool>,
    ) {
        self.building.remove(&Builder::Wasm);
        if self.txn.is_some() {
            crate::warn!("coord"; "mode {} staged while another change is open, aborting it", mode);
            let _ = commit.send(false);
            return;
        }

        self.next_txn += 1;
        let id = TxnId(self.next_txn);
        crate::debug!("coord"; "{} mode {} staged, re-emitting script.js", id, mode);
        let refresh = AssetMsg::Refresh {
            media: MediaType::Js,
            loader: Some(Arc::clone(&loader)),
            cause: EmitCause::Txn(id),
        };
        if self.out.assets.send(refresh).await.is_err() {
            let _ = commit.send(false);
            return;
        }
        self.status.wasm_mode_pending = Some(mode);
        self.txn = Some(Txn {
            id,
            mode,
            loader,
            commit: Some(commit),
            emitted: false,
        });
    }

    fn on_assets_emitted(&mut self, media: MediaType, op: OpId, success: bool, cause: EmitCause) {
        self.building.remove(&Builder::Assets);
        let entry = self.status.builder_mut(Builder::Assets);
        entry.state = if success {
            BuilderState::Idle
        } else {
            BuilderState::Failed
        };
        entry.last_op = Some(op);
        entry.last_success = Some(success);

        match cause {
            EmitCause::Source => {
                if let Some(pending) = &mut self.pending {
                    let item = match media {
                        MediaType::Css => "style.css",
                        MediaType::Js => "script.js",
                    };
                    pending.done(item, success);
                } else if success {
                    self.request_reload(media.label());
                }
            }
            EmitCause::Txn(id) => {
                let Some(txn) = self.txn.as_mut().filter(|txn| txn.id == id) else {
                    crate::debug!("coord"; "emission for closed {} ignored", id);
                    return;
                };
                txn.emitted = success;
                if !success {
                    crate::err!("coord"; "{} script.js for mode {} failed, keeping the current mode", id, txn.mode);
                }
                if let Some(commit) = txn.commit.take() {
                    let _ = commit.send(success);
                }
            }
            EmitCause::Restore => {
                crate::debug!("coord"; "script.js loader restored ({})", if success { "ok" } else { "failed" });
            }
        }
    }

    async fn on_mode_settled(&mut self, mode: WasmMode, committed: bool) {
        self.building.remove(&Builder::Wasm);
        self.status.wasm_mode_pending = None;
        let Some(txn) = self.txn.take() else {
            return;
        };

        self.status.wasm.state = if committed {
            BuilderState::Idle
        } else {
            BuilderState::Failed
        };
        self.status.wasm.last_success = Some(committed);

        if committed {
            self.loader = txn.loader;
            self.status.wasm_mode = mode;
            self.request_reload("wasm mode changed");
            return;
        }
        if txn.emitted {
            // Bundle carries the new loader but the binary stayed old.
            let restore = AssetMsg::Refresh {
                media: MediaType::Js,
                loader: Some(Arc::clone(&self.loader)),
                cause: EmitCause::Restore,
            };
            let _ = self.out.assets.send(restore).await;
        }
    }

    async fn on_command(&mut self, command: Command) -> String {
        crate::log!("cmd"; "{}", command);
        match command {
            Command::RebuildAll => {
                let _ = self.out.router.send(RouterMsg::BuildAll).await;
                for media in MediaType::ALL {
                    let refresh = AssetMsg::Refresh {
                        media,
                        loader: None,
                        cause: EmitCause::Source,
                    };
                    let _ = self.out.assets.send(refresh).await;
                }
                "rebuilding all".into()
            }
            Command::SetWasmMode(mode) => {
                if self.txn.is_some() {
                    return "a mode change is already in progress".into();
                }
                let _ = self.out.wasm.send(WasmMsg::SetMode(mode)).await;
                format!("switching wasm mode to {mode}")
            }
            Command::ToggleBuildOnDisk => {
                let target = if self.status.build_on_disk {
                    OutputTarget::Memory
                } else {
                    OutputTarget::Disk
                };
                let _ = self.out.wasm.send(WasmMsg::SetOutput(target)).await;
                format!("build_on_disk={}", target.is_disk())
            }
            Command::RestartServer => {
                let _ = self.out.server.send(ServerMsg::Restart).await;
                "restarting server".into()
            }
            Command::SetServerMode(mode) => {
                let _ = self.out.server.send(ServerMsg::SetMode(mode)).await;
                format!("switching server to {mode} mode")
            }
            Command::Reload => {
                self.request_reload("command");
                "reload requested".into()
            }
            Command::Status => self.status.to_json(),
            Command::Quit => {
                self.shutdown.trigger();
                "bye".into()
            }
            Command::Help => USAGE.into(),
        }
    }

    // =========================================================================
    // Status & one-shot
    // =========================================================================

    fn publish(&self) {
        self.status_tx.send_replace(self.status.clone());
    }

    /// One-shot builds stop once every expected artifact is done.
    fn check_oneshot(&mut self) -> bool {
        let Some(pending) = &self.pending else {
            return false;
        };
        if !pending.items.is_empty() || !self.building.is_empty() {
            return false;
        }
        self.shutdown.trigger();
        true
    }
}
