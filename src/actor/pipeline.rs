//! Pipeline wiring.
//!
//! Builds every actor up front so startup errors (unreadable root, taken app
//! port) surface before anything runs, then spawns them on the current
//! runtime:
//!
//! ```text
//! FsActor ──> RouterActor ──┬─> ServerBuilder ─┐
//!                           ├─> WasmBuilder ───┼─> Coordinator ──> Browser
//!                           └─> AssetBuilder ──┘        │
//!                                    ^                   │
//!                                    └──── SetLoader ────┘
//! ```

use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::builder::{AssetBuilder, ServerBuilder, WasmBuilder};
use super::coordinator::{
    Coordinator, CoordinatorConfig, CoordinatorHandle, CoordinatorOutputs, Expect,
};
use super::fs::{FsActor, IgnoreList};
use super::router::{RouterActor, RouterOutputs};
use crate::browser::Browser;
use crate::config::DevConfig;
use crate::core::{MemoryArtifact, Shutdown};
use crate::store::Store;

/// Queue depth of every actor inbox.
const CHANNEL_CAPACITY: usize = 256;

/// How long stopped actors get to wind down after shutdown.
const JOIN_TIMEOUT: Duration = Duration::from_secs(6);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineMode {
    /// Watch, supervise the server and reload the browser until shutdown.
    Serve,
    /// Build every artifact once, then stop.
    Once,
}

pub struct Pipeline {
    handle: CoordinatorHandle,
    coordinator: JoinHandle<Result<()>>,
    actors: Vec<(&'static str, JoinHandle<()>)>,
    shutdown: Shutdown,
}

impl Pipeline {
    /// Construct and spawn all actors. Must be called inside a tokio runtime.
    pub fn start<B: Browser + 'static>(
        config: &DevConfig,
        mode: PipelineMode,
        browser: B,
        livereload_port: u16,
        shutdown: Shutdown,
    ) -> Result<Self> {
        let layout = config.layout();
        let store = Store::open(&layout.state_file());
        let memory = MemoryArtifact::new();

        let ignore = IgnoreList::new();
        ignore.declare(layout.builder_outputs());
        ignore.declare([layout.state_file()]);

        let (router_tx, router_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (server_tx, server_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (wasm_tx, wasm_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (assets_tx, assets_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (coord_tx, coord_rx) = mpsc::channel(CHANNEL_CAPACITY);

        let fs = FsActor::start(&layout.root, ignore, router_tx.clone(), shutdown.clone())
            .with_context(|| format!("cannot watch {}", layout.root.display()))?;

        let server = ServerBuilder::new(
            &layout,
            &config.serve,
            &config.toolchain,
            memory.clone(),
            mode == PipelineMode::Serve,
            server_rx,
            server_tx.clone(),
            coord_tx.clone(),
            shutdown.clone(),
        )?;
        let server_mode = server.mode();

        let wasm_mode = store.wasm_mode();
        let output = store.output_target();
        let wasm = WasmBuilder::new(
            &layout,
            &config.toolchain,
            store,
            memory,
            server_mode,
            wasm_rx,
            coord_tx.clone(),
            shutdown.clone(),
        );

        let assets = AssetBuilder::new(
            &layout,
            livereload_port,
            assets_rx,
            coord_tx.clone(),
            shutdown.clone(),
        );

        let router = RouterActor::new(
            layout.clone(),
            router_rx,
            RouterOutputs {
                server: server_tx.clone(),
                wasm: wasm_tx.clone(),
                assets: assets_tx.clone(),
            },
            shutdown.clone(),
        );

        let oneshot = (mode == PipelineMode::Once).then(|| Expect {
            server: layout.server_root().has_main(),
            wasm: layout.wasm_root().has_main(),
        });
        let (coordinator, handle) = Coordinator::new(
            CoordinatorConfig {
                app_port: config.serve.port,
                https: config.serve.https,
                livereload_port,
                server_mode,
                wasm_mode,
                output,
                oneshot,
            },
            CoordinatorOutputs {
                router: router_tx,
                server: server_tx,
                wasm: wasm_tx,
                assets: assets_tx,
            },
            browser,
            coord_tx,
            coord_rx,
            shutdown.clone(),
        );

        crate::debug!("pipeline"; "server {}, wasm {}, assets {}",
            server_mode, wasm_mode, layout.public_dir.display());

        let actors = vec![
            ("server", tokio::spawn(server.run())),
            ("wasm", tokio::spawn(wasm.run())),
            ("assets", tokio::spawn(assets.run())),
            ("router", tokio::spawn(router.run())),
            ("watch", tokio::spawn(fs.run())),
        ];
        let coordinator = tokio::spawn(coordinator.run());

        Ok(Self {
            handle,
            coordinator,
            actors,
            shutdown,
        })
    }

    pub fn handle(&self) -> CoordinatorHandle {
        self.handle.clone()
    }

    /// Wait for the coordinator to stop, then give every actor a bounded
    /// window to finish. The coordinator's verdict is the pipeline's.
    pub async fn join(self) -> Result<()> {
        let Self {
            coordinator,
            actors,
            shutdown,
            ..
        } = self;

        let outcome = match coordinator.await {
            Ok(result) => result,
            Err(e) => Err(anyhow::anyhow!("coordinator panicked: {e}")),
        };
        shutdown.trigger();

        let deadline = Instant::now() + JOIN_TIMEOUT;
        for (name, task) in actors {
            match tokio::time::timeout_at(deadline, task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => crate::warn!("pipeline"; "{} stopped abnormally: {}", name, e),
                Err(_) => crate::warn!("pipeline"; "{} did not stop in time", name),
            }
        }
        crate::debug!("pipeline"; "stopped");
        outcome
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::net::{Ipv4Addr, TcpListener};
    use std::path::{Path, PathBuf};
    use std::time::Duration;

    use tempfile::TempDir;

    use super::{Pipeline, PipelineMode};
    use crate::actor::builder::BuilderState;
    use crate::actor::builder::testkit::write_executable;
    use crate::actor::coordinator::{CoordinatorHandle, Status};
    use crate::browser::recording::{Call, RecordingBrowser};
    use crate::config::DevConfig;
    use crate::core::{MediaType, Shutdown};
    use crate::deps::tests::{project, write};

    const SETTLE: Duration = Duration::from_millis(800);

    /// `go` that writes a wasm stub for `GOARCH=wasm` and a sleeping shell
    /// script as the server binary.
    fn install_go(dir: &Path) -> PathBuf {
        let goroot = dir.join("goroot");
        std::fs::create_dir_all(goroot.join("lib/wasm")).unwrap();
        std::fs::write(goroot.join("lib/wasm/wasm_exec.js"), "class Go{}").unwrap();

        let program = dir.join("go");
        let script = format!(
            r#"#!/bin/sh
if [ "$1" = "env" ]; then
  echo "{goroot}"
  exit 0
fi
out=""
prev=""
for a in "$@"; do
  if [ "$prev" = "-o" ]; then out="$a"; fi
  prev="$a"
done
if [ "$GOARCH" = "wasm" ]; then
  printf 'wasm:%s' "$*" > "$out"
else
  printf '#!/bin/sh\nexec sleep 30\n' > "$out"
  chmod +x "$out"
fi
"#,
            goroot = goroot.display(),
        );
        write_executable(&program, &script);
        program
    }

    fn sample_project() -> (TempDir, PathBuf) {
        project(&[
            ("go.mod", "module example.com/app\n"),
            (
                "web/server.go",
                "package main\n\nimport \"example.com/app/pkg/shared\"\n\nfunc main() {}\n",
            ),
            (
                "web/client.go",
                "package main\n\nimport (\n\t\"example.com/app/pkg/greet\"\n\t\"example.com/app/pkg/shared\"\n)\n\nfunc main() {}\n",
            ),
            ("pkg/greet/greet.go", "package greet\n"),
            ("pkg/shared/shared.go", "package shared\n"),
            ("web/app.css", "body { color: red; }\n"),
            ("web/app.js", "function greetUser() {\n  console.log(\"hi\");\n}\n"),
            ("web/public/index.html", "<html></html>"),
        ])
    }

    struct Running {
        _temp: TempDir,
        _tools: TempDir,
        /// Stands in for the user server's socket.
        _listener: TcpListener,
        port: u16,
        root: PathBuf,
        pipeline: Pipeline,
        handle: CoordinatorHandle,
        browser: RecordingBrowser,
        shutdown: Shutdown,
    }

    fn start(mode: PipelineMode) -> Running {
        let (temp, root) = sample_project();
        let tools = TempDir::new().unwrap();
        let go = install_go(tools.path());

        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let port = listener.local_addr().unwrap().port();
        let mut config = DevConfig::for_root(&root);
        config.serve.port = port;
        config.toolchain.go = go.display().to_string();

        let browser = RecordingBrowser::default();
        let shutdown = Shutdown::new();
        let pipeline =
            Pipeline::start(&config, mode, browser.clone(), 35729, shutdown.clone()).unwrap();
        let handle = pipeline.handle();
        Running {
            _temp: temp,
            _tools: tools,
            _listener: listener,
            port,
            root,
            pipeline,
            handle,
            browser,
            shutdown,
        }
    }

    async fn wait_until(handle: &CoordinatorHandle, what: &str, f: impl FnMut(&Status) -> bool) {
        let mut rx = handle.watch();
        let reached = tokio::time::timeout(Duration::from_secs(20), rx.wait_for(f))
            .await
            .map(|r| r.is_ok());
        assert_eq!(reached, Ok(true), "timed out waiting for {what}");
    }

    fn settled(s: &Status) -> bool {
        s.server.state == BuilderState::Running
            && s.wasm.last_success == Some(true)
            && s.wasm.state == BuilderState::Idle
            && s.assets.last_success == Some(true)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_client_package_edit_rebuilds_wasm_only() {
        let h = start(PipelineMode::Serve);
        wait_until(&h.handle, "startup builds", settled).await;
        tokio::time::sleep(SETTLE).await;
        assert_eq!(h.browser.calls().first(), Some(&Call::Open(h.port, false)));

        let before = h.handle.status();
        write(
            &h.root,
            "pkg/greet/greet.go",
            "package greet\n\nfunc Hello() string { return \"hi\" }\n",
        );
        wait_until(&h.handle, "client.wasm rebuild", |s| {
            s.wasm.last_op > before.wasm.last_op && s.wasm.state == BuilderState::Idle
        })
        .await;
        wait_until(&h.handle, "reload", |s| s.reloads > before.reloads).await;
        tokio::time::sleep(SETTLE).await;

        let after = h.handle.status();
        assert_eq!(after.wasm.last_success, Some(true));
        assert_eq!(after.server.last_op, before.server.last_op);
        assert_eq!(after.server.state, BuilderState::Running);

        h.shutdown.trigger();
        h.pipeline.join().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_bundle_writes_do_not_retrigger() {
        let h = start(PipelineMode::Serve);
        wait_until(&h.handle, "startup builds", settled).await;
        tokio::time::sleep(SETTLE).await;

        let before = h.handle.status();
        assert!(h.root.join("web/public/script.js").is_file());
        assert!(h.root.join("web/public/style.css").is_file());

        // Writing the bundles must not feed back into the asset builder.
        tokio::time::sleep(SETTLE * 2).await;
        let after = h.handle.status();
        assert_eq!(after.assets.last_op, before.assets.last_op);
        assert_eq!(after.reloads, before.reloads);

        // A source edit still goes through, exactly once.
        write(&h.root, "web/app.css", "body { color: blue; }\n");
        wait_until(&h.handle, "style.css rebuild", |s| {
            s.assets.last_op > before.assets.last_op
        })
        .await;
        tokio::time::sleep(SETTLE * 2).await;
        let edited = h.handle.status();
        assert_eq!(edited.wasm.last_op, before.wasm.last_op);
        assert_eq!(edited.server.last_op, before.server.last_op);
        let css = std::fs::read_to_string(h.root.join("web/public/style.css")).unwrap();
        assert!(css.contains("blue"), "{css}");

        h.shutdown.trigger();
        h.pipeline.join().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_once_builds_every_artifact() {
        let h = start(PipelineMode::Once);
        let outcome = tokio::time::timeout(Duration::from_secs(30), h.pipeline.join()).await;
        assert!(matches!(outcome, Ok(Ok(()))), "{outcome:?}");

        let layout = DevConfig::for_root(&h.root).layout();
        assert!(layout.server_root().output_path().is_file());
        assert!(layout.wasm_root().output_path().is_file());
        let script = std::fs::read_to_string(layout.bundle_path(MediaType::Js)).unwrap();
        assert!(script.contains("greetUser"), "{script}");
        assert!(layout.bundle_path(MediaType::Css).is_file());
        // Built, never started or opened.
        assert!(h.browser.calls().iter().all(|c| !matches!(c, Call::Open(..))));
    }
}
