use std::net::{Ipv4Addr, TcpListener};
use std::path::PathBuf;
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::mpsc;

use super::ServerBuilder;
use crate::actor::builder::testkit::{assert_quiet, next_msg, write_executable};
use crate::actor::messages::{Builder, CoordinatorMsg, ServerMsg};
use crate::config::{Layout, ServeConfig, ToolchainConfig};
use crate::core::{MemoryArtifact, OpId, ServerMode, Shutdown};
use crate::deps::tests::project;

/// `go build -o <out>` copies `server.body` to `<out>` as an executable.
struct FakeServerGo {
    program: PathBuf,
    body: PathBuf,
    fail_marker: PathBuf,
}

impl FakeServerGo {
    fn install(dir: &std::path::Path) -> Self {
        let program = dir.join("go");
        let body = dir.join("server.body");
        let fail_marker = dir.join("go.FAIL");
        let script = format!(
            r#"#!/bin/sh
if [ -f "{fail}" ]; then
  echo "web/server.go:4:2: undefined: handler" >&2
  exit 1
fi
out=""
prev=""
for a in "$@"; do
  if [ "$prev" = "-o" ]; then out="$a"; fi
  prev="$a"
done
cp "{body}" "$out"
chmod +x "$out"
"#,
            fail = fail_marker.display(),
            body = body.display(),
        );
        write_executable(&program, &script);
        Self {
            program,
            body,
            fail_marker,
        }
    }

    fn set_body(&self, body: &str) {
        std::fs::write(&self.body, format!("#!/bin/sh\n{body}\n")).unwrap();
    }

    fn set_failing(&self, failing: bool) {
        if failing {
            std::fs::write(&self.fail_marker, "").unwrap();
        } else {
            let _ = std::fs::remove_file(&self.fail_marker);
        }
    }
}

struct Harness {
    _temp: TempDir,
    _tools: TempDir,
    layout: Layout,
    go: FakeServerGo,
    port: u16,
    /// Stands in for the user server's socket so the probe succeeds.
    listener: Option<TcpListener>,
    tx: mpsc::Sender<ServerMsg>,
    rx: mpsc::Receiver<CoordinatorMsg>,
    shutdown: Shutdown,
}

impl Harness {
    async fn send(&self, msg: ServerMsg) {
        self.tx.send(msg).await.unwrap();
    }

    async fn expect_build(&mut self, success: bool) -> OpId {
        let started = match next_msg(&mut self.rx).await {
            CoordinatorMsg::BuildStarted { builder, op } => {
                assert_eq!(builder, Builder::Server);
                op
            }
            other => panic!("expected BuildStarted, got {other:?}"),
        };
        match next_msg(&mut self.rx).await {
            CoordinatorMsg::BuildResult { op, success: s, .. } => {
                assert_eq!(op, started);
                assert_eq!(s, success);
            }
            other => panic!("expected BuildResult, got {other:?}"),
        }
        started
    }

    async fn expect_ready(&mut self, expected: ServerMode) -> OpId {
        self.expect_ready_from(expected, true).await
    }

    async fn expect_ready_from(&mut self, expected: ServerMode, fresh: bool) -> OpId {
        match next_msg(&mut self.rx).await {
            CoordinatorMsg::ServerReady { op, mode, rebuilt } => {
                assert_eq!(mode, expected);
                assert_eq!(rebuilt, fresh);
                op
            }
            other => panic!("expected ServerReady, got {other:?}"),
        }
    }
}

fn free_port() -> (u16, TcpListener) {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
    (listener.local_addr().unwrap().port(), listener)
}

/// Builder over a project with (`external`) or without `web/server.go`.
///
/// `listen` keeps a socket on the app port for the readiness probe.
async fn spawn(external: bool, listen: bool, body: &str) -> Harness {
    let mut files = vec![
        ("go.mod", "module example.com/app\n"),
        ("web/client.go", "package main\n"),
        ("web/public/index.html", "<html></html>"),
    ];
    if external {
        files.push(("web/server.go", "package main\n\nfunc main() {}\n"));
    }
    let (temp, root) = project(&files);
    let tools = TempDir::new().unwrap();
    let go = FakeServerGo::install(tools.path());
    go.set_body(body);

    let (port, listener) = free_port();
    let listener = listen.then_some(listener);
    let serve = ServeConfig {
        port,
        ..ServeConfig::default()
    };
    let toolchain = ToolchainConfig {
        go: go.program.display().to_string(),
        ..ToolchainConfig::default()
    };

    let layout = Layout::new(&root);
    let (tx, server_rx) = mpsc::channel(16);
    let (coord_tx, rx) = mpsc::channel(16);
    let shutdown = Shutdown::new();
    let builder = ServerBuilder::new(
        &layout,
        &serve,
        &toolchain,
        MemoryArtifact::new(),
        true,
        server_rx,
        tx.clone(),
        coord_tx,
        shutdown.clone(),
    )
    .unwrap();
    assert_eq!(
        builder.mode(),
        if external {
            ServerMode::External
        } else {
            ServerMode::Internal
        }
    );
    tokio::spawn(builder.run());

    Harness {
        _temp: temp,
        _tools: tools,
        layout,
        go,
        port,
        listener,
        tx,
        rx,
        shutdown,
    }
}

#[tokio::test]
async fn test_internal_mode_ready_at_startup() {
    let mut h = spawn(false, false, "exit 0").await;
    h.expect_ready(ServerMode::Internal).await;

    h.send(ServerMsg::Build { trigger: None }).await;
    assert_quiet(&mut h.rx, Duration::from_millis(300)).await;
    assert!(!h.layout.server_root().output_path().exists());
    h.shutdown.trigger();
}

#[tokio::test]
async fn test_internal_port_taken_is_fatal() {
    let (temp, root) = project(&[("web/public/index.html", "")]);
    let (port, _held) = free_port();
    let serve = ServeConfig {
        port,
        ..ServeConfig::default()
    };
    let (tx, rx) = mpsc::channel(1);
    let (coord_tx, _coord_rx) = mpsc::channel(1);
    let result = ServerBuilder::new(
        &Layout::new(&root),
        &serve,
        &ToolchainConfig::default(),
        MemoryArtifact::new(),
        true,
        rx,
        tx,
        coord_tx,
        Shutdown::new(),
    );
    assert!(result.is_err());
    drop(temp);
}

#[tokio::test]
async fn test_external_build_starts_and_probes() {
    let mut h = spawn(true, true, "echo up\nexec sleep 30").await;
    h.send(ServerMsg::Build {
        trigger: Some(h.layout.web_dir.join("server.go")),
    })
    .await;

    let op = h.expect_build(true).await;
    assert_eq!(h.expect_ready(ServerMode::External).await, op);
    let binary = h.layout.server_root().output_path();
    assert!(binary.is_file());
    assert!(!h.layout.server_root().temp_path().exists());
    h.shutdown.trigger();
}

#[tokio::test]
async fn test_broken_build_keeps_running_server() {
    let mut h = spawn(true, true, "exec sleep 30").await;
    h.send(ServerMsg::Build { trigger: None }).await;
    h.expect_build(true).await;
    h.expect_ready(ServerMode::External).await;
    let binary = h.layout.server_root().output_path();
    let before = std::fs::read(&binary).unwrap();

    h.go.set_failing(true);
    h.send(ServerMsg::Build { trigger: None }).await;
    h.expect_build(false).await;
    // No restart, no ready, no down.
    assert_quiet(&mut h.rx, Duration::from_millis(300)).await;
    assert_eq!(std::fs::read(&binary).unwrap(), before);
    h.shutdown.trigger();
}

#[tokio::test]
async fn test_child_exit_reports_down_once() {
    let mut h = spawn(true, true, "sleep 0.3\nexit 4").await;
    h.send(ServerMsg::Build { trigger: None }).await;
    let op = h.expect_build(true).await;
    h.expect_ready(ServerMode::External).await;

    match next_msg(&mut h.rx).await {
        CoordinatorMsg::ServerDown { op: down, reason } => {
            assert_eq!(down, op);
            assert_eq!(reason, "exit code 4");
        }
        other => panic!("expected ServerDown, got {other:?}"),
    }
    // No automatic restart.
    assert_quiet(&mut h.rx, Duration::from_millis(500)).await;
    h.shutdown.trigger();
}

#[tokio::test]
async fn test_exit_before_ready_is_down() {
    let mut h = spawn(true, false, "exit 2").await;
    h.send(ServerMsg::Build { trigger: None }).await;
    let op = h.expect_build(true).await;
    match next_msg(&mut h.rx).await {
        CoordinatorMsg::ServerDown { op: down, .. } => assert_eq!(down, op),
        other => panic!("expected ServerDown, got {other:?}"),
    }
    // The supervisor's own exit report is stale by now.
    assert_quiet(&mut h.rx, Duration::from_millis(300)).await;
    h.shutdown.trigger();
}

#[tokio::test]
async fn test_restart_falls_back_to_previous_binary() {
    let mut h = spawn(true, true, "exec sleep 30").await;
    h.send(ServerMsg::Build { trigger: None }).await;
    h.expect_build(true).await;
    h.expect_ready(ServerMode::External).await;

    h.go.set_failing(true);
    h.send(ServerMsg::Restart).await;
    let op = h.expect_build(false).await;
    assert_eq!(h.expect_ready_from(ServerMode::External, false).await, op);
    h.shutdown.trigger();
}

#[tokio::test]
async fn test_mode_switch_and_failed_external_fallback() {
    let mut h = spawn(true, false, "exec sleep 30").await;
    drop(h.listener.take());

    h.send(ServerMsg::SetMode(ServerMode::Internal)).await;
    assert!(matches!(
        next_msg(&mut h.rx).await,
        CoordinatorMsg::ServerModeChanged(ServerMode::Internal)
    ));
    h.expect_ready(ServerMode::Internal).await;
    assert!(std::net::TcpStream::connect((Ipv4Addr::LOCALHOST, h.port)).is_ok());

    // Broken server.go: internal server comes back, mode stays internal.
    h.go.set_failing(true);
    h.send(ServerMsg::SetMode(ServerMode::External)).await;
    h.expect_build(false).await;
    h.expect_ready(ServerMode::Internal).await;
    assert_quiet(&mut h.rx, Duration::from_millis(200)).await;
    h.shutdown.trigger();
}
