//! Supervised server process.
//!
//! The child's stdout / stderr lines go to the `server` log stream tagged
//! with the op that started it. One task per child waits for either its
//! exit or a stop request:
//!
//! ```text
//! spawn ─> supervise ─┬─ child exits ──> exited=true, ChildExited { op, status }
//!                     └─ stop() ───────> SIGINT ─1s─> SIGTERM ─1s─> SIGKILL
//! ```

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::actor::messages::ServerMsg;
use crate::core::OpId;
use crate::logger::{self, Severity};

/// Wait after each polite signal before escalating.
const STOP_GRACE: Duration = Duration::from_secs(1);

/// How to launch the server binary.
pub struct Launch<'a> {
    pub program: &'a Path,
    pub args: &'a [String],
    pub cwd: &'a Path,
    pub port: u16,
}

/// A running child owned by the ServerBuilder.
pub struct Supervised {
    pub op: OpId,
    stop: Option<oneshot::Sender<()>>,
    exited: watch::Receiver<bool>,
    task: JoinHandle<()>,
}

impl Supervised {
    /// Start the child. `exits` receives `ChildExited` if it ends unasked.
    pub fn spawn(launch: &Launch<'_>, op: OpId, exits: mpsc::Sender<ServerMsg>) -> Result<Self> {
        let mut child = Command::new(launch.program)
            .args(launch.args)
            .env("PORT", launch.port.to_string())
            .current_dir(launch.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("cannot start {}", launch.program.display()))?;

        if let Some(stdout) = child.stdout.take() {
            copy_lines(stdout, op);
        }
        if let Some(stderr) = child.stderr.take() {
            copy_lines(stderr, op);
        }

        let (stop_tx, stop_rx) = oneshot::channel();
        let (exited_tx, exited) = watch::channel(false);
        let task = tokio::spawn(supervise(child, op, stop_rx, exited_tx, exits));

        Ok(Self {
            op,
            stop: Some(stop_tx),
            exited,
            task,
        })
    }

    /// Flips to `true` once the child is gone.
    pub fn exited(&self) -> watch::Receiver<bool> {
        self.exited.clone()
    }

    /// Run the stop sequence and wait for the child to be reaped.
    pub async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        let _ = (&mut self.task).await;
    }
}

async fn supervise(
    mut child: Child,
    op: OpId,
    mut stop: oneshot::Receiver<()>,
    exited: watch::Sender<bool>,
    exits: mpsc::Sender<ServerMsg>,
) {
    tokio::select! {
        status = child.wait() => {
            exited.send_replace(true);
            let status = match status {
                Ok(status) => describe(status),
                Err(e) => format!("wait failed: {e}"),
            };
            let _ = exits.send(ServerMsg::ChildExited { op, status }).await;
        }
        // A dropped handle stops the child too.
        _ = &mut stop => {
            let status = terminate(&mut child).await;
            exited.send_replace(true);
            crate::debug!("server"; "{} stopped ({})", op, status.map(describe).unwrap_or_default());
        }
    }
}

/// SIGINT, SIGTERM, then SIGKILL; each polite signal gets `STOP_GRACE`.
async fn terminate(child: &mut Child) -> Option<ExitStatus> {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;

        #[allow(clippy::cast_possible_wrap)]
        let pid = Pid::from_raw(pid as i32);
        for signal in [Signal::SIGINT, Signal::SIGTERM] {
            if kill(pid, signal).is_err() {
                break;
            }
            if let Ok(Ok(status)) = tokio::time::timeout(STOP_GRACE, child.wait()).await {
                return Some(status);
            }
        }
    }

    let _ = child.kill().await;
    child.wait().await.ok()
}

fn describe(status: ExitStatus) -> String {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return format!("killed by signal {signal}");
        }
    }
    match status.code() {
        Some(code) => format!("exit code {code}"),
        None => status.to_string(),
    }
}

fn copy_lines<R>(reader: R, op: OpId)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            logger::emit("server", Severity::Info, Some(op), line);
        }
    });
}
