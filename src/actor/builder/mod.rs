//! Builders: one task per artifact.
//!
//! Each builder owns its inbox and runs builds inline in its loop, so at
//! most one build per root is ever in flight. Requests that pile up while a
//! build runs collapse into a single follow-up build.
//!
//! | Builder | Artifact | Toolchain |
//! |---------|----------|-----------|
//! | `ServerBuilder` | `web/server` + child process | `go` |
//! | `WasmBuilder` | `web/public/client.wasm` | `go` / `tinygo` |
//! | `AssetBuilder` | `script.js`, `style.css` | oxc, lightningcss |

mod assets;
mod server;
mod wasm;

#[cfg(all(test, unix))]
pub(crate) mod testkit;

pub use assets::AssetBuilder;
pub use server::ServerBuilder;
pub use wasm::{LoaderCache, WasmBuilder};

use std::collections::VecDeque;
use std::path::PathBuf;

use tokio::sync::mpsc;

use super::messages::{AssetMsg, Builder, CoordinatorMsg, ServerMsg, WasmMsg};
use crate::core::{OpId, Shutdown};

/// Lines of compiler output kept in an error report.
const OUTPUT_TAIL_LINES: usize = 20;

/// Lifecycle state of one builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BuilderState {
    #[default]
    Idle,
    Building,
    /// Server only: child process up.
    Running,
    Failed,
}

// =============================================================================
// Reporting
// =============================================================================

/// Builder-side handle for results sent to the coordinator.
#[derive(Clone)]
pub struct Reporter {
    builder: Builder,
    tx: mpsc::Sender<CoordinatorMsg>,
}

impl Reporter {
    pub fn new(builder: Builder, tx: mpsc::Sender<CoordinatorMsg>) -> Self {
        Self { builder, tx }
    }

    pub async fn started(&self, op: OpId) {
        self.send(CoordinatorMsg::BuildStarted {
            builder: self.builder,
            op,
        })
        .await;
    }

    pub async fn finished(&self, op: OpId, success: bool) {
        self.send(CoordinatorMsg::BuildResult {
            builder: self.builder,
            op,
            success,
        })
        .await;
    }

    /// Coordinator gone means shutdown; nothing left to tell.
    pub async fn send(&self, msg: CoordinatorMsg) {
        let _ = self.tx.send(msg).await;
    }
}

/// Last lines of a build error, for the builder's log stream.
pub fn output_tail(error: &anyhow::Error) -> String {
    let text = format!("{error:#}");
    let lines: Vec<&str> = text.lines().collect();
    let skip = lines.len().saturating_sub(OUTPUT_TAIL_LINES);
    lines[skip..].join("\n")
}

// =============================================================================
// Inbox
// =============================================================================

/// Builder messages that can be merged while queued.
pub trait Queued: Sized {
    /// Trigger path if this is a build request.
    fn build_trigger(&mut self) -> Option<&mut Option<PathBuf>>;
}

impl Queued for ServerMsg {
    fn build_trigger(&mut self) -> Option<&mut Option<PathBuf>> {
        match self {
            Self::Build { trigger } => Some(trigger),
            _ => None,
        }
    }
}

impl Queued for WasmMsg {
    fn build_trigger(&mut self) -> Option<&mut Option<PathBuf>> {
        match self {
            Self::Build { trigger } => Some(trigger),
            _ => None,
        }
    }
}

impl Queued for AssetMsg {
    fn build_trigger(&mut self) -> Option<&mut Option<PathBuf>> {
        None
    }
}

/// Receiver plus a backlog where queued build requests collapse.
pub struct Inbox<M> {
    rx: mpsc::Receiver<M>,
    backlog: VecDeque<M>,
}

impl<M: Queued> Inbox<M> {
    pub fn new(rx: mpsc::Receiver<M>) -> Self {
        Self {
            rx,
            backlog: VecDeque::new(),
        }
    }

    /// Next message, or `None` on shutdown / closed channel.
    pub async fn recv(&mut self, shutdown: &Shutdown) -> Option<M> {
        self.absorb();
        if let Some(msg) = self.backlog.pop_front() {
            return Some(msg);
        }
        tokio::select! {
            biased;
            _ = shutdown.wait() => None,
            msg = self.rx.recv() => msg,
        }
    }

    /// Move everything already queued into the backlog, merging builds.
    fn absorb(&mut self) {
        while let Ok(mut msg) = self.rx.try_recv() {
            if let Some(trigger) = msg.build_trigger() {
                let newer = trigger.take();
                if let Some(queued) = self
                    .backlog
                    .iter_mut()
                    .find_map(|m| m.build_trigger())
                {
                    if newer.is_some() {
                        *queued = newer;
                    }
                    continue;
                }
                *trigger = newer;
            }
            self.backlog.push_back(msg);
        }
    }
}
