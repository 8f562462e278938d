//! Router Actor
//!
//! Decides which builder owns each `FileEvent`.
//!
//! ```text
//! FileEvent ─┬─ .css / .js ──────────────> AssetBuilder (one by one)
//!            ├─ .go ── DependencyIndex ──> Coalescer ──> Server/WasmBuilder
//!            ├─ go.mod / go.sum ─────────> every root (index dropped)
//!            └─ anything else ───────────> dropped
//! ```
//!
//! The router is the only owner of the `DependencyIndex`.

mod coalesce;


use std::path::PathBuf;
use std::time::Instant;

use tokio::sync::mpsc;

use super::messages::{AssetMsg, RouterMsg, ServerMsg, WasmMsg};
use crate::config::Layout;
use crate::core::{FileEvent, RootKind, Shutdown};
use crate::deps::DependencyIndex;
use crate::utils::path::display_relative;

use coalesce::Coalescer;

/// Routing decision for one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Build {
        root: RootKind,
        trigger: Option<PathBuf>,
    },
    Asset(FileEvent),
}

/// Route a single event, updating the index as a side effect.
///
/// Deterministic for a given index state and filesystem.
pub fn route(index: &mut DependencyIndex, layout: &Layout, event: &FileEvent) -> Vec<Route> {
    if event.media().is_some() {
        return vec![Route::Asset(event.clone())];
    }

    if layout.is_module_file(&event.path) {
        index.invalidate_all();
        return RootKind::ALL
            .iter()
            .map(|&root| Route::Build {
                root,
                trigger: Some(event.path.clone()),
            })
            .collect();
    }

    if event.ext != ".go" {
        crate::debug!("router"; "unrouted {}", display_relative(&event.path, &layout.root));
        return Vec::new();
    }

    let mut routes = Vec::new();
    for root in RootKind::ALL {
        let build = if event.kind.is_removal() {
            let known = index.all_known_files(root).contains(&event.path);
            if known {
                index.invalidate(root);
            }
            known
        } else {
            let owned = index.owns_refreshing(root, &event.path);
            // A new file, or a changed import list, reshapes the graph. The
            // debouncer may report a fresh file as a plain write.
            if owned
                && (!index.knows(root, &event.path) || index.imports_changed(root, &event.path))
            {
                index.invalidate(root);
            }
            owned
        };
        if build {
            routes.push(Route::Build {
                root,
                trigger: Some(event.path.clone()),
            });
        }
    }

    if routes.is_empty() {
        crate::debug!("router"; "{} owned by no root", display_relative(&event.path, &layout.root));
    }
    routes
}

/// Builder inputs, one channel per builder.
#[derive(Clone)]
pub struct RouterOutputs {
    pub server: mpsc::Sender<ServerMsg>,
    pub wasm: mpsc::Sender<WasmMsg>,
    pub assets: mpsc::Sender<AssetMsg>,
}

pub struct RouterActor {
    layout: Layout,
    index: DependencyIndex,
    rx: mpsc::Receiver<RouterMsg>,
    out: RouterOutputs,
    pending: Coalescer,
    shutdown: Shutdown,
}

impl RouterActor {
    pub fn new(
        layout: Layout,
        rx: mpsc::Receiver<RouterMsg>,
        out: RouterOutputs,
        shutdown: Shutdown,
    ) -> Self {
        let index = DependencyIndex::new(&layout);
        Self {
            layout,
            index,
            rx,
            out,
            pending: Coalescer::new(),
            shutdown,
        }
    }

    pub async fn run(mut self) {
        loop {
            let sleep = self.pending.sleep_duration(Instant::now());
            tokio::select! {
                biased;
                _ = self.shutdown.wait() => break,
                msg = self.rx.recv() => match msg {
                    Some(msg) => {
                        if !self.handle(msg).await {
                            break;
                        }
                    }
                    None => {
                        // Watcher closed: flush what is left, then stop.
                        let rest = self.pending.drain();
                        self.dispatch(rest).await;
                        break;
                    }
                },
                _ = tokio::time::sleep(sleep) => {
                    let due = self.pending.take_due(Instant::now());
                    if !self.dispatch(due).await {
                        break;
                    }
                }
            }
        }
        crate::debug!("router"; "stopped");
    }

    /// Returns false once a downstream builder is gone.
    async fn handle(&mut self, msg: RouterMsg) -> bool {
        match msg {
            RouterMsg::File(event) => {
                let now = Instant::now();
                for route in route(&mut self.index, &self.layout, &event) {
                    match route {
                        Route::Asset(event) => {
                            if self.out.assets.send(AssetMsg::Ingest(event)).await.is_err() {
                                return false;
                            }
                        }
                        Route::Build { root, trigger } => self.pending.push(root, trigger, now),
                    }
                }
                true
            }
            RouterMsg::ScanComplete => self.out.assets.send(AssetMsg::ScanComplete).await.is_ok(),
            RouterMsg::BuildAll => {
                let now = Instant::now();
                for root in RootKind::ALL {
                    self.pending.push(root, None, now);
                }
                true
            }
        }
    }

    async fn dispatch(&mut self, due: Vec<(RootKind, Option<PathBuf>)>) -> bool {
        for (root, trigger) in due {
            if let Some(path) = &trigger {
                crate::debug!("router"; "{} build <- {}", root, display_relative(path, &self.layout.root));
            }
            let sent = match root {
                RootKind::Server => self.out.server.send(ServerMsg::Build { trigger }).await.is_ok(),
                RootKind::Wasm => self.out.wasm.send(WasmMsg::Build { trigger }).await.is_ok(),
            };
            if !sent {
                return false;
            }
        }
        true
    }
}
