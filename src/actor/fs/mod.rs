//! FileSystem Actor
//!
//! Watches every directory of the project and sends debounced `FileEvent`s to
//! the Router. Implements the "Watcher-First" pattern: directories are
//! subscribed before the initial walk is reported, so no change is lost
//! between the walk and the first notification.
//!
//! Architecture:
//! ```text
//! notify ──> bridge thread ──> map_event ──> ignore ──> Debouncer ──> RouterMsg
//!                                  │
//!                                  └─ directory create / remove ──> (un)subscribe
//! ```

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use notify::RecommendedWatcher;
use tokio::sync::mpsc;

use super::messages::RouterMsg;
use crate::core::{FileEvent, FileEventKind, Shutdown};

// Pure timing and per-path coalescing.
mod debouncer;
// Ignore predicate and the shared unobserved list.
mod ignore;
// notify event translation.
mod mapping;
// Per-directory subscriptions and tree walking.
mod subscriptions;

#[cfg(test)]
mod tests;

pub use ignore::{IgnoreList, is_ignored_name};

use debouncer::Debouncer;
use mapping::map_event;
use subscriptions::{Subscriptions, walk};

type RawEvent = notify::Result<notify::Event>;

/// FileSystem Actor - watches for file changes
pub struct FsActor {
    root: PathBuf,
    ignore: IgnoreList,
    /// Watcher handle (must be kept alive)
    watcher: RecommendedWatcher,
    /// Callback side of notify (sync -> async bridge)
    raw_rx: crossbeam::channel::Receiver<RawEvent>,
    subs: Subscriptions,
    debouncer: Debouncer,
    /// Files found by the initial walk, reported as synthetic creates
    initial: Vec<PathBuf>,
    out: mpsc::Sender<RouterMsg>,
    shutdown: Shutdown,
}

impl FsActor {
    /// Subscribe the whole tree under `root`.
    ///
    /// An unreadable root is fatal; everything below it is best effort.
    pub fn start(
        root: &Path,
        ignore: IgnoreList,
        out: mpsc::Sender<RouterMsg>,
        shutdown: Shutdown,
    ) -> Result<Self> {
        let (raw_tx, raw_rx) = crossbeam::channel::unbounded();
        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = raw_tx.send(res);
        })
        .context("failed to create file watcher")?;

        let tree = walk(root, &ignore)?;
        let mut subs = Subscriptions::new();
        for dir in &tree.dirs {
            subs.subscribe(&mut watcher, dir);
        }
        crate::debug!("watch"; "watching {} directories, {} files", subs.len(), tree.files.len());

        Ok(Self {
            root: root.to_path_buf(),
            ignore,
            watcher,
            raw_rx,
            subs,
            debouncer: Debouncer::new(),
            initial: tree.files,
            out,
            shutdown,
        })
    }

    /// Run the actor event loop
    pub async fn run(self) {
        let Self {
            root,
            ignore,
            mut watcher,
            raw_rx,
            mut subs,
            mut debouncer,
            initial,
            out,
            shutdown,
        } = self;

        let (async_tx, mut async_rx) = mpsc::channel::<notify::Event>(256);

        // Poll notify events on a plain thread; exits when the watcher drops.
        std::thread::spawn(move || {
            while let Ok(result) = raw_rx.recv() {
                match result {
                    Ok(event) => {
                        if async_tx.blocking_send(event).is_err() {
                            break; // Receiver dropped
                        }
                    }
                    Err(e) => crate::warn!("watch"; "notify error: {}", e),
                }
            }
        });

        let mut tree = TreeState {
            ignore: &ignore,
            watcher: &mut watcher,
            subs: &mut subs,
            debouncer: &mut debouncer,
        };

        if report_initial(&out, initial).await.is_err() {
            return;
        }
        crate::debug!("watch"; "initial scan of {} complete", root.display());

        loop {
            tokio::select! {
                biased;
                _ = shutdown.wait() => break,
                Some(event) = async_rx.recv() => tree.on_raw(&event),
                _ = tokio::time::sleep(tree.debouncer.sleep_duration(Instant::now())) => {
                    if flush(&mut *tree.debouncer, &out).await.is_err() {
                        break;
                    }
                }
            }
        }

        tree.subs.clear(&mut *tree.watcher);
        crate::debug!("watch"; "stopped");
        // Dropping `watcher` ends the bridge thread; dropping `out` closes the router input.
    }
}

/// Mutable watcher state threaded through raw event handling.
struct TreeState<'a> {
    ignore: &'a IgnoreList,
    watcher: &'a mut RecommendedWatcher,
    subs: &'a mut Subscriptions,
    debouncer: &'a mut Debouncer,
}

impl TreeState<'_> {
    fn on_raw(&mut self, event: &notify::Event) {
        crate::debug!("watch"; "raw notify: {:?} {:?}", event.kind, event.paths);
        let now = Instant::now();

        for (path, kind) in map_event(event) {
            if self.ignore.is_ignored(&path) {
                continue;
            }
            if kind.is_arrival() && path.is_dir() {
                self.attach_tree(&path, now);
                continue;
            }
            if kind.is_removal() && self.subs.is_subscribed(&path) {
                let n = self.subs.unsubscribe_tree(&mut *self.watcher, &path);
                crate::debug!("watch"; "released {} subscriptions under {}", n, path.display());
                continue;
            }
            if path.is_dir() {
                continue;
            }
            self.debouncer.add(path, kind, now);
        }
    }

    /// New directory: subscribe it and its subtree, report files inside.
    fn attach_tree(&mut self, dir: &Path, now: Instant) {
        match walk(dir, self.ignore) {
            Ok(tree) => {
                for d in &tree.dirs {
                    self.subs.subscribe(&mut *self.watcher, d);
                }
                for file in tree.files {
                    self.debouncer.add(file, FileEventKind::Create, now);
                }
            }
            Err(e) => crate::debug!("watch"; "directory vanished before walk: {:#}", e),
        }
    }
}

async fn report_initial(out: &mpsc::Sender<RouterMsg>, files: Vec<PathBuf>) -> Result<(), ()> {
    for file in files {
        let event = FileEvent::now(file, FileEventKind::Create);
        out.send(RouterMsg::File(event)).await.map_err(|_| ())?;
    }
    out.send(RouterMsg::ScanComplete).await.map_err(|_| ())
}

/// Send every path that has been quiet for a full window.
///
/// Returns `Err(())` if the router shut down.
async fn flush(debouncer: &mut Debouncer, out: &mpsc::Sender<RouterMsg>) -> Result<(), ()> {
    if debouncer.is_empty() {
        return Ok(());
    }
    for event in debouncer.take_ready(Instant::now()) {
        out.send(RouterMsg::File(event)).await.map_err(|_| ())?;
    }
    Ok(())
}
