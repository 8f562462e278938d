use std::path::PathBuf;
use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;

use crate::core::RootKind;

pub(super) const COALESCE_MS: u64 = 100;

const IDLE: Duration = Duration::from_secs(86400);

#[derive(Debug)]
struct Pending {
    first: Instant,
    /// Latest triggering file, kept for logging.
    trigger: Option<PathBuf>,
}

/// Per-root build request coalescing.
///
/// Unlike the watcher's debouncer the window is measured from the first
/// request, so a steady stream of edits still builds every 100 ms.
pub(super) struct Coalescer {
    pending: FxHashMap<RootKind, Pending>,
    window: Duration,
}

impl Coalescer {
    pub(super) fn new() -> Self {
        Self {
            pending: FxHashMap::default(),
            window: Duration::from_millis(COALESCE_MS),
        }
    }

    pub(super) fn push(&mut self, kind: RootKind, trigger: Option<PathBuf>, now: Instant) {
        self.pending
            .entry(kind)
            .and_modify(|p| {
                if trigger.is_some() {
                    p.trigger.clone_from(&trigger);
                }
            })
            .or_insert(Pending {
                first: now,
                trigger,
            });
    }

    /// Requests whose window has elapsed, in `RootKind` order.
    pub(super) fn take_due(&mut self, now: Instant) -> Vec<(RootKind, Option<PathBuf>)> {
        let window = self.window;
        let mut due: Vec<_> = self
            .pending
            .iter()
            .filter(|(_, p)| now.saturating_duration_since(p.first) >= window)
            .map(|(&kind, _)| kind)
            .collect();
        due.sort();
        due.into_iter()
            .filter_map(|kind| self.pending.remove(&kind).map(|p| (kind, p.trigger)))
            .collect()
    }

    /// Everything still pending, regardless of the window.
    pub(super) fn drain(&mut self) -> Vec<(RootKind, Option<PathBuf>)> {
        let mut all: Vec<_> = self.pending.drain().map(|(k, p)| (k, p.trigger)).collect();
        all.sort_by_key(|(k, _)| *k);
        all
    }

    pub(super) fn sleep_duration(&self, now: Instant) -> Duration {
        self.pending
            .values()
            .map(|p| self.window.saturating_sub(now.saturating_duration_since(p.first)))
            .min()
            .map_or(IDLE, |d| d.max(Duration::from_millis(1)))
    }

    pub(super) fn is_pending(&self, kind: RootKind) -> bool {
        self.pending.contains_key(&kind)
    }
}
