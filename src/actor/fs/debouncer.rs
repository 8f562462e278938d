use std::path::PathBuf;
use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;

use crate::core::{FileEvent, FileEventKind};

pub(super) const DEBOUNCE_MS: u64 = 100;

/// Idle sleep when nothing is pending.
const IDLE: Duration = Duration::from_secs(86400);

#[derive(Debug, Clone, Copy)]
pub(super) struct Pending {
    pub(super) kind: FileEventKind,
    pub(super) last: Instant,
}

/// Pure per-path debouncer: only handles timing and event coalescing.
///
/// Events for one path within the window merge; the survivor carries the
/// kind and timestamp of the last one. A path is released once it has been
/// quiet for the full window.
pub(super) struct Debouncer {
    pub(super) pending: FxHashMap<PathBuf, Pending>,
    window: Duration,
}

impl Debouncer {
    pub(super) fn new() -> Self {
        Self::with_window(Duration::from_millis(DEBOUNCE_MS))
    }

    pub(super) fn with_window(window: Duration) -> Self {
        Self {
            pending: FxHashMap::default(),
            window,
        }
    }

    pub(super) fn add(&mut self, path: PathBuf, kind: FileEventKind, at: Instant) {
        let kind = match self.pending.get(&path) {
            // Deleted then recreated (unlink + create saves): content changed.
            Some(prev) if prev.kind.is_removal() && kind.is_arrival() => FileEventKind::Write,
            _ => kind,
        };
        crate::debug!("watch"; "event {}: {}", kind.label(), path.display());
        self.pending.insert(path, Pending { kind, last: at });
    }

    /// Release every path quiet for a full window, oldest first.
    pub(super) fn take_ready(&mut self, now: Instant) -> Vec<FileEvent> {
        let window = self.window;
        let mut ready = Vec::new();
        self.pending.retain(|path, p| {
            if now.saturating_duration_since(p.last) >= window {
                ready.push(FileEvent::new(path.clone(), p.kind, p.last));
                false
            } else {
                true
            }
        });
        ready.sort_by_key(|e| e.at);
        ready
    }

    /// Precise sleep duration until the next path becomes ready.
    pub(super) fn sleep_duration(&self, now: Instant) -> Duration {
        self.pending
            .values()
            .map(|p| self.window.saturating_sub(now.saturating_duration_since(p.last)))
            .min()
            .map_or(IDLE, |d| d.max(Duration::from_millis(1)))
    }

    pub(super) fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
