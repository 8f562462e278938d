//! Reload coalescing.
//!
//! Requests within `RELOAD_WINDOW` of the first pending one merge into a
//! single reload. The coordinator fires a due reload only when nothing holds
//! it (a build in flight, a server awaiting ready, an open mode change).

use std::time::{Duration, Instant};

pub const RELOAD_WINDOW: Duration = Duration::from_millis(100);

#[derive(Debug)]
pub struct ReloadGate {
    window: Duration,
    /// First request not yet delivered.
    pending: Option<Instant>,
}

impl ReloadGate {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: None,
        }
    }

    pub fn request(&mut self, now: Instant) {
        self.pending.get_or_insert(now);
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Time left until the pending reload is due; `None` if nothing pending.
    pub fn sleep_duration(&self, now: Instant) -> Option<Duration> {
        self.pending
            .map(|first| (first + self.window).saturating_duration_since(now))
    }

    /// Consume the pending request if its window has passed.
    pub fn take_due(&mut self, now: Instant) -> bool {
        match self.pending {
            Some(first) if now >= first + self.window => {
                self.pending = None;
                true
            }
            _ => false,
        }
    }
}

impl Default for ReloadGate {
    fn default() -> Self {
        Self::new(RELOAD_WINDOW)
    }
}
