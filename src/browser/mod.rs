//! Browser drivers.
//!
//! The coordinator only talks to the [`Browser`] trait: it opens the app
//! once the server first reports ready and asks for a reload whenever a
//! consistent set of artifacts is on disk.

mod livereload;

pub use livereload::LiveReload;

/// Something that shows the app and can be told to reload it.
pub trait Browser: Send {
    fn open(&mut self, port: u16, https: bool);
    fn reload(&mut self);
    fn close(&mut self);
}

/// App URL for a local port.
pub fn app_url(port: u16, https: bool) -> String {
    let scheme = if https { "https" } else { "http" };
    format!("{scheme}://localhost:{port}")
}

/// No page to drive: one-shot builds.
#[derive(Debug, Default)]
pub struct Headless;

impl Browser for Headless {
    fn open(&mut self, port: u16, https: bool) {
        crate::debug!("browser"; "headless, not opening {}", app_url(port, https));
    }

    fn reload(&mut self) {}

    fn close(&mut self) {}
}

#[cfg(test)]
pub(crate) mod recording {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::Browser;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub(crate) enum Call {
        Open(u16, bool),
        Reload,
        Close,
    }

    /// Records calls; clones share the log.
    #[derive(Debug, Clone, Default)]
    pub(crate) struct RecordingBrowser {
        calls: Arc<Mutex<Vec<Call>>>,
    }

    impl RecordingBrowser {
        pub(crate) fn calls(&self) -> Vec<Call> {
            self.calls.lock().clone()
        }

        pub(crate) fn reloads(&self) -> usize {
            self.calls.lock().iter().filter(|c| **c == Call::Reload).count()
        }
    }

    impl Browser for RecordingBrowser {
        fn open(&mut self, port: u16, https: bool) {
            self.calls.lock().push(Call::Open(port, https));
        }

        fn reload(&mut self) {
            self.calls.lock().push(Call::Reload);
        }

        fn close(&mut self) {
            self.calls.lock().push(Call::Close);
        }
    }
}
