//! Core types shared by every pipeline stage.
//!
//! - `event`: normalized filesystem events
//! - `root`: build roots (server / wasm entry points)
//! - `mode`: WASM toolchain mode, output target and server mode
//! - `state`: process-wide shutdown signal
//! - `artifact`: in-memory WASM binary

mod artifact;
mod event;
mod mode;
mod root;
mod state;

pub use artifact::MemoryArtifact;
pub use event::{FileEvent, FileEventKind, MediaType};
pub use mode::{OutputTarget, ServerMode, WasmMode};
pub use root::{BuildRoot, RootKind};
pub use state::{Shutdown, setup_shutdown_handler};

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifier of one build attempt, unique per builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
pub struct OpId(pub u64);

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Monotonic op id source owned by a single builder.
#[derive(Debug, Default)]
pub struct OpCounter(AtomicU64);

impl OpCounter {
    pub const fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn next(&self) -> OpId {
        OpId(self.0.fetch_add(1, Ordering::Relaxed) + 1)
    }
}
