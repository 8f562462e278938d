//! Actor Message Definitions
//!
//! Message types for inter-actor communication.
//!
//! ```text
//! FsActor --File--> Router --Build--> ServerBuilder ─┐
//!                      │    --Build--> WasmBuilder ──┼--results--> Coordinator --reload--> Browser
//!                      └--Ingest---> AssetBuilder ───┘
//! ```

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::oneshot;

use crate::core::{FileEvent, MediaType, OpId, OutputTarget, RootKind, ServerMode, WasmMode};

// =============================================================================
// Router Messages
// =============================================================================

/// Messages to the Router
#[derive(Debug)]
pub enum RouterMsg {
    /// Debounced file change from the watcher
    File(FileEvent),
    /// Initial walk finished; every existing file has been reported
    ScanComplete,
    /// Build every root (command or module change)
    BuildAll,
}

// =============================================================================
// Builder Messages
// =============================================================================

/// Messages to the ServerBuilder
#[derive(Debug)]
pub enum ServerMsg {
    /// Recompile and restart; `trigger` is the file that caused it
    Build { trigger: Option<PathBuf> },
    /// Stop, rebuild, start
    Restart,
    /// Switch between the internal static server and the user server
    SetMode(ServerMode),
    /// Supervised child exited without being asked to
    ChildExited { op: OpId, status: String },
}

/// Messages to the WasmBuilder
#[derive(Debug)]
pub enum WasmMsg {
    Build { trigger: Option<PathBuf> },
    /// Staged toolchain switch (see `CoordinatorMsg::LoaderStaged`)
    SetMode(WasmMode),
    SetOutput(OutputTarget),
    /// External servers read the artifact from disk
    ServerMode(ServerMode),
}

/// Messages to the AssetBuilder
#[derive(Debug)]
pub enum AssetMsg {
    /// A `.css` / `.js` file changed
    Ingest(FileEvent),
    /// Emit both bundles once the initial walk is done
    ScanComplete,
    /// Loader for the active WASM mode (adopted immediately)
    SetLoader(Arc<str>),
    /// Re-emit without a source change; a loader is adopted only on success
    Refresh {
        media: MediaType,
        loader: Option<Arc<str>>,
        cause: EmitCause,
    },
}

/// Why a bundle was emitted, echoed back in `AssetsEmitted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitCause {
    /// A source file changed (or the initial bundle)
    Source,
    /// Part of a WASM mode transaction
    Txn(TxnId),
    /// Rolling back the loader of an aborted transaction
    Restore,
}

/// Identifier of a WASM mode transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxnId(pub u64);

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn{}", self.0)
    }
}

// =============================================================================
// Coordinator Messages
// =============================================================================

/// Which builder a result comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Builder {
    Server,
    Wasm,
    Assets,
}

impl Builder {
    pub const ALL: [Self; 3] = [Self::Server, Self::Wasm, Self::Assets];

    pub const fn label(self) -> &'static str {
        match self {
            Self::Server => "server",
            Self::Wasm => "wasm",
            Self::Assets => "assets",
        }
    }
}

impl From<RootKind> for Builder {
    fn from(kind: RootKind) -> Self {
        match kind {
            RootKind::Server => Self::Server,
            RootKind::Wasm => Self::Wasm,
        }
    }
}

/// Messages to the Coordinator
#[derive(Debug)]
pub enum CoordinatorMsg {
    BuildStarted {
        builder: Builder,
        op: OpId,
    },
    BuildResult {
        builder: Builder,
        op: OpId,
        success: bool,
    },
    /// Server answers on its port (or internal server bound).
    /// `rebuilt` is false when a restart fell back to the previous binary.
    ServerReady {
        op: OpId,
        mode: ServerMode,
        rebuilt: bool,
    },
    /// Server not serving: probe timed out, child exited, or stopped
    ServerDown {
        op: OpId,
        reason: String,
    },
    /// Loader of the persisted WASM mode, sent once at startup
    LoaderReady {
        mode: WasmMode,
        loader: Arc<str>,
    },
    /// New-mode binary is staged; `commit` decides whether it goes live
    LoaderStaged {
        mode: WasmMode,
        loader: Arc<str>,
        commit: oneshot::Sender<bool>,
    },
    /// Mode transaction finished (committed or rolled back)
    ModeSettled {
        mode: WasmMode,
        committed: bool,
    },
    AssetsEmitted {
        media: MediaType,
        op: OpId,
        success: bool,
        cause: EmitCause,
    },
    /// WASM output target persisted by the WasmBuilder
    OutputChanged(OutputTarget),
    /// ServerBuilder switched modes
    ServerModeChanged(ServerMode),
    /// Control request from the console / external agents
    Command {
        command: crate::actor::coordinator::Command,
        reply: oneshot::Sender<String>,
    },
}
