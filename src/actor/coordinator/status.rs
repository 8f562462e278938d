//! Pipeline status snapshot, published on a `watch` channel.

use serde::Serialize;

use crate::actor::builder::BuilderState;
use crate::actor::messages::Builder;
use crate::core::{OpId, ServerMode, WasmMode};

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct BuilderStatus {
    pub state: BuilderState,
    pub last_op: Option<OpId>,
    pub last_success: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Status {
    pub server: BuilderStatus,
    pub wasm: BuilderStatus,
    pub assets: BuilderStatus,
    pub server_mode: ServerMode,
    pub wasm_mode: WasmMode,
    /// A mode change is staged and not yet committed or rolled back.
    pub wasm_mode_pending: Option<WasmMode>,
    pub build_on_disk: bool,
    pub url: Option<String>,
    pub livereload_port: u16,
    pub reloads: u64,
}

impl Status {
    pub fn builder_mut(&mut self, builder: Builder) -> &mut BuilderStatus {
        match builder {
            Builder::Server => &mut self.server,
            Builder::Wasm => &mut self.wasm,
            Builder::Assets => &mut self.assets,
        }
    }

    pub fn builder(&self, builder: Builder) -> &BuilderStatus {
        match builder {
            Builder::Server => &self.server,
            Builder::Wasm => &self.wasm,
            Builder::Assets => &self.assets,
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|e| format!("{{\"error\":\"{e}\"}}"))
    }
}
