//! In-memory WASM artifact shared between the WASM builder and the
//! internal static server.

use std::sync::Arc;

use arc_swap::ArcSwapOption;

/// Latest `client.wasm` bytes when the output target is memory.
///
/// Readers get a consistent snapshot: a swap replaces the whole binary.
#[derive(Debug, Clone, Default)]
pub struct MemoryArtifact(Arc<ArcSwapOption<Vec<u8>>>);

impl MemoryArtifact {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, bytes: Vec<u8>) {
        self.0.store(Some(Arc::new(bytes)));
    }

    pub fn clear(&self) {
        self.0.store(None);
    }

    pub fn load(&self) -> Option<Arc<Vec<u8>>> {
        self.0.load_full()
    }
}
