//! Actor system for the dev loop.
//!
//! Message-passing concurrency, one tokio task per stage:
//!
//! ```text
//! FsActor --> RouterActor --> Server/Wasm/AssetBuilder --> Coordinator --> Browser
//! (watch)     (ownership)         (build, supervise)        (reload gate)
//! ```
//!
//! # Module Structure
//!
//! - `messages` - Message types for inter-actor communication
//! - `fs` - File system watcher with debouncing
//! - `router` - Dependency index and build coalescing
//! - `builder` - Server, WASM and asset builders
//! - `coordinator` - Reload decisions, commands and status
//! - `pipeline` - Wires up and runs actors

pub mod builder;
pub mod coordinator;
pub mod fs;
pub mod messages;
pub mod pipeline;
pub mod router;

pub use coordinator::{Command, CoordinatorHandle};
pub use pipeline::{Pipeline, PipelineMode};
