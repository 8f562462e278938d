//! Configuration section definitions.

mod serve;
mod toolchain;

pub use serve::ServeConfig;
pub use toolchain::ToolchainConfig;
