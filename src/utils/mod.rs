//! Utility modules shared by the builders.

pub mod exec;
pub mod fs;
pub mod mime;
pub mod path;
