//! CSS / JS bundling and minification.

pub mod bundle;
pub mod minify;

pub use bundle::Bundle;
