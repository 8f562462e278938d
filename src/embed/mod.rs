//! Embedded static resources.
//!
//! # Module Structure
//!
//! - `template` - Template types for typed variable injection
//! - `runtime` - Client runtime initializer appended to the JS bundle
//!
//! # Usage
//!
//! ```ignore
//! use embed::runtime::{RUNTIME_JS, RuntimeVars};
//!
//! let js = RUNTIME_JS.render(&RuntimeVars { wasm_url: "/client.wasm".into(), livereload_port: 35729 });
//! ```

mod template;

pub use template::{Template, TemplateVars};

pub mod runtime {
    use super::{Template, TemplateVars};

    /// Variables for runtime.js template.
    pub struct RuntimeVars {
        pub wasm_url: String,
        /// `0` disables the live reload socket.
        pub livereload_port: u16,
    }

    impl TemplateVars for RuntimeVars {
        fn bindings(&self) -> Vec<(&'static str, String)> {
            let url = serde_json::to_string(&self.wasm_url).unwrap_or_else(|_| "\"\"".into());
            vec![
                ("WASM_URL", url),
                ("LIVERELOAD_PORT", self.livereload_port.to_string()),
            ]
        }
    }

    /// Instantiates `client.wasm` through the loader and listens for reloads.
    pub const RUNTIME_JS: Template<RuntimeVars> =
        Template::new(include_str!("runtime.js"));
}

#[cfg(test)]
mod tests {
    use super::runtime::{RUNTIME_JS, RuntimeVars};

    #[test]
    fn test_runtime_render() {
        let js = RUNTIME_JS.render(&RuntimeVars {
            wasm_url: "/client.wasm".into(),
            livereload_port: 4000,
        });
        assert!(js.contains("\"/client.wasm\""));
        assert!(js.contains("var livereloadPort = 4000;"));
        assert!(!js.contains("__"));
    }
}
