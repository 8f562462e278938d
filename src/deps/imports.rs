//! Go source header parsing: module path and import declarations.
//!
//! Only the file header matters: Go requires imports before any other
//! top-level declaration, so parsing stops at the first `func`, `type`,
//! `var` or `const`.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

static BLOCK_COMMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)/\*.*?\*/").unwrap());
static LINE_COMMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"//[^\n]*").unwrap());
static FIRST_DECL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^(?:func|type|var|const)\b").unwrap());
static IMPORT_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bimport\s*\(([^)]*)\)").unwrap());
static IMPORT_SINGLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^\s*import\s+(?:[\w.]+\s+)?["`]([^"`]+)["`]"#).unwrap()
});
static QUOTED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"["`]([^"`]+)["`]"#).unwrap());
static MODULE_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?m)^\s*module\s+"?([^"\s]+)"?"#).unwrap());

fn strip_comments(source: &str) -> String {
    let source = BLOCK_COMMENT.replace_all(source, " ");
    LINE_COMMENT.replace_all(&source, "").into_owned()
}

/// Import paths declared by a Go source file, in declaration order.
pub fn parse_imports(source: &str) -> Vec<String> {
    let source = strip_comments(source);
    let header = match FIRST_DECL.find(&source) {
        Some(m) => &source[..m.start()],
        None => &source,
    };

    let mut imports = Vec::new();
    for block in IMPORT_BLOCK.captures_iter(header) {
        imports.extend(QUOTED.captures_iter(&block[1]).map(|c| c[1].to_string()));
    }
    let without_blocks = IMPORT_BLOCK.replace_all(header, "");
    imports.extend(
        IMPORT_SINGLE
            .captures_iter(&without_blocks)
            .map(|c| c[1].to_string()),
    );
    imports
}

/// Imports of a file on disk. Unreadable files have none.
pub fn read_imports(path: &Path) -> Vec<String> {
    match std::fs::read_to_string(path) {
        Ok(source) => parse_imports(&source),
        Err(e) => {
            crate::debug!("deps"; "cannot read {}: {}", path.display(), e);
            Vec::new()
        }
    }
}

/// `module` path declared in go.mod content.
pub fn parse_module_path(go_mod: &str) -> Option<String> {
    let source = strip_comments(go_mod);
    MODULE_LINE
        .captures(&source)
        .map(|c| c[1].to_string())
}
