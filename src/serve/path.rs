//! URL to filesystem path resolution.

use std::path::{Path, PathBuf};

/// Resolve URL to a file under `serve_root`, handling `index.html` for directories.
///
/// Anything that escapes `serve_root` (dot-dot segments, symlinks) resolves
/// to `None`.
pub fn resolve_path(url: &str, serve_root: &Path) -> Option<PathBuf> {
    let clean = normalize_url(url);
    if clean.split('/').any(|seg| seg == "..") {
        return None;
    }

    let canonical = serve_root.join(&clean).canonicalize().ok()?;
    let root_canonical = serve_root.canonicalize().ok()?;
    if !canonical.starts_with(&root_canonical) {
        return None;
    }

    if canonical.is_file() {
        return Some(canonical);
    }
    if canonical.is_dir() {
        let index = canonical.join("index.html");
        if index.is_file() {
            return Some(index);
        }
    }
    None
}

/// Decode, strip query string and fragment, trim slashes.
pub fn normalize_url(url: &str) -> String {
    use percent_encoding::percent_decode_str;

    let path = url.split(['?', '#']).next().unwrap_or(url);
    let decoded = percent_decode_str(path)
        .decode_utf8()
        .map(std::borrow::Cow::into_owned)
        .unwrap_or_default();
    decoded.trim_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_normalize_url() {
        assert_eq!(normalize_url("/client.wasm?v=3"), "client.wasm");
        assert_eq!(normalize_url("/a%20b/c.css#top"), "a b/c.css");
        assert_eq!(normalize_url("/"), "");
    }

    #[test]
    fn test_resolve_index_and_files() {
        let dir = TempDir::new().unwrap();
        let public = dir.path().join("public");
        std::fs::create_dir_all(public.join("docs")).unwrap();
        std::fs::write(public.join("index.html"), "<html>").unwrap();
        std::fs::write(public.join("docs/index.html"), "<html>").unwrap();
        std::fs::write(public.join("style.css"), "a{}").unwrap();

        let root = public.canonicalize().unwrap();
        assert_eq!(resolve_path("/", &public), Some(root.join("index.html")));
        assert_eq!(resolve_path("/docs/", &public), Some(root.join("docs/index.html")));
        assert_eq!(resolve_path("/style.css", &public), Some(root.join("style.css")));
        assert_eq!(resolve_path("/missing.js", &public), None);
    }

    #[test]
    fn test_resolve_rejects_traversal() {
        let dir = TempDir::new().unwrap();
        let public = dir.path().join("public");
        std::fs::create_dir_all(&public).unwrap();
        std::fs::write(dir.path().join("secret.txt"), "x").unwrap();

        assert_eq!(resolve_path("/../secret.txt", &public), None);
        assert_eq!(resolve_path("/%2e%2e/secret.txt", &public), None);
    }
}
