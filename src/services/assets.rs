//! Static asset lookup for the SPA fallback

use std::path::{Path, PathBuf};

use crate::http::mime;
use crate::logger;

/// A file the fallback route may serve
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    pub path: PathBuf,
    pub content_type: &'static str,
}

impl Asset {
    fn at(path: PathBuf) -> Self {
        let content_type = mime::get_content_type(path.extension().and_then(|e| e.to_str()));
        Self { path, content_type }
    }
}

pub trait AssetResolver: Send + Sync {
    /// Existing file for a request path, if any
    fn resolve(&self, request_path: &str) -> Option<Asset>;

    /// The SPA entry document
    fn entry_document(&self) -> Option<Asset>;
}

/// Serves files from one directory, typically the frontend build output
#[derive(Debug, Clone)]
pub struct StaticDirResolver {
    root: PathBuf,
    index_file: String,
}

impl StaticDirResolver {
    pub fn new(root: impl Into<PathBuf>, index_file: &str) -> Self {
        Self {
            root: root.into(),
            index_file: index_file.to_string(),
        }
    }

    fn canonical_root(&self) -> Option<PathBuf> {
        match self.root.canonicalize() {
            Ok(p) => Some(p),
            Err(e) => {
                logger::log_warning(&format!(
                    "Static directory not found or inaccessible '{}': {e}",
                    self.root.display()
                ));
                None
            }
        }
    }
}

impl AssetResolver for StaticDirResolver {
    fn resolve(&self, request_path: &str) -> Option<Asset> {
        let relative = request_path.trim_start_matches('/');
        if relative.is_empty() || relative.ends_with('/') {
            return None;
        }
        let root = self.canonical_root()?;

        // Missing files are the common case for client-side routes
        let candidate = Path::new(&self.root).join(relative).canonicalize().ok()?;
        if !candidate.starts_with(&root) {
            logger::log_warning(&format!(
                "Path traversal attempt blocked: {request_path} -> {}",
                candidate.display()
            ));
            return None;
        }
        candidate.is_file().then(|| Asset::at(candidate))
    }

    fn entry_document(&self) -> Option<Asset> {
        let index = self.root.join(&self.index_file);
        index.is_file().then(|| Asset::at(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<html>app</html>").unwrap();
        std::fs::create_dir(dir.path().join("assets")).unwrap();
        std::fs::write(dir.path().join("assets/app.js"), "console.log(1)").unwrap();
        dir
    }

    #[test]
    fn test_resolves_existing_asset() {
        let dir = build_dir();
        let resolver = StaticDirResolver::new(dir.path().join("."), "index.html");
        let asset = resolver.resolve("/assets/app.js").unwrap();
        assert!(asset.path.ends_with("assets/app.js"));
        assert_eq!(asset.content_type, "application/javascript; charset=utf-8");
    }

    #[test]
    fn test_client_routes_and_dirs_do_not_resolve() {
        let dir = build_dir();
        let resolver = StaticDirResolver::new(dir.path(), "index.html");
        assert!(resolver.resolve("/unknown/path").is_none());
        assert!(resolver.resolve("/assets").is_none());
        assert!(resolver.resolve("/").is_none());
    }

    #[test]
    fn test_traversal_is_blocked() {
        let outer = tempfile::tempdir().unwrap();
        std::fs::write(outer.path().join("secret.txt"), "s").unwrap();
        let root = outer.path().join("dist");
        std::fs::create_dir(&root).unwrap();

        let resolver = StaticDirResolver::new(&root, "index.html");
        assert!(resolver.resolve("/../secret.txt").is_none());
    }

    #[test]
    fn test_entry_document() {
        let dir = build_dir();
        let resolver = StaticDirResolver::new(dir.path(), "index.html");
        let entry = resolver.entry_document().unwrap();
        assert_eq!(entry.content_type, "text/html; charset=utf-8");

        let empty = tempfile::tempdir().unwrap();
        assert!(StaticDirResolver::new(empty.path(), "index.html").entry_document().is_none());
    }
}
