//! Route file discovery.
//!
//! # Responsibilities
//! - Walk the routes root recursively
//! - Keep files with a recognized source extension
//! - Skip unreadable directories with a warning
//!
//! # Design Decisions
//! - Entries are sorted by file name, so re-scans of the same tree compare equal
//! - Depth is capped as a safety valve against symlink cycles

use std::path::{Path, PathBuf};

use thiserror::Error;
use walkdir::WalkDir;

/// Default recursion ceiling for route discovery.
pub const DEFAULT_MAX_DEPTH: usize = 32;

/// A discovered route-definition file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteFile {
    /// Absolute (or root-joined) path on disk.
    pub path: PathBuf,
    /// Path relative to the routes root, `/`-separated.
    pub relative: String,
}

impl RouteFile {
    pub fn new(root: &Path, path: PathBuf) -> Self {
        let relative = path
            .strip_prefix(root)
            .unwrap_or(&path)
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        Self { path, relative }
    }
}

/// Error raised when the routes root itself cannot be scanned.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("routes root {path:?} does not exist")]
    MissingRoot { path: PathBuf },

    #[error("routes root {path:?} is not readable: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Recursive file walker producing candidate route files.
#[derive(Debug, Clone)]
pub struct FileCollector {
    extensions: Vec<String>,
    max_depth: usize,
}

impl FileCollector {
    pub fn new(extensions: Vec<String>, max_depth: usize) -> Self {
        let extensions = extensions
            .into_iter()
            .map(|e| e.trim_start_matches('.').to_string())
            .collect();
        Self { extensions, max_depth }
    }

    /// Whether `path` carries one of the recognized extensions.
    pub fn is_candidate(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| self.extensions.iter().any(|x| x == e))
            .unwrap_or(false)
    }

    /// Collect every candidate file under `root`.
    pub fn collect(&self, root: &Path) -> Result<Vec<RouteFile>, ScanError> {
        if !root.exists() {
            return Err(ScanError::MissingRoot { path: root.to_path_buf() });
        }
        std::fs::read_dir(root).map_err(|source| ScanError::Unreadable {
            path: root.to_path_buf(),
            source,
        })?;

        let mut files = Vec::new();
        let walker = WalkDir::new(root)
            .follow_links(true)
            .max_depth(self.max_depth)
            .sort_by_file_name();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(
                        path = ?e.path(),
                        error = %e,
                        "Skipping unreadable entry during route scan"
                    );
                    continue;
                }
            };

            if entry.file_type().is_file() && self.is_candidate(entry.path()) {
                files.push(RouteFile::new(root, entry.into_path()));
            }
        }

        tracing::debug!(root = ?root, count = files.len(), "Route scan complete");
        Ok(files)
    }
}

impl Default for FileCollector {
    fn default() -> Self {
        Self::new(vec!["rs".to_string()], DEFAULT_MAX_DEPTH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "// route").unwrap();
    }

    #[test]
    fn test_collects_recursively_with_extension_filter() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "route.rs");
        touch(dir.path(), "users/[id]/route.rs");
        touch(dir.path(), "users/README.md");
        touch(dir.path(), "posts/get.rs");

        let files = FileCollector::default().collect(dir.path()).unwrap();
        let rel: Vec<&str> = files.iter().map(|f| f.relative.as_str()).collect();

        assert_eq!(rel, vec!["posts/get.rs", "route.rs", "users/[id]/route.rs"]);
        assert!(files.iter().all(|f| f.path.starts_with(dir.path())));
    }

    #[test]
    fn test_rescan_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "b/route.rs");
        touch(dir.path(), "a/route.rs");
        touch(dir.path(), "c/d/route.rs");

        let collector = FileCollector::default();
        let first = collector.collect(dir.path()).unwrap();
        let second = collector.collect(dir.path()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_depth_ceiling() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "a/route.rs");
        touch(dir.path(), "a/b/c/route.rs");

        let files = FileCollector::new(vec![".rs".into()], 2).collect(dir.path()).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].relative, "a/route.rs");
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_loop_and_dangling_link_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "a/route.rs");
        std::os::unix::fs::symlink(dir.path().join("a"), dir.path().join("a/loop")).unwrap();
        std::os::unix::fs::symlink(dir.path().join("gone.rs"), dir.path().join("a/dangling.rs")).unwrap();

        let files = FileCollector::default().collect(dir.path()).unwrap();
        let relative: Vec<&str> = files.iter().map(|f| f.relative.as_str()).collect();
        assert_eq!(relative, vec!["a/route.rs"]);
    }

    #[test]
    fn test_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let err = FileCollector::default()
            .collect(&dir.path().join("nope"))
            .unwrap_err();
        assert!(matches!(err, ScanError::MissingRoot { .. }));
    }
}
