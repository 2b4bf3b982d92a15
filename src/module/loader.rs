//! Module loading and caching.
//!
//! # Responsibilities
//! - Resolve route files into modules through a [`ModuleSource`]
//! - Cache modules per file path in production mode
//! - Load whole batches concurrently, isolating per-file failures
//!
//! # Design Decisions
//! - The cache is owned by the loader, which is owned by the app (no globals)
//! - Concurrent first loads of one path are not deduplicated; the second
//!   write replaces the first with an equivalent module
//! - Diagnostics are attached after the failure, never required for it

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use futures_util::future::join_all;
use thiserror::Error;

use crate::config::Mode;
use crate::module::diagnostics::{extract_location, with_source_line, SourceLocation};
use crate::module::manifest::{ModuleSource, SourceFailure};
use crate::module::RouteModule;
use crate::observability::metrics;
use crate::routing::collector::RouteFile;

/// A route file that could not be turned into a module.
#[derive(Debug, Error)]
pub enum ModuleLoadError {
    #[error("no module registered for route file {path:?}")]
    Unregistered { path: PathBuf },

    #[error("route module {path:?} failed to initialize: {source}")]
    Failed {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
        location: Option<SourceLocation>,
    },

    #[error("route module {path:?} panicked during initialization: {message}")]
    Panicked {
        path: PathBuf,
        message: String,
        location: Option<SourceLocation>,
    },
}

impl ModuleLoadError {
    pub fn path(&self) -> &PathBuf {
        match self {
            ModuleLoadError::Unregistered { path }
            | ModuleLoadError::Failed { path, .. }
            | ModuleLoadError::Panicked { path, .. } => path,
        }
    }

    pub fn location(&self) -> Option<&SourceLocation> {
        match self {
            ModuleLoadError::Unregistered { .. } => None,
            ModuleLoadError::Failed { location, .. } | ModuleLoadError::Panicked { location, .. } => {
                location.as_ref()
            }
        }
    }
}

/// Outcome of loading one file in a batch.
pub struct LoadOutcome {
    pub file: RouteFile,
    pub result: Result<Arc<RouteModule>, ModuleLoadError>,
}

/// Loads route modules, optionally caching them for the process lifetime.
pub struct ModuleLoader {
    source: Arc<dyn ModuleSource>,
    cache: DashMap<PathBuf, Arc<RouteModule>>,
    caching: bool,
    evaluations: AtomicUsize,
}

impl ModuleLoader {
    pub fn new(source: Arc<dyn ModuleSource>, mode: Mode) -> Self {
        Self {
            source,
            cache: DashMap::new(),
            caching: mode.is_production(),
            evaluations: AtomicUsize::new(0),
        }
    }

    /// Whether successful loads are cached.
    pub fn is_caching(&self) -> bool {
        self.caching
    }

    /// Number of times a module source was actually evaluated.
    pub fn evaluations(&self) -> usize {
        self.evaluations.load(Ordering::Relaxed)
    }

    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
        tracing::debug!("Module cache cleared");
    }

    /// Load a single route file.
    pub async fn load(&self, file: &RouteFile) -> Result<Arc<RouteModule>, ModuleLoadError> {
        if self.caching {
            if let Some(module) = self.cache.get(&file.path) {
                return Ok(module.clone());
            }
        }

        self.evaluations.fetch_add(1, Ordering::Relaxed);
        let result = self.source.load(file).await;

        match result {
            Ok(module) => {
                let module = Arc::new(module);
                if self.caching {
                    self.cache.insert(file.path.clone(), module.clone());
                }
                metrics::record_module_load("ok");
                Ok(module)
            }
            Err(failure) => {
                metrics::record_module_load("error");
                Err(self.describe(file, failure).await)
            }
        }
    }

    /// Load every file concurrently; completes once all loads have settled.
    ///
    /// Outcomes are returned in the order of `files`.
    pub async fn load_all(&self, files: &[RouteFile]) -> Vec<LoadOutcome> {
        let loads = files.iter().map(|file| async move {
            LoadOutcome {
                file: file.clone(),
                result: self.load(file).await,
            }
        });
        join_all(loads).await
    }

    async fn describe(&self, file: &RouteFile, failure: SourceFailure) -> ModuleLoadError {
        let path = file.path.clone();
        match failure {
            SourceFailure::Unregistered => ModuleLoadError::Unregistered { path },
            SourceFailure::Failed(source) => {
                let text = format!("{:?}", source);
                let location = locate(&text, file).await;
                ModuleLoadError::Failed { path, source, location }
            }
            SourceFailure::Panicked { message, location } => {
                let location = match location {
                    Some(loc) if loc.file.ends_with(&file.relative) => {
                        Some(with_source_line(loc, &file.path).await)
                    }
                    Some(loc) => Some(loc),
                    None => locate(&message, file).await,
                };
                ModuleLoadError::Panicked { path, message, location }
            }
        }
    }
}

async fn locate(text: &str, file: &RouteFile) -> Option<SourceLocation> {
    let loc = extract_location(text, &file.relative)?;
    if loc.file.ends_with(&file.relative) {
        Some(with_source_line(loc, &file.path).await)
    } else {
        Some(loc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::Manifest;

    fn file(relative: &str) -> RouteFile {
        RouteFile {
            path: PathBuf::from("/routes").join(relative),
            relative: relative.to_string(),
        }
    }

    fn manifest() -> Manifest {
        Manifest::new()
            .module("a/route.rs", || Ok(RouteModule::new().get(|_req| async { Ok("a") })))
            .module("b/route.rs", || Err(anyhow::anyhow!("b is broken")))
            .module("c/route.rs", || Ok(RouteModule::new().get(|_req| async { Ok("c") })))
    }

    #[tokio::test]
    async fn test_production_caches_by_path() {
        let loader = ModuleLoader::new(Arc::new(manifest()), Mode::Production);
        let f = file("a/route.rs");

        let first = loader.load(&f).await.unwrap();
        let second = loader.load(&f).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(loader.evaluations(), 1);
        assert_eq!(loader.cached(), 1);

        loader.clear_cache();
        let third = loader.load(&f).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(loader.evaluations(), 2);
    }

    #[tokio::test]
    async fn test_development_bypasses_cache() {
        let loader = ModuleLoader::new(Arc::new(manifest()), Mode::Development);
        let f = file("a/route.rs");

        loader.load(&f).await.unwrap();
        loader.load(&f).await.unwrap();

        assert_eq!(loader.evaluations(), 2);
        assert_eq!(loader.cached(), 0);
    }

    #[tokio::test]
    async fn test_batch_isolates_failures() {
        let loader = ModuleLoader::new(Arc::new(manifest()), Mode::Production);
        let files = vec![file("a/route.rs"), file("b/route.rs"), file("c/route.rs"), file("d/route.rs")];

        let outcomes = loader.load_all(&files).await;
        assert_eq!(outcomes.len(), 4);

        let ok: Vec<&str> = outcomes
            .iter()
            .filter(|o| o.result.is_ok())
            .map(|o| o.file.relative.as_str())
            .collect();
        assert_eq!(ok, vec!["a/route.rs", "c/route.rs"]);

        match &outcomes[1].result {
            Err(ModuleLoadError::Failed { path, .. }) => assert!(path.ends_with("b/route.rs")),
            _ => panic!("expected b to fail"),
        }
        assert!(matches!(outcomes[3].result, Err(ModuleLoadError::Unregistered { .. })));
    }

    #[tokio::test]
    async fn test_failure_location_is_enriched() {
        let dir = tempfile::tempdir().unwrap();
        let route = dir.path().join("x/route.rs");
        std::fs::create_dir_all(route.parent().unwrap()).unwrap();
        std::fs::write(&route, "fn module() {\n    let port: u16 = \"abc\";\n}\n").unwrap();

        let manifest = Manifest::new().module("x/route.rs", || {
            Err(anyhow::anyhow!("invalid value at routes/x/route.rs:2:21"))
        });
        let loader = ModuleLoader::new(Arc::new(manifest), Mode::Development);
        let f = RouteFile::new(dir.path(), route);

        let err = loader.load(&f).await.unwrap_err();
        let loc = err.location().unwrap();
        assert_eq!((loc.line, loc.column), (2, 21));
        assert_eq!(loc.source_line.as_deref(), Some("    let port: u16 = \"abc\";"));
    }

    #[tokio::test]
    async fn test_panic_keeps_raise_site() {
        let manifest = Manifest::new().module("p/route.rs", || {
            let ports: Vec<u16> = Vec::new();
            if ports.is_empty() {
                panic!("no ports configured");
            }
            Ok(RouteModule::new())
        });
        let loader = ModuleLoader::new(Arc::new(manifest), Mode::Development);

        let err = loader.load(&file("p/route.rs")).await.unwrap_err();
        match &err {
            ModuleLoadError::Panicked { message, .. } => assert_eq!(message, "no ports configured"),
            other => panic!("expected a panic failure, got {other:?}"),
        }
        let loc = err.location().unwrap();
        assert!(loc.file.ends_with("loader.rs"), "{loc}");
        assert!(loc.line > 0);
    }
}
