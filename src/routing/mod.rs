//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Route discovery (at boot and on hot reload):
//!     routes root
//!     → collector.rs (walk, filter by extension, sorted)
//!     → path.rs (file → RouteTemplate, or skip)
//!     → module::ModuleLoader (all files concurrently)
//!     → registrar.rs (exports → MethodRouter per template)
//!     → axum Router + RegistrationReport
//! ```
//!
//! # Design Decisions
//! - A bad route file is logged and skipped, never fatal
//! - Registration runs after every load has settled, in collector order,
//!   so the result does not depend on load timing

pub mod collector;
pub mod path;
pub mod registrar;

use std::path::Path;

use axum::Router;

use crate::config::RoutesConfig;
use crate::module::ModuleLoader;
use crate::observability::metrics;

pub use collector::{FileCollector, RouteFile, ScanError};
pub use path::{map_path, Naming, RouteTemplate};
pub use registrar::{LoadedRoute, RegistrationReport, RouteRegistrar};

/// Scan, load and register every route under `settings.root`.
///
/// A missing or unreadable routes root yields an empty router.
pub async fn load_routes(
    settings: &RoutesConfig,
    loader: &ModuleLoader,
    registrar: &RouteRegistrar,
) -> (Router, RegistrationReport) {
    let root = Path::new(&settings.root);
    let collector = FileCollector::new(settings.extensions.clone(), settings.max_depth);

    let files = match collector.collect(root) {
        Ok(files) => files,
        Err(e) => {
            tracing::warn!(error = %e, "Route discovery failed, no routes mounted");
            Vec::new()
        }
    };

    let mut mapped = Vec::with_capacity(files.len());
    for file in files {
        match map_path(root, &file.path, &settings.base_route, settings.naming, &settings.marker_file) {
            Some(template) => mapped.push((file, template)),
            None => tracing::trace!(file = %file.relative, "Not a route file"),
        }
    }

    let candidates: Vec<RouteFile> = mapped.iter().map(|(f, _)| f.clone()).collect();
    let outcomes = loader.load_all(&candidates).await;

    let mut loaded = Vec::with_capacity(outcomes.len());
    let mut failures = Vec::new();
    for (outcome, (_, template)) in outcomes.into_iter().zip(mapped) {
        match outcome.result {
            Ok(module) => {
                let method = match settings.naming {
                    Naming::MethodFiles => path::file_method(&outcome.file.path),
                    Naming::Marker => None,
                };
                loaded.push(LoadedRoute {
                    file: outcome.file,
                    template,
                    method,
                    module,
                });
            }
            Err(e) => {
                match e.location() {
                    Some(location) => tracing::error!(
                        file = %outcome.file.relative,
                        location = %location,
                        error = %e,
                        "Failed to load route module"
                    ),
                    None => tracing::error!(file = %outcome.file.relative, error = %e, "Failed to load route module"),
                }
                failures.push(e);
            }
        }
    }

    let (router, mut report) = registrar.register(loaded);
    report.failures = failures;
    metrics::record_routes_registered(report.registered());
    for (template, methods) in registrar::route_table(&report) {
        let methods: Vec<&str> = methods.iter().map(|m| m.as_str()).collect();
        tracing::debug!(route = %template, methods = ?methods, "Route mounted");
    }
    tracing::info!(
        registered = report.registered(),
        conflicts = report.conflicts.len(),
        failed = report.failures.len(),
        "Routes loaded"
    );
    (router, report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Mode;
    use crate::http::adapter::Dispatch;
    use crate::module::{Manifest, RouteModule};
    use std::sync::Arc;

    fn touch(root: &Path, relative: &str) {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, "// route").unwrap();
    }

    #[tokio::test]
    async fn test_bad_file_is_isolated() {
        let dir = tempfile::tempdir().unwrap();
        for f in ["a/route.rs", "b/route.rs", "c/route.rs", "c/helper.rs"] {
            touch(dir.path(), f);
        }
        let manifest = Manifest::new()
            .module("a/route.rs", || Ok(RouteModule::new().get(|_req| async { Ok("a") })))
            .module("b/route.rs", || Err(anyhow::anyhow!("b is broken")))
            .module("c/route.rs", || Ok(RouteModule::new().get(|_req| async { Ok("c") })));
        let loader = ModuleLoader::new(Arc::new(manifest), Mode::Production);
        let registrar = RouteRegistrar::new(Dispatch::new(Mode::Production));
        let settings = RoutesConfig {
            root: dir.path().to_string_lossy().into_owned(),
            ..Default::default()
        };

        let (_router, report) = load_routes(&settings, &loader, &registrar).await;
        assert_eq!(report.registered(), 2);
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].path().ends_with("b/route.rs"));
    }

    #[tokio::test]
    async fn test_missing_root_mounts_nothing() {
        let loader = ModuleLoader::new(Arc::new(Manifest::new()), Mode::Development);
        let registrar = RouteRegistrar::new(Dispatch::new(Mode::Development));
        let settings = RoutesConfig {
            root: "/definitely/not/here".into(),
            ..Default::default()
        };
        let (_router, report) = load_routes(&settings, &loader, &registrar).await;
        assert_eq!(report.registered(), 0);
    }
}
