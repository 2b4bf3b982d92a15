//! Explicit file → module manifest.
//!
//! Route files are discovered on disk, but their code is compiled into the
//! binary. The manifest is the table joining the two: each entry is keyed
//! by the file's path relative to the routes root and holds the factory
//! that builds its [`RouteModule`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use crate::middleware::MiddlewareDecl;
use crate::module::diagnostics::{catch_panic, SourceLocation};
use crate::module::RouteModule;
use crate::routing::collector::RouteFile;

/// Failure produced by a module source before diagnostics are attached.
#[derive(Debug)]
pub enum SourceFailure {
    /// No code unit is registered for the file.
    Unregistered,
    /// The module's construction returned an error.
    Failed(anyhow::Error),
    /// The module's construction panicked.
    Panicked {
        message: String,
        location: Option<SourceLocation>,
    },
}

/// Anything able to turn a discovered route file into a module.
pub trait ModuleSource: Send + Sync {
    fn load<'a>(&'a self, file: &'a RouteFile) -> BoxFuture<'a, Result<RouteModule, SourceFailure>>;
}

type Factory = Arc<dyn Fn() -> anyhow::Result<RouteModule> + Send + Sync>;

/// Compiled-in registry of route modules and the project middleware declaration.
#[derive(Clone, Default)]
pub struct Manifest {
    modules: HashMap<String, Factory>,
    middleware: Option<(String, MiddlewareDecl)>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module factory for `relative` (e.g. `users/[id]/route.rs`).
    pub fn module<F>(mut self, relative: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> anyhow::Result<RouteModule> + Send + Sync + 'static,
    {
        self.modules.insert(normalize(&relative.into()), Arc::new(factory));
        self
    }

    /// Register the project-level middleware declaration, keyed by its path
    /// relative to the project root (e.g. `middlewares/index.rs`).
    pub fn middleware(mut self, relative: impl Into<String>, decl: MiddlewareDecl) -> Self {
        self.middleware = Some((normalize(&relative.into()), decl));
        self
    }

    pub fn contains(&self, relative: &str) -> bool {
        self.modules.contains_key(&normalize(relative))
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// The middleware declaration registered for `relative`, if any.
    pub fn middleware_decl(&self, relative: &str) -> Option<&MiddlewareDecl> {
        let wanted = normalize(relative);
        self.middleware
            .as_ref()
            .filter(|(key, _)| *key == wanted)
            .map(|(_, decl)| decl)
    }
}

impl fmt::Debug for Manifest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&String> = self.modules.keys().collect();
        keys.sort();
        f.debug_struct("Manifest")
            .field("modules", &keys)
            .field("middleware", &self.middleware.as_ref().map(|(k, _)| k))
            .finish()
    }
}

impl ModuleSource for Manifest {
    fn load<'a>(&'a self, file: &'a RouteFile) -> BoxFuture<'a, Result<RouteModule, SourceFailure>> {
        let factory = self.modules.get(&normalize(&file.relative)).cloned();
        async move {
            let factory = factory.ok_or(SourceFailure::Unregistered)?;
            // Yield so a batch of loads interleaves instead of running back to back.
            tokio::task::yield_now().await;
            match catch_panic("route module", || factory()) {
                Ok(Ok(module)) => Ok(module),
                Ok(Err(e)) => Err(SourceFailure::Failed(e)),
                Err(caught) => Err(SourceFailure::Panicked {
                    message: caught.message,
                    location: caught.location,
                }),
            }
        }
        .boxed()
    }
}

fn normalize(relative: &str) -> String {
    relative
        .replace('\\', "/")
        .split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn file(relative: &str) -> RouteFile {
        RouteFile {
            path: PathBuf::from("/routes").join(relative),
            relative: relative.to_string(),
        }
    }

    #[tokio::test]
    async fn test_resolves_registered_module() {
        let manifest = Manifest::new()
            .module("./users/[id]/route.rs", || Ok(RouteModule::new().get(|_req| async { Ok("hi") })));

        assert!(manifest.contains("users/[id]/route.rs"));
        let module = manifest.load(&file("users/[id]/route.rs")).await.unwrap();
        assert!(!module.is_empty());
    }

    #[tokio::test]
    async fn test_unregistered_and_failing_modules() {
        let manifest = Manifest::new()
            .module("bad/route.rs", || Err(anyhow::anyhow!("missing DATABASE_URL")))
            .module("panics/route.rs", || panic!("top-level panic"));

        assert!(matches!(
            manifest.load(&file("nope/route.rs")).await,
            Err(SourceFailure::Unregistered)
        ));
        assert!(matches!(
            manifest.load(&file("bad/route.rs")).await,
            Err(SourceFailure::Failed(_))
        ));
        match manifest.load(&file("panics/route.rs")).await {
            Err(SourceFailure::Panicked { message, location }) => {
                assert_eq!(message, "top-level panic");
                assert!(location.unwrap().file.ends_with("manifest.rs"));
            }
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }
    }
}
