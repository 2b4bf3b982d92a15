//! Middleware chain construction.
//!
//! Each middleware becomes one `from_fn` layer. Layers are added in
//! reverse so the first declared middleware is the outermost and runs
//! first. A layer whose prefix does not cover the request path passes
//! straight through.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{extract::Request, middleware::Next, response::Response, Router};

use crate::config::Mode;
use crate::http::adapter::Dispatch;
use crate::middleware::{Continue, Middleware, MiddlewareDecl, MiddlewareError, MiddlewareMap};
use crate::module::diagnostics::{catch_panic, catch_panic_async};

/// Default stall warning threshold.
pub const DEFAULT_WARN_AFTER: Duration = Duration::from_millis(5000);

/// Builds router transformations from middleware maps and declarations.
#[derive(Debug, Clone)]
pub struct Composer {
    dispatch: Dispatch,
    warn_after: Option<Duration>,
}

impl Composer {
    pub fn new(dispatch: Dispatch) -> Self {
        Self {
            dispatch,
            warn_after: Some(DEFAULT_WARN_AFTER),
        }
    }

    /// Warn about middlewares stalled longer than `after`; `None` disables the watchdog.
    pub fn warn_after(mut self, after: Option<Duration>) -> Self {
        self.warn_after = after;
        self
    }

    /// Check `map` against the registration contract without building anything.
    pub fn validate(&self, map: &MiddlewareMap) -> Result<(), MiddlewareError> {
        for (prefix, list) in map.entries() {
            if !prefix.starts_with('/') {
                let name = list.first().map(|m| m.name().to_string()).unwrap_or_default();
                return Err(MiddlewareError::Contract {
                    name,
                    reason: format!("prefix {prefix:?} must start with '/'"),
                });
            }
            if list.iter().any(|m| m.name().trim().is_empty()) {
                return Err(MiddlewareError::Contract {
                    name: String::new(),
                    reason: format!("middleware under {prefix:?} has an empty name"),
                });
            }
        }
        Ok(())
    }

    /// Validate `map` and return a function that wraps a router with it.
    pub fn compose(&self, map: &MiddlewareMap) -> Result<impl Fn(Router) -> Router + Clone + Send + Sync + 'static, MiddlewareError> {
        self.validate(map)?;
        let chain: Vec<Arc<Scoped>> = map
            .entries()
            .iter()
            .flat_map(|(prefix, list)| {
                list.iter().map(move |middleware| {
                    Arc::new(Scoped {
                        prefix: normalize_prefix(prefix),
                        middleware: middleware.clone(),
                        dispatch: self.dispatch.clone(),
                        warn_after: self.warn_after,
                    })
                })
            })
            .collect();

        Ok(move |router: Router| {
            chain.iter().rev().fold(router, |router, scoped| {
                let scoped = scoped.clone();
                router.layer(axum::middleware::from_fn(move |req: Request, next: Next| {
                    let scoped = scoped.clone();
                    async move { scoped.run(req, next).await }
                }))
            })
        })
    }

    /// Apply a project-level declaration to `router`.
    pub fn apply(&self, decl: &MiddlewareDecl, router: Router) -> Result<Router, MiddlewareError> {
        match decl {
            MiddlewareDecl::Setup(setup) => Ok(setup(router)),
            MiddlewareDecl::Map(map) => Ok(self.compose(map)?(router)),
        }
    }
}

/// Compose `map` with the default error handler in production mode.
pub fn compose(map: &MiddlewareMap) -> Result<impl Fn(Router) -> Router + Clone + Send + Sync + 'static, MiddlewareError> {
    Composer::new(Dispatch::new(Mode::Production)).compose(map)
}

struct Scoped {
    prefix: String,
    middleware: Middleware,
    dispatch: Dispatch,
    warn_after: Option<Duration>,
}

impl Scoped {
    async fn run(&self, req: Request, next: Next) -> Response {
        if !prefix_matches(&self.prefix, req.uri().path()) {
            return next.run(req).await;
        }

        let method = req.method().to_string();
        let path = req.uri().path().to_string();
        let continued = Arc::new(AtomicBool::new(false));
        let handle = Continue::new(next, continued.clone());

        let result = match catch_panic("middleware", move || self.middleware.call(req, handle)) {
            Ok(fut) => match self.watch(catch_panic_async("middleware", fut), &continued).await {
                Ok(result) => result,
                Err(caught) => Err(anyhow::Error::new(caught)),
            },
            Err(caught) => Err(anyhow::Error::new(caught)),
        };

        match result {
            Ok(response) => response,
            Err(error) => {
                tracing::error!(
                    middleware = %self.middleware.name(),
                    method = %method,
                    path = %path,
                    error = %format!("{:#}", error),
                    "Middleware failed"
                );
                self.dispatch.render(&error, &method, &path)
            }
        }
    }

    async fn watch<F: std::future::Future>(&self, fut: F, continued: &AtomicBool) -> F::Output {
        let Some(after) = self.warn_after else {
            return fut.await;
        };
        tokio::pin!(fut);
        tokio::select! {
            out = &mut fut => return out,
            _ = tokio::time::sleep(after) => {
                if !continued.load(Ordering::Acquire) {
                    tracing::warn!(
                        middleware = %self.middleware.name(),
                        waited_ms = after.as_millis() as u64,
                        "Middleware has neither continued nor responded"
                    );
                }
            }
        }
        fut.await
    }
}

fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Segment-aware prefix match: `/api` covers `/api` and `/api/x`, not `/apis`.
pub fn prefix_matches(prefix: &str, path: &str) -> bool {
    if prefix == "/" {
        return true;
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}
