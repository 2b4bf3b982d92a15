//! Middleware composition subsystem.
//!
//! # Data Flow
//! ```text
//! MiddlewareMap (prefix → [Middleware], insertion ordered)
//!     → compose.rs (one from_fn layer per middleware, prefix scoped)
//!     → axum Router wrapped around the routes
//!
//! Project declaration:
//!     {project_root}/{dir}/{declaration}.<ext> on disk
//!     → discover.rs (resolve through the Manifest)
//!     → MiddlewareDecl::Setup (full control) | MiddlewareDecl::Map (compose)
//! ```
//!
//! # Design Decisions
//! - Continuation is explicit: a middleware receives a [`Continue`] and
//!   either runs it or returns its own response
//! - Errors and panics from a middleware go to the error handler
//! - A middleware that stalls without continuing is reported by a
//!   watchdog warning, not cancelled

pub mod compose;
pub mod discover;

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::{extract::Request, middleware::Next, response::Response, Router};
use futures_util::future::BoxFuture;
use thiserror::Error;

pub use compose::{compose, Composer};
pub use discover::discover;

pub type MiddlewareFuture = BoxFuture<'static, anyhow::Result<Response>>;

type MiddlewareFn = dyn Fn(Request, Continue) -> MiddlewareFuture + Send + Sync;

/// Handle to the rest of the chain.
pub struct Continue {
    next: Next,
    continued: Arc<AtomicBool>,
}

impl Continue {
    pub(crate) fn new(next: Next, continued: Arc<AtomicBool>) -> Self {
        Self { next, continued }
    }

    /// Hand the request to the next middleware or route.
    pub async fn run(self, req: Request) -> Response {
        self.continued.store(true, Ordering::Release);
        self.next.run(req).await
    }
}

/// A named middleware function.
#[derive(Clone)]
pub struct Middleware {
    name: Arc<str>,
    f: Arc<MiddlewareFn>,
}

impl Middleware {
    pub fn new<F, Fut>(name: &str, f: F) -> Self
    where
        F: Fn(Request, Continue) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Response>> + Send + 'static,
    {
        Self {
            name: Arc::from(name),
            f: Arc::new(move |req, next| Box::pin(f(req, next))),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn call(&self, req: Request, next: Continue) -> MiddlewareFuture {
        (self.f)(req, next)
    }
}

impl fmt::Debug for Middleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Middleware").field(&self.name).finish()
    }
}

/// Route prefix → ordered middleware list. Insertion order is dispatch order.
#[derive(Debug, Clone, Default)]
pub struct MiddlewareMap {
    entries: Vec<(String, Vec<Middleware>)>,
}

impl MiddlewareMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `middleware` to the list for `prefix`.
    pub fn add(mut self, prefix: &str, middleware: Middleware) -> Self {
        match self.entries.iter_mut().find(|(p, _)| p == prefix) {
            Some((_, list)) => list.push(middleware),
            None => self.entries.push((prefix.to_string(), vec![middleware])),
        }
        self
    }

    /// Replace the list for `prefix`.
    pub fn scope(mut self, prefix: &str, middlewares: Vec<Middleware>) -> Self {
        match self.entries.iter_mut().find(|(p, _)| p == prefix) {
            Some((_, list)) => *list = middlewares,
            None => self.entries.push((prefix.to_string(), middlewares)),
        }
        self
    }

    pub fn entries(&self) -> &[(String, Vec<Middleware>)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.iter().map(|(_, l)| l.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append every entry of `other` after this map's entries.
    pub fn merge(mut self, other: &MiddlewareMap) -> Self {
        for (prefix, list) in &other.entries {
            for middleware in list {
                self = self.add(prefix, middleware.clone());
            }
        }
        self
    }
}

pub type SetupFn = dyn Fn(Router) -> Router + Send + Sync;

/// What the project-level middleware declaration provides.
#[derive(Clone)]
pub enum MiddlewareDecl {
    /// Full manual control over the application router.
    Setup(Arc<SetupFn>),
    /// A prefix → list mapping, composed like an explicit map.
    Map(MiddlewareMap),
}

impl MiddlewareDecl {
    pub fn setup<F>(f: F) -> Self
    where
        F: Fn(Router) -> Router + Send + Sync + 'static,
    {
        MiddlewareDecl::Setup(Arc::new(f))
    }
}

impl fmt::Debug for MiddlewareDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MiddlewareDecl::Setup(_) => f.write_str("MiddlewareDecl::Setup"),
            MiddlewareDecl::Map(map) => f.debug_tuple("MiddlewareDecl::Map").field(map).finish(),
        }
    }
}

#[derive(Debug, Error)]
pub enum MiddlewareError {
    #[error("middleware {name:?} violates its contract: {reason}")]
    Contract { name: String, reason: String },

    #[error("middleware declaration {path:?} has no registered module")]
    Unregistered { path: String },
}
