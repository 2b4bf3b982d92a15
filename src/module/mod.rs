//! Route module subsystem.
//!
//! # Data Flow
//! ```text
//! RouteFile (from routing::collector)
//!     → manifest.rs (resolve relative path → module factory)
//!     → loader.rs (evaluate factory, cache per file in production)
//!     → diagnostics.rs (best-effort source location on failure)
//!     → RouteModule (method → Handler table)
//!     → routing::registrar
//! ```
//!
//! # Design Decisions
//! - Modules come from an explicit manifest compiled into the binary
//! - A module is immutable once built and shared via `Arc`
//! - Handler arity is a type-level choice (`Handler::Request` / `Handler::WithSink`)

pub mod diagnostics;
pub mod loader;
pub mod manifest;

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use axum::routing::MethodFilter;
use futures_util::future::BoxFuture;

use crate::http::reply::HandlerResult;
use crate::http::request::RequestContext;
use crate::http::sink::ResponseSink;

pub use loader::{ModuleLoadError, ModuleLoader};
pub use manifest::{Manifest, ModuleSource};

/// HTTP methods a route module may export, in registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Options,
    Head,
}

impl Method {
    pub const ALL: [Method; 7] = [
        Method::Get,
        Method::Post,
        Method::Put,
        Method::Patch,
        Method::Delete,
        Method::Options,
        Method::Head,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Options => "OPTIONS",
            Method::Head => "HEAD",
        }
    }

    /// Match a method-named file stem (`get`, `POST`, ...).
    pub fn from_file_stem(stem: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(stem))
    }

    pub fn filter(&self) -> MethodFilter {
        match self {
            Method::Get => MethodFilter::GET,
            Method::Post => MethodFilter::POST,
            Method::Put => MethodFilter::PUT,
            Method::Patch => MethodFilter::PATCH,
            Method::Delete => MethodFilter::DELETE,
            Method::Options => MethodFilter::OPTIONS,
            Method::Head => MethodFilter::HEAD,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type HandlerFuture = BoxFuture<'static, anyhow::Result<HandlerResult>>;

type RequestFn = dyn Fn(RequestContext) -> HandlerFuture + Send + Sync;
type WithSinkFn = dyn Fn(RequestContext, ResponseSink) -> HandlerFuture + Send + Sync;

/// A user-supplied route handler.
#[derive(Clone)]
pub enum Handler {
    /// Invoked with the request alone; the response comes from the return value.
    Request(Arc<RequestFn>),
    /// Invoked with the request and the response sink.
    WithSink(Arc<WithSinkFn>),
}

impl Handler {
    pub fn new<F, Fut, R>(f: F) -> Self
    where
        F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
        R: Into<HandlerResult>,
    {
        Handler::Request(Arc::new(move |req| {
            let fut = f(req);
            Box::pin(async move { fut.await.map(Into::into) })
        }))
    }

    pub fn with_sink<F, Fut, R>(f: F) -> Self
    where
        F: Fn(RequestContext, ResponseSink) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
        R: Into<HandlerResult>,
    {
        Handler::WithSink(Arc::new(move |req, sink| {
            let fut = f(req, sink);
            Box::pin(async move { fut.await.map(Into::into) })
        }))
    }

    /// Number of arguments the handler takes.
    pub fn arity(&self) -> usize {
        match self {
            Handler::Request(_) => 1,
            Handler::WithSink(_) => 2,
        }
    }

    pub(crate) fn call(&self, req: RequestContext, sink: ResponseSink) -> HandlerFuture {
        match self {
            Handler::Request(f) => f(req),
            Handler::WithSink(f) => f(req, sink),
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handler(arity={})", self.arity())
    }
}

/// The loaded code unit behind one route file.
#[derive(Debug, Clone, Default)]
pub struct RouteModule {
    handlers: BTreeMap<Method, Handler>,
    default: Option<Handler>,
}

impl RouteModule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Export `handler` under `method`.
    pub fn on(mut self, method: Method, handler: Handler) -> Self {
        self.handlers.insert(method, handler);
        self
    }

    /// Default export; served as GET when no GET handler exists.
    pub fn default_handler(mut self, handler: Handler) -> Self {
        self.default = Some(handler);
        self
    }

    pub fn get<F, Fut, R>(self, f: F) -> Self
    where
        F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
        R: Into<HandlerResult>,
    {
        self.on(Method::Get, Handler::new(f))
    }

    pub fn post<F, Fut, R>(self, f: F) -> Self
    where
        F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
        R: Into<HandlerResult>,
    {
        self.on(Method::Post, Handler::new(f))
    }

    pub fn put<F, Fut, R>(self, f: F) -> Self
    where
        F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
        R: Into<HandlerResult>,
    {
        self.on(Method::Put, Handler::new(f))
    }

    pub fn patch<F, Fut, R>(self, f: F) -> Self
    where
        F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
        R: Into<HandlerResult>,
    {
        self.on(Method::Patch, Handler::new(f))
    }

    pub fn delete<F, Fut, R>(self, f: F) -> Self
    where
        F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
        R: Into<HandlerResult>,
    {
        self.on(Method::Delete, Handler::new(f))
    }

    pub fn handler(&self, method: Method) -> Option<&Handler> {
        self.handlers.get(&method)
    }

    pub fn default_export(&self) -> Option<&Handler> {
        self.default.as_ref()
    }

    /// Handlers to register, in [`Method::ALL`] order.
    ///
    /// The default export fills in GET when no explicit GET exists.
    pub fn exports(&self) -> Vec<(Method, &Handler)> {
        let mut out: Vec<(Method, &Handler)> =
            self.handlers.iter().map(|(m, h)| (*m, h)).collect();
        if !self.handlers.contains_key(&Method::Get) {
            if let Some(default) = &self.default {
                out.insert(0, (Method::Get, default));
            }
        }
        out
    }

    /// The handler serving `method` for a method-named route file.
    pub fn export_for(&self, method: Method) -> Option<&Handler> {
        self.handlers.get(&method).or(self.default.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty() && self.default.is_none()
    }
}
