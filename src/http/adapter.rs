//! Handler adapter: runs one user handler for one request.
//!
//! # Data Flow
//! ```text
//! axum Request
//!     → path params + buffered body + cookie jar → RequestContext
//!     → Handler::call (panics caught)
//!     → interpret::apply (result → ResponseSink)
//!     → Response
//!
//! Handler error / panic / interpretation failure:
//!     → logged with method and path
//!     → ErrorHandler renders the response
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, RawPathParams, Request},
    http::StatusCode,
    response::Response,
};
use crate::config::Mode;
use crate::http::cookies::CookieJar;
use crate::http::error::{default_error_handler, ErrorContext, ErrorHandler, HttpError};
use crate::http::interpret;
use crate::http::reply::HandlerResult;
use crate::http::request::RequestContext;
use crate::http::sink::ResponseSink;
use crate::module::diagnostics::{catch_panic, catch_panic_async};
use crate::module::Handler;
use crate::observability::metrics;

/// Shared settings for turning failures into responses.
#[derive(Clone)]
pub struct Dispatch {
    pub error_handler: ErrorHandler,
    pub mode: Mode,
}

impl Dispatch {
    pub fn new(mode: Mode) -> Self {
        Self {
            error_handler: default_error_handler(),
            mode,
        }
    }

    pub fn with_error_handler(mut self, handler: ErrorHandler) -> Self {
        self.error_handler = handler;
        self
    }

    pub(crate) fn render(&self, error: &anyhow::Error, method: &str, path: &str) -> Response {
        let ctx = ErrorContext {
            method: method.to_string(),
            path: path.to_string(),
            mode: self.mode,
        };
        (self.error_handler)(error, &ctx)
    }
}

impl std::fmt::Debug for Dispatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatch").field("mode", &self.mode).finish()
    }
}

/// The route a handler is mounted under.
#[derive(Debug, Clone)]
pub struct Binding {
    route: Arc<str>,
    /// Router parameter name → name the handler's template uses.
    renames: Arc<[(String, String)]>,
}

impl Binding {
    pub fn new(route: &str) -> Self {
        Self {
            route: Arc::from(route),
            renames: Arc::from(Vec::new()),
        }
    }

    pub fn with_renames(route: &str, renames: Vec<(String, String)>) -> Self {
        Self {
            route: Arc::from(route),
            renames: Arc::from(renames),
        }
    }

    pub fn route(&self) -> &str {
        &self.route
    }

    fn rename(&self, params: &mut HashMap<String, String>) {
        for (from, to) in self.renames.iter() {
            if let Some(value) = params.remove(from) {
                params.insert(to.clone(), value);
            }
        }
    }
}

/// Run `handler` for `req` and produce the response.
pub async fn invoke(handler: Handler, dispatch: Dispatch, binding: Binding, req: Request) -> Response {
    let (mut parts, body) = req.into_parts();
    let method = parts.method.to_string();
    let path = parts.uri.path().to_string();

    let mut params: HashMap<String, String> = match RawPathParams::from_request_parts(&mut parts, &()).await {
        Ok(raw) => raw.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        Err(rejection) => {
            tracing::warn!(method = %method, path = %path, error = %rejection, "Rejected path parameters");
            let error = anyhow::Error::new(HttpError::bad_request("invalid path parameter"));
            return dispatch.render(&error, &method, &path);
        }
    };
    binding.rename(&mut params);

    let bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            let status = if is_length_limit(&e) {
                StatusCode::PAYLOAD_TOO_LARGE
            } else {
                StatusCode::BAD_REQUEST
            };
            tracing::warn!(method = %method, path = %path, error = %e, "Failed to read request body");
            let error = anyhow::Error::new(HttpError::new(status, e.to_string()));
            return dispatch.render(&error, &method, &path);
        }
    };

    // Reuse the pipeline's jar when the cookie layer is mounted.
    let (jar, owns_jar) = match parts.extensions.get::<CookieJar>() {
        Some(jar) => (jar.clone(), false),
        None => (CookieJar::from_headers(&parts.headers), true),
    };

    let ctx = RequestContext::from_parts(&parts, params, bytes, jar.clone());
    let sink = ResponseSink::new();

    let outcome = run_handler(&handler, ctx, sink.clone()).await;
    let outcome = match outcome {
        Ok(result) => interpret::apply(result, &sink).await.map_err(anyhow::Error::new),
        Err(e) => Err(e),
    };

    let mut response = match outcome {
        Ok(()) => sink.into_response(),
        Err(error) => {
            metrics::record_handler_error(binding.route());
            tracing::error!(
                method = %method,
                path = %path,
                route = %binding.route(),
                error = %format!("{:#}", error),
                "Route handler failed"
            );
            if sink.headers_sent() {
                sink.into_response()
            } else {
                dispatch.render(&error, &method, &path)
            }
        }
    };

    if owns_jar {
        jar.apply(response.headers_mut());
    }

    response
}

async fn run_handler(
    handler: &Handler,
    ctx: RequestContext,
    sink: ResponseSink,
) -> anyhow::Result<HandlerResult> {
    // Catch panics raised while building the future as well as while polling it.
    let fut = catch_panic("handler", || handler.call(ctx, sink)).map_err(anyhow::Error::new)?;
    catch_panic_async("handler", fut).await.map_err(anyhow::Error::new)?
}

fn is_length_limit(error: &axum::Error) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(error);
    while let Some(e) = source {
        if e.to_string().contains("length limit exceeded") {
            return true;
        }
        source = e.source();
    }
    false
}
