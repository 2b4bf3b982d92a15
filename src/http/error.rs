//! Error and not-found responses.
//!
//! # Responsibilities
//! - Render handler and middleware failures as HTTP responses
//! - Render unmatched requests as the 404 JSON body
//!
//! # Design Decisions
//! - The renderer is pluggable ([`ErrorHandler`]); the default is JSON
//! - Production responses never carry messages or stacks
//! - `HttpError` anywhere in the chain selects the status code

use std::fmt;
use std::sync::Arc;

use axum::{
    extract::Request,
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};

use crate::config::Mode;
use crate::module::diagnostics::error_location;

/// Maximum number of error-chain entries rendered in development.
const MAX_STACK_ENTRIES: usize = 10;

/// An error carrying the HTTP status it should produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpError {
    pub status: StatusCode,
    pub message: String,
}

impl HttpError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.status.as_u16(), self.message)
    }
}

impl std::error::Error for HttpError {}

/// Where a failure happened.
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub method: String,
    pub path: String,
    pub mode: Mode,
}

pub type ErrorHandler = Arc<dyn Fn(&anyhow::Error, &ErrorContext) -> Response + Send + Sync>;

/// Status selected by the first `HttpError` in the chain, else 500.
pub fn status_of(error: &anyhow::Error) -> StatusCode {
    error
        .chain()
        .find_map(|e| e.downcast_ref::<HttpError>())
        .map(|e| e.status)
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

/// Default JSON error renderer.
pub fn default_error_response(error: &anyhow::Error, ctx: &ErrorContext) -> Response {
    let status = status_of(error);
    let reason = status.canonical_reason().unwrap_or("Internal Server Error");

    let mut body = json!({ "error": reason });
    if !ctx.mode.is_production() {
        let detail = error
            .chain()
            .find_map(|e| e.downcast_ref::<HttpError>())
            .map(|e| e.message.clone())
            .unwrap_or_else(|| error.to_string());
        let stack: Vec<Value> = error
            .chain()
            .take(MAX_STACK_ENTRIES)
            .map(|e| Value::String(e.to_string()))
            .collect();
        body["detail"] = Value::String(detail);
        body["stack"] = Value::Array(stack);
        if let Some(loc) = error_location(error) {
            body["location"] = Value::String(loc.to_string());
        }
    } else if status.is_client_error() {
        if let Some(http) = error.chain().find_map(|e| e.downcast_ref::<HttpError>()) {
            body["detail"] = Value::String(http.message.clone());
        }
    }

    (status, Json(body)).into_response()
}

pub fn default_error_handler() -> ErrorHandler {
    Arc::new(default_error_response)
}

/// Body of the 404 response.
pub fn not_found_body(uri: &Uri) -> Value {
    let path = uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string());
    json!({ "error": "Not Found", "path": path })
}

/// Fallback handler for unmatched requests.
pub async fn not_found(req: Request) -> Response {
    let uri = req
        .extensions()
        .get::<axum::extract::OriginalUri>()
        .map(|o| o.0.clone())
        .unwrap_or_else(|| req.uri().clone());
    tracing::debug!(method = %req.method(), path = %uri.path(), "No route matched");
    (StatusCode::NOT_FOUND, Json(not_found_body(&uri))).into_response()
}
