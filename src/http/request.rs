//! Request context handed to route handlers.
//!
//! # Responsibilities
//! - Carry method, path, headers, query, path params and buffered body
//! - Parse the body on demand (JSON, urlencoded form, text, multipart)
//! - Expose the request-scoped cookie jar
//!
//! # Design Decisions
//! - The body is buffered once by the adapter; the limit layer bounds it
//! - Parsing is lazy and per call; handlers pick the representation

use std::collections::HashMap;

use axum::{
    body::{Body, Bytes},
    extract::{FromRequest, Multipart},
    http::{header, request::Parts, HeaderMap, Method, Request, Uri},
};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::http::cookies::CookieJar;

/// Header carrying the request id.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Body parsed according to its `Content-Type`.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedBody {
    Empty,
    Json(Value),
    Form(HashMap<String, String>),
    Text(String),
    Bytes(Bytes),
}

/// Everything a handler needs to know about the in-flight request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    query: HashMap<String, String>,
    params: HashMap<String, String>,
    body: Bytes,
    cookies: CookieJar,
}

impl RequestContext {
    pub(crate) fn from_parts(
        parts: &Parts,
        params: HashMap<String, String>,
        body: Bytes,
        cookies: CookieJar,
    ) -> Self {
        let query = parts
            .uri
            .query()
            .and_then(|q| serde_urlencoded::from_str::<Vec<(String, String)>>(q).ok())
            .map(|pairs| pairs.into_iter().collect())
            .unwrap_or_default();

        Self {
            method: parts.method.clone(),
            uri: parts.uri.clone(),
            headers: parts.headers.clone(),
            query,
            params,
            body,
            cookies,
        }
    }

    /// Build a context directly, mainly for exercising handlers in tests.
    pub fn builder(method: Method, uri: &str) -> RequestContextBuilder {
        RequestContextBuilder {
            request: Request::builder().method(method).uri(uri),
            params: HashMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn request_id(&self) -> Option<&str> {
        self.header(X_REQUEST_ID)
    }

    pub fn query(&self) -> &HashMap<String, String> {
        &self.query
    }

    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    pub fn params(&self) -> &HashMap<String, String> {
        &self.params
    }

    /// Named path parameter (`[id]` folder → `param("id")`).
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub fn cookies(&self) -> &CookieJar {
        &self.cookies
    }

    pub fn bytes(&self) -> &Bytes {
        &self.body
    }

    pub fn text(&self) -> anyhow::Result<String> {
        Ok(String::from_utf8(self.body.to_vec())?)
    }

    pub fn json<T: DeserializeOwned>(&self) -> anyhow::Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    pub fn form<T: DeserializeOwned>(&self) -> anyhow::Result<T> {
        Ok(serde_urlencoded::from_bytes(&self.body)?)
    }

    fn content_type(&self) -> Option<&str> {
        self.header(header::CONTENT_TYPE.as_str())
    }

    /// Parse the body according to its `Content-Type`.
    pub fn parsed_body(&self) -> anyhow::Result<ParsedBody> {
        if self.body.is_empty() {
            return Ok(ParsedBody::Empty);
        }
        let mime = self
            .content_type()
            .and_then(|ct| ct.split(';').next())
            .map(|ct| ct.trim().to_ascii_lowercase())
            .unwrap_or_default();

        let parsed = if mime == "application/json" || mime.ends_with("+json") {
            ParsedBody::Json(self.json()?)
        } else if mime == "application/x-www-form-urlencoded" {
            ParsedBody::Form(self.form()?)
        } else if mime.starts_with("text/") {
            ParsedBody::Text(self.text()?)
        } else {
            ParsedBody::Bytes(self.body.clone())
        };
        Ok(parsed)
    }

    /// Streaming multipart view over the buffered body.
    pub async fn multipart(&self) -> anyhow::Result<Multipart> {
        let mut builder = Request::builder().method(self.method.clone()).uri(self.uri.clone());
        for (name, value) in &self.headers {
            builder = builder.header(name.clone(), value.clone());
        }
        let request = builder.body(Body::from(self.body.clone()))?;
        Multipart::from_request(request, &())
            .await
            .map_err(|rejection| anyhow::anyhow!(rejection.body_text()))
    }
}

/// Builder for hand-made request contexts.
pub struct RequestContextBuilder {
    request: axum::http::request::Builder,
    params: HashMap<String, String>,
    body: Bytes,
}

impl RequestContextBuilder {
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.request = self.request.header(name, value);
        self
    }

    pub fn param(mut self, name: &str, value: &str) -> Self {
        self.params.insert(name.to_string(), value.to_string());
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn build(self) -> anyhow::Result<RequestContext> {
        let (parts, ()) = self.request.body(())?.into_parts();
        let cookies = CookieJar::from_headers(&parts.headers);
        Ok(RequestContext::from_parts(&parts, self.params, self.body, cookies))
    }
}
