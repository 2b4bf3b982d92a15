//! Response sink: the output side of one in-flight request.
//!
//! # Responsibilities
//! - Accumulate status and headers until a body is committed
//! - Commit exactly once (send / json / redirect / pipe / download / end)
//! - Report whether the response has already been sent
//!
//! # Design Decisions
//! - Shared handle (`Arc<Mutex<_>>`): handlers taking the sink and the
//!   result interpreter write to the same state
//! - A second commit is an error value, never a panic

use std::path::Path;
use std::sync::{Arc, Mutex};

use axum::{
    body::{Body, Bytes},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::Response,
};
use cookie::Cookie;
use futures_util::Stream;
use thiserror::Error;
use tokio_util::io::ReaderStream;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("response already sent")]
    AlreadySent,

    #[error("invalid header {name}: {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("cannot open {path}: {source}")]
    File {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot serialize JSON body: {0}")]
    Json(#[from] serde_json::Error),
}

struct SinkState {
    status: StatusCode,
    headers: HeaderMap,
    body: Option<Body>,
    sent: bool,
}

#[derive(Clone)]
pub struct ResponseSink {
    inner: Arc<Mutex<SinkState>>,
}

impl Default for ResponseSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseSink {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(SinkState {
                status: StatusCode::OK,
                headers: HeaderMap::new(),
                body: None,
                sent: false,
            })),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut SinkState) -> R) -> R {
        let mut state = self.inner.lock().expect("response sink mutex poisoned");
        f(&mut state)
    }

    /// Whether a body has been committed (headers flushed).
    pub fn headers_sent(&self) -> bool {
        self.with(|s| s.sent)
    }

    pub fn status_code(&self) -> StatusCode {
        self.with(|s| s.status)
    }

    pub fn set_status(&self, status: StatusCode) -> Result<(), SinkError> {
        self.with(|s| {
            if s.sent {
                return Err(SinkError::AlreadySent);
            }
            s.status = status;
            Ok(())
        })
    }

    pub fn header_value(&self, name: &str) -> Option<String> {
        self.with(|s| {
            s.headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        })
    }

    /// Set (replace) a header.
    pub fn set_header(&self, name: &str, value: &str) -> Result<(), SinkError> {
        let (name, value) = parse_header(name, value)?;
        self.with(|s| {
            if s.sent {
                return Err(SinkError::AlreadySent);
            }
            s.headers.insert(name, value);
            Ok(())
        })
    }

    /// Append a `Set-Cookie` directive.
    pub fn add_cookie(&self, cookie: &Cookie<'_>) -> Result<(), SinkError> {
        let value = HeaderValue::from_str(&cookie.to_string()).map_err(|e| SinkError::InvalidHeader {
            name: header::SET_COOKIE.to_string(),
            reason: e.to_string(),
        })?;
        self.with(|s| {
            if s.sent {
                return Err(SinkError::AlreadySent);
            }
            s.headers.append(header::SET_COOKIE, value);
            Ok(())
        })
    }

    fn commit(&self, status: Option<StatusCode>, content_type: Option<&str>, body: Body) -> Result<(), SinkError> {
        let content_type = content_type.map(HeaderValue::from_str).transpose().map_err(|e| {
            SinkError::InvalidHeader {
                name: header::CONTENT_TYPE.to_string(),
                reason: e.to_string(),
            }
        })?;
        self.with(|s| {
            if s.sent {
                return Err(SinkError::AlreadySent);
            }
            if let Some(status) = status {
                s.status = status;
            }
            if let Some(ct) = content_type {
                if !s.headers.contains_key(header::CONTENT_TYPE) {
                    s.headers.insert(header::CONTENT_TYPE, ct);
                }
            }
            s.body = Some(body);
            s.sent = true;
            Ok(())
        })
    }

    /// Send a text body with the current status.
    pub fn send_text(&self, text: impl Into<String>) -> Result<(), SinkError> {
        self.commit(None, Some("text/plain; charset=utf-8"), Body::from(text.into()))
    }

    /// Send raw bytes.
    pub fn send_bytes(&self, status: Option<StatusCode>, bytes: impl Into<Bytes>) -> Result<(), SinkError> {
        self.commit(status, Some("application/octet-stream"), Body::from(bytes.into()))
    }

    /// Send a JSON body.
    pub fn send_json(&self, status: Option<StatusCode>, value: &serde_json::Value) -> Result<(), SinkError> {
        let body = serde_json::to_vec(value)?;
        self.commit(status, Some("application/json"), Body::from(body))
    }

    /// Redirect to `location`.
    pub fn redirect(&self, status: StatusCode, location: &str) -> Result<(), SinkError> {
        self.set_header(header::LOCATION.as_str(), location)?;
        self.commit(Some(status), None, Body::empty())
    }

    /// Pipe a byte stream into the response.
    pub fn pipe<S>(&self, stream: S) -> Result<(), SinkError>
    where
        S: Stream<Item = Result<Bytes, BoxError>> + Send + 'static,
    {
        self.commit(None, Some("application/octet-stream"), Body::from_stream(stream))
    }

    /// Stream a file as the body with the given content type.
    pub async fn send_file(&self, path: &Path, content_type: &str) -> Result<(), SinkError> {
        let file = tokio::fs::File::open(path).await.map_err(|source| SinkError::File {
            path: path.display().to_string(),
            source,
        })?;
        self.commit(None, Some(content_type), Body::from_stream(ReaderStream::new(file)))
    }

    /// Stream a file as an attachment download.
    pub async fn download(&self, path: &Path, filename: Option<&str>) -> Result<(), SinkError> {
        let name = filename
            .map(str::to_string)
            .or_else(|| path.file_name().map(|n| n.to_string_lossy().into_owned()))
            .unwrap_or_else(|| "download".to_string());
        let disposition = format!("attachment; filename=\"{}\"", name.replace('"', ""));
        let content_type = mime_guess::from_path(path).first_or_octet_stream().to_string();

        let file = tokio::fs::File::open(path).await.map_err(|source| SinkError::File {
            path: path.display().to_string(),
            source,
        })?;
        self.set_header(header::CONTENT_DISPOSITION.as_str(), &disposition)?;
        self.commit(None, Some(&content_type), Body::from_stream(ReaderStream::new(file)))
    }

    /// Finish without a body.
    pub fn end(&self) -> Result<(), SinkError> {
        self.commit(None, None, Body::empty())
    }

    /// Build the final response from whatever has been written.
    pub fn into_response(self) -> Response {
        let (status, headers, body) = self.with(|s| {
            (
                s.status,
                std::mem::take(&mut s.headers),
                s.body.take().unwrap_or_else(Body::empty),
            )
        });
        let mut response = Response::new(body);
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        response
    }
}

fn parse_header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue), SinkError> {
    let invalid = |reason: String| SinkError::InvalidHeader {
        name: name.to_string(),
        reason,
    };
    let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| invalid(e.to_string()))?;
    let header_value = HeaderValue::from_str(value).map_err(|e| invalid(e.to_string()))?;
    Ok((header_name, header_value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_once() {
        let sink = ResponseSink::new();
        assert!(!sink.headers_sent());

        sink.send_text("first").unwrap();
        assert!(sink.headers_sent());
        assert!(matches!(sink.send_text("second"), Err(SinkError::AlreadySent)));
        assert!(matches!(sink.set_status(StatusCode::CREATED), Err(SinkError::AlreadySent)));
        assert!(matches!(sink.set_header("x-a", "b"), Err(SinkError::AlreadySent)));
    }

    #[test]
    fn test_status_and_headers_before_commit() {
        let sink = ResponseSink::new();
        sink.set_status(StatusCode::ACCEPTED).unwrap();
        sink.set_header("x-trace", "1").unwrap();
        sink.send_json(None, &serde_json::json!({"ok": true})).unwrap();

        let response = sink.into_response();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(response.headers()["x-trace"], "1");
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
    }

    #[test]
    fn test_invalid_header() {
        let sink = ResponseSink::new();
        assert!(matches!(
            sink.set_header("bad header", "x"),
            Err(SinkError::InvalidHeader { .. })
        ));
    }

    #[tokio::test]
    async fn test_download_sets_disposition() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.csv");
        std::fs::write(&path, "a,b\n1,2\n").unwrap();

        let sink = ResponseSink::new();
        sink.download(&path, Some("q3.csv")).await.unwrap();
        let response = sink.into_response();

        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"q3.csv\""
        );
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/csv");
    }

    #[tokio::test]
    async fn test_download_missing_file() {
        let sink = ResponseSink::new();
        let err = sink.download(Path::new("/no/such/file.bin"), None).await.unwrap_err();
        assert!(matches!(err, SinkError::File { .. }));
        assert!(!sink.headers_sent());
    }
}
