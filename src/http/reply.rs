//! Handler return values.
//!
//! A handler may return nothing, a plain value, or a [`Reply`] carrying
//! response directives. Headers and cookies are non-terminal; the terminal
//! directives resolve into exactly one [`Action`] by fixed precedence:
//!
//! ```text
//! redirect > file > stream > raw > static > json
//! ```

use std::fmt;
use std::path::PathBuf;
use std::pin::Pin;

use axum::body::Bytes;
use axum::http::StatusCode;
use futures_util::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::http::cookies::CookieOptions;
use crate::http::sink::BoxError;

pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes, BoxError>> + Send>>;

/// What a handler produced.
pub enum HandlerResult {
    /// No value: the handler used the sink directly (or chose not to respond).
    Empty,
    /// A string, number or boolean, sent as a literal text body.
    Text(String),
    /// A structured reply.
    Reply(Reply),
}

impl fmt::Debug for HandlerResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerResult::Empty => f.write_str("Empty"),
            HandlerResult::Text(t) => f.debug_tuple("Text").field(t).finish(),
            HandlerResult::Reply(r) => f.debug_tuple("Reply").field(r).finish(),
        }
    }
}

impl From<()> for HandlerResult {
    fn from(_: ()) -> Self {
        HandlerResult::Empty
    }
}

impl<T: Into<HandlerResult>> From<Option<T>> for HandlerResult {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(HandlerResult::Empty)
    }
}

impl From<Reply> for HandlerResult {
    fn from(reply: Reply) -> Self {
        HandlerResult::Reply(reply)
    }
}

impl From<&str> for HandlerResult {
    fn from(s: &str) -> Self {
        HandlerResult::Text(s.to_string())
    }
}

impl From<String> for HandlerResult {
    fn from(s: String) -> Self {
        HandlerResult::Text(s)
    }
}

macro_rules! text_results {
    ($($t:ty),*) => {
        $(impl From<$t> for HandlerResult {
            fn from(v: $t) -> Self {
                HandlerResult::Text(v.to_string())
            }
        })*
    };
}

text_results!(bool, i8, i16, i32, i64, u8, u16, u32, u64, usize, isize, f32, f64);

impl From<Value> for HandlerResult {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => HandlerResult::Empty,
            Value::String(s) => HandlerResult::Text(s),
            Value::Bool(b) => HandlerResult::Text(b.to_string()),
            Value::Number(n) => HandlerResult::Text(n.to_string()),
            Value::Array(_) => HandlerResult::Reply(Reply::json(value)),
            Value::Object(_) => HandlerResult::Reply(Reply::from_value(value)),
        }
    }
}

/// A file to send as an attachment.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FileDownload {
    pub path: PathBuf,
    /// Download name; defaults to the file name.
    #[serde(default)]
    pub filename: Option<String>,
    /// Extra headers sent with the download.
    #[serde(default)]
    pub headers: Vec<(String, String)>,
}

/// A file to serve inline.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StaticFile {
    pub path: PathBuf,
    /// Explicit content type; guessed from the extension when absent.
    #[serde(default, alias = "contentType")]
    pub content_type: Option<String>,
}

/// The terminal directive of a reply.
pub enum Action {
    Redirect { status: StatusCode, location: String },
    File(FileDownload),
    Stream(BodyStream),
    Raw { status: StatusCode, bytes: Bytes },
    Static(StaticFile),
    Json { status: StatusCode, body: Option<Value> },
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Redirect { status, location } => f
                .debug_struct("Redirect")
                .field("status", status)
                .field("location", location)
                .finish(),
            Action::File(d) => f.debug_tuple("File").field(d).finish(),
            Action::Stream(_) => f.write_str("Stream(..)"),
            Action::Raw { status, bytes } => f
                .debug_struct("Raw")
                .field("status", status)
                .field("len", &bytes.len())
                .finish(),
            Action::Static(s) => f.debug_tuple("Static").field(s).finish(),
            Action::Json { status, body } => f
                .debug_struct("Json")
                .field("status", status)
                .field("body", body)
                .finish(),
        }
    }
}

/// A structured handler reply.
#[derive(Default)]
pub struct Reply {
    status: Option<StatusCode>,
    body: Option<Value>,
    headers: Vec<(String, String)>,
    cookies: Vec<(String, String, CookieOptions)>,
    redirect: Option<String>,
    file: Option<FileDownload>,
    stream: Option<BodyStream>,
    raw: Option<Bytes>,
    static_file: Option<StaticFile>,
}

impl fmt::Debug for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reply")
            .field("status", &self.status)
            .field("body", &self.body)
            .field("headers", &self.headers)
            .field("cookies", &self.cookies.iter().map(|(n, _, _)| n).collect::<Vec<_>>())
            .field("redirect", &self.redirect)
            .field("file", &self.file)
            .field("stream", &self.stream.is_some())
            .field("raw", &self.raw.as_ref().map(Bytes::len))
            .field("static_file", &self.static_file)
            .finish()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CookieSpec {
    Value(String),
    Full {
        value: String,
        #[serde(default)]
        options: CookieOptions,
    },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawSpec {
    Text(String),
    Bytes(Vec<u8>),
}

impl Reply {
    pub fn new() -> Self {
        Self::default()
    }

    /// JSON reply with the given body.
    pub fn json(body: impl Into<Value>) -> Self {
        Self {
            body: Some(body.into()),
            ..Self::default()
        }
    }

    /// Serialize `body` as the JSON reply body.
    pub fn json_of<T: serde::Serialize>(body: &T) -> anyhow::Result<Self> {
        Ok(Self::json(serde_json::to_value(body)?))
    }

    pub fn redirect_to(location: impl Into<String>) -> Self {
        Self::new().redirect(location)
    }

    pub fn status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    pub fn body(mut self, body: impl Into<Value>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn cookie(mut self, name: impl Into<String>, value: impl Into<String>, options: CookieOptions) -> Self {
        self.cookies.push((name.into(), value.into(), options));
        self
    }

    pub fn redirect(mut self, location: impl Into<String>) -> Self {
        self.redirect = Some(location.into());
        self
    }

    pub fn file(mut self, download: FileDownload) -> Self {
        self.file = Some(download);
        self
    }

    pub fn stream<S>(mut self, stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, BoxError>> + Send + 'static,
    {
        self.stream = Some(stream.boxed());
        self
    }

    pub fn raw(mut self, bytes: impl Into<Bytes>) -> Self {
        self.raw = Some(bytes.into());
        self
    }

    pub fn static_file(mut self, file: StaticFile) -> Self {
        self.static_file = Some(file);
        self
    }

    /// Interpret an untyped JSON object.
    ///
    /// Recognized keys: `status`, `body`, `headers`, `cookies`, `redirect`,
    /// `file`, `raw`, `static`. Without a `body` key, the whole object is the
    /// JSON body. Malformed directive values are ignored with a warning.
    pub fn from_value(value: Value) -> Self {
        let Value::Object(map) = value else {
            return Self::json(value);
        };
        let mut reply = Self::default();

        reply.status = map
            .get("status")
            .and_then(Value::as_u64)
            .and_then(|s| u16::try_from(s).ok())
            .and_then(|s| StatusCode::from_u16(s).ok());

        if let Some(Value::Object(headers)) = map.get("headers") {
            for (name, value) in headers {
                match value {
                    Value::String(s) => reply.headers.push((name.clone(), s.clone())),
                    Value::Number(_) | Value::Bool(_) => reply.headers.push((name.clone(), value.to_string())),
                    _ => tracing::warn!(header = %name, "Ignoring non-scalar header value"),
                }
            }
        }

        if let Some(Value::Object(cookies)) = map.get("cookies") {
            for (name, spec) in cookies {
                match serde_json::from_value::<CookieSpec>(spec.clone()) {
                    Ok(CookieSpec::Value(v)) => reply.cookies.push((name.clone(), v, CookieOptions::default())),
                    Ok(CookieSpec::Full { value, options }) => reply.cookies.push((name.clone(), value, options)),
                    Err(e) => tracing::warn!(cookie = %name, error = %e, "Ignoring malformed cookie directive"),
                }
            }
        }

        reply.redirect = map.get("redirect").and_then(Value::as_str).map(str::to_string);
        reply.file = directive(&map, "file");
        reply.static_file = directive(&map, "static");
        reply.raw = directive::<RawSpec>(&map, "raw").map(|raw| match raw {
            RawSpec::Text(s) => Bytes::from(s),
            RawSpec::Bytes(b) => Bytes::from(b),
        });

        reply.body = match map.get("body") {
            Some(body) => Some(body.clone()),
            None => Some(Value::Object(map)),
        };
        reply
    }

    /// Split into non-terminal directives and the terminal action.
    pub fn into_parts(self) -> ReplyParts {
        let status = self.status;
        let action = if let Some(location) = self.redirect {
            Action::Redirect {
                status: status.unwrap_or(StatusCode::FOUND),
                location,
            }
        } else if let Some(file) = self.file {
            Action::File(file)
        } else if let Some(stream) = self.stream {
            Action::Stream(stream)
        } else if let Some(bytes) = self.raw {
            Action::Raw {
                status: status.unwrap_or(StatusCode::OK),
                bytes,
            }
        } else if let Some(file) = self.static_file {
            Action::Static(file)
        } else {
            Action::Json {
                status: status.unwrap_or(StatusCode::OK),
                body: self.body,
            }
        };

        ReplyParts {
            status,
            headers: self.headers,
            cookies: self.cookies,
            action,
        }
    }
}

/// A reply split for interpretation.
pub struct ReplyParts {
    pub status: Option<StatusCode>,
    pub headers: Vec<(String, String)>,
    pub cookies: Vec<(String, String, CookieOptions)>,
    pub action: Action,
}

fn directive<T: serde::de::DeserializeOwned>(map: &Map<String, Value>, key: &str) -> Option<T> {
    let value = map.get(key)?;
    match serde_json::from_value(value.clone()) {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::warn!(directive = key, error = %e, "Ignoring malformed reply directive");
            None
        }
    }
}
