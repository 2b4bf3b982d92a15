//! Handler result interpretation.
//!
//! # Responsibilities
//! - Turn a [`HandlerResult`] into writes on the [`ResponseSink`]
//! - Apply headers and cookies before the terminal action
//! - Leave sinks the handler already committed untouched
//!
//! # Design Decisions
//! - Only one terminal action fires (see [`crate::http::reply`] precedence)
//! - Static file I/O failures become a 500 here and never propagate
//! - Every other failure is returned for the error handler to render

use axum::http::StatusCode;
use serde_json::json;
use thiserror::Error;

use crate::http::cookies::build_cookie;
use crate::http::reply::{Action, HandlerResult};
use crate::http::sink::{ResponseSink, SinkError};

#[derive(Debug, Error)]
pub enum InterpretError {
    #[error(transparent)]
    Sink(#[from] SinkError),
}

/// Apply a handler's result to its response sink.
pub async fn apply(result: HandlerResult, sink: &ResponseSink) -> Result<(), InterpretError> {
    if sink.headers_sent() {
        if !matches!(result, HandlerResult::Empty) {
            tracing::debug!("Response already sent by handler, ignoring returned value");
        }
        return Ok(());
    }

    let reply = match result {
        HandlerResult::Empty => return Ok(()),
        HandlerResult::Text(text) => {
            sink.send_text(text)?;
            return Ok(());
        }
        HandlerResult::Reply(reply) => reply,
    };

    let parts = reply.into_parts();

    for (name, value) in &parts.headers {
        sink.set_header(name, value)?;
    }
    for (name, value, options) in &parts.cookies {
        sink.add_cookie(&build_cookie(name, value, options))?;
    }

    match parts.action {
        Action::Redirect { status, location } => sink.redirect(status, &location)?,
        Action::File(download) => {
            for (name, value) in &download.headers {
                sink.set_header(name, value)?;
            }
            sink.download(&download.path, download.filename.as_deref()).await?;
        }
        Action::Stream(stream) => {
            if let Some(status) = parts.status {
                sink.set_status(status)?;
            }
            sink.pipe(stream)?;
        }
        Action::Raw { status, bytes } => sink.send_bytes(Some(status), bytes)?,
        Action::Static(file) => {
            let content_type = file.content_type.clone().unwrap_or_else(|| {
                mime_guess::from_path(&file.path)
                    .first_or_octet_stream()
                    .to_string()
            });
            if let Some(status) = parts.status {
                sink.set_status(status)?;
            }
            if let Err(e) = sink.send_file(&file.path, &content_type).await {
                tracing::error!(path = ?file.path, error = %e, "Failed to serve static file");
                sink.send_json(
                    Some(StatusCode::INTERNAL_SERVER_ERROR),
                    &json!({ "error": "Internal Server Error" }),
                )?;
            }
        }
        Action::Json { status, body } => match body {
            Some(body) => sink.send_json(Some(status), &body)?,
            None => {
                sink.set_status(status)?;
                sink.end()?;
            }
        },
    }

    Ok(())
}
