//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (pipeline layers, live router, graceful shutdown)
//!     → cookies.rs (request-scoped jar)
//!     → adapter.rs (RequestContext + ResponseSink, handler call)
//!     → reply.rs / interpret.rs (handler result → response writes)
//!     → error.rs (failures and unmatched requests)
//!     → Send to client
//! ```

pub mod adapter;
pub mod cookies;
pub mod error;
pub mod interpret;
pub mod reply;
pub mod request;
pub mod server;
pub mod sink;

pub use cookies::{CookieJar, CookieOptions, SameSitePolicy};
pub use error::{ErrorContext, ErrorHandler, HttpError};
pub use reply::{FileDownload, HandlerResult, Reply, StaticFile};
pub use request::{ParsedBody, RequestContext, X_REQUEST_ID};
pub use server::{App, AppBuilder, BootError};
pub use sink::ResponseSink;
