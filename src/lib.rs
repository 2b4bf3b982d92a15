//! Convention-driven route discovery and dispatch on top of axum.
//!
//! Route files under a routes root map to URL templates by their location
//! (`users/[id]/route.rs` → `/users/:id`). Each file's code is registered in
//! a [`module::Manifest`]; the loader evaluates it, the registrar mounts its
//! exported handlers, and whatever a handler returns is interpreted into a
//! response.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod middleware;
pub mod module;
pub mod observability;
pub mod routing;

pub use config::AppConfig;
pub use http::{App, AppBuilder, BootError};
pub use lifecycle::Shutdown;
