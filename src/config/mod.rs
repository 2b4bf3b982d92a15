//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! fsroute.toml
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → AppConfig (validated, immutable)
//!     → shared by App and its subsystems
//!
//! On route file change (development):
//!     watcher.rs detects change
//!     → App rescans, reloads, rebuilds
//!     → atomic swap of the live Router
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AppConfig, CorsConfig, LimitsConfig, LogFormat, MiddlewareConfig, Mode, ObservabilityConfig,
    RoutesConfig, ServerConfig, StaticConfig,
};
