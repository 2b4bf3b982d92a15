//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges and address formats
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AppConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::AppConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self { field, message: message.into() }
    }
}

/// Check every semantic rule, collecting all failures.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "server.bind_address",
            format!("'{}' is not a socket address", config.server.bind_address),
        ));
    }
    if !config.server.health_path.starts_with('/') {
        errors.push(ValidationError::new("server.health_path", "must start with '/'"));
    }
    if config.server.request_timeout_secs == 0 {
        errors.push(ValidationError::new("server.request_timeout_secs", "must be greater than 0"));
    }

    if config.routes.root.trim().is_empty() {
        errors.push(ValidationError::new("routes.root", "must not be empty"));
    }
    if !config.routes.base_route.starts_with('/') {
        errors.push(ValidationError::new("routes.base_route", "must start with '/'"));
    }
    if config.routes.marker_file.trim().is_empty() {
        errors.push(ValidationError::new("routes.marker_file", "must not be empty"));
    }
    if config.routes.extensions.iter().all(|e| e.trim_start_matches('.').is_empty()) {
        errors.push(ValidationError::new("routes.extensions", "at least one extension is required"));
    }
    if config.routes.max_depth == 0 {
        errors.push(ValidationError::new("routes.max_depth", "must be greater than 0"));
    }

    if config.cors.enabled && config.cors.allow_credentials && config.cors.allowed_origins.iter().any(|o| o == "*") {
        errors.push(ValidationError::new(
            "cors.allowed_origins",
            "'*' cannot be combined with allow_credentials",
        ));
    }

    if config.limits.body_bytes == 0 {
        errors.push(ValidationError::new("limits.body_bytes", "must be greater than 0"));
    }

    if config.static_files.enabled {
        if !config.static_files.mount.starts_with('/') {
            errors.push(ValidationError::new("static_files.mount", "must start with '/'"));
        } else if config.static_files.mount.trim_matches('/').is_empty() {
            errors.push(ValidationError::new("static_files.mount", "must not be the root path"));
        }
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
