//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the app.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::routing::path::Naming;

/// Operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Modules are cached, error responses carry no internals.
    #[default]
    Production,
    /// Cache bypassed, error responses include detail and location.
    Development,
}

impl Mode {
    pub fn is_production(&self) -> bool {
        matches!(self, Mode::Production)
    }
}

impl std::str::FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(Mode::Production),
            "development" | "dev" => Ok(Mode::Development),
            other => Err(format!("unknown mode '{}'", other)),
        }
    }
}

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Operating mode (production / development).
    pub mode: Mode,

    /// Server settings (bind address, timeouts, health path).
    pub server: ServerConfig,

    /// Route discovery settings.
    pub routes: RoutesConfig,

    /// Project middleware discovery settings.
    pub middleware: MiddlewareConfig,

    /// CORS policy.
    pub cors: CorsConfig,

    /// Request limits.
    pub limits: LimitsConfig,

    /// Static file serving.
    pub static_files: StaticConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:3000").
    pub bind_address: String,

    /// Request timeout in seconds.
    pub request_timeout_secs: u64,

    /// Conventional health-check endpoint.
    pub health_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
            request_timeout_secs: 30,
            health_path: "/health".to_string(),
        }
    }
}

/// Route discovery configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RoutesConfig {
    /// Directory holding route files.
    pub root: String,

    /// Prefix applied to every discovered route.
    pub base_route: String,

    /// Route file naming convention.
    pub naming: Naming,

    /// Marker file stem for [`Naming::Marker`].
    pub marker_file: String,

    /// Recognized route file extensions.
    pub extensions: Vec<String>,

    /// Recursion ceiling for discovery.
    pub max_depth: usize,

    /// Rebuild routes on file changes (development only).
    pub watch: bool,
}

impl Default for RoutesConfig {
    fn default() -> Self {
        Self {
            root: "routes".to_string(),
            base_route: "/".to_string(),
            naming: Naming::Marker,
            marker_file: "route".to_string(),
            extensions: vec!["rs".to_string()],
            max_depth: crate::routing::collector::DEFAULT_MAX_DEPTH,
            watch: true,
        }
    }
}

/// Project-level middleware discovery.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MiddlewareConfig {
    /// Project root the middlewares directory is resolved against.
    pub project_root: String,

    /// Middlewares directory, relative to the project root.
    pub dir: String,

    /// Declaration file stem inside the middlewares directory.
    pub declaration: String,

    /// Warn when a middleware neither continues nor responds within this time.
    pub warn_after_ms: u64,
}

impl Default for MiddlewareConfig {
    fn default() -> Self {
        Self {
            project_root: ".".to_string(),
            dir: "middlewares".to_string(),
            declaration: "index".to_string(),
            warn_after_ms: 5_000,
        }
    }
}

/// CORS configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CorsConfig {
    pub enabled: bool,

    /// Allowed origins; `"*"` allows any.
    pub allowed_origins: Vec<String>,

    pub allowed_methods: Vec<String>,

    pub allowed_headers: Vec<String>,

    pub allow_credentials: bool,

    pub max_age_secs: Option<u64>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            allowed_origins: vec!["*".to_string()],
            allowed_methods: ["GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS", "HEAD"]
                .iter()
                .map(|m| m.to_string())
                .collect(),
            allowed_headers: vec!["content-type".to_string(), "authorization".to_string()],
            allow_credentials: false,
            max_age_secs: None,
        }
    }
}

/// Request limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum request body size in bytes.
    pub body_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            body_bytes: 1024 * 1024, // 1MB
        }
    }
}

/// Static file serving.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StaticConfig {
    pub enabled: bool,

    /// Directory to serve.
    pub dir: String,

    /// URL prefix the directory is mounted at.
    pub mount: String,
}

impl Default for StaticConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: "public".to_string(),
            mount: "/static".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_toml_uses_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            mode = "development"

            [routes]
            root = "src/routes"
            base_route = "/api"
            naming = "method_files"
            "#,
        )
        .unwrap();

        assert_eq!(config.mode, Mode::Development);
        assert_eq!(config.routes.base_route, "/api");
        assert_eq!(config.routes.naming, Naming::MethodFiles);
        assert_eq!(config.routes.marker_file, "route");
        assert_eq!(config.server.health_path, "/health");
        assert_eq!(config.limits.body_bytes, 1024 * 1024);
    }

    #[test]
    fn test_mode_from_str() {
        assert_eq!("dev".parse::<Mode>().unwrap(), Mode::Development);
        assert_eq!("Production".parse::<Mode>().unwrap(), Mode::Production);
        assert!("staging".parse::<Mode>().is_err());
    }
}
