//! Application assembly and serving.
//!
//! # Responsibilities
//! - Discover, load and register routes into an axum Router
//! - Compose the explicit middleware map and the project declaration
//! - Wrap everything in the request pipeline (trace, request id, CORS,
//!   body limit, timeout, cookies)
//! - Serve with graceful shutdown
//! - Rebuild and swap the live router on route file changes (development)
//!
//! # Pipeline (outermost first)
//! ```text
//! TraceLayer → request metrics → SetRequestId → PropagateRequestId → CORS → body limit
//!     → timeout → cookie jar → composed middleware → routes | health | static
//!     → 404 JSON fallback
//! ```

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue, Method as HttpMethod},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use notify::RecommendedWatcher;
use serde_json::json;
use thiserror::Error;
use tokio::net::TcpListener;
use tower::ServiceExt;
use tower_http::{
    cors::{AllowHeaders, AllowOrigin, CorsLayer},
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    services::ServeDir,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use uuid::Uuid;

use crate::config::validation::{validate_config, ValidationError};
use crate::config::watcher::RouteWatcher;
use crate::config::{AppConfig, CorsConfig};
use crate::http::adapter::Dispatch;
use crate::http::cookies::cookie_layer;
use crate::http::error::{not_found, ErrorHandler};
use crate::lifecycle::Shutdown;
use crate::middleware::{self, Composer, MiddlewareDecl, MiddlewareError, MiddlewareMap};
use crate::module::{Manifest, ModuleLoader};
use crate::observability::metrics;
use crate::routing::registrar::RegisteredRoute;
use crate::routing::{load_routes, FileCollector, RegistrationReport, RouteRegistrar};

/// Failures that abort startup.
#[derive(Debug, Error)]
pub enum BootError {
    #[error("invalid configuration: {}", .0.iter().map(|e| e.to_string()).collect::<Vec<_>>().join(", "))]
    Config(Vec<ValidationError>),

    #[error(transparent)]
    Middleware(#[from] MiddlewareError),

    #[error("route watcher failed: {0}")]
    Watch(#[from] notify::Error),

    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}

/// Generates UUID v4 request ids.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidRequestId;

impl MakeRequestId for UuidRequestId {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// Collects everything an [`App`] is built from.
pub struct AppBuilder {
    config: AppConfig,
    manifest: Manifest,
    middleware: MiddlewareMap,
    error_handler: Option<ErrorHandler>,
}

impl AppBuilder {
    pub fn manifest(mut self, manifest: Manifest) -> Self {
        self.manifest = manifest;
        self
    }

    /// Explicit prefix → middleware map, applied before the project declaration.
    pub fn middleware(mut self, map: MiddlewareMap) -> Self {
        self.middleware = map;
        self
    }

    pub fn error_handler(mut self, handler: ErrorHandler) -> Self {
        self.error_handler = Some(handler);
        self
    }

    /// Validate, discover middleware, and build the first router.
    pub async fn build(self) -> Result<App, BootError> {
        validate_config(&self.config).map_err(BootError::Config)?;

        let mut dispatch = Dispatch::new(self.config.mode);
        if let Some(handler) = self.error_handler {
            dispatch = dispatch.with_error_handler(handler);
        }

        let warn_after = match self.config.middleware.warn_after_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };
        let composer = Composer::new(dispatch.clone()).warn_after(warn_after);

        // Surface contract violations at boot rather than on first rebuild.
        composer.validate(&self.middleware)?;
        let declaration = middleware::discover(
            &self.config.middleware,
            &self.config.routes.extensions,
            &self.manifest,
        )?;
        if let Some(MiddlewareDecl::Map(map)) = &declaration {
            composer.validate(map)?;
        }

        let loader = ModuleLoader::new(Arc::new(self.manifest), self.config.mode);
        let inner = Arc::new(AppInner {
            registrar: RouteRegistrar::new(dispatch),
            composer,
            explicit: self.middleware,
            declaration,
            loader,
            live: ArcSwap::from_pointee(Router::new()),
            routes: ArcSwap::from_pointee(Vec::new()),
            rebuild_lock: tokio::sync::Mutex::new(()),
            config: self.config,
        });

        let app = App { inner };
        app.rebuild().await?;
        Ok(app)
    }
}

struct AppInner {
    config: AppConfig,
    loader: ModuleLoader,
    registrar: RouteRegistrar,
    composer: Composer,
    explicit: MiddlewareMap,
    declaration: Option<MiddlewareDecl>,
    live: ArcSwap<Router>,
    routes: ArcSwap<Vec<RegisteredRoute>>,
    rebuild_lock: tokio::sync::Mutex<()>,
}

/// A built application: the live router plus what is needed to rebuild it.
#[derive(Clone)]
pub struct App {
    inner: Arc<AppInner>,
}

impl App {
    pub fn builder(config: AppConfig) -> AppBuilder {
        AppBuilder {
            config,
            manifest: Manifest::new(),
            middleware: MiddlewareMap::new(),
            error_handler: None,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.inner.config
    }

    pub fn loader(&self) -> &ModuleLoader {
        &self.inner.loader
    }

    /// Routes mounted by the latest build.
    pub fn routes(&self) -> Arc<Vec<RegisteredRoute>> {
        self.inner.routes.load_full()
    }

    /// Snapshot of the current router.
    pub fn router(&self) -> Router {
        self.inner.live.load().as_ref().clone()
    }

    /// Rescan, reload and swap in a new router.
    pub async fn rebuild(&self) -> Result<RegistrationReport, BootError> {
        let inner = &self.inner;
        let _guard = inner.rebuild_lock.lock().await;

        let (routes, report) = load_routes(&inner.config.routes, &inner.loader, &inner.registrar).await;
        let router = self.assemble(routes, &report)?;

        inner.live.store(Arc::new(router));
        inner.routes.store(Arc::new(report.routes.clone()));
        Ok(report)
    }

    fn assemble(&self, routes: Router, report: &RegistrationReport) -> Result<Router, BootError> {
        let config = &self.inner.config;
        let mut app = routes;

        let health_path = config.server.health_path.as_str();
        if report.routes.iter().any(|r| r.template == health_path) {
            tracing::warn!(path = %health_path, "Route file shadows the health endpoint");
        } else {
            app = app.route(health_path, get(health));
        }

        if config.static_files.enabled {
            let mount = config.static_files.mount.trim_end_matches('/');
            let shadowed = report
                .routes
                .iter()
                .any(|r| r.template == mount || r.template.starts_with(&format!("{mount}/")));
            if shadowed {
                tracing::warn!(mount = %mount, "Route files overlap the static mount, static serving disabled");
            } else {
                app = app.nest_service(mount, ServeDir::new(&config.static_files.dir));
            }
        }

        app = app.fallback(not_found);
        app = self.inner.composer.compose(&self.inner.explicit)?(app);
        if let Some(decl) = &self.inner.declaration {
            app = self.inner.composer.apply(decl, app)?;
        }

        #[allow(deprecated)]
        let timeout = TimeoutLayer::new(Duration::from_secs(config.server.request_timeout_secs));

        let mut app = app
            .layer(axum::middleware::from_fn(cookie_layer))
            .layer(timeout)
            .layer(RequestBodyLimitLayer::new(config.limits.body_bytes));
        if config.cors.enabled {
            app = app.layer(cors_layer(&config.cors));
        }
        Ok(app
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
            .layer(axum::middleware::from_fn(metrics::track_requests))
            .layer(TraceLayer::new_for_http()))
    }

    /// Router that forwards every request to the current live router.
    pub fn service(&self) -> Router {
        let app = self.clone();
        Router::new().fallback(move |req: Request| {
            let router = app.router();
            async move {
                match router.oneshot(req).await {
                    Ok(response) => response,
                    Err(never) => match never {},
                }
            }
        })
    }

    /// Start the route watcher when hot reload applies.
    ///
    /// The returned watcher must be kept alive for reloads to happen.
    pub fn watch(&self) -> Result<Option<RecommendedWatcher>, BootError> {
        let config = &self.inner.config;
        if config.mode.is_production() || !config.routes.watch {
            return Ok(None);
        }

        let collector = FileCollector::new(config.routes.extensions.clone(), config.routes.max_depth);
        let (watcher, mut changes) = RouteWatcher::new(std::path::Path::new(&config.routes.root), collector);
        let handle = watcher.run()?;

        let app = self.clone();
        tokio::spawn(async move {
            while changes.recv().await.is_some() {
                // Coalesce bursts of events from one save.
                tokio::time::sleep(Duration::from_millis(150)).await;
                while changes.try_recv().is_ok() {}
                match app.rebuild().await {
                    Ok(report) => tracing::info!(registered = report.registered(), "Routes reloaded"),
                    Err(e) => tracing::error!(error = %e, "Route reload failed, keeping previous routes"),
                }
            }
        });

        Ok(Some(handle))
    }

    /// Serve on `listener` until `shutdown` fires.
    pub async fn run(self, listener: TcpListener, shutdown: &Shutdown) -> Result<(), BootError> {
        let addr = listener.local_addr()?;
        let _watcher = self.watch()?;
        let mut stop = shutdown.subscribe();

        tracing::info!(
            address = %addr,
            mode = ?self.inner.config.mode,
            routes = self.routes().len(),
            "HTTP server starting"
        );

        axum::serve(listener, self.service())
            .with_graceful_shutdown(async move {
                let _ = stop.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn health() -> Response {
    Json(json!({ "status": "ok" })).into_response()
}

fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let mut layer = CorsLayer::new();

    layer = if config.allowed_origins.iter().any(|o| o == "*") {
        layer.allow_origin(AllowOrigin::any())
    } else {
        let origins: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|o| HeaderValue::from_str(o).ok())
            .collect();
        layer.allow_origin(origins)
    };

    let methods: Vec<HttpMethod> = config
        .allowed_methods
        .iter()
        .filter_map(|m| HttpMethod::from_bytes(m.to_ascii_uppercase().as_bytes()).ok())
        .collect();
    layer = layer.allow_methods(methods);

    layer = if config.allowed_headers.iter().any(|h| h == "*") {
        if config.allow_credentials {
            layer.allow_headers(AllowHeaders::mirror_request())
        } else {
            layer.allow_headers(AllowHeaders::any())
        }
    } else {
        let headers: Vec<HeaderName> = config
            .allowed_headers
            .iter()
            .filter_map(|h| HeaderName::from_bytes(h.as_bytes()).ok())
            .collect();
        layer.allow_headers(headers)
    };

    if config.allow_credentials {
        layer = layer.allow_credentials(true);
    }
    if let Some(secs) = config.max_age_secs {
        layer = layer.max_age(Duration::from_secs(secs));
    }
    layer
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::StatusCode;
    use serde_json::Value;

    async fn send(router: Router, req: Request) -> (StatusCode, axum::http::HeaderMap, Value) {
        let response = router.oneshot(req).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, headers, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    fn empty_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.routes.root = "/definitely/not/here".into();
        config.middleware.project_root = "/definitely/not/here".into();
        config
    }

    #[tokio::test]
    async fn test_health_and_not_found() {
        let app = App::builder(empty_config()).build().await.unwrap();

        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let (status, headers, body) = send(app.router(), req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "ok"}));
        assert!(headers.contains_key("x-request-id"));

        let req = Request::builder().uri("/nope?q=1").body(Body::empty()).unwrap();
        let (status, _, body) = send(app.service(), req).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"error": "Not Found", "path": "/nope?q=1"}));
    }

    #[tokio::test]
    async fn test_invalid_config_aborts_boot() {
        let mut config = empty_config();
        config.routes.base_route = "api".into();
        assert!(matches!(App::builder(config).build().await, Err(BootError::Config(_))));
    }

    #[tokio::test]
    async fn test_bad_middleware_prefix_aborts_boot() {
        let map = MiddlewareMap::new().add(
            "no-slash",
            middleware::Middleware::new("m", |req, next: middleware::Continue| async move { Ok(next.run(req).await) }),
        );
        let result = App::builder(empty_config()).middleware(map).build().await;
        assert!(matches!(result, Err(BootError::Middleware(MiddlewareError::Contract { .. }))));
    }

    #[tokio::test]
    async fn test_cors_preflight() {
        let mut config = empty_config();
        config.cors.enabled = true;
        let app = App::builder(config).build().await.unwrap();

        let req = Request::builder()
            .method("OPTIONS")
            .uri("/health")
            .header("origin", "https://example.com")
            .header("access-control-request-method", "GET")
            .body(Body::empty())
            .unwrap();
        let (_, headers, _) = send(app.router(), req).await;
        assert_eq!(headers["access-control-allow-origin"], "*");
    }

    #[derive(Default)]
    struct CountingRecorder {
        counters: std::sync::Mutex<Vec<(String, Vec<(String, String)>)>>,
    }

    impl ::metrics::Recorder for CountingRecorder {
        fn describe_counter(&self, _: ::metrics::KeyName, _: Option<::metrics::Unit>, _: ::metrics::SharedString) {}
        fn describe_gauge(&self, _: ::metrics::KeyName, _: Option<::metrics::Unit>, _: ::metrics::SharedString) {}
        fn describe_histogram(&self, _: ::metrics::KeyName, _: Option<::metrics::Unit>, _: ::metrics::SharedString) {}

        fn register_counter(&self, key: &::metrics::Key, _: &::metrics::Metadata<'_>) -> ::metrics::Counter {
            let labels = key
                .labels()
                .map(|l| (l.key().to_string(), l.value().to_string()))
                .collect();
            self.counters.lock().unwrap().push((key.name().to_string(), labels));
            ::metrics::Counter::noop()
        }

        fn register_gauge(&self, _: &::metrics::Key, _: &::metrics::Metadata<'_>) -> ::metrics::Gauge {
            ::metrics::Gauge::noop()
        }

        fn register_histogram(&self, _: &::metrics::Key, _: &::metrics::Metadata<'_>) -> ::metrics::Histogram {
            ::metrics::Histogram::noop()
        }
    }

    #[test]
    fn test_unmatched_requests_are_counted() {
        let recorder = CountingRecorder::default();
        ::metrics::with_local_recorder(&recorder, || {
            let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
            runtime.block_on(async {
                let app = App::builder(empty_config()).build().await.unwrap();
                let req = Request::builder().uri("/nowhere").body(Body::empty()).unwrap();
                let (status, _, _) = send(app.router(), req).await;
                assert_eq!(status, StatusCode::NOT_FOUND);
            });
        });

        let counters = recorder.counters.lock().unwrap();
        let request = counters
            .iter()
            .find(|(name, _)| name == "fsroute_requests_total")
            .expect("request counter registered");
        assert!(request.1.contains(&("method".to_string(), "GET".to_string())));
        assert!(request.1.contains(&("status".to_string(), "404".to_string())));
    }

    #[test]
    fn test_uuid_request_id() {
        let req = axum::http::Request::new(());
        let id = UuidRequestId.make_request_id(&req).unwrap();
        assert!(Uuid::parse_str(id.header_value().to_str().unwrap()).is_ok());
    }
}
