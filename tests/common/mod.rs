//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::body::{to_bytes, Body, Bytes};
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use fsroute::config::{AppConfig, Mode};
use fsroute::{App, Shutdown};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tower::ServiceExt;

/// A routes tree on disk. Files only need to exist; their code lives in the manifest.
pub struct RouteTree {
    pub dir: TempDir,
}

impl RouteTree {
    pub fn new(files: &[&str]) -> Self {
        let tree = Self {
            dir: tempfile::tempdir().expect("create temp dir"),
        };
        for file in files {
            tree.add(file);
        }
        tree
    }

    pub fn routes_root(&self) -> std::path::PathBuf {
        self.dir.path().join("routes")
    }

    /// Create `relative` under the routes root.
    pub fn add(&self, relative: &str) {
        touch(&self.routes_root(), relative);
    }

    /// Create `relative` under the project root (e.g. `middlewares/index.rs`).
    pub fn add_project_file(&self, relative: &str) {
        touch(self.dir.path(), relative);
    }

    pub fn config(&self, mode: Mode) -> AppConfig {
        let mut config = AppConfig::default();
        config.mode = mode;
        config.routes.root = self.routes_root().to_string_lossy().into_owned();
        config.middleware.project_root = self.dir.path().to_string_lossy().into_owned();
        config.server.bind_address = "127.0.0.1:0".into();
        config
    }
}

fn touch(root: &Path, relative: &str) {
    let path = root.join(relative);
    std::fs::create_dir_all(path.parent().expect("file has a parent")).expect("create dirs");
    std::fs::write(path, "// route file\n").expect("write file");
}

pub struct Reply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Reply {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("JSON body")
    }
}

/// Drive one request through `router`.
pub async fn send(router: &Router, method: &str, uri: &str, body: Option<&str>) -> Reply {
    let mut builder = Request::builder().method(method).uri(uri);
    if body.is_some() {
        builder = builder.header("content-type", "application/json");
    }
    let req = builder
        .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
        .expect("valid request");
    let response = router.clone().oneshot(req).await.expect("infallible");
    let status = response.status();
    let headers = response.headers().clone();
    let body = to_bytes(response.into_body(), usize::MAX).await.expect("body");
    Reply { status, headers, body }
}

/// Serve `app` on an ephemeral port. Trigger the returned `Shutdown` to stop.
pub async fn spawn_server(app: App) -> (SocketAddr, Arc<Shutdown>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let shutdown = Arc::new(Shutdown::new());
    let stop = shutdown.clone();
    tokio::spawn(async move {
        let _ = app.run(listener, &stop).await;
    });
    (addr, shutdown)
}
