use std::time::Instant;

use axum::http::HeaderValue;
use fsroute::middleware::{Continue, Middleware, MiddlewareDecl, MiddlewareMap};

pub fn declaration() -> MiddlewareDecl {
    let timing = Middleware::new("timing", |req, next: Continue| async move {
        let start = Instant::now();
        let mut response = next.run(req).await;
        let elapsed = format!("{}ms", start.elapsed().as_millis());
        if let Ok(value) = HeaderValue::from_str(&elapsed) {
            response.headers_mut().insert("x-response-time", value);
        }
        Ok(response)
    });

    let audit = Middleware::new("audit", |req, next: Continue| async move {
        tracing::info!(method = %req.method(), path = %req.uri().path(), "User API access");
        Ok(next.run(req).await)
    });

    MiddlewareDecl::Map(MiddlewareMap::new().add("/", timing).add("/users", audit))
}
