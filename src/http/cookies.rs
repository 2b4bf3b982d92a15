//! Request-scoped cookie jar.
//!
//! Parsed view over the `Cookie` header plus an accumulator of `Set-Cookie`
//! directives. The jar is cheap to clone; clones share the accumulator, so
//! cookies set by middleware and handlers all reach the final response.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::{
    extract::Request,
    http::{header, HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use cookie::time::Duration;
use cookie::{Cookie, SameSite};
use serde::{Deserialize, Serialize};

/// `SameSite` attribute values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SameSitePolicy {
    Strict,
    Lax,
    None,
}

impl From<SameSitePolicy> for SameSite {
    fn from(p: SameSitePolicy) -> Self {
        match p {
            SameSitePolicy::Strict => SameSite::Strict,
            SameSitePolicy::Lax => SameSite::Lax,
            SameSitePolicy::None => SameSite::None,
        }
    }
}

/// Standard cookie attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CookieOptions {
    pub path: Option<String>,
    pub domain: Option<String>,
    pub http_only: bool,
    pub secure: bool,
    pub same_site: Option<SameSitePolicy>,
    /// Lifetime in seconds.
    pub max_age: Option<i64>,
}

/// Build a `Set-Cookie` cookie from a name, value and options.
pub fn build_cookie(name: &str, value: &str, options: &CookieOptions) -> Cookie<'static> {
    let mut builder = Cookie::build((name.to_string(), value.to_string()))
        .http_only(options.http_only)
        .secure(options.secure);
    if let Some(path) = &options.path {
        builder = builder.path(path.clone());
    }
    if let Some(domain) = &options.domain {
        builder = builder.domain(domain.clone());
    }
    if let Some(same_site) = options.same_site {
        builder = builder.same_site(same_site.into());
    }
    if let Some(max_age) = options.max_age {
        builder = builder.max_age(Duration::seconds(max_age));
    }
    builder.build()
}

#[derive(Clone, Default)]
pub struct CookieJar {
    incoming: Arc<HashMap<String, String>>,
    outgoing: Arc<Mutex<Vec<Cookie<'static>>>>,
}

impl CookieJar {
    /// Parse every `Cookie` header. Malformed pairs are ignored.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut incoming = HashMap::new();
        for value in headers.get_all(header::COOKIE) {
            let Ok(raw) = value.to_str() else { continue };
            for cookie in Cookie::split_parse(raw.to_string()).flatten() {
                incoming.insert(cookie.name().to_string(), cookie.value().to_string());
            }
        }
        Self {
            incoming: Arc::new(incoming),
            outgoing: Arc::default(),
        }
    }

    /// Value of a request cookie.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.incoming.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.incoming.len()
    }

    pub fn is_empty(&self) -> bool {
        self.incoming.is_empty()
    }

    /// Queue a `Set-Cookie` directive.
    pub fn add(&self, cookie: Cookie<'static>) {
        self.outgoing.lock().expect("cookie jar mutex poisoned").push(cookie);
    }

    pub fn set(&self, name: &str, value: &str, options: &CookieOptions) {
        self.add(build_cookie(name, value, options));
    }

    /// Queue a removal (empty value, zero max-age).
    pub fn remove(&self, name: &str, path: Option<&str>) {
        let mut cookie = Cookie::new(name.to_string(), String::new());
        if let Some(path) = path {
            cookie.set_path(path.to_string());
        }
        cookie.make_removal();
        self.add(cookie);
    }

    /// Cookies queued so far.
    pub fn pending(&self) -> Vec<Cookie<'static>> {
        self.outgoing.lock().expect("cookie jar mutex poisoned").clone()
    }

    /// Move queued cookies onto `headers` as `Set-Cookie` values.
    pub fn apply(&self, headers: &mut HeaderMap) {
        let drained: Vec<Cookie<'static>> =
            std::mem::take(&mut *self.outgoing.lock().expect("cookie jar mutex poisoned"));
        for cookie in drained {
            match HeaderValue::from_str(&cookie.to_string()) {
                Ok(value) => {
                    headers.append(header::SET_COOKIE, value);
                }
                Err(e) => tracing::warn!(cookie = %cookie.name(), error = %e, "Dropping unencodable cookie"),
            }
        }
    }
}

impl std::fmt::Debug for CookieJar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CookieJar")
            .field("incoming", &self.incoming.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Pipeline layer: parses cookies once per request and emits queued ones.
pub async fn cookie_layer(mut req: Request, next: Next) -> Response {
    let jar = CookieJar::from_headers(req.headers());
    req.extensions_mut().insert(jar.clone());
    let mut response = next.run(req).await;
    jar.apply(response.headers_mut());
    response
}
