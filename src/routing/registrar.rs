//! Route registration.
//!
//! # Responsibilities
//! - Turn loaded route modules into axum routes
//! - Group every method for one template under a single `MethodRouter`
//! - Resolve (method, template) collisions deterministically
//!
//! # Design Decisions
//! - Input order is the collector's sorted order; the first claim on a
//!   (method, template) pair wins and later claims are reported
//! - Templates that differ only in parameter names share one mount point,
//!   keyed by the first template seen
//! - A template the router rejects is skipped, never fatal

use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use axum::{
    extract::Request,
    routing::{any, MethodRouter},
    Router,
};

use crate::http::adapter::{invoke, Binding, Dispatch};
use crate::module::{Handler, Method, ModuleLoadError, RouteModule};
use crate::routing::collector::RouteFile;
use crate::routing::path::{RouteTemplate, Segment};

/// A route module paired with the template its file maps to.
#[derive(Debug, Clone)]
pub struct LoadedRoute {
    pub file: RouteFile,
    pub template: RouteTemplate,
    /// Set for method-named files; only this method is registered.
    pub method: Option<Method>,
    pub module: Arc<RouteModule>,
}

/// One mounted (method, template) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredRoute {
    pub method: Method,
    pub template: String,
    pub file: String,
}

/// A claim that lost to an earlier registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub method: Method,
    pub template: String,
    /// Relative path of the file that kept the route.
    pub winner: String,
    /// Relative path of the file that was skipped.
    pub loser: String,
}

/// Summary of one registration pass.
#[derive(Debug, Default)]
pub struct RegistrationReport {
    pub routes: Vec<RegisteredRoute>,
    pub conflicts: Vec<Conflict>,
    pub failures: Vec<ModuleLoadError>,
}

impl RegistrationReport {
    /// Number of successfully registered (method, template) pairs.
    pub fn registered(&self) -> usize {
        self.routes.len()
    }
}

struct Mount {
    path: String,
    template: String,
    params: Vec<String>,
    methods: MethodRouter,
    owners: HashMap<Method, String>,
}

/// Registers loaded modules against an axum router.
#[derive(Debug, Clone)]
pub struct RouteRegistrar {
    dispatch: Dispatch,
}

impl RouteRegistrar {
    pub fn new(dispatch: Dispatch) -> Self {
        Self { dispatch }
    }

    pub fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }

    /// Register `routes` in order and return the router plus a report.
    pub fn register(&self, routes: Vec<LoadedRoute>) -> (Router, RegistrationReport) {
        let mut report = RegistrationReport::default();
        let mut mounts: Vec<Mount> = Vec::new();
        let mut by_shape: HashMap<String, usize> = HashMap::new();

        for route in routes {
            let exports: Vec<(Method, Handler)> = match route.method {
                Some(method) => route
                    .module
                    .export_for(method)
                    .map(|h| vec![(method, h.clone())])
                    .unwrap_or_default(),
                None => route
                    .module
                    .exports()
                    .into_iter()
                    .map(|(m, h)| (m, h.clone()))
                    .collect(),
            };
            if exports.is_empty() {
                tracing::debug!(file = %route.file.relative, "Route module exports no handlers");
                continue;
            }

            let template = route.template.as_string();
            let shape = shape_of(&route.template);
            let index = *by_shape.entry(shape).or_insert_with(|| {
                mounts.push(Mount {
                    path: route.template.axum_path(),
                    template: template.clone(),
                    params: route.template.params().into_iter().map(str::to_string).collect(),
                    methods: MethodRouter::new(),
                    owners: HashMap::new(),
                });
                mounts.len() - 1
            });
            let mount = &mut mounts[index];
            let renames: Vec<(String, String)> = mount
                .params
                .iter()
                .zip(route.template.params())
                .filter(|(from, to)| from.as_str() != *to)
                .map(|(from, to)| (from.clone(), to.to_string()))
                .collect();

            for (method, handler) in exports {
                if let Some(winner) = mount.owners.get(&method) {
                    tracing::warn!(
                        method = %method,
                        route = %mount.template,
                        kept = %winner,
                        skipped = %route.file.relative,
                        "Duplicate route registration ignored"
                    );
                    report.conflicts.push(Conflict {
                        method,
                        template: mount.template.clone(),
                        winner: winner.clone(),
                        loser: route.file.relative.clone(),
                    });
                    continue;
                }

                let dispatch = self.dispatch.clone();
                let binding = Binding::with_renames(&template, renames.clone());
                let methods = std::mem::replace(&mut mount.methods, MethodRouter::new());
                mount.methods = methods.on(method.filter(), move |req: Request| {
                    invoke(handler.clone(), dispatch.clone(), binding.clone(), req)
                });
                mount.owners.insert(method, route.file.relative.clone());

                tracing::debug!(method = %method, route = %mount.template, file = %route.file.relative, "Route registered");
                report.routes.push(RegisteredRoute {
                    method,
                    template: mount.template.clone(),
                    file: route.file.relative.clone(),
                });
            }
        }

        let mut router = Router::new();
        let mut scratch: Router = Router::new();
        for mount in mounts {
            if !accepts(&scratch, &mount.path) {
                tracing::error!(route = %mount.template, "Route template conflicts with an existing route, skipping");
                report.routes.retain(|r| r.template != mount.template);
                continue;
            }
            scratch = scratch.route(&mount.path, any(|| async {}));
            router = router.route(&mount.path, mount.methods);
        }

        (router, report)
    }
}

/// Template with parameter names erased; equal shapes share a mount.
fn shape_of(template: &RouteTemplate) -> String {
    let mut shape = String::new();
    for segment in template.segments() {
        shape.push('/');
        match segment {
            Segment::Static(s) => shape.push_str(s),
            Segment::Param(_) => shape.push(':'),
            Segment::CatchAll(_) => shape.push('*'),
        }
    }
    if shape.is_empty() {
        shape.push('/');
    }
    shape
}

/// Whether `path` can be added to `scratch` without the router rejecting it.
fn accepts(scratch: &Router, path: &str) -> bool {
    let candidate = scratch.clone();
    let path = path.to_string();
    std::panic::catch_unwind(AssertUnwindSafe(move || {
        let _ = candidate.route(&path, any(|| async {}));
    }))
    .is_ok()
}

/// Mounted templates with their methods, in registration order.
pub fn route_table(report: &RegistrationReport) -> Vec<(String, Vec<Method>)> {
    let mut order: Vec<String> = Vec::new();
    let mut methods: HashMap<String, Vec<Method>> = HashMap::new();
    let mut seen = HashSet::new();
    for route in &report.routes {
        if seen.insert(route.template.clone()) {
            order.push(route.template.clone());
        }
        methods.entry(route.template.clone()).or_default().push(route.method);
    }
    order
        .into_iter()
        .map(|t| {
            let mut m = methods.remove(&t).unwrap_or_default();
            m.sort();
            (t, m)
        })
        .collect()
}
