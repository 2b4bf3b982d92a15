//! Route file path → URL route template mapping.
//!
//! # Responsibilities
//! - Strip the routes root and the file name from a discovered file
//! - Convert `[name]` folder segments into `:name` parameters
//! - Join segments under the base route with single slashes
//!
//! # Design Decisions
//! - Pure: same (root, file, base, naming) always yields the same template
//! - Malformed bracket segments (`[id`, `id]`) pass through literally
//! - `[...name]` is a catch-all parameter rendered as `*name`

use std::fmt;
use std::path::{Component, Path};

use serde::{Deserialize, Serialize};

use crate::module::Method;

/// File naming convention used to recognize route files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Naming {
    /// A fixed marker file (e.g. `route.rs`) defines the route of its folder.
    #[default]
    Marker,
    /// Files named after an HTTP method (e.g. `get.rs`) define that method
    /// for their folder; any other file name becomes a trailing segment.
    MethodFiles,
}

/// One segment of a route template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Static(String),
    Param(String),
    CatchAll(String),
}

/// A URL pattern derived from a route file location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTemplate {
    segments: Vec<Segment>,
}

impl RouteTemplate {
    /// Build a template from raw path segments.
    ///
    /// Empty segments are dropped, which collapses runs of slashes.
    pub fn from_segments<'a>(raw: impl IntoIterator<Item = &'a str>) -> Self {
        let segments = raw
            .into_iter()
            .flat_map(|s| s.split('/'))
            .filter(|s| !s.is_empty())
            .map(classify_segment)
            .collect();
        Self { segments }
    }

    /// Parse a template string such as `/api/users/:id`.
    pub fn parse(template: &str) -> Self {
        let segments = template
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| {
                if let Some(name) = s.strip_prefix(':') {
                    Segment::Param(name.to_string())
                } else if let Some(name) = s.strip_prefix('*') {
                    Segment::CatchAll(name.to_string())
                } else {
                    Segment::Static(s.to_string())
                }
            })
            .collect();
        Self { segments }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Parameter names, in path order.
    pub fn params(&self) -> Vec<&str> {
        self.segments
            .iter()
            .filter_map(|s| match s {
                Segment::Param(name) | Segment::CatchAll(name) => Some(name.as_str()),
                Segment::Static(_) => None,
            })
            .collect()
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Canonical textual form (`/users/:id`).
    pub fn as_string(&self) -> String {
        self.render(|seg, out| match seg {
            Segment::Static(s) => out.push_str(s),
            Segment::Param(name) => {
                out.push(':');
                out.push_str(name);
            }
            Segment::CatchAll(name) => {
                out.push('*');
                out.push_str(name);
            }
        })
    }

    /// Path syntax accepted by axum's router (`/users/{id}`).
    pub fn axum_path(&self) -> String {
        self.render(|seg, out| match seg {
            Segment::Static(s) => out.push_str(s),
            Segment::Param(name) => {
                out.push('{');
                out.push_str(name);
                out.push('}');
            }
            Segment::CatchAll(name) => {
                out.push_str("{*");
                out.push_str(name);
                out.push('}');
            }
        })
    }

    fn render(&self, write: impl Fn(&Segment, &mut String)) -> String {
        if self.segments.is_empty() {
            return "/".to_string();
        }
        let mut out = String::new();
        for seg in &self.segments {
            out.push('/');
            write(seg, &mut out);
        }
        out
    }
}

impl fmt::Display for RouteTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_string())
    }
}

/// Classify a single folder/file segment.
fn classify_segment(segment: &str) -> Segment {
    let inner = segment
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .filter(|s| !s.is_empty());

    match inner {
        Some(rest) => match rest.strip_prefix("...") {
            Some(name) if !name.is_empty() => Segment::CatchAll(name.to_string()),
            _ => Segment::Param(rest.to_string()),
        },
        None => Segment::Static(segment.to_string()),
    }
}

/// Returns the HTTP method a file name designates under [`Naming::MethodFiles`].
pub fn file_method(file: &Path) -> Option<Method> {
    file.file_stem()
        .and_then(|s| s.to_str())
        .and_then(Method::from_file_stem)
}

/// Map a route file to its URL route template.
///
/// Returns `None` when `file` is not under `routes_root` or, with
/// [`Naming::Marker`], when the file is not the marker file.
pub fn map_path(
    routes_root: &Path,
    file: &Path,
    base_route: &str,
    naming: Naming,
    marker_file: &str,
) -> Option<RouteTemplate> {
    let relative = file.strip_prefix(routes_root).ok()?;
    let stem = relative.file_stem()?.to_str()?;

    let folders: Vec<&str> = relative
        .parent()
        .map(|parent| {
            parent
                .components()
                .filter_map(|c| match c {
                    Component::Normal(s) => s.to_str(),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default();

    let trailing = match naming {
        Naming::Marker => {
            if stem != marker_file {
                return None;
            }
            None
        }
        Naming::MethodFiles => {
            if Method::from_file_stem(stem).is_some() || stem == "index" || stem == marker_file {
                None
            } else {
                Some(stem)
            }
        }
    };

    let raw = std::iter::once(base_route)
        .chain(folders)
        .chain(trailing);

    Some(RouteTemplate::from_segments(raw))
}
