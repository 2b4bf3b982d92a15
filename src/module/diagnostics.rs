//! Best-effort source locations for module load failures.
//!
//! Scans the textual form of a failure (error chain, backtrace, panic
//! message) for `file:line:column` triples and reads the offending line
//! back from disk when possible. Nothing here is required for the error
//! itself to propagate.
//!
//! Panics carry no text location in their payload, so a chained panic hook
//! records [`std::panic::Location`] per thread and [`catch_panic`] picks it
//! up right after the unwind is caught.

use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::{Once, OnceLock};

use futures_util::FutureExt;
use regex::Regex;
use thiserror::Error;

/// A location inside a source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub file: String,
    pub line: u32,
    pub column: u32,
    /// Text of the offending line, when the file was readable.
    pub source_line: Option<String>,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

fn location_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"([^\s:()<>,]+\.[A-Za-z0-9]+):(\d+):(\d+)").expect("location pattern is valid")
    })
}

/// Extract the most relevant `file:line:col` triple from `text`.
///
/// Prefers a location inside `relative` (the route file's path under the
/// routes root); otherwise returns the first one found.
pub fn extract_location(text: &str, relative: &str) -> Option<SourceLocation> {
    let mut first = None;

    for caps in location_pattern().captures_iter(text) {
        let file = caps[1].trim_start_matches("./").to_string();
        let (Ok(line), Ok(column)) = (caps[2].parse::<u32>(), caps[3].parse::<u32>()) else {
            continue;
        };
        let loc = SourceLocation { file, line, column, source_line: None };

        if !relative.is_empty() && loc.file.ends_with(relative) {
            return Some(loc);
        }
        if first.is_none() {
            first = Some(loc);
        }
    }

    first
}

/// Attach the text of the offending line, read from `path`.
pub async fn with_source_line(mut loc: SourceLocation, path: &Path) -> SourceLocation {
    if loc.line == 0 {
        return loc;
    }
    if let Ok(content) = tokio::fs::read_to_string(path).await {
        loc.source_line = content
            .lines()
            .nth(loc.line as usize - 1)
            .map(|l| l.trim_end().to_string());
    }
    loc
}

thread_local! {
    static LAST_PANIC: RefCell<Option<SourceLocation>> = const { RefCell::new(None) };
}

static PANIC_HOOK: Once = Once::new();

/// Chain a hook that records where each panic happened. Installed once.
pub fn install_panic_hook() {
    PANIC_HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            if let Some(loc) = info.location() {
                let loc = SourceLocation {
                    file: loc.file().to_string(),
                    line: loc.line(),
                    column: loc.column(),
                    source_line: None,
                };
                LAST_PANIC.with(|slot| *slot.borrow_mut() = Some(loc));
            }
            previous(info);
        }));
    });
}

fn take_panic_location() -> Option<SourceLocation> {
    LAST_PANIC.with(|slot| slot.borrow_mut().take())
}

/// A panic caught at a user-code boundary.
#[derive(Debug, Clone, Error)]
#[error("{origin} panicked: {message}")]
pub struct CaughtPanic {
    pub origin: &'static str,
    pub message: String,
    /// Where the panic was raised, when the hook saw it.
    pub location: Option<SourceLocation>,
}

impl CaughtPanic {
    fn from_payload(origin: &'static str, payload: &(dyn std::any::Any + Send)) -> Self {
        Self {
            origin,
            message: panic_message(payload),
            location: take_panic_location(),
        }
    }
}

/// Run `f`, turning a panic into a [`CaughtPanic`] with its location.
pub fn catch_panic<R>(origin: &'static str, f: impl FnOnce() -> R) -> Result<R, CaughtPanic> {
    install_panic_hook();
    take_panic_location();
    std::panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| CaughtPanic::from_payload(origin, payload.as_ref()))
}

/// Poll `fut` to completion, turning a panic into a [`CaughtPanic`].
///
/// The location is read in the same poll that caught the unwind, so it
/// comes from the thread that panicked.
pub async fn catch_panic_async<F: Future>(origin: &'static str, fut: F) -> Result<F::Output, CaughtPanic> {
    install_panic_hook();
    take_panic_location();
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(out) => Ok(out),
        Err(payload) => Err(CaughtPanic::from_payload(origin, payload.as_ref())),
    }
}

/// Best-effort location for any error: a caught panic's own location, else
/// the first `file:line:col` in its debug text (which carries the backtrace
/// when one was captured).
pub fn error_location(error: &anyhow::Error) -> Option<SourceLocation> {
    if let Some(panic) = error.chain().find_map(|e| e.downcast_ref::<CaughtPanic>()) {
        if panic.location.is_some() {
            return panic.location.clone();
        }
    }
    extract_location(&format!("{:?}", error), "")
}

/// Render a panic payload as text.
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefers_route_file_frame() {
        let text = "boom\n  at src/module/loader.rs:10:5\n  at demos/routes/users/[id]/route.rs:7:13";
        let loc = extract_location(text, "users/[id]/route.rs").unwrap();
        assert_eq!(loc.file, "demos/routes/users/[id]/route.rs");
        assert_eq!((loc.line, loc.column), (7, 13));
    }

    #[test]
    fn test_falls_back_to_first_frame() {
        let loc = extract_location("failed at ./src/lib.rs:3:1", "other/route.rs").unwrap();
        assert_eq!(loc.to_string(), "src/lib.rs:3:1");
    }

    #[test]
    fn test_no_location() {
        assert_eq!(extract_location("no frames here", "route.rs"), None);
    }

    #[test]
    fn test_caught_panic_records_location() {
        let caught = catch_panic("factory", || -> u32 { panic!("bad factory") }).unwrap_err();
        assert_eq!(caught.to_string(), "factory panicked: bad factory");
        let loc = caught.location.unwrap();
        assert!(loc.file.ends_with("diagnostics.rs"), "{}", loc);
        assert!(loc.line > 0);

        assert_eq!(catch_panic("factory", || 7).unwrap(), 7);
    }

    #[tokio::test]
    async fn test_async_panic_location_survives_await() {
        let fut = async {
            tokio::task::yield_now().await;
            if true {
                panic!("late panic");
            }
            1u8
        };
        let caught = catch_panic_async("handler", fut).await.unwrap_err();
        assert_eq!(caught.message, "late panic");
        assert!(caught.location.unwrap().file.ends_with("diagnostics.rs"));
    }

    #[test]
    fn test_error_location_prefers_panic_then_text() {
        let caught = catch_panic("handler", || panic!("boom")).unwrap_err();
        let expected = caught.location.clone().unwrap();
        let err = anyhow::Error::new(caught);
        assert_eq!(error_location(&err), Some(expected));

        let err = anyhow::anyhow!("parse failed at demos/routes/route.rs:4:9");
        assert_eq!(error_location(&err).unwrap().to_string(), "demos/routes/route.rs:4:9");
    }

    #[tokio::test]
    async fn test_reads_source_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("route.rs");
        std::fs::write(&path, "line one\n    let broken = ;\nline three\n").unwrap();

        let loc = SourceLocation { file: "route.rs".into(), line: 2, column: 5, source_line: None };
        let loc = with_source_line(loc, &path).await;
        assert_eq!(loc.source_line.as_deref(), Some("    let broken = ;"));

        let missing = SourceLocation { file: "x.rs".into(), line: 1, column: 1, source_line: None };
        let missing = with_source_line(missing, &dir.path().join("x.rs")).await;
        assert_eq!(missing.source_line, None);
    }
}
