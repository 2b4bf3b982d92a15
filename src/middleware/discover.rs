//! Project-level middleware declaration discovery.

use std::path::Path;

use crate::config::MiddlewareConfig;
use crate::middleware::{MiddlewareDecl, MiddlewareError};
use crate::module::Manifest;

/// Look for `{project_root}/{dir}/{declaration}.<ext>` and resolve it.
///
/// Returns `Ok(None)` when no declaration file exists on disk, and
/// [`MiddlewareError::Unregistered`] when one exists but the manifest
/// has nothing for it.
pub fn discover(
    config: &MiddlewareConfig,
    extensions: &[String],
    manifest: &Manifest,
) -> Result<Option<MiddlewareDecl>, MiddlewareError> {
    let dir = Path::new(&config.project_root).join(&config.dir);

    for ext in extensions {
        let file_name = format!("{}.{}", config.declaration, ext);
        if !dir.join(&file_name).is_file() {
            continue;
        }
        let relative = format!("{}/{}", config.dir.trim_matches('/'), file_name);
        return match manifest.middleware_decl(&relative) {
            Some(decl) => {
                tracing::info!(declaration = %relative, "Middleware declaration found");
                Ok(Some(decl.clone()))
            }
            None => Err(MiddlewareError::Unregistered { path: relative }),
        };
    }

    tracing::debug!(dir = ?dir, "No middleware declaration");
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::MiddlewareMap;

    fn config(root: &Path) -> MiddlewareConfig {
        MiddlewareConfig {
            project_root: root.to_string_lossy().into_owned(),
            ..Default::default()
        }
    }

    #[test]
    fn test_absent_declaration() {
        let dir = tempfile::tempdir().unwrap();
        let found = discover(&config(dir.path()), &["rs".into()], &Manifest::new()).unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn test_declaration_resolved_through_manifest() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("middlewares")).unwrap();
        std::fs::write(dir.path().join("middlewares/index.rs"), "// decl").unwrap();

        let manifest = Manifest::new().middleware("middlewares/index.rs", MiddlewareDecl::Map(MiddlewareMap::new()));
        let found = discover(&config(dir.path()), &["rs".into()], &manifest).unwrap();
        assert!(matches!(found, Some(MiddlewareDecl::Map(_))));

        let err = discover(&config(dir.path()), &["rs".into()], &Manifest::new()).unwrap_err();
        assert!(matches!(err, MiddlewareError::Unregistered { .. }));
    }
}
