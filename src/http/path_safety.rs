//! Mapping of request paths onto files inside the web root.
//!
//! A request path is treated as relative to the root no matter how it is
//! spelled: a leading `/` is dropped, `.` segments vanish and `..` may only
//! climb back out of directories the path itself entered. Whatever file the
//! result names, following symlinks, must still live under the root.

use std::path::{Component, Path, PathBuf};

use crate::{AppError, Result};

/// Map `requested` onto a path under `root`.
///
/// `/etc/passwd` becomes `<root>/etc/passwd`, and `css/../index.html`
/// becomes `<root>/index.html`. Paths that do not exist yet are returned
/// unresolved so the caller can answer not-found itself.
///
/// # Errors
///
/// Returns `AppError::PathViolation` when the root is unusable, when `..`
/// would leave the root, or when an existing entry links outside it.
pub fn resolve_under_root(root: &Path, requested: impl AsRef<Path>) -> Result<PathBuf> {
    let root = root
        .canonicalize()
        .map_err(|err| AppError::PathViolation(format!("cannot open web root: {err}")))?;

    let relative = relative_to_root(requested.as_ref())?;
    let target = root.join(relative);

    if !target.exists() {
        return Ok(target);
    }

    let resolved = target
        .canonicalize()
        .map_err(|err| AppError::PathViolation(format!("cannot resolve request path: {err}")))?;
    if resolved.starts_with(&root) {
        Ok(resolved)
    } else {
        Err(AppError::PathViolation(format!(
            "symlink at {} leads outside the web root",
            requested.as_ref().display()
        )))
    }
}

/// Lexically reduce `requested` to a root-relative path.
fn relative_to_root(requested: &Path) -> Result<PathBuf> {
    let mut segments: Vec<&std::ffi::OsStr> = Vec::new();
    for component in requested.components() {
        match component {
            Component::Normal(segment) => segments.push(segment),
            Component::ParentDir => {
                if segments.pop().is_none() {
                    return Err(AppError::PathViolation(format!(
                        "{} climbs above the web root",
                        requested.display()
                    )));
                }
            }
            Component::RootDir | Component::Prefix(_) | Component::CurDir => {}
        }
    }
    Ok(segments.into_iter().collect())
}
