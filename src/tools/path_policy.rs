//! Path resolution and confinement.
//!
//! Confinement must hold even against symlink escapes: a symlink inside the
//! allowed root pointing outward, and a not-yet-existing path beneath such a
//! symlink, are both resolved to their real location before the containment
//! check. Paths that do not exist yet are resolved through their deepest
//! existing ancestor rather than skipped.

use std::io;
use std::path::{Component, Path, PathBuf};

use crate::error::{Result, SkiffError};

/// Resolve a user-supplied path against a working directory.
///
/// Absolute paths pass through unchanged; relative paths are joined onto
/// `cwd`. Empty input defaults to `.`, as does an empty `cwd`.
pub fn resolve_path(cwd: &str, path_value: &str) -> PathBuf {
    let trimmed = path_value.trim();
    let trimmed = if trimmed.is_empty() { "." } else { trimmed };
    let candidate = Path::new(trimmed);
    if candidate.is_absolute() {
        return candidate.to_path_buf();
    }

    let base = cwd.trim();
    let base = if base.is_empty() { "." } else { base };
    Path::new(base).join(candidate)
}

/// Prove that `candidate` stays within `allowed_root` after full symlink
/// resolution of both sides.
pub fn ensure_path_allowed(allowed_root: &str, candidate: &Path) -> Result<()> {
    let allowed_root = allowed_root.trim();
    if allowed_root.is_empty() {
        return Err(SkiffError::PathPolicy(
            "invalid tool context: allowed_root is required".into(),
        ));
    }

    let real_root = std::fs::canonicalize(allowed_root)
        .map_err(|err| SkiffError::PathPolicy(format!("failed to resolve allowed_root: {err}")))?;

    let abs_candidate = absolutize(candidate)
        .map_err(|err| SkiffError::PathPolicy(format!("failed to resolve path: {err}")))?;
    let real_candidate = resolve_real_path(&abs_candidate)
        .map_err(|err| SkiffError::PathPolicy(format!("failed to evaluate path symlinks: {err}")))?;

    if real_candidate.starts_with(&real_root) {
        Ok(())
    } else {
        Err(SkiffError::PathPolicy("path is outside allowed_root".into()))
    }
}

fn absolutize(path: &Path) -> io::Result<PathBuf> {
    if path.is_absolute() {
        return Ok(lexical_clean(path));
    }
    Ok(lexical_clean(&std::env::current_dir()?.join(path)))
}

/// Resolve all symlinks in `abs_path`. When trailing components do not exist
/// yet (write-to-new-file case), resolve the deepest existing ancestor and
/// rejoin the non-existent remainder onto that resolved ancestor.
fn resolve_real_path(abs_path: &Path) -> io::Result<PathBuf> {
    match std::fs::canonicalize(abs_path) {
        Ok(real) => Ok(real),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            let existing = find_existing_ancestor(abs_path)?;
            let real_ancestor = std::fs::canonicalize(&existing)?;
            let remainder = abs_path.strip_prefix(&existing).unwrap_or(Path::new(""));
            Ok(lexical_clean(&real_ancestor.join(remainder)))
        }
        Err(err) => Err(err),
    }
}

/// Deepest ancestor of `path` that exists per lstat (symlinks themselves
/// count as existing, so a dangling link is not silently skipped).
fn find_existing_ancestor(path: &Path) -> io::Result<PathBuf> {
    let mut current = path;
    loop {
        match std::fs::symlink_metadata(current) {
            Ok(_) => return Ok(current.to_path_buf()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(err),
        }
        current = current.parent().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "no existing ancestor found for path")
        })?;
    }
}

/// Lexically normalize a path: drop `.`, collapse `..` against preceding
/// components. No filesystem access.
fn lexical_clean(path: &Path) -> PathBuf {
    let mut cleaned = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !cleaned.pop() {
                    cleaned.push(component.as_os_str());
                }
            }
            other => cleaned.push(other.as_os_str()),
        }
    }
    if cleaned.as_os_str().is_empty() {
        cleaned.push(".");
    }
    cleaned
}
