//! Path validation: confine user- or model-supplied names to a root
//! directory.

use std::path::{Component, Path, PathBuf};

/// Error returned when path validation fails.
#[derive(Debug, thiserror::Error)]
pub enum PathValidationError {
    #[error("Path name is empty")]
    Empty,

    #[error("Path traversal detected in '{path}'")]
    PathTraversal { path: String },

    #[error("Absolute path '{path}' is not allowed")]
    Absolute { path: String },

    #[error("Path '{path}' resolves outside '{root}'")]
    OutsideRoot { path: String, root: String },

    #[error("Failed to canonicalize path '{path}': {reason}")]
    CanonicalizeFailed { path: String, reason: String },
}

/// Check that `name` is a plain relative name.
///
/// Rejects:
/// 1. empty names and names containing NUL
/// 2. any `..` path component, with either separator
/// 3. absolute paths, drive prefixes, and leading separators
pub fn validate_relative_name(name: &str) -> Result<(), PathValidationError> {
    if name.trim().is_empty() || name.contains('\0') {
        return Err(PathValidationError::Empty);
    }

    let normalized = name.replace('\\', "/");
    if Path::new(&normalized)
        .components()
        .any(|c| c == Component::ParentDir)
    {
        return Err(PathValidationError::PathTraversal { path: name.into() });
    }

    let path = Path::new(name);
    let has_root = path
        .components()
        .any(|c| matches!(c, Component::RootDir | Component::Prefix(_)));
    if normalized.starts_with('/') || path.is_absolute() || has_root {
        return Err(PathValidationError::Absolute { path: name.into() });
    }

    Ok(())
}

/// Resolve `name` under `root`, refusing anything that would land outside.
///
/// The name is first checked with [`validate_relative_name`]. When the
/// target already exists it is canonicalized, so a symlink pointing out
/// of the root is caught as well. The returned path may not exist yet.
pub fn resolve_within(root: &Path, name: &str) -> Result<PathBuf, PathValidationError> {
    validate_relative_name(name)?;

    let candidate = root.join(name);
    if !candidate.exists() {
        return Ok(candidate);
    }

    let canonical_root = root
        .canonicalize()
        .map_err(|e| PathValidationError::CanonicalizeFailed {
            path: root.display().to_string(),
            reason: e.to_string(),
        })?;
    let canonical = candidate
        .canonicalize()
        .map_err(|e| PathValidationError::CanonicalizeFailed {
            path: name.into(),
            reason: e.to_string(),
        })?;

    if !canonical.starts_with(&canonical_root) {
        tracing::warn!(path = %name, "Resolved path escapes its root");
        return Err(PathValidationError::OutsideRoot {
            path: name.into(),
            root: root.display().to_string(),
        });
    }

    Ok(canonical)
}
