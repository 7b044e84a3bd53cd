//! Per-session scratch directories.
//!
//! Functions that produce files write them under `<root>/<session_id>/`.
//! The directory is created on first use and removed when the session is
//! cleaned up.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parley_core::context::SessionCleanup;
use parley_security::PathValidationError;

#[derive(Debug, Clone)]
pub struct ScratchDirs {
    root: PathBuf,
}

impl ScratchDirs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `<tmp>/parley-scratch`, used when no root is configured.
    pub fn in_temp_dir() -> Self {
        Self::new(std::env::temp_dir().join("parley-scratch"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory for `session_id`, without creating it. Session ids that
    /// are not plain names are refused.
    pub fn dir_for(&self, session_id: &str) -> Result<PathBuf, PathValidationError> {
        if session_id.contains(['/', '\\']) {
            return Err(PathValidationError::PathTraversal {
                path: session_id.into(),
            });
        }
        parley_security::resolve_within(&self.root, session_id)
    }

    /// Directory for `session_id`, created if missing.
    pub async fn ensure(&self, session_id: &str) -> std::io::Result<PathBuf> {
        let dir = self
            .dir_for(session_id)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()))?;
        tokio::fs::create_dir_all(&dir).await?;
        Ok(dir)
    }
}

#[async_trait]
impl SessionCleanup for ScratchDirs {
    async fn cleanup(&self, session_id: &str) {
        let dir = match self.dir_for(session_id) {
            Ok(dir) => dir,
            Err(e) => {
                tracing::warn!(session_id, error = %e, "Refusing to clean scratch directory");
                return;
            }
        };
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => tracing::debug!(session_id, path = %dir.display(), "Removed scratch directory"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(session_id, error = %e, "Failed to remove scratch directory"),
        }
    }
}
