//! Context documents read from a directory on disk.

use std::path::PathBuf;

use async_trait::async_trait;
use parley_core::context::ContextResolver;
use parley_core::error::ContextError;
use parley_security::PathValidationError;

/// Resolves context names to files under one root directory.
///
/// Names containing `..`, absolute paths and symlinks leading outside the
/// root are refused. A document that is empty or whitespace-only counts
/// as unusable.
#[derive(Debug, Clone)]
pub struct DirContextResolver {
    root: PathBuf,
}

impl DirContextResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ContextResolver for DirContextResolver {
    async fn read(&self, name: &str) -> Result<String, ContextError> {
        let path = parley_security::resolve_within(&self.root, name).map_err(|e| match e {
            PathValidationError::CanonicalizeFailed { reason, .. } => ContextError::Unreadable {
                name: name.into(),
                reason,
            },
            _ => ContextError::InvalidName(name.into()),
        })?;

        let text = tokio::fs::read_to_string(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ContextError::NotFound(name.into())
            } else {
                ContextError::Unreadable {
                    name: name.into(),
                    reason: e.to_string(),
                }
            }
        })?;

        if text.trim().is_empty() {
            return Err(ContextError::Empty(name.into()));
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (tempfile::TempDir, DirContextResolver) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("support.txt"), "You are a support agent.").unwrap();
        std::fs::write(dir.path().join("blank.txt"), "  \n").unwrap();
        let resolver = DirContextResolver::new(dir.path());
        (dir, resolver)
    }

    #[tokio::test]
    async fn reads_existing_document() {
        let (_dir, resolver) = setup();
        assert_eq!(resolver.read("support.txt").await.unwrap(), "You are a support agent.");
    }

    #[tokio::test]
    async fn missing_and_empty_documents() {
        let (_dir, resolver) = setup();
        assert!(matches!(resolver.read("nope.txt").await, Err(ContextError::NotFound(_))));
        assert!(matches!(resolver.read("blank.txt").await, Err(ContextError::Empty(_))));
    }

    #[tokio::test]
    async fn traversal_and_absolute_names_refused() {
        let (_dir, resolver) = setup();
        assert!(matches!(
            resolver.read("../etc/passwd").await,
            Err(ContextError::InvalidName(_))
        ));
        assert!(matches!(
            resolver.read("/etc/passwd").await,
            Err(ContextError::InvalidName(_))
        ));
    }
}
