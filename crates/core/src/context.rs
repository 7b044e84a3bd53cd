//! Collaborator traits for session context documents and per-session
//! temporary resources.

use async_trait::async_trait;

use crate::error::ContextError;

/// Loads named context documents (persona / instruction text).
///
/// Implementations must refuse names that escape their designated root.
#[async_trait]
pub trait ContextResolver: Send + Sync {
    async fn read(&self, name: &str) -> Result<String, ContextError>;
}

/// Releases temporary resources held on behalf of a session.
///
/// Fire-and-forget: implementations log their own failures and never
/// report them back to the caller.
#[async_trait]
pub trait SessionCleanup: Send + Sync {
    async fn cleanup(&self, session_id: &str);
}

/// Cleanup that does nothing, for deployments without scratch resources.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCleanup;

#[async_trait]
impl SessionCleanup for NoopCleanup {
    async fn cleanup(&self, _session_id: &str) {}
}
