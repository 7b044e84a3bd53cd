//! Error types for the parley domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; the top-level [`Error`]
//! wraps them for callers that only need to propagate.

use thiserror::Error;

/// The top-level error type for all parley operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Context errors ---
    #[error("Context error: {0}")]
    Context(#[from] ContextError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures of the LLM inference capability.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response from provider: {0}")]
    InvalidResponse(String),
}

/// Failures while dispatching or running a registered function.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Function '{0}' not found")]
    NotFound(String),

    #[error("Missing required arguments for function '{function}': {}", missing.join(", "))]
    MissingArguments {
        function: String,
        missing: Vec<String>,
    },

    #[error("Invalid argument '{param}' for function '{function}': expected {expected}")]
    InvalidArgument {
        function: String,
        param: String,
        expected: String,
    },

    #[error("Function execution failed: {function}: {reason}")]
    ExecutionFailed { function: String, reason: String },

    #[error("Permission denied: {function}: {reason}")]
    PermissionDenied { function: String, reason: String },
}

/// Failures while resolving a named context document.
#[derive(Debug, Clone, Error)]
pub enum ContextError {
    #[error("Invalid context name '{0}'")]
    InvalidName(String),

    #[error("Context '{0}' not found")]
    NotFound(String),

    #[error("Context '{name}' could not be read: {reason}")]
    Unreadable { name: String, reason: String },

    #[error("Context '{0}' is empty")]
    Empty(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 500,
            message: "upstream exploded".into(),
        });
        assert!(err.to_string().contains("500"));
        assert!(err.to_string().contains("upstream exploded"));
    }

    #[test]
    fn missing_arguments_lists_every_name() {
        let err = ToolError::MissingArguments {
            function: "create_pull_request".into(),
            missing: vec!["title".into(), "sourceBranch".into()],
        };
        let text = err.to_string();
        assert!(text.contains("create_pull_request"));
        assert!(text.contains("title, sourceBranch"));
    }

    #[test]
    fn timeout_mentions_duration() {
        assert_eq!(
            ProviderError::Timeout(30).to_string(),
            "Request timed out after 30s"
        );
    }
}
