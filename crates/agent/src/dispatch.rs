//! Function dispatch: turn one model-proposed tool call into the text of
//! the tool message that answers it.
//!
//! Failures never escape. Unknown functions, bad arguments and handler
//! faults all become a small JSON error payload that is fed back to the
//! model, which is expected to recover or explain.

use std::time::Instant;

use parley_core::error::ToolError;
use parley_core::message::MessageToolCall;
use parley_core::tool::{CallArgs, FunctionRegistry};
use serde_json::json;
use tracing::{debug, info, warn};

/// Result of answering one tool call.
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatched {
    /// Tool message content
    pub content: String,
    pub success: bool,
    pub duration_ms: u64,
}

/// Resolve, validate and invoke the function named by `call`.
pub async fn call_function(
    registry: &dyn FunctionRegistry,
    session_id: &str,
    call: &MessageToolCall,
) -> Dispatched {
    let start = Instant::now();
    let outcome = invoke(registry, session_id, call).await;
    let duration_ms = start.elapsed().as_millis() as u64;

    match outcome {
        Ok(content) => {
            info!(session_id, function = %call.name, duration_ms, "Function executed");
            Dispatched {
                content,
                success: true,
                duration_ms,
            }
        }
        Err(e) => {
            warn!(session_id, function = %call.name, error = %e, "Function call failed");
            Dispatched {
                content: error_payload(&e),
                success: false,
                duration_ms,
            }
        }
    }
}

async fn invoke(
    registry: &dyn FunctionRegistry,
    session_id: &str,
    call: &MessageToolCall,
) -> Result<String, ToolError> {
    let function = registry
        .resolve(&call.name)
        .ok_or_else(|| ToolError::NotFound(call.name.clone()))?;
    let args = CallArgs::bind(function.as_ref(), &call.arguments, session_id)?;
    debug!(session_id, function = %call.name, arguments = %call.arguments, "Calling function");
    Ok(function.invoke(args).await?.into_text())
}

/// JSON error payload handed back to the model in place of a result.
pub fn error_payload(error: &ToolError) -> String {
    let payload = match error {
        ToolError::NotFound(name) => json!({ "error": format!("Function '{name}' not found") }),
        ToolError::MissingArguments { function, missing } => json!({
            "error": format!("Missing required arguments for function '{function}'"),
            "details": format!("Missing: {}", missing.join(", ")),
        }),
        ToolError::InvalidArgument {
            function,
            param,
            expected,
        } => json!({
            "error": format!("Invalid argument '{param}' for function '{function}'"),
            "details": format!("'{param}' must be {} {expected}.", article(expected)),
        }),
        ToolError::ExecutionFailed { reason, .. } | ToolError::PermissionDenied { reason, .. } => {
            json!({ "error": "Function execution failed", "details": reason })
        }
    };
    payload.to_string()
}

fn article(word: &str) -> &'static str {
    match word.chars().next() {
        Some('a' | 'e' | 'i' | 'o' | 'u') => "an",
        _ => "a",
    }
}
