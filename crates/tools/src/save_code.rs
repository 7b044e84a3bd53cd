//! Save generated code into the session's scratch directory.

use std::sync::Arc;

use async_trait::async_trait;
use parley_core::error::ToolError;
use parley_core::tool::{CallArgs, Function, FunctionOutput, ParamSpec, ParamType};

use crate::scratch::ScratchDirs;

pub struct SaveCodeToFile {
    scratch: Arc<ScratchDirs>,
}

impl SaveCodeToFile {
    pub fn new(scratch: Arc<ScratchDirs>) -> Self {
        Self { scratch }
    }

    fn failed(&self, reason: impl Into<String>) -> ToolError {
        ToolError::ExecutionFailed {
            function: self.name().into(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Function for SaveCodeToFile {
    fn name(&self) -> &str {
        "save_code_to_file"
    }

    fn description(&self) -> &str {
        "Save a block of code to a file in this session's workspace. Overwrites an existing file of the same name."
    }

    fn params(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::required("file_name", ParamType::String, "Relative file name, e.g. 'main.rs'"),
            ParamSpec::required("code", ParamType::String, "The code to write"),
        ]
    }

    fn needs_session(&self) -> bool {
        true
    }

    async fn invoke(&self, args: CallArgs) -> Result<FunctionOutput, ToolError> {
        let session_id = args
            .session_id()
            .ok_or_else(|| self.failed("no session attached to call"))?;
        let file_name = args.str("file_name").unwrap_or_default();
        let code = args.str("code").unwrap_or_default();

        let dir = self.scratch.ensure(session_id).await.map_err(|e| self.failed(e.to_string()))?;
        let path = parley_security::resolve_within(&dir, file_name).map_err(|e| {
            ToolError::PermissionDenied {
                function: self.name().into(),
                reason: e.to_string(),
            }
        })?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.failed(format!("Failed to create directory: {e}")))?;
        }
        tokio::fs::write(&path, code)
            .await
            .map_err(|e| self.failed(format!("Failed to write file: {e}")))?;

        tracing::debug!(session_id, file = %file_name, bytes = code.len(), "Saved code to scratch file");
        Ok(FunctionOutput::Json(serde_json::json!({
            "saved": true,
            "file_name": file_name,
            "bytes": code.len(),
        })))
    }
}
