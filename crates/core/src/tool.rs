//! Function trait: the typed capability table the model can call into.
//!
//! Each callable function describes its ordered parameter list up front
//! (name, JSON type, whether it is required) and whether the session
//! identifier must be injected as an implicit first argument. Arguments
//! proposed by the model are validated against that metadata by
//! [`CallArgs::bind`] before anything is invoked.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ToolError;
use crate::provider::ToolDefinition;

/// JSON type of a declared parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Number,
    Integer,
    Boolean,
    Object,
    Array,
}

impl ParamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Number => "number",
            ParamType::Integer => "integer",
            ParamType::Boolean => "boolean",
            ParamType::Object => "object",
            ParamType::Array => "array",
        }
    }

    /// Whether `value` is acceptable for this type.
    pub fn accepts(&self, value: &serde_json::Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::Number => value.is_number(),
            ParamType::Integer => value.is_i64() || value.is_u64(),
            ParamType::Boolean => value.is_boolean(),
            ParamType::Object => value.is_object(),
            ParamType::Array => value.is_array(),
        }
    }
}

/// One declared parameter of a function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamType,
    pub description: String,
    pub required: bool,
}

impl ParamSpec {
    pub fn required(name: impl Into<String>, kind: ParamType, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            description: description.into(),
            required: true,
        }
    }

    pub fn optional(name: impl Into<String>, kind: ParamType, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            description: description.into(),
            required: false,
        }
    }
}

/// Validated arguments handed to [`Function::invoke`].
///
/// Values are stored in declaration order; optional parameters the model
/// left out are `Null`.
#[derive(Debug, Clone, PartialEq)]
pub struct CallArgs {
    session_id: Option<String>,
    values: Vec<(String, serde_json::Value)>,
}

impl CallArgs {
    /// Build arguments directly, bypassing validation. Intended for tests
    /// and for callers that already hold checked values.
    pub fn new(session_id: Option<String>, values: Vec<(String, serde_json::Value)>) -> Self {
        Self { session_id, values }
    }

    /// Validate `raw` against the function's declared parameters.
    ///
    /// A non-object payload is treated as an empty object. All missing
    /// required parameters are reported together; a present argument whose
    /// JSON type does not match its declaration is rejected. The session
    /// identifier is only carried when the function asks for it.
    pub fn bind(
        function: &dyn Function,
        raw: &serde_json::Value,
        session_id: &str,
    ) -> Result<Self, ToolError> {
        let empty = serde_json::Map::new();
        let supplied = raw.as_object().unwrap_or(&empty);
        let params = function.params();

        let missing: Vec<String> = params
            .iter()
            .filter(|p| p.required && supplied.get(&p.name).is_none_or(|v| v.is_null()))
            .map(|p| p.name.clone())
            .collect();
        if !missing.is_empty() {
            return Err(ToolError::MissingArguments {
                function: function.name().to_string(),
                missing,
            });
        }

        let mut values = Vec::with_capacity(params.len());
        for param in params {
            let value = supplied.get(&param.name).cloned().unwrap_or_default();
            if !value.is_null() && !param.kind.accepts(&value) {
                return Err(ToolError::InvalidArgument {
                    function: function.name().to_string(),
                    param: param.name,
                    expected: param.kind.as_str().to_string(),
                });
            }
            values.push((param.name, value));
        }

        Ok(Self {
            session_id: function.needs_session().then(|| session_id.to_string()),
            values,
        })
    }

    /// The injected session identifier, if the function asked for one.
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Argument by parameter name. Absent optional arguments yield `None`.
    pub fn get(&self, name: &str) -> Option<&serde_json::Value> {
        self.values
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
            .filter(|v| !v.is_null())
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|v| v.as_str())
    }

    pub fn f64(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(|v| v.as_f64())
    }

    /// Arguments in call order: the session identifier first when injected,
    /// then one value per declared parameter.
    pub fn positional(&self) -> Vec<serde_json::Value> {
        self.session_id
            .iter()
            .map(|s| serde_json::Value::String(s.clone()))
            .chain(self.values.iter().map(|(_, v)| v.clone()))
            .collect()
    }
}

/// What a function hands back to the model.
#[derive(Debug, Clone, PartialEq)]
pub enum FunctionOutput {
    Text(String),
    Json(serde_json::Value),
}

impl FunctionOutput {
    /// Textual encoding sent back as the tool message content.
    ///
    /// Text passes through untouched; structured values are encoded as
    /// compact JSON. `serde_json::Value` is acyclic and cannot hold
    /// non-finite numbers, so the encoding always succeeds.
    pub fn into_text(self) -> String {
        match self {
            FunctionOutput::Text(text) => text,
            FunctionOutput::Json(value) => value.to_string(),
        }
    }
}

impl From<String> for FunctionOutput {
    fn from(text: String) -> Self {
        FunctionOutput::Text(text)
    }
}

impl From<serde_json::Value> for FunctionOutput {
    fn from(value: serde_json::Value) -> Self {
        FunctionOutput::Json(value)
    }
}

/// A function the model can call.
#[async_trait]
pub trait Function: Send + Sync {
    /// The unique name of this function (e.g., "calculator").
    fn name(&self) -> &str;

    /// A description of what this function does (sent to the LLM).
    fn description(&self) -> &str;

    /// Ordered parameter declarations.
    fn params(&self) -> Vec<ParamSpec>;

    /// Whether the session identifier is injected as an implicit argument.
    fn needs_session(&self) -> bool {
        false
    }

    /// Run the function with validated arguments.
    async fn invoke(&self, args: CallArgs) -> Result<FunctionOutput, ToolError>;

    /// Names of the required parameters, in declaration order.
    fn required(&self) -> Vec<String> {
        self.params()
            .into_iter()
            .filter(|p| p.required)
            .map(|p| p.name)
            .collect()
    }

    /// Convert this function into a schema for the LLM.
    fn to_definition(&self) -> ToolDefinition {
        let params = self.params();
        let properties: serde_json::Map<String, serde_json::Value> = params
            .iter()
            .map(|p| {
                (
                    p.name.clone(),
                    serde_json::json!({ "type": p.kind.as_str(), "description": p.description }),
                )
            })
            .collect();
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": properties,
                "required": self.required(),
            }),
        }
    }
}

/// The function registry capability consumed by the orchestrator.
///
/// The registry is read-mostly shared state; the orchestrator only lists
/// schemas and resolves functions, it never mutates it.
#[async_trait]
pub trait FunctionRegistry: Send + Sync {
    /// Schemas offered to the model for this session.
    async fn list_schemas(&self, session_id: &str) -> Vec<ToolDefinition>;

    /// Look up a function by name.
    fn resolve(&self, name: &str) -> Option<Arc<dyn Function>>;
}
