//! Shared test doubles for the agent crate.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use parley_core::error::{ContextError, ProviderError, ToolError};
use parley_core::message::{Message, MessageToolCall};
use parley_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use parley_core::tool::{CallArgs, Function, FunctionOutput, ParamSpec, ParamType};
use parley_core::{ContextResolver, SessionCleanup};
use parley_tools::FunctionTable;

/// A provider that replays scripted responses in order.
///
/// Once the script runs dry the last entry repeats, so "always returns
/// tool calls" is a one-element script. Every request is recorded.
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Result<ProviderResponse, ProviderError>>>,
    last: Mutex<Option<Result<ProviderResponse, ProviderError>>>,
    requests: Mutex<Vec<ProviderRequest>>,
    delay: Option<Duration>,
}

impl ScriptedProvider {
    pub fn new(script: Vec<Result<ProviderResponse, ProviderError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            last: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    pub fn replies(responses: Vec<ProviderResponse>) -> Self {
        Self::new(responses.into_iter().map(Ok).collect())
    }

    /// Sleep this long inside every call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn next(&self) -> Result<ProviderResponse, ProviderError> {
        let mut script = self.script.lock().unwrap();
        let mut last = self.last.lock().unwrap();
        if let Some(next) = script.pop_front() {
            *last = Some(next.clone());
            return next;
        }
        last.clone().expect("ScriptedProvider: empty script")
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.requests.lock().unwrap().push(request);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.next()
    }
}

fn usage() -> Option<Usage> {
    Some(Usage {
        prompt_tokens: 10,
        completion_tokens: 5,
        total_tokens: 15,
    })
}

pub fn text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Some(Message::assistant(text)),
        done: true,
        usage: usage(),
        model: "mock-model".into(),
    }
}

pub fn tool_response(calls: Vec<MessageToolCall>) -> ProviderResponse {
    ProviderResponse {
        message: Some(Message::assistant_with_tools("", calls)),
        done: false,
        usage: usage(),
        model: "mock-model".into(),
    }
}

/// A response without any message payload.
pub fn empty_response() -> ProviderResponse {
    ProviderResponse {
        message: None,
        done: true,
        usage: None,
        model: "mock-model".into(),
    }
}

pub fn tool_call(id: &str, name: &str, arguments: serde_json::Value) -> MessageToolCall {
    MessageToolCall {
        id: id.into(),
        name: name.into(),
        arguments,
    }
}

pub fn registry_with(functions: Vec<Arc<dyn Function>>) -> FunctionTable {
    let mut table = FunctionTable::new();
    for f in functions {
        table.register(f);
    }
    table
}

/// Returns its positional arguments, session id first.
pub struct EchoSession;

#[async_trait]
impl Function for EchoSession {
    fn name(&self) -> &str {
        "echo_session"
    }
    fn description(&self) -> &str {
        "Echo arguments back"
    }
    fn params(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::required("text", ParamType::String, "Text"),
            ParamSpec::required("times", ParamType::Integer, "Repeat count"),
        ]
    }
    fn needs_session(&self) -> bool {
        true
    }
    async fn invoke(&self, args: CallArgs) -> Result<FunctionOutput, ToolError> {
        Ok(FunctionOutput::Json(serde_json::Value::Array(args.positional())))
    }
}

/// Always fails.
pub struct Explode;

#[async_trait]
impl Function for Explode {
    fn name(&self) -> &str {
        "explode"
    }
    fn description(&self) -> &str {
        "Fails every time"
    }
    fn params(&self) -> Vec<ParamSpec> {
        Vec::new()
    }
    async fn invoke(&self, _args: CallArgs) -> Result<FunctionOutput, ToolError> {
        Err(ToolError::ExecutionFailed {
            function: "explode".into(),
            reason: "boom".into(),
        })
    }
}

/// Counts invocations.
#[derive(Default)]
pub struct Counter {
    pub calls: AtomicUsize,
}

#[async_trait]
impl Function for Counter {
    fn name(&self) -> &str {
        "counter"
    }
    fn description(&self) -> &str {
        "Count calls"
    }
    fn params(&self) -> Vec<ParamSpec> {
        Vec::new()
    }
    async fn invoke(&self, _args: CallArgs) -> Result<FunctionOutput, ToolError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(FunctionOutput::Text(format!("count={n}")))
    }
}

/// In-memory context documents.
#[derive(Default)]
pub struct MapResolver {
    pub docs: std::collections::HashMap<String, String>,
}

impl MapResolver {
    pub fn with(name: &str, text: &str) -> Self {
        let mut docs = std::collections::HashMap::new();
        docs.insert(name.to_string(), text.to_string());
        Self { docs }
    }
}

#[async_trait]
impl ContextResolver for MapResolver {
    async fn read(&self, name: &str) -> Result<String, ContextError> {
        match self.docs.get(name) {
            Some(text) if !text.is_empty() => Ok(text.clone()),
            Some(_) => Err(ContextError::Empty(name.into())),
            None => Err(ContextError::NotFound(name.into())),
        }
    }
}

/// Records which sessions were cleaned up.
#[derive(Default)]
pub struct RecordingCleanup {
    pub cleaned: Mutex<Vec<String>>,
}

impl RecordingCleanup {
    pub fn count(&self) -> usize {
        self.cleaned.lock().unwrap().len()
    }
}

#[async_trait]
impl SessionCleanup for RecordingCleanup {
    async fn cleanup(&self, session_id: &str) {
        self.cleaned.lock().unwrap().push(session_id.to_string());
    }
}
