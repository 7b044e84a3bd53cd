//! The tool-calling agent loop.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parley_core::context::{NoopCleanup, SessionCleanup};
use parley_core::error::ProviderError;
use parley_core::event::{DomainEvent, EventBus};
use parley_core::message::Message;
use parley_core::provider::{ModelOptions, Provider, ProviderRequest, ProviderResponse};
use parley_core::tool::FunctionRegistry;
use parley_session::{ContextSync, Session};
use tracing::{debug, error, info, warn};

use crate::dispatch::call_function;

pub const NO_VALID_MESSAGE: &str = "Could not get a valid message from the model.";
pub const UNEXPECTED_FORMAT: &str = "Received an unexpected response format from the model.";
pub const MAX_STEPS_REACHED: &str =
    "Reached maximum processing steps or could not get a final text response from the model.";

/// How a turn ended.
#[derive(Debug, Clone)]
pub enum TurnOutcome {
    /// The model produced a final text reply
    Reply(String),
    /// A response arrived without any message
    NoMessage,
    /// A message arrived with neither tool calls nor text
    UnexpectedFormat,
    /// The step budget ran out while the model kept calling functions
    StepsExhausted,
    /// Inference failed; the turn was abandoned
    Failed(ProviderError),
}

/// Runs one user turn against the model, executing requested functions
/// between inference calls until the model answers in text or the step
/// budget is spent.
pub struct AgentLoop {
    provider: Arc<dyn Provider>,
    functions: Arc<dyn FunctionRegistry>,
    model: String,
    options: ModelOptions,
    /// Inference calls allowed per turn
    max_steps: u32,
    max_history: usize,
    llm_timeout: Option<Duration>,
    cleanup: Arc<dyn SessionCleanup>,
    event_bus: Arc<EventBus>,
}

impl AgentLoop {
    pub fn new(
        provider: Arc<dyn Provider>,
        functions: Arc<dyn FunctionRegistry>,
        model: impl Into<String>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            provider,
            functions,
            model: model.into(),
            options: ModelOptions::default(),
            max_steps: 5,
            max_history: 500,
            llm_timeout: Some(Duration::from_secs(120)),
            cleanup: Arc::new(NoopCleanup),
            event_bus,
        }
    }

    pub fn with_options(mut self, options: ModelOptions) -> Self {
        self.options = options;
        self
    }

    /// Set the step budget. Clamped to at least 1.
    pub fn with_max_steps(mut self, max: u32) -> Self {
        self.max_steps = max.max(1);
        self
    }

    pub fn with_max_history(mut self, max: usize) -> Self {
        self.max_history = max;
        self
    }

    /// Per-call inference timeout. `None` waits indefinitely.
    pub fn with_llm_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.llm_timeout = timeout;
        self
    }

    pub fn with_cleanup(mut self, cleanup: Arc<dyn SessionCleanup>) -> Self {
        self.cleanup = cleanup;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Run one turn and produce the user-visible reply.
    ///
    /// Except after an inference failure, the history is trimmed and the
    /// reply is cached under `input`.
    pub async fn run_turn(&self, session: &mut Session, input: &str, force_json: bool) -> String {
        let outcome = self.run(session, input, force_json).await;

        let reply = match outcome {
            TurnOutcome::Failed(e) => {
                error!(session_id = %session.id, error = %e, "Inference failed");
                self.event_bus.publish(DomainEvent::InferenceFailed {
                    session_id: session.id.clone(),
                    error_message: e.to_string(),
                    timestamp: Utc::now(),
                });
                return self.failure_reply(&e);
            }
            TurnOutcome::Reply(text) => {
                self.cleanup.cleanup(&session.id).await;
                text
            }
            TurnOutcome::NoMessage => NO_VALID_MESSAGE.to_string(),
            TurnOutcome::UnexpectedFormat => UNEXPECTED_FORMAT.to_string(),
            TurnOutcome::StepsExhausted => {
                warn!(session_id = %session.id, max_steps = self.max_steps, "Step budget exhausted");
                MAX_STEPS_REACHED.to_string()
            }
        };

        let trimmed = session.history.trim(self.max_history);
        if trimmed > 0 {
            debug!(session_id = %session.id, trimmed, remaining = session.history.len(), "Trimmed history");
        }
        session.cache.store(input, reply.clone());
        reply
    }

    /// The loop itself, without trimming or caching.
    pub async fn run(&self, session: &mut Session, input: &str, force_json: bool) -> TurnOutcome {
        match session.history.sync_with_context(&session.context) {
            ContextSync::SystemAdded => debug!(session_id = %session.id, "Added system message from context"),
            ContextSync::SystemRemoved => debug!(session_id = %session.id, "Removed stale system message"),
            ContextSync::Unchanged => {}
        }
        session.history.push(Message::user(input));
        debug!(session_id = %session.id, content = %input, "Added user message to history");

        let tools = self.functions.list_schemas(&session.id).await;
        let options = ModelOptions {
            force_json: force_json || self.options.force_json,
            ..self.options.clone()
        };
        let mut tokens_used = 0u32;

        for step in 1..=self.max_steps {
            debug!(session_id = %session.id, step, "Agent loop iteration");

            let request = ProviderRequest {
                model: self.model.clone(),
                messages: session.history.messages().to_vec(),
                tools: tools.clone(),
                options: options.clone(),
            };

            let response = match self.infer(request).await {
                Ok(response) => response,
                Err(e) => return TurnOutcome::Failed(e),
            };
            if let Some(usage) = response.usage {
                tokens_used = tokens_used.saturating_add(usage.total_tokens);
            }

            let Some(message) = response.message else {
                warn!(session_id = %session.id, step, "No message in model response");
                return TurnOutcome::NoMessage;
            };

            let tool_calls = message.tool_calls.clone();
            let text = message.content.clone();
            session.history.push(message);

            if !tool_calls.is_empty() {
                info!(session_id = %session.id, step, count = tool_calls.len(), "Model requested function calls");
                for call in &tool_calls {
                    let result = call_function(self.functions.as_ref(), &session.id, call).await;
                    self.event_bus.publish(DomainEvent::ToolExecuted {
                        session_id: session.id.clone(),
                        tool_name: call.name.clone(),
                        success: result.success,
                        duration_ms: result.duration_ms,
                        timestamp: Utc::now(),
                    });
                    session.history.push(Message::tool_result(&call.id, result.content));
                }
                continue;
            }

            if !text.is_empty() {
                info!(session_id = %session.id, steps = step, "Received final text response");
                self.event_bus.publish(DomainEvent::ResponseGenerated {
                    session_id: session.id.clone(),
                    model: response.model,
                    steps: step,
                    tokens_used,
                    timestamp: Utc::now(),
                });
                return TurnOutcome::Reply(text);
            }

            warn!(session_id = %session.id, step, "Message had neither content nor tool calls");
            return TurnOutcome::UnexpectedFormat;
        }

        TurnOutcome::StepsExhausted
    }

    async fn infer(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        match self.llm_timeout {
            Some(limit) => tokio::time::timeout(limit, self.provider.complete(request))
                .await
                .map_err(|_| ProviderError::Timeout(limit.as_secs()))?,
            None => self.provider.complete(request).await,
        }
    }

    /// User-facing text for an inference failure.
    pub fn failure_reply(&self, error: &ProviderError) -> String {
        match error {
            ProviderError::ModelNotFound(_) => format!(
                "Error: The specified model '{}' was not found. Please ensure it is available and spelled correctly.",
                self.model
            ),
            ProviderError::Network(detail) => format!(
                "Error: Could not connect to the model backend. Please ensure it is running. ({detail})"
            ),
            ProviderError::Timeout(secs) => {
                format!("Error: The model did not respond within {secs}s. Please try again.")
            }
            other => format!(
                "Error processing your request: {other}. Please try again or contact support."
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use parley_core::message::Role;
    use parley_session::ResponseCache;
    use serde_json::json;

    fn session() -> Session {
        Session::new("s1", ResponseCache::default())
    }

    fn agent(provider: Arc<ScriptedProvider>, functions: Vec<Arc<dyn parley_core::Function>>) -> AgentLoop {
        AgentLoop::new(
            provider,
            Arc::new(registry_with(functions)),
            "mock-model",
            Arc::new(EventBus::default()),
        )
    }

    #[tokio::test]
    async fn simple_text_response() {
        let provider = Arc::new(ScriptedProvider::replies(vec![text_response("Hello! How can I help?")]));
        let agent = agent(provider.clone(), vec![]);
        let mut s = session();

        let reply = agent.run_turn(&mut s, "Hello!", false).await;
        assert_eq!(reply, "Hello! How can I help?");
        assert_eq!(s.history.len(), 2);
        assert_eq!(s.cache.lookup("hello"), Some("Hello! How can I help?"));
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn tool_call_then_answer() {
        let counter = Arc::new(Counter::default());
        let provider = Arc::new(ScriptedProvider::replies(vec![
            tool_response(vec![tool_call("call_1", "counter", json!({}))]),
            text_response("Counted."),
        ]));
        let agent = agent(provider.clone(), vec![counter.clone()]);
        let mut s = session();

        let reply = agent.run_turn(&mut s, "count please", false).await;
        assert_eq!(reply, "Counted.");
        assert_eq!(counter.calls.load(std::sync::atomic::Ordering::SeqCst), 1);

        let tool_msgs: Vec<_> = s.history.messages().iter().filter(|m| m.role == Role::Tool).collect();
        assert_eq!(tool_msgs.len(), 1);
        assert_eq!(tool_msgs[0].tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(tool_msgs[0].content, "count=1");

        // Second request saw the tool result.
        let second = &provider.requests()[1];
        assert_eq!(second.messages.last().unwrap().role, Role::Tool);
        assert_eq!(second.tools.len(), 1);
    }

    #[tokio::test]
    async fn multiple_calls_answered_in_order() {
        let provider = Arc::new(ScriptedProvider::replies(vec![
            tool_response(vec![
                tool_call("a", "counter", json!({})),
                tool_call("b", "missing_fn", json!({})),
                tool_call("c", "counter", json!({})),
            ]),
            text_response("done"),
        ]));
        let agent = agent(provider, vec![Arc::new(Counter::default())]);
        let mut s = session();
        agent.run_turn(&mut s, "go", false).await;

        let ids: Vec<_> = s
            .history
            .messages()
            .iter()
            .filter_map(|m| m.tool_call_id.as_deref())
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        let contents: Vec<_> = s.history.messages().iter().filter(|m| m.role == Role::Tool).map(|m| m.content.as_str()).collect();
        assert_eq!(contents[0], "count=1");
        assert!(contents[1].contains("not found"));
        assert_eq!(contents[2], "count=2");
    }

    #[tokio::test]
    async fn step_budget_bounds_inference_calls() {
        let provider = Arc::new(ScriptedProvider::replies(vec![tool_response(vec![tool_call(
            "loop",
            "counter",
            json!({}),
        )])]));
        let agent = agent(provider.clone(), vec![Arc::new(Counter::default())]).with_max_steps(3);
        let mut s = session();

        let reply = agent.run_turn(&mut s, "spin", false).await;
        assert_eq!(reply, MAX_STEPS_REACHED);
        assert_eq!(provider.call_count(), 3);
        assert_eq!(s.cache.lookup("spin"), Some(MAX_STEPS_REACHED));
    }

    #[tokio::test]
    async fn missing_message_and_blank_message() {
        let provider = Arc::new(ScriptedProvider::replies(vec![empty_response()]));
        let reply = agent(provider, vec![]).run_turn(&mut session(), "q", false).await;
        assert_eq!(reply, NO_VALID_MESSAGE);

        let provider = Arc::new(ScriptedProvider::replies(vec![text_response("")]));
        let reply = agent(provider, vec![]).run_turn(&mut session(), "q", false).await;
        assert_eq!(reply, UNEXPECTED_FORMAT);
    }

    #[tokio::test]
    async fn inference_error_is_not_cached() {
        let provider = Arc::new(ScriptedProvider::new(vec![Err(ProviderError::ModelNotFound(
            "llama9".into(),
        ))]));
        let agent = agent(provider, vec![]);
        let mut s = session();

        let reply = agent.run_turn(&mut s, "hi", false).await;
        assert_eq!(
            reply,
            "Error: The specified model 'mock-model' was not found. Please ensure it is available and spelled correctly."
        );
        assert!(s.cache.is_empty());
    }

    #[tokio::test]
    async fn failure_reply_classes() {
        let provider = Arc::new(ScriptedProvider::replies(vec![text_response("x")]));
        let agent = agent(provider, vec![]);
        assert_eq!(
            agent.failure_reply(&ProviderError::Network("connection refused".into())),
            "Error: Could not connect to the model backend. Please ensure it is running. (connection refused)"
        );
        assert!(agent
            .failure_reply(&ProviderError::InvalidResponse("garbage".into()))
            .starts_with("Error processing your request: Invalid response from provider: garbage."));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_backend_times_out() {
        let provider = Arc::new(
            ScriptedProvider::replies(vec![text_response("late")]).with_delay(Duration::from_secs(30)),
        );
        let agent = agent(provider, vec![]).with_llm_timeout(Some(Duration::from_secs(5)));
        let mut s = session();

        let reply = agent.run_turn(&mut s, "hello", false).await;
        assert_eq!(reply, "Error: The model did not respond within 5s. Please try again.");
        assert!(s.cache.is_empty());
    }

    #[tokio::test]
    async fn context_sync_and_force_json() {
        let provider = Arc::new(ScriptedProvider::replies(vec![text_response("a"), text_response("b")]));
        let agent = agent(provider.clone(), vec![]);
        let mut s = session();
        s.context = "persona".into();

        agent.run_turn(&mut s, "first", true).await;
        let req = &provider.requests()[0];
        assert_eq!(req.messages[0].role, Role::System);
        assert!(req.options.force_json);

        s.context.clear();
        agent.run_turn(&mut s, "second", false).await;
        let req = &provider.requests()[1];
        assert_ne!(req.messages[0].role, Role::System);
        assert!(!req.options.force_json);
    }

    #[tokio::test]
    async fn history_is_trimmed_but_keeps_system() {
        let provider = Arc::new(ScriptedProvider::replies(vec![text_response("ok")]));
        let agent = agent(provider, vec![]).with_max_history(4);
        let mut s = session();
        s.load_context("persona");

        for i in 0..5 {
            agent.run_turn(&mut s, &format!("question {i}"), false).await;
            assert!(s.history.len() <= 4);
        }
        assert!(s.history.has_system());
        assert_eq!(s.history.messages().last().unwrap().content, "ok");
    }

    #[tokio::test]
    async fn cleanup_runs_after_final_reply_only() {
        let cleanup = Arc::new(RecordingCleanup::default());
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok(text_response("fine")),
            Err(ProviderError::Network("down".into())),
        ]));
        let agent = agent(provider, vec![]).with_cleanup(cleanup.clone());
        let mut s = session();

        agent.run_turn(&mut s, "one", false).await;
        assert_eq!(cleanup.count(), 1);
        agent.run_turn(&mut s, "two", false).await;
        assert_eq!(cleanup.count(), 1);
    }

    #[tokio::test]
    async fn events_are_published() {
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();
        let provider = Arc::new(ScriptedProvider::replies(vec![
            tool_response(vec![tool_call("c1", "counter", json!({}))]),
            text_response("done"),
        ]));
        let agent = AgentLoop::new(
            provider,
            Arc::new(registry_with(vec![Arc::new(Counter::default())])),
            "mock-model",
            bus.clone(),
        );
        agent.run_turn(&mut session(), "go", false).await;

        let first = rx.recv().await.unwrap();
        assert!(matches!(&*first, DomainEvent::ToolExecuted { success: true, .. }));
        let second = rx.recv().await.unwrap();
        match &*second {
            DomainEvent::ResponseGenerated { steps, tokens_used, .. } => {
                assert_eq!(*steps, 2);
                assert_eq!(*tokens_used, 30);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
