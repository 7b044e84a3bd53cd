//! The inbound chat call.
//!
//! Per request: reject blank input, lock the session for the whole turn,
//! try the command interpreter, enforce the context requirement, consult
//! the response cache, and only then run the agent loop.

use std::sync::Arc;
use std::time::Duration;

use parley_config::AppConfig;
use parley_core::context::{ContextResolver, SessionCleanup};
use parley_core::event::EventBus;
use parley_core::provider::{ModelOptions, Provider};
use parley_core::tool::FunctionRegistry;
use parley_session::{InMemorySessionStore, SessionStore};
use parley_tools::ScratchDirs;
use tracing::{debug, info};

use crate::commands::{Command, CommandInterpreter};
use crate::context_dir::DirContextResolver;
use crate::loop_runner::AgentLoop;

pub const CONTEXT_REQUIRED: &str = "Error: Context is required and not set for this session. Please use \"bot-context load <file>\" to load one.";

/// Errors the chat call reports to its transport instead of a reply.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ChatError {
    #[error("Message is required")]
    EmptyMessage,

    #[error("Internal error: {0}")]
    Internal(String),
}

pub struct ChatService {
    store: Arc<dyn SessionStore>,
    commands: CommandInterpreter,
    agent: AgentLoop,
    cleanup: Arc<dyn SessionCleanup>,
    require_context: bool,
}

impl ChatService {
    pub fn new(
        store: Arc<dyn SessionStore>,
        commands: CommandInterpreter,
        agent: AgentLoop,
        cleanup: Arc<dyn SessionCleanup>,
    ) -> Self {
        Self {
            store,
            commands,
            agent,
            cleanup,
            require_context: false,
        }
    }

    /// Refuse model calls until a context has been loaded.
    pub fn with_require_context(mut self, required: bool) -> Self {
        self.require_context = required;
        self
    }

    /// Wire up the full service from configuration: in-memory sessions,
    /// the built-in functions, contexts from `chat.contexts_dir` and
    /// scratch directories under `session.scratch_dir`.
    pub fn from_config(config: &AppConfig, provider: Arc<dyn Provider>, event_bus: Arc<EventBus>) -> Self {
        let scratch = Arc::new(match &config.session.scratch_dir {
            Some(dir) => ScratchDirs::new(dir.clone()),
            None => ScratchDirs::in_temp_dir(),
        });
        let functions: Arc<dyn FunctionRegistry> =
            Arc::new(parley_tools::default_registry(Arc::clone(&scratch)));
        let resolver: Arc<dyn ContextResolver> =
            Arc::new(DirContextResolver::new(config.chat.contexts_dir.clone()));
        let cleanup: Arc<dyn SessionCleanup> = scratch;

        let chat = &config.chat;
        let store = Arc::new(InMemorySessionStore::with_cache_limits(
            chat.cache_capacity,
            chat.eviction_batch(),
        ));
        let agent = AgentLoop::new(provider, functions, config.model.clone(), Arc::clone(&event_bus))
            .with_options(ModelOptions {
                temperature: chat.temperature,
                top_p: chat.top_p,
                max_output_tokens: chat.max_tokens,
                force_json: false,
            })
            .with_max_steps(chat.max_chat_steps)
            .with_max_history(chat.max_history)
            .with_llm_timeout((chat.llm_timeout_secs > 0).then(|| Duration::from_secs(chat.llm_timeout_secs)))
            .with_cleanup(Arc::clone(&cleanup));
        let commands = CommandInterpreter::new(resolver, Arc::clone(&cleanup), event_bus);

        Self::new(store, commands, agent, cleanup).with_require_context(chat.require_context)
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Answer one chat message for `session_id`.
    pub async fn handle(&self, session_id: &str, message: &str, force_json: bool) -> Result<String, ChatError> {
        if message.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        let handle = self.store.get_or_create(session_id);
        let mut session = handle.lock().await;
        debug!(session_id, content = %message, "Chat request");

        if let Some(command) = Command::parse(message) {
            debug!(session_id, ?command, "Handling command");
            return Ok(self.commands.execute(command, &mut session).await);
        }

        if self.require_context && !session.has_context() {
            return Ok(CONTEXT_REQUIRED.to_string());
        }

        if let Some(cached) = session.cache.lookup(message) {
            info!(session_id, "Returning cached response");
            return Ok(cached.to_string());
        }

        Ok(self.agent.run_turn(&mut session, message, force_json).await)
    }

    /// Drop sessions idle for longer than `max_idle` and release their
    /// scratch resources. Returns how many were evicted.
    ///
    /// A session recreated between removal and cleanup already owns the
    /// scratch space again, so it is left alone.
    pub async fn evict_idle(&self, max_idle: Duration) -> usize {
        let evicted = self.store.evict_idle(max_idle);
        for session_id in &evicted {
            if self.store.contains(session_id) {
                debug!(session_id = %session_id, "Session came back before cleanup, keeping its resources");
                continue;
            }
            self.cleanup.cleanup(session_id).await;
        }
        evicted.len()
    }
}
