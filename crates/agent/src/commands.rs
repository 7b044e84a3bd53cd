//! Command interpreter: administrative commands typed as ordinary chat
//! input and answered without calling the model.
//!
//! The first whitespace-delimited token selects the command and is matched
//! case-insensitively. Arguments keep their original case.

use std::sync::Arc;

use chrono::Utc;
use parley_core::context::{ContextResolver, SessionCleanup};
use parley_core::event::{DomainEvent, EventBus};
use parley_session::Session;
use tracing::{info, warn};

pub const HELP_TEXT: &str = "\
Available commands:
  help                          Show this text
  bot-echo-string <text>        Echo <text> back
  bot-context load <file>       Load a context document and reset the session
  bot-context show              Show the current context
  bot-context reset             Clear context, chat history, and cache
Anything else is sent to the model.";

pub const LOAD_USAGE: &str = "Usage: bot-context load <context_file_name>";
pub const NOTHING_TO_ECHO: &str = "No string to echo";
pub const CONTEXT_EMPTY: &str = "Context is empty for this session";
pub const CONTEXT_RESET: &str = "Context, chat history, and cache reset for this session";
pub const INVALID_CONTEXT_COMMAND: &str = "Invalid bot-context command. Use: load <file>, show, reset";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Echo(String),
    /// `None` when no file name was given
    LoadContext(Option<String>),
    ShowContext,
    ResetContext,
    /// Unknown or missing `bot-context` subcommand
    InvalidContext,
}

impl Command {
    /// Recognize a command, or `None` when the input is a normal query.
    pub fn parse(input: &str) -> Option<Command> {
        let input = input.trim();
        let (head, rest) = match input.split_once(char::is_whitespace) {
            Some((head, rest)) => (head, rest.trim()),
            None => (input, ""),
        };

        match head.to_lowercase().as_str() {
            "help" if rest.is_empty() => Some(Command::Help),
            "bot-echo-string" => Some(Command::Echo(rest.to_string())),
            "bot-context" => {
                let (sub, arg) = match rest.split_once(char::is_whitespace) {
                    Some((sub, arg)) => (sub, arg.trim()),
                    None => (rest, ""),
                };
                Some(match sub.to_lowercase().as_str() {
                    "load" if arg.is_empty() => Command::LoadContext(None),
                    "load" => Command::LoadContext(Some(arg.to_string())),
                    "show" => Command::ShowContext,
                    "reset" => Command::ResetContext,
                    _ => Command::InvalidContext,
                })
            }
            _ => None,
        }
    }
}

/// Executes commands against a locked session.
pub struct CommandInterpreter {
    resolver: Arc<dyn ContextResolver>,
    cleanup: Arc<dyn SessionCleanup>,
    event_bus: Arc<EventBus>,
}

impl CommandInterpreter {
    pub fn new(
        resolver: Arc<dyn ContextResolver>,
        cleanup: Arc<dyn SessionCleanup>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            resolver,
            cleanup,
            event_bus,
        }
    }

    pub async fn execute(&self, command: Command, session: &mut Session) -> String {
        match command {
            Command::Help => HELP_TEXT.to_string(),
            Command::Echo(text) if text.is_empty() => NOTHING_TO_ECHO.to_string(),
            Command::Echo(text) => text,
            Command::LoadContext(None) => LOAD_USAGE.to_string(),
            Command::LoadContext(Some(name)) => self.load(&name, session).await,
            Command::ShowContext if session.has_context() => session.context.clone(),
            Command::ShowContext => CONTEXT_EMPTY.to_string(),
            Command::ResetContext => {
                self.cleanup.cleanup(&session.id).await;
                session.reset();
                self.event_bus.publish(DomainEvent::SessionReset {
                    session_id: session.id.clone(),
                    timestamp: Utc::now(),
                });
                info!(session_id = %session.id, "Context, chat history, and cache reset");
                CONTEXT_RESET.to_string()
            }
            Command::InvalidContext => INVALID_CONTEXT_COMMAND.to_string(),
        }
    }

    async fn load(&self, name: &str, session: &mut Session) -> String {
        match self.resolver.read(name).await {
            Ok(text) => {
                session.load_context(text);
                info!(session_id = %session.id, context = %name, "Context loaded and session reset");
                format!("Context '{name}' loaded and session reset")
            }
            Err(e) => {
                warn!(session_id = %session.id, context = %name, error = %e, "Context could not be loaded");
                format!("Context file '{name}' could not be read or is empty")
            }
        }
    }
}
