//! The conversational core of parley.
//!
//! A chat turn goes through these stages:
//!
//! 1. **Commands**: `help`, `bot-echo-string`, `bot-context ...` are
//!    answered directly
//! 2. **Context gate**: optionally refuse until a context is loaded
//! 3. **Cache**: a previous reply to the same normalized query is reused
//! 4. **Agent loop**: call the model; if it asks for functions, run them,
//!    append the results and call it again, up to the step budget
//!
//! Each session is locked for the whole turn, so requests for the same
//! session are answered one at a time while different sessions proceed
//! in parallel.

pub mod chat;
pub mod commands;
pub mod context_dir;
pub mod dispatch;
pub mod loop_runner;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use chat::{ChatError, ChatService};
pub use commands::{Command, CommandInterpreter};
pub use context_dir::DirContextResolver;
pub use dispatch::{call_function, Dispatched};
pub use loop_runner::{AgentLoop, TurnOutcome};
