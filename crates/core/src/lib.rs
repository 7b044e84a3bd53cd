//! # parley core
//!
//! Domain types, traits, and error definitions for the parley chat
//! orchestration engine. This crate has no framework dependencies; it defines
//! the boundaries every other crate implements against.
//!
//! ## Capabilities
//!
//! The orchestrator talks to the outside world only through the traits here:
//! - [`Provider`]: the LLM inference backend
//! - [`FunctionRegistry`]: the set of functions the model may call
//! - [`ContextResolver`]: loads named context documents
//! - [`SessionCleanup`]: releases per-session temporary resources

pub mod context;
pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use context::{ContextResolver, NoopCleanup, SessionCleanup};
pub use error::{ContextError, Error, ProviderError, Result, ToolError};
pub use event::{DomainEvent, EventBus};
pub use message::{Message, MessageToolCall, Role};
pub use provider::{ModelOptions, Provider, ProviderRequest, ProviderResponse, ToolDefinition, Usage};
pub use tool::{CallArgs, Function, FunctionOutput, FunctionRegistry, ParamSpec, ParamType};
