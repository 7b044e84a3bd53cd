//! Session state for parley.
//!
//! A session is the unit of isolated conversational state: a context
//! string injected as the system message, the role-tagged message
//! [`History`], and a [`ResponseCache`] of previously answered queries.
//! Sessions live in a [`SessionStore`]; the in-memory implementation keeps
//! each one behind its own async mutex so a turn sees a consistent view.

pub mod cache;
pub mod history;
pub mod store;

pub use cache::{normalize_key, ResponseCache};
pub use history::{ContextSync, History};
pub use store::{InMemorySessionStore, Session, SessionHandle, SessionStore};
