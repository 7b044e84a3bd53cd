//! Role-tagged message history for one session.
//!
//! Invariant: at most one system message exists, and when present it is
//! at index 0. Every mutator preserves this.

use parley_core::message::{Message, Role};

/// What [`History::sync_with_context`] had to change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextSync {
    Unchanged,
    SystemAdded,
    SystemRemoved,
}

#[derive(Debug, Clone, Default)]
pub struct History {
    messages: Vec<Message>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// A history holding only a system message built from `context`.
    pub fn with_system(context: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::system(context)],
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn has_system(&self) -> bool {
        self.messages.first().is_some_and(Message::is_system)
    }

    /// Append a message. A system message is routed to
    /// [`prepend_system`](Self::prepend_system) instead.
    pub fn push(&mut self, message: Message) {
        if message.is_system() {
            self.prepend_system(message.content);
        } else {
            self.messages.push(message);
        }
    }

    /// Put a system message at index 0, replacing an existing one.
    pub fn prepend_system(&mut self, content: impl Into<String>) {
        let system = Message::system(content);
        if self.has_system() {
            self.messages[0] = system;
        } else {
            self.messages.insert(0, system);
        }
    }

    pub fn remove_system(&mut self) -> Option<Message> {
        if self.has_system() {
            Some(self.messages.remove(0))
        } else {
            None
        }
    }

    /// Keep the system message in step with the session context: add one
    /// when there is context but no system message, drop it when the
    /// context is empty. An existing system message is left as is.
    pub fn sync_with_context(&mut self, context: &str) -> ContextSync {
        match (context.is_empty(), self.has_system()) {
            (false, false) => {
                self.prepend_system(context);
                ContextSync::SystemAdded
            }
            (true, true) => {
                self.remove_system();
                ContextSync::SystemRemoved
            }
            _ => ContextSync::Unchanged,
        }
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Bound the history to `max_len` messages.
    ///
    /// The system message survives; older non-system messages are dropped
    /// first and relative order is kept. Tool results left at the head of
    /// the retained window have lost the assistant message that requested
    /// them, so they are dropped too. Returns how many messages were removed.
    pub fn trim(&mut self, max_len: usize) -> usize {
        if self.messages.len() <= max_len {
            return 0;
        }
        let before = self.messages.len();

        let system = self.remove_system();
        let keep = max_len.saturating_sub(usize::from(system.is_some()));
        let start = self.messages.len().saturating_sub(keep);
        let mut tail: Vec<Message> = self.messages.drain(start..).collect();

        let orphans = tail.iter().take_while(|m| m.role == Role::Tool).count();
        tail.drain(..orphans);

        self.messages = system.into_iter().chain(tail).collect();
        before - self.messages.len()
    }
}
