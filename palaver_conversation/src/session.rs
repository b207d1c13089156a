//! State owned by one conversation.

use chrono::{DateTime, Utc};

use palaver_core::{ChatMessage, ConversationId, ParameterStore};

use crate::history::ConversationHistory;

/// One conversation's history, its optional private parameter store and
/// whether a reply is currently being generated for it.
#[derive(Debug, Clone)]
pub struct ConversationSession {
    /// Conversation identifier
    pub id: ConversationId,
    /// Bounded message history
    pub history: ConversationHistory,
    /// Private parameters; `None` when the deployment shares one store
    pub params: Option<ParameterStore>,
    /// A chat turn is between rendering and commit
    pub in_flight: bool,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl ConversationSession {
    #[must_use]
    pub fn new(id: ConversationId, window: usize, params: Option<ParameterStore>) -> Self {
        let now = Utc::now();
        Self {
            id,
            history: ConversationHistory::new(window),
            params,
            in_flight: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Add a message to the history.
    pub fn add_message(&mut self, message: ChatMessage) {
        self.history.push(message);
        self.updated_at = Utc::now();
    }

    /// Get message count.
    #[must_use]
    pub fn message_count(&self) -> usize {
        self.history.len()
    }

    /// Clear all messages from the session.
    pub fn clear(&mut self) {
        self.history.clear();
        self.updated_at = Utc::now();
    }
}
