use thiserror::Error;

use crate::ConversationId;

pub type Result<T> = std::result::Result<T, ChatError>;

/// Every failure the session engine reports to its host.
///
/// None of these leave shared state half-written: validation failures are
/// raised before any mutation, and generation failures leave the conversation
/// idle with the user turn kept and no assistant turn committed.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Unknown template: {0}")]
    UnknownTemplate(String),

    #[error("Invalid conversation shape at message {position}: {reason}")]
    InvalidConversationShape { position: usize, reason: String },

    #[error("Invalid value {value:?} for {name}: {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Command /{command} is not allowed for {conversation}")]
    Unauthorized {
        conversation: ConversationId,
        command: String,
    },

    #[error("Conversation {0} already has a reply in progress")]
    Busy(ConversationId),

    #[error("Generation failed: {0}")]
    GenerationFailed(String),
}

impl ChatError {
    pub(crate) fn shape(position: usize, reason: impl Into<String>) -> Self {
        Self::InvalidConversationShape {
            position,
            reason: reason.into(),
        }
    }

    pub(crate) fn parameter(
        name: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }
}
