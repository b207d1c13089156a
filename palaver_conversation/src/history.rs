//! Bounded conversation history.
//!
//! A history keeps at most `window` non-system messages. Appending past the
//! window evicts the oldest non-system message first; relative order of the
//! survivors never changes.

use std::collections::VecDeque;

use palaver_core::{ChatMessage, Role};

/// Default number of messages kept per conversation.
pub const DEFAULT_WINDOW: usize = 10;

#[derive(Debug, Clone)]
pub struct ConversationHistory {
    window: usize,
    messages: VecDeque<ChatMessage>,
}

impl ConversationHistory {
    /// Create an empty history. A zero window is raised to one.
    #[must_use]
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            messages: VecDeque::new(),
        }
    }

    /// Append a message, then evict down to the window.
    ///
    /// After an eviction the retained turns start with a user message
    /// whenever one is left: a dangling assistant reply at the front is
    /// evicted along with the question it answered.
    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push_back(message);
        let mut evicted = false;
        while self.counted() > self.window {
            let Some(oldest) = self.oldest_turn() else {
                break;
            };
            self.messages.remove(oldest);
            evicted = true;
        }
        if !evicted {
            return;
        }
        while let Some(oldest) = self.oldest_turn() {
            let orphaned = self.messages[oldest].role == Role::Assistant
                && self
                    .messages
                    .iter()
                    .skip(oldest + 1)
                    .any(|m| m.role == Role::User);
            if !orphaned {
                break;
            }
            self.messages.remove(oldest);
        }
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    #[must_use]
    pub const fn window(&self) -> usize {
        self.window
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChatMessage> {
        self.messages.iter()
    }

    #[must_use]
    pub fn to_vec(&self) -> Vec<ChatMessage> {
        self.messages.iter().cloned().collect()
    }

    /// Messages as handed to the prompt assembler: the pinned system
    /// message (if any) first, then the retained history.
    #[must_use]
    pub fn view(&self, pinned: Option<&str>) -> Vec<ChatMessage> {
        let mut view = Vec::with_capacity(self.messages.len() + 1);
        if let Some(system) = pinned {
            view.push(ChatMessage::system(system));
        }
        view.extend(self.messages.iter().cloned());
        view
    }

    #[must_use]
    pub fn stats(&self) -> HistoryStats {
        let total_chars: usize = self.messages.iter().map(|m| m.content.len()).sum();
        let count = |role: Role| self.messages.iter().filter(|m| m.role == role).count();

        HistoryStats {
            total_messages: self.messages.len(),
            user_messages: count(Role::User),
            assistant_messages: count(Role::Assistant),
            total_characters: total_chars,
            estimated_tokens: total_chars / 4, // Rough estimate: 4 chars per token
        }
    }

    fn oldest_turn(&self) -> Option<usize> {
        self.messages.iter().position(|m| m.role != Role::System)
    }

    fn counted(&self) -> usize {
        self.messages
            .iter()
            .filter(|m| m.role != Role::System)
            .count()
    }
}

impl Default for ConversationHistory {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

/// Statistics about conversation history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryStats {
    pub total_messages: usize,
    pub user_messages: usize,
    pub assistant_messages: usize,
    pub total_characters: usize,
    pub estimated_tokens: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn_pairs(history: &mut ConversationHistory, pairs: usize) {
        for i in 0..pairs {
            history.push(ChatMessage::user(format!("q{i}")));
            history.push(ChatMessage::assistant(format!("a{i}")));
        }
    }

    #[test]
    fn evicts_oldest_first() {
        let mut history = ConversationHistory::new(4);
        turn_pairs(&mut history, 5);

        let contents: Vec<_> = history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["q3", "a3", "q4", "a4"]);
    }

    #[test]
    fn pinned_message_is_not_counted() {
        let mut history = ConversationHistory::new(3);
        turn_pairs(&mut history, 6);

        let view = history.view(Some("You are terse."));
        assert_eq!(view.len(), 3);
        assert_eq!(view[0], ChatMessage::system("You are terse."));
        assert_eq!(view[1].content, "q5");
    }

    #[test]
    fn window_never_starts_with_assistant_turn() {
        for window in 1..=6 {
            let mut history = ConversationHistory::new(window);
            for i in 0..8 {
                history.push(ChatMessage::user(format!("q{i}")));
                assert_eq!(history.iter().next().map(|m| m.role), Some(Role::User));
                history.push(ChatMessage::assistant(format!("a{i}")));
                if window > 1 {
                    assert_eq!(history.iter().next().map(|m| m.role), Some(Role::User));
                }
                assert!(history.len() <= window, "window {window}");
            }
        }
    }

    #[test]
    fn unanswered_turns_are_kept_in_order() {
        let mut history = ConversationHistory::new(3);
        history.push(ChatMessage::user("q0"));
        history.push(ChatMessage::user("q1"));
        history.push(ChatMessage::assistant("a1"));
        history.push(ChatMessage::user("q2"));

        let contents: Vec<_> = history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["q1", "a1", "q2"]);
    }

    #[test]
    fn stored_system_messages_survive_eviction() {
        let mut history = ConversationHistory::new(2);
        history.push(ChatMessage::system("rules"));
        turn_pairs(&mut history, 3);

        assert_eq!(history.len(), 3);
        assert_eq!(history.iter().next().map(|m| m.role), Some(Role::System));
    }

    #[test]
    fn stats_count_roles() {
        let mut history = ConversationHistory::new(10);
        turn_pairs(&mut history, 3);

        let stats = history.stats();
        assert_eq!(stats.total_messages, 6);
        assert_eq!(stats.user_messages, 3);
        assert_eq!(stats.assistant_messages, 3);
    }
}
