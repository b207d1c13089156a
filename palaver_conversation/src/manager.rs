//! Per-conversation history and parameter ownership.
//!
//! The `SessionManager` is the only owner of conversation state. Each
//! conversation sits behind its own lock, so work on one conversation never
//! waits on another; the outer map lock is held only to look up or insert.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use palaver_core::{
    ChatError, ChatMessage, ConversationId, GenerationParams, ParameterScope, ParameterStore,
    Result, Role,
};
use tracing::info;

use crate::history::{DEFAULT_WINDOW, HistoryStats};
use crate::session::ConversationSession;

/// Lock a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct SessionManager {
    window: usize,
    scope: ParameterScope,
    defaults: ParameterStore,
    shared: Mutex<ParameterStore>,
    sessions: RwLock<HashMap<ConversationId, Arc<Mutex<ConversationSession>>>>,
}

impl SessionManager {
    /// Create a manager keeping `window` messages per conversation.
    ///
    /// `defaults` seeds the shared store, or every private store when
    /// `scope` is [`ParameterScope::PerConversation`].
    #[must_use]
    pub fn new(window: usize, scope: ParameterScope, defaults: ParameterStore) -> Self {
        info!("Creating session manager: window={window}, parameter scope={scope:?}");
        Self {
            window,
            scope,
            shared: Mutex::new(defaults.clone()),
            defaults,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    #[must_use]
    pub const fn window(&self) -> usize {
        self.window
    }

    #[must_use]
    pub const fn scope(&self) -> ParameterScope {
        self.scope
    }

    /// Append a message and apply the eviction policy.
    pub fn append_turn(&self, id: &ConversationId, role: Role, content: impl Into<String>) {
        let slot = self.slot(id);
        lock(&slot).add_message(ChatMessage::new(role, content));
    }

    /// The sequence rendered for this conversation: pinned system message
    /// first, then the retained history.
    #[must_use]
    pub fn view(&self, id: &ConversationId) -> Vec<ChatMessage> {
        let slot = self.slot(id);
        let session = lock(&slot);
        self.read_params(&session, |params| {
            session.history.view(params.system_message())
        })
    }

    /// Retained history without the pinned system message.
    #[must_use]
    pub fn history(&self, id: &ConversationId) -> Vec<ChatMessage> {
        lock(&self.slot(id)).history.to_vec()
    }

    #[must_use]
    pub fn history_stats(&self, id: &ConversationId) -> HistoryStats {
        lock(&self.slot(id)).history.stats()
    }

    /// Empty the history. The system message setting is untouched.
    pub fn clear(&self, id: &ConversationId) -> Result<()> {
        let slot = self.slot(id);
        let mut session = lock(&slot);
        if session.in_flight {
            return Err(ChatError::Busy(id.clone()));
        }
        session.clear();
        info!("Cleared history for conversation {id}");
        Ok(())
    }

    #[must_use]
    pub fn is_in_flight(&self, id: &ConversationId) -> bool {
        self.existing(id).is_some_and(|slot| lock(&slot).in_flight)
    }

    /// Every conversation seen so far, sorted.
    #[must_use]
    pub fn conversations(&self) -> Vec<ConversationId> {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<_> = sessions.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Snapshot of the parameters in force for this conversation.
    #[must_use]
    pub fn params(&self, id: &ConversationId) -> GenerationParams {
        self.with_params(id, ParameterStore::snapshot)
    }

    pub fn with_params<R>(&self, id: &ConversationId, f: impl FnOnce(&ParameterStore) -> R) -> R {
        let slot = self.slot(id);
        let session = lock(&slot);
        self.read_params(&session, f)
    }

    /// Mutate the store this conversation reads from.
    ///
    /// With a shared scope this changes the parameters of every conversation.
    pub fn update_params<R>(
        &self,
        id: &ConversationId,
        f: impl FnOnce(&mut ParameterStore) -> Result<R>,
    ) -> Result<R> {
        match self.scope {
            ParameterScope::Global => f(&mut lock(&self.shared)),
            ParameterScope::PerConversation => {
                let slot = self.slot(id);
                let mut session = lock(&slot);
                let store = session.params.get_or_insert_with(|| self.defaults.clone());
                f(store)
            }
        }
    }

    /// The conversation's slot, created on first use.
    pub(crate) fn slot(&self, id: &ConversationId) -> Arc<Mutex<ConversationSession>> {
        if let Some(slot) = self.existing(id) {
            return slot;
        }

        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(sessions.entry(id.clone()).or_insert_with(|| {
            info!("Starting conversation {id}");
            let params = match self.scope {
                ParameterScope::Global => None,
                ParameterScope::PerConversation => Some(self.defaults.clone()),
            };
            Arc::new(Mutex::new(ConversationSession::new(
                id.clone(),
                self.window,
                params,
            )))
        }))
    }

    /// Read the store that applies to an already-locked session.
    pub(crate) fn read_params<R>(
        &self,
        session: &ConversationSession,
        f: impl FnOnce(&ParameterStore) -> R,
    ) -> R {
        match &session.params {
            Some(params) => f(params),
            None => f(&lock(&self.shared)),
        }
    }

    fn existing(&self, id: &ConversationId) -> Option<Arc<Mutex<ConversationSession>>> {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        sessions.get(id).cloned()
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new(
            DEFAULT_WINDOW,
            ParameterScope::Global,
            ParameterStore::default(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use palaver_core::ParamName;

    fn id(s: &str) -> ConversationId {
        ConversationId::from(s)
    }

    #[test]
    fn view_is_bounded_and_ordered() {
        let manager = SessionManager::default();
        let alice = id("alice");
        manager
            .update_params(&alice, |p| p.set(ParamName::SystemMessage, "You are terse."))
            .unwrap();

        for i in 0..15 {
            manager.append_turn(&alice, Role::User, format!("q{i}"));
            manager.append_turn(&alice, Role::Assistant, format!("a{i}"));
        }

        let view = manager.view(&alice);
        assert_eq!(view.len(), 11);
        assert_eq!(view[0], ChatMessage::system("You are terse."));
        let expected: Vec<String> = (10..15)
            .flat_map(|i| [format!("q{i}"), format!("a{i}")])
            .collect();
        let rest: Vec<String> = view[1..].iter().map(|m| m.content.clone()).collect();
        assert_eq!(rest, expected);
    }

    #[test]
    fn clear_keeps_pinned_system_message() {
        let manager = SessionManager::default();
        let bob = id("bob");
        manager
            .update_params(&bob, |p| p.set(ParamName::SystemMessage, "pinned"))
            .unwrap();
        for i in 0..5 {
            manager.append_turn(&bob, Role::User, format!("m{i}"));
        }

        manager.clear(&bob).unwrap();
        assert_eq!(manager.view(&bob), vec![ChatMessage::system("pinned")]);

        manager
            .update_params(&bob, |p| p.set(ParamName::SystemMessage, ""))
            .unwrap();
        assert!(manager.view(&bob).is_empty());
    }

    #[test]
    fn conversations_do_not_share_history() {
        let manager = SessionManager::default();
        manager.append_turn(&id("a"), Role::User, "for a");
        manager.append_turn(&id("b"), Role::User, "for b");

        assert_eq!(manager.history(&id("a")), vec![ChatMessage::user("for a")]);
        assert_eq!(manager.history(&id("b")), vec![ChatMessage::user("for b")]);
        assert_eq!(manager.conversations(), vec![id("a"), id("b")]);
    }

    #[test]
    fn per_conversation_scope_isolates_parameters() {
        let manager =
            SessionManager::new(10, ParameterScope::PerConversation, ParameterStore::default());
        manager
            .update_params(&id("a"), |p| p.set(ParamName::Temperature, "0.2"))
            .unwrap();

        assert!((manager.params(&id("a")).temperature - 0.2).abs() < f32::EPSILON);
        assert!((manager.params(&id("b")).temperature - 0.7).abs() < f32::EPSILON);
    }

    #[test]
    fn global_scope_shares_parameters() {
        let manager = SessionManager::default();
        manager
            .update_params(&id("a"), |p| p.set(ParamName::TopK, "5"))
            .unwrap();
        assert_eq!(manager.params(&id("b")).top_k, 5);
    }

    #[test]
    fn clear_is_refused_while_in_flight() {
        let manager = SessionManager::default();
        let carol = id("carol");
        manager.append_turn(&carol, Role::User, "hi");
        lock(&manager.slot(&carol)).in_flight = true;

        assert!(matches!(manager.clear(&carol), Err(ChatError::Busy(_))));
        assert_eq!(manager.history(&carol).len(), 1);
    }
}
