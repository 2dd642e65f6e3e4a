//! Conversation session storage.
//!
//! A session is the ordered history of one conversation. `history[0]` is
//! always the system prompt; every later entry is appended by a completed
//! round. The store performs each operation atomically but does not order
//! rounds: callers that read, extend and commit a history must hold the
//! conversation's lock (see [`crate::locks`]) for the whole cycle.

use crate::message::{Message, MessageRole};
use chrono::{DateTime, Utc};
use relay_core::ConversationId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// A conversation session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// The conversation this session belongs to.
    pub id: ConversationId,
    /// Messages, oldest first, starting with the system prompt.
    pub history: Vec<Message>,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
    /// When the history was last committed.
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Creates a session seeded with the system prompt.
    #[must_use]
    pub fn seeded(id: ConversationId, system_prompt: &str) -> Self {
        let now = Utc::now();
        Self {
            id,
            history: vec![Message::system(system_prompt)],
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns the number of messages, including the system prompt.
    #[must_use]
    pub fn message_count(&self) -> usize {
        self.history.len()
    }

    /// Returns the number of completed rounds.
    #[must_use]
    pub fn round_count(&self) -> usize {
        self.history.len().saturating_sub(1) / 2
    }
}

/// Trait for session storage.
pub trait SessionStore: Send + Sync {
    /// Returns the session for `id`, creating one seeded with the system
    /// prompt if none exists. At most one session is created per id.
    fn get_or_init(&self, id: ConversationId) -> Session;

    /// Replaces the stored history for `id` wholesale.
    fn commit(&self, id: ConversationId, history: Vec<Message>);

    /// Removes the session for `id`. Returns true if one existed.
    fn evict(&self, id: ConversationId) -> bool;

    /// Returns true if a session exists for `id`.
    fn contains(&self, id: ConversationId) -> bool;

    /// Returns the number of stored sessions.
    fn len(&self) -> usize;

    /// Returns true if no sessions are stored.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Process-memory session store.
#[derive(Debug)]
pub struct InMemorySessionStore {
    system_prompt: String,
    sessions: RwLock<HashMap<ConversationId, Session>>,
}

impl InMemorySessionStore {
    /// Creates an empty store that seeds new sessions with `system_prompt`.
    #[must_use]
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            sessions: RwLock::new(HashMap::new()),
        }
    }
}

impl SessionStore for InMemorySessionStore {
    fn get_or_init(&self, id: ConversationId) -> Session {
        if let Some(session) = self
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
        {
            return session.clone();
        }

        // Re-check under the write lock: another caller may have seeded it.
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        sessions
            .entry(id)
            .or_insert_with(|| {
                tracing::debug!(conversation = %id, "seeding new session");
                Session::seeded(id, &self.system_prompt)
            })
            .clone()
    }

    fn commit(&self, id: ConversationId, history: Vec<Message>) {
        debug_assert!(
            history.first().map(Message::role) == Some(MessageRole::System),
            "history must start with the system prompt"
        );

        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let session = sessions
            .entry(id)
            .or_insert_with(|| Session::seeded(id, &self.system_prompt));
        session.history = history;
        session.updated_at = Utc::now();
    }

    fn evict(&self, id: ConversationId) -> bool {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .is_some()
    }

    fn contains(&self, id: ConversationId) -> bool {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&id)
    }

    fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const PROMPT: &str = "You are Tut.";

    #[test]
    fn new_conversation_is_seeded_with_system_prompt() {
        let store = InMemorySessionStore::new(PROMPT);
        let session = store.get_or_init(ConversationId::new(1));

        assert_eq!(session.message_count(), 1);
        assert_eq!(session.history[0], Message::system(PROMPT));
        assert_eq!(session.round_count(), 0);
        assert!(store.contains(ConversationId::new(1)));
    }

    #[test]
    fn get_or_init_returns_existing_history() {
        let store = InMemorySessionStore::new(PROMPT);
        let id = ConversationId::new(7);
        let mut history = store.get_or_init(id).history;
        history.push(Message::user("hello"));
        history.push(Message::assistant("hi there"));
        store.commit(id, history.clone());

        let session = store.get_or_init(id);
        assert_eq!(session.history, history);
        assert_eq!(session.round_count(), 1);
        assert_eq!(session.history.last(), Some(&Message::assistant("hi there")));
    }

    #[test]
    fn evict_then_reseed() {
        let store = InMemorySessionStore::new(PROMPT);
        let id = ConversationId::new(3);
        let mut history = store.get_or_init(id).history;
        history.push(Message::user("remember 42"));
        history.push(Message::assistant("ok"));
        store.commit(id, history);

        assert!(store.evict(id));
        assert!(!store.contains(id));
        assert!(!store.evict(id));

        let fresh = store.get_or_init(id);
        assert_eq!(fresh.history, vec![Message::system(PROMPT)]);
    }

    #[test]
    fn conversations_do_not_share_history() {
        let store = InMemorySessionStore::new(PROMPT);
        let a = ConversationId::new(1);
        let b = ConversationId::new(2);
        let mut history = store.get_or_init(a).history;
        history.push(Message::user("only for a"));
        history.push(Message::assistant("noted"));
        store.commit(a, history);

        assert_eq!(store.get_or_init(b).message_count(), 1);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn concurrent_first_access_initializes_once() {
        let store = Arc::new(InMemorySessionStore::new(PROMPT));
        let id = ConversationId::new(99);

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || store.get_or_init(id).created_at)
            })
            .collect();
        let created: Vec<_> = handles
            .into_iter()
            .map(|h| h.join().expect("thread"))
            .collect();

        assert_eq!(store.len(), 1);
        assert!(created.iter().all(|c| *c == created[0]));
    }

    #[test]
    fn empty_store() {
        let store = InMemorySessionStore::new(PROMPT);
        assert!(store.is_empty());
        assert_eq!(store.len(), 0);
    }
}
