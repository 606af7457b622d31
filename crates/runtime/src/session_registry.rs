//! Session registry (§5): one `AgentSession` per (channel type, chat
//! id), each guarded by its own `tokio::sync::Mutex` so at most one
//! turn runs against a session at a time. The map itself sits behind a
//! `RwLock` so looking up or creating a session never blocks a turn
//! already in flight on a different session.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use turnkeep_agent::AgentSession;

#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<(String, String), Arc<Mutex<AgentSession>>>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the session for `(channel_type, chat_id)`, creating it on
    /// first use. The returned handle's mutex must be held for the
    /// entire duration of a turn.
    pub async fn get_or_create(&self, channel_type: &str, chat_id: &str) -> Arc<Mutex<AgentSession>> {
        let key = (channel_type.to_string(), chat_id.to_string());
        if let Some(session) = self.sessions.read().await.get(&key) {
            return session.clone();
        }
        let mut sessions = self.sessions.write().await;
        sessions.entry(key).or_insert_with(|| Arc::new(Mutex::new(AgentSession::new(channel_type, chat_id)))).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_channel_and_chat_returns_the_same_session() {
        let registry = SessionRegistry::new();
        let a = registry.get_or_create("cli", "chat-1").await;
        let b = registry.get_or_create("cli", "chat-1").await;
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn different_chats_get_different_sessions() {
        let registry = SessionRegistry::new();
        let a = registry.get_or_create("cli", "chat-1").await;
        let b = registry.get_or_create("cli", "chat-2").await;
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn a_locked_session_blocks_a_concurrent_turn() {
        let registry = SessionRegistry::new();
        let session = registry.get_or_create("cli", "chat-1").await;
        let _guard = session.lock().await;
        assert!(session.try_lock().is_err());
    }
}
