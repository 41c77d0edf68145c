//! # Session State Store
//! One conversation slot per session key. Creation is an atomic
//! check-and-insert under a write lock, so concurrent first turns for the same
//! key share one slot. Each slot has its own async mutex, which serializes the
//! turns of a session without blocking other sessions.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::conversation::{Conversation, SessionKey};

pub type SessionSlot = Arc<tokio::sync::Mutex<Conversation>>;

#[derive(Debug, Default)]
pub struct SessionStore {
    inner: RwLock<HashMap<SessionKey, SessionSlot>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Existing slot for `key`, or a new one holding an empty conversation.
    pub fn get_or_create(&self, key: &SessionKey) -> SessionSlot {
        if let Some(slot) = self.get(key) {
            return slot;
        }
        let mut map = self.inner.write().unwrap_or_else(|e| e.into_inner());
        map.entry(key.clone())
            .or_insert_with(|| {
                debug!(session = %crate::logging::anon_hash(&key.to_string()), "new conversation");
                Arc::new(tokio::sync::Mutex::new(Conversation::new()))
            })
            .clone()
    }

    /// Slot for `key` if the session exists. Never creates.
    pub fn get(&self, key: &SessionKey) -> Option<SessionSlot> {
        let map = self.inner.read().unwrap_or_else(|e| e.into_inner());
        map.get(key).cloned()
    }

    /// Replace the stored conversation for `key` (creating the slot if needed).
    pub async fn update(&self, key: &SessionKey, conversation: Conversation) {
        let slot = self.get_or_create(key);
        *slot.lock().await = conversation;
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
