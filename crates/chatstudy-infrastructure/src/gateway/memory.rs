//! In-memory conversation store.
//!
//! Serves offline mode and tests. Every call is recorded, and an
//! availability switch simulates the remote store being unreachable.

use async_trait::async_trait;
use chatstudy_core::conversation::{Conversation, ConversationGateway};
use chatstudy_core::error::{Result, StudyError};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// One recorded gateway call.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayCall {
    FetchAll { principal_id: String },
    FetchOne { principal_id: String, conversation_id: String },
    Save { principal_id: String, conversation: Conversation },
    Delete { principal_id: String, conversation_id: String },
}

#[derive(Default)]
pub struct InMemoryConversationGateway {
    /// principal id → conversation id → conversation
    store: Mutex<HashMap<String, HashMap<String, Conversation>>>,
    calls: Mutex<Vec<GatewayCall>>,
    unavailable: AtomicBool,
}

impl InMemoryConversationGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Puts a conversation straight into the store, bypassing call recording.
    pub fn seed(&self, principal_id: &str, conversation: Conversation) {
        let mut store = self.store.lock().unwrap_or_else(|e| e.into_inner());
        store
            .entry(principal_id.to_string())
            .or_default()
            .insert(conversation.id.clone(), conversation);
    }

    pub fn stored(&self, principal_id: &str, conversation_id: &str) -> Option<Conversation> {
        let store = self.store.lock().unwrap_or_else(|e| e.into_inner());
        store
            .get(principal_id)
            .and_then(|convs| convs.get(conversation_id))
            .cloned()
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Every conversation passed to `save`, in call order.
    pub fn saves(&self) -> Vec<Conversation> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                GatewayCall::Save { conversation, .. } => Some(conversation),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: GatewayCall) {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(call);
    }

    fn check(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StudyError::remote("conversation store unreachable"));
        }
        Ok(())
    }
}

#[async_trait]
impl ConversationGateway for InMemoryConversationGateway {
    async fn fetch_all(&self, principal_id: &str) -> Result<Vec<Conversation>> {
        self.record(GatewayCall::FetchAll {
            principal_id: principal_id.to_string(),
        });
        self.check()?;
        let store = self.store.lock().unwrap_or_else(|e| e.into_inner());
        Ok(store
            .get(principal_id)
            .map(|convs| convs.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn fetch_one(
        &self,
        principal_id: &str,
        conversation_id: &str,
    ) -> Result<Option<Conversation>> {
        self.record(GatewayCall::FetchOne {
            principal_id: principal_id.to_string(),
            conversation_id: conversation_id.to_string(),
        });
        self.check()?;
        Ok(self.stored(principal_id, conversation_id))
    }

    async fn save(&self, principal_id: &str, conversation: &Conversation) -> Result<()> {
        self.record(GatewayCall::Save {
            principal_id: principal_id.to_string(),
            conversation: conversation.clone(),
        });
        self.check()?;
        self.seed(principal_id, conversation.clone());
        Ok(())
    }

    async fn delete(&self, principal_id: &str, conversation_id: &str) -> Result<()> {
        self.record(GatewayCall::Delete {
            principal_id: principal_id.to_string(),
            conversation_id: conversation_id.to_string(),
        });
        self.check()?;
        let mut store = self.store.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(convs) = store.get_mut(principal_id) {
            convs.remove(conversation_id);
        }
        Ok(())
    }
}
