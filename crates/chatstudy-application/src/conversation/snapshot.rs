use chatstudy_core::conversation::Conversation;
use chatstudy_core::sync::SyncState;
use serde::{Deserialize, Serialize};

/// One conversation as persisted in the local cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredConversation {
    pub conversation: Conversation,
    pub state: SyncState,
}

/// A principal's local conversation view.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSnapshot {
    #[serde(default)]
    pub entries: Vec<StoredConversation>,
    /// Conversations deleted locally whose remote deletion is unconfirmed.
    #[serde(default)]
    pub pending_deletes: Vec<String>,
}
