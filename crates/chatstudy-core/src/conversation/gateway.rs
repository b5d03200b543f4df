//! Remote conversation gateway contract.
//!
//! The remote store is authoritative but slow and may be unreachable at
//! any time. Implementations report every failure as an `Err`; callers
//! treat that as "remote currently unavailable", never as data loss.

use super::model::Conversation;
use crate::error::Result;
use async_trait::async_trait;

#[async_trait]
pub trait ConversationGateway: Send + Sync {
    /// Lists every conversation owned by a principal.
    async fn fetch_all(&self, principal_id: &str) -> Result<Vec<Conversation>>;

    /// Fetches one conversation.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(Conversation))`: found
    /// - `Ok(None)`: the store does not hold this id
    /// - `Err(_)`: the store could not be reached
    async fn fetch_one(
        &self,
        principal_id: &str,
        conversation_id: &str,
    ) -> Result<Option<Conversation>>;

    /// Upserts a conversation, replacing its stored message list wholesale.
    async fn save(&self, principal_id: &str, conversation: &Conversation) -> Result<()>;

    /// Hard-deletes a conversation. Deleting an absent id is not an error.
    async fn delete(&self, principal_id: &str, conversation_id: &str) -> Result<()>;
}
