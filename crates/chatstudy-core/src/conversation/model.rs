//! Conversation domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who sent a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    /// Message typed by the study participant (or researcher).
    Participant,
    /// Message produced by the AI assistant.
    Assistant,
}

/// A single message in a conversation.
///
/// Messages are never edited once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub sender: Sender,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(sender: Sender, text: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: format!("msg_{}", uuid::Uuid::new_v4().simple()),
            sender,
            text: text.into(),
            timestamp,
        }
    }
}

/// A conversation between a principal and the assistant.
///
/// Invariants:
/// - `id` is minted once (client side) and carried unchanged everywhere.
/// - `created_at` never changes after first persistence.
/// - `last_activity_at >= created_at`, and it never decreases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    /// Principal id of the owner.
    pub owner_id: String,
    pub title: String,
    /// Model reference the conversation runs against.
    pub model: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

impl Conversation {
    /// Creates a conversation with a freshly minted id.
    ///
    /// Ids carry 122 bits of randomness so that independent tabs or
    /// devices creating conversations at the same time cannot collide.
    pub fn new(
        owner_id: impl Into<String>,
        title: impl Into<String>,
        model: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Self::mint_id(),
            owner_id: owner_id.into(),
            title: title.into(),
            model: model.into(),
            messages: Vec::new(),
            created_at: now,
            last_activity_at: now,
        }
    }

    pub fn mint_id() -> String {
        format!("conv_{}", uuid::Uuid::new_v4().simple())
    }

    /// Appends a message and advances the activity timestamp.
    pub fn append(&mut self, message: Message) {
        self.touch(message.timestamp);
        self.messages.push(message);
    }

    /// Moves `last_activity_at` forward to `at`; never moves it back.
    pub fn touch(&mut self, at: DateTime<Utc>) {
        if at > self.last_activity_at {
            self.last_activity_at = at;
        }
    }

    /// True once the conversation holds more than the assistant greeting,
    /// i.e. at least one participant message.
    pub fn meets_persistence_threshold(&self) -> bool {
        self.messages
            .iter()
            .any(|m| m.sender == Sender::Participant)
    }
}
