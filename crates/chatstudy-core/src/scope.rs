//! Principal-scoped cache keys.
//!
//! Every locally cached entity is stored under a key that embeds the owning
//! principal, so one principal's entries can never be read or overwritten
//! through another principal's key.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use std::fmt;

const SCOPE_PREFIX: &str = "scope/";

/// Kind of entity cached per principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Tasks,
    Conversations,
    Settings,
    ActiveConversation,
}

impl EntityKind {
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Tasks,
        EntityKind::Conversations,
        EntityKind::Settings,
        EntityKind::ActiveConversation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Tasks => "tasks",
            EntityKind::Conversations => "conversations",
            EntityKind::Settings => "settings",
            EntityKind::ActiveConversation => "active_conversation",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key prefix shared by every entry of one principal.
///
/// The principal id is base64url-encoded, so ids containing `/` or any
/// other character cannot produce a prefix of a different principal.
pub fn principal_prefix(principal_id: &str) -> String {
    format!(
        "{}{}/",
        SCOPE_PREFIX,
        URL_SAFE_NO_PAD.encode(principal_id.as_bytes())
    )
}

/// Full key for one principal / kind pair.
pub fn scope_key(principal_id: &str, kind: EntityKind) -> String {
    format!("{}{}", principal_prefix(principal_id), kind.as_str())
}

/// True if `key` belongs to the scope cache at all.
pub fn is_scope_key(key: &str) -> bool {
    key.starts_with(SCOPE_PREFIX)
}
