//! Merge-by-identity between the local conversation view and a freshly
//! fetched remote list.
//!
//! Field precedence for an id present on both sides:
//! - `created_at`: always the cached value.
//! - Local copy without unsaved changes: the fetched content wins.
//! - Local copy with unsaved changes: the local title and model win. The
//!   message list is the fetched list followed by every local message the
//!   remote has not seen yet, so nothing unsaved is dropped. The entry keeps
//!   its unsaved state; only an acknowledged save marks it synced.
//! - `last_activity_at` is the later of the two, clamped so it never
//!   precedes `created_at`.

use super::state::SyncState;
use crate::conversation::{Conversation, Message};
use std::collections::{HashMap, HashSet};

/// A conversation together with its sync state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedEntry {
    pub conversation: Conversation,
    pub state: SyncState,
}

impl MergedEntry {
    pub fn new(conversation: Conversation, state: SyncState) -> Self {
        Self {
            conversation,
            state,
        }
    }
}

#[derive(Debug, Default)]
pub struct MergeOutcome {
    /// Every entry the local view should hold after the merge, including
    /// `LocalOnly` ones.
    pub entries: Vec<MergedEntry>,
    /// Ids of synced local entries the remote store no longer holds.
    pub dropped: Vec<String>,
}

/// Merges one cached conversation with its fetched remote copy.
///
/// Returns the merged conversation and whether local changes survived the
/// merge (and therefore still need saving).
pub fn merge_conversation(
    cached: &Conversation,
    cached_state: SyncState,
    fetched: Conversation,
) -> (Conversation, bool) {
    let unsaved = cached_state.has_unsaved_changes();

    let mut merged = if unsaved {
        let remote_activity = fetched.last_activity_at;
        let seen: HashSet<&str> = fetched.messages.iter().map(|m| m.id.as_str()).collect();
        let unsent: Vec<Message> = cached
            .messages
            .iter()
            .filter(|m| !seen.contains(m.id.as_str()))
            .cloned()
            .collect();

        let mut local = cached.clone();
        local.messages = fetched.messages;
        local.messages.extend(unsent);
        local.touch(remote_activity);
        local
    } else {
        Conversation {
            id: cached.id.clone(),
            owner_id: cached.owner_id.clone(),
            ..fetched
        }
    };

    merged.created_at = cached.created_at;
    if merged.last_activity_at < merged.created_at {
        merged.last_activity_at = merged.created_at;
    }
    (merged, unsaved)
}

/// Merges the whole local view with a fetched list.
pub fn merge_lists(local: Vec<MergedEntry>, fetched: Vec<Conversation>) -> MergeOutcome {
    let mut local_by_id: HashMap<String, MergedEntry> = local
        .into_iter()
        .map(|e| (e.conversation.id.clone(), e))
        .collect();

    let mut outcome = MergeOutcome::default();

    for remote in fetched {
        match local_by_id.remove(&remote.id) {
            Some(entry) if entry.state == SyncState::Deleted => {
                // Deleted locally while the fetch was in flight.
                outcome.entries.push(entry);
            }
            Some(entry) => {
                let (merged, kept_local) =
                    merge_conversation(&entry.conversation, entry.state, remote);
                let state = if kept_local {
                    entry.state
                } else {
                    SyncState::Synced
                };
                outcome.entries.push(MergedEntry::new(merged, state));
            }
            None => {
                let mut remote = remote;
                if remote.last_activity_at < remote.created_at {
                    remote.last_activity_at = remote.created_at;
                }
                outcome
                    .entries
                    .push(MergedEntry::new(remote, SyncState::Synced));
            }
        }
    }

    for (id, entry) in local_by_id {
        match entry.state {
            SyncState::Synced => outcome.dropped.push(id),
            _ => outcome.entries.push(entry),
        }
    }

    outcome
}
