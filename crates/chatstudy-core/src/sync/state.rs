//! Per-conversation sync state machine.

use serde::{Deserialize, Serialize};

/// Where a conversation stands relative to the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// Created, but nothing beyond the greeting yet. Never persisted remotely.
    LocalOnly,
    /// Has content worth persisting; waiting for the debounce or a retry.
    PendingSync,
    /// The remote store acknowledged the latest content.
    Synced,
    /// Changed after being synced; re-arming moves it back to `PendingSync`.
    Dirty,
    /// Explicitly deleted. Terminal.
    Deleted,
}

/// Inputs to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncEvent {
    /// Content changed. `persistable` tells whether the conversation now
    /// meets the persistence threshold.
    Changed { persistable: bool },
    /// The debounce timer for this conversation was (re-)armed.
    DebounceArmed,
    SaveSucceeded,
    SaveFailed,
    Deleted,
}

impl SyncState {
    /// Applies an event and returns the next state.
    ///
    /// Events that make no sense for the current state leave it unchanged;
    /// `Deleted` is absorbing.
    pub fn on(self, event: SyncEvent) -> SyncState {
        use SyncEvent as E;
        use SyncState as S;

        match (self, event) {
            (S::Deleted, _) => S::Deleted,
            (_, E::Deleted) => S::Deleted,

            (S::LocalOnly, E::Changed { persistable: false }) => S::LocalOnly,
            (S::LocalOnly, E::Changed { persistable: true }) => S::PendingSync,
            (S::Synced, E::Changed { .. }) => S::Dirty,
            (S::PendingSync, E::Changed { .. }) => S::PendingSync,
            (S::Dirty, E::Changed { .. }) => S::Dirty,

            (S::Dirty, E::DebounceArmed) => S::PendingSync,
            (state, E::DebounceArmed) => state,

            (S::PendingSync, E::SaveSucceeded) => S::Synced,
            (state, E::SaveSucceeded) => state,

            (S::PendingSync, E::SaveFailed) => S::PendingSync,
            (state, E::SaveFailed) => state,
        }
    }

    /// True if the local copy holds content the remote store has not
    /// acknowledged yet.
    pub fn has_unsaved_changes(self) -> bool {
        matches!(self, SyncState::PendingSync | SyncState::Dirty)
    }
}
