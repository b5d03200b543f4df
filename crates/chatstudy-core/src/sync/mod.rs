//! Conversation synchronization primitives.
//!
//! Pure, clock-free building blocks used by the application-layer
//! synchronizer: the per-conversation state machine, the debounce
//! scheduler, and merge-by-identity.

mod merge;
mod scheduler;
mod state;

pub use merge::{MergeOutcome, MergedEntry, merge_conversation, merge_lists};
pub use scheduler::DebounceScheduler;
pub use state::{SyncEvent, SyncState};
