//! Conversation synchronization services.
//!
//! - [`ConversationSynchronizer`]: optimistic local conversation view,
//!   debounced persistence and merge with the remote store.
//! - [`ConversationSnapshot`]: what the synchronizer keeps in the scope
//!   cache so a restart can pick up unsaved work.

mod snapshot;
mod synchronizer;

pub use snapshot::{ConversationSnapshot, StoredConversation};
pub use synchronizer::{ConversationSynchronizer, DeleteOutcome, FlushReport, LoadOutcome};
