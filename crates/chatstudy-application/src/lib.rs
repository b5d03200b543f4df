//! Application layer for the chat study client.
//!
//! Services in this crate coordinate the domain model in `chatstudy-core`
//! with the adapters in `chatstudy-infrastructure`: resolving the device
//! identity, scoping local state by principal, and keeping the
//! conversation view in sync with the remote store.

pub mod bootstrap;
pub mod conversation;
pub mod identity;
pub mod principal;
pub mod scope;

#[cfg(test)]
pub(crate) mod test_support;

pub use bootstrap::StudyClient;
pub use conversation::{ConversationSynchronizer, DeleteOutcome, FlushReport, LoadOutcome};
pub use identity::IdentityResolver;
pub use principal::{PrincipalContext, PrincipalResolver};
pub use scope::ScopeCache;
