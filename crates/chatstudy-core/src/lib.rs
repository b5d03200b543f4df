//! Domain layer of the chat study client.
//!
//! Pure types and traits shared by the infrastructure and application
//! crates: principals, device identity and fingerprints, conversations,
//! the sync state machine, scope keys, configuration and errors.

pub mod clock;
pub mod config;
pub mod conversation;
pub mod error;
pub mod identity;
pub mod principal;
pub mod scope;
pub mod sync;

// Re-export common error type
pub use error::{Result, StudyError};
