//! Conversation domain module.
//!
//! # Module Structure
//!
//! - `model`: `Conversation`, `Message`, `Sender`
//! - `gateway`: the remote conversation store contract

mod gateway;
mod model;

pub use gateway::ConversationGateway;
pub use model::{Conversation, Message, Sender};
