//! Remote conversation gateway adapters.

mod http;
mod memory;

pub use http::HttpConversationGateway;
pub use memory::{GatewayCall, InMemoryConversationGateway};
