//! Infrastructure adapters for the chat study client: persistence tiers,
//! remote gateways, environment probing, configuration and logging.

pub mod environment;
pub mod gateway;
pub mod logging;
pub mod paths;
pub mod storage;

pub use crate::environment::HostEnvironment;
pub use crate::gateway::{HttpConversationGateway, InMemoryConversationGateway};
pub use crate::paths::StudyPaths;
pub use crate::storage::{
    ConfigStorage, FileKeyValueStore, InMemoryDurableStore, InMemoryKeyValueStore, SqliteVault,
};
