//! Principal-scoped local cache.

mod cache;

pub use cache::ScopeCache;
