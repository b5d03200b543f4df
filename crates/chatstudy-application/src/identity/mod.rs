//! Device identity services.

mod resolver;

pub use resolver::IdentityResolver;
