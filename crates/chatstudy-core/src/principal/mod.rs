//! Principal domain module.
//!
//! A principal is the identity on whose behalf state is cached and
//! persisted: either an anonymous participant or an authenticated actor
//! decoded from a bearer token.
//!
//! # Module Structure
//!
//! - `model`: `Principal` and `ActorRole`
//! - `token`: payload decoding for bearer tokens (`TokenClaims`)

mod model;
mod token;

pub use model::{ActorRole, Principal};
pub use token::{TokenClaims, decode_bearer_token};
