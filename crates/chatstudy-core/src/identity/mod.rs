//! Device identity domain module.
//!
//! # Module Structure
//!
//! - `model`: `DeviceIdentity`, `DerivationMethod` and the persisted record
//! - `fingerprint`: environment characteristics and `FingerprintDeriver`
//! - `tier`: the two persistence tier traits (`KeyValueStore`, `DurableStore`)

mod fingerprint;
mod model;
mod tier;

pub use fingerprint::{
    DeviceCharacteristics, EnvironmentProbe, Fingerprint, FingerprintDeriver, StaticEnvironment,
};
pub use model::{DerivationMethod, DeviceIdentity, IdentityRecord};
pub use tier::{DurableStore, KeyValueStore};

/// Key under which the identity record is stored in both tiers.
pub const IDENTITY_KEY: &str = "chatstudy.device_identity";
