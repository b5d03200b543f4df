//! Device identity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a device identity was obtained by the current resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DerivationMethod {
    /// Read from the fast tier.
    Stored,
    /// Read from the durable tier after the fast tier was lost.
    Recovered,
    /// Minted from the device fingerprint.
    Fingerprinted,
    /// Minted from random entropy because no fingerprint was available.
    Random,
}

/// A stable token identifying a client installation.
///
/// The value is immutable once minted; only the method describing how the
/// current process obtained it varies between runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    value: String,
    method: DerivationMethod,
}

impl DeviceIdentity {
    pub const FINGERPRINT_PREFIX: &'static str = "fp_";
    pub const RANDOM_PREFIX: &'static str = "rand_";

    pub fn new(value: impl Into<String>, method: DerivationMethod) -> Self {
        Self {
            value: value.into(),
            method,
        }
    }

    pub fn fingerprinted(hash: &str) -> Self {
        Self::new(
            format!("{}{}", Self::FINGERPRINT_PREFIX, hash),
            DerivationMethod::Fingerprinted,
        )
    }

    pub fn random() -> Self {
        Self::new(
            format!("{}{}", Self::RANDOM_PREFIX, uuid::Uuid::new_v4().simple()),
            DerivationMethod::Random,
        )
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn method(&self) -> DerivationMethod {
        self.method
    }

    /// Checks that a stored value has a shape this crate could have minted.
    pub fn is_well_formed(value: &str) -> bool {
        let body = value
            .strip_prefix(Self::FINGERPRINT_PREFIX)
            .or_else(|| value.strip_prefix(Self::RANDOM_PREFIX));
        match body {
            Some(body) => !body.is_empty() && body.chars().all(|c| c.is_ascii_alphanumeric()),
            None => false,
        }
    }
}

/// Serialized form written into both persistence tiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub value: String,
    pub minted_by: DerivationMethod,
    pub minted_at: DateTime<Utc>,
}

impl IdentityRecord {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Parses a stored record. Anything malformed, including a record whose
    /// value fails [`DeviceIdentity::is_well_formed`], reads as `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let record: Self = serde_json::from_str(raw).ok()?;
        DeviceIdentity::is_well_formed(&record.value).then_some(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_identity_shape() {
        let identity = DeviceIdentity::random();
        assert!(identity.value().starts_with("rand_"));
        assert!(DeviceIdentity::is_well_formed(identity.value()));
        assert_ne!(identity, DeviceIdentity::random());
    }

    #[test]
    fn test_well_formed_rejects_foreign_values() {
        assert!(DeviceIdentity::is_well_formed("fp_0a1b"));
        assert!(!DeviceIdentity::is_well_formed("fp_"));
        assert!(!DeviceIdentity::is_well_formed("user-1"));
        assert!(!DeviceIdentity::is_well_formed("rand_a b"));
    }

    #[test]
    fn test_record_parse_treats_garbage_as_absent() {
        assert!(IdentityRecord::parse("{\"value\":").is_none());
        assert!(IdentityRecord::parse("null").is_none());

        let record = IdentityRecord {
            value: "fp_abc123".to_string(),
            minted_by: DerivationMethod::Fingerprinted,
            minted_at: Utc::now(),
        };
        let raw = record.to_json().unwrap();
        assert_eq!(IdentityRecord::parse(&raw), Some(record));
    }
}
