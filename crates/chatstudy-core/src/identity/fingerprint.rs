//! Device fingerprint derivation.
//!
//! A fingerprint is a reproducible digest of characteristics that stay
//! stable for one client installation. It never touches the network and
//! never fails: unreadable characteristics are skipped, and when nothing at
//! all is readable the deriver returns [`Fingerprint::Unavailable`] so the
//! caller can fall back to random generation.

use crate::config::{HashAlgorithm, IdentitySettings};
use sha2::{Digest as _, Sha256};
use std::fmt::Write as _;

/// Characteristics read from the running environment.
///
/// Each field is `None` when it could not be read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceCharacteristics {
    pub screen_width: Option<u32>,
    pub screen_height: Option<u32>,
    pub color_depth: Option<u32>,
    pub timezone: Option<String>,
    pub languages: Option<Vec<String>>,
    pub platform: Option<String>,
    pub cpu_cores: Option<u32>,
    /// Signature of rendered graphics output, when the embedder has one.
    pub graphics_signature: Option<String>,
}

impl DeviceCharacteristics {
    /// Labelled, length-prefixed fields in a fixed order.
    ///
    /// Each field is written as `label=len:value;` so a value that contains
    /// the separator cannot be confused with a neighbouring field.
    fn canonical_fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = Vec::new();
        if let Some(w) = self.screen_width {
            fields.push(("screen_width", w.to_string()));
        }
        if let Some(h) = self.screen_height {
            fields.push(("screen_height", h.to_string()));
        }
        if let Some(depth) = self.color_depth {
            fields.push(("color_depth", depth.to_string()));
        }
        if let Some(tz) = self.timezone.as_deref().filter(|s| !s.is_empty()) {
            fields.push(("timezone", tz.to_string()));
        }
        if let Some(langs) = self.languages.as_ref().filter(|l| !l.is_empty()) {
            let mut joined = String::new();
            for lang in langs {
                let _ = write!(&mut joined, "{}:{},", lang.len(), lang);
            }
            fields.push(("languages", joined));
        }
        if let Some(platform) = self.platform.as_deref().filter(|s| !s.is_empty()) {
            fields.push(("platform", platform.to_string()));
        }
        if let Some(cores) = self.cpu_cores {
            fields.push(("cpu_cores", cores.to_string()));
        }
        if let Some(gfx) = self.graphics_signature.as_deref().filter(|s| !s.is_empty()) {
            fields.push(("graphics", gfx.to_string()));
        }
        fields
    }

    fn canonical_input(&self) -> Option<String> {
        let fields = self.canonical_fields();
        if fields.is_empty() {
            return None;
        }
        let mut input = String::new();
        for (label, value) in fields {
            let _ = write!(&mut input, "{}={}:{};", label, value.len(), value);
        }
        Some(input)
    }
}

/// Reads device characteristics from the environment.
pub trait EnvironmentProbe: Send + Sync {
    fn characteristics(&self) -> DeviceCharacteristics;
}

/// A probe returning fixed characteristics.
#[derive(Debug, Clone, Default)]
pub struct StaticEnvironment(pub DeviceCharacteristics);

impl EnvironmentProbe for StaticEnvironment {
    fn characteristics(&self) -> DeviceCharacteristics {
        self.0.clone()
    }
}

/// Result of a fingerprint derivation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fingerprint {
    /// Hex digest truncated to the configured length.
    Hash(String),
    /// No characteristic could be read.
    Unavailable,
}

impl Fingerprint {
    pub fn as_hash(&self) -> Option<&str> {
        match self {
            Self::Hash(hash) => Some(hash),
            Self::Unavailable => None,
        }
    }
}

/// Computes fingerprints from an [`EnvironmentProbe`].
#[derive(Debug, Clone)]
pub struct FingerprintDeriver {
    length: usize,
    algorithm: HashAlgorithm,
}

impl FingerprintDeriver {
    /// Longest hash this deriver emits (hex SHA-256).
    pub const MAX_LENGTH: usize = 64;

    pub fn new(settings: &IdentitySettings) -> Self {
        Self {
            length: settings.fingerprint_length.clamp(8, Self::MAX_LENGTH),
            algorithm: settings.hash_algorithm,
        }
    }

    pub fn derive(&self, probe: &dyn EnvironmentProbe) -> Fingerprint {
        self.derive_from(&probe.characteristics())
    }

    pub fn derive_from(&self, characteristics: &DeviceCharacteristics) -> Fingerprint {
        let Some(input) = characteristics.canonical_input() else {
            return Fingerprint::Unavailable;
        };

        let mut hash = match self.algorithm {
            HashAlgorithm::Sha256 => sha256_hex(&input),
            HashAlgorithm::Rolling => rolling_hex(&input, self.length),
        };
        hash.truncate(self.length);
        Fingerprint::Hash(hash)
    }
}

impl Default for FingerprintDeriver {
    fn default() -> Self {
        Self::new(&IdentitySettings::default())
    }
}

fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for b in digest {
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// Multiplicative rolling hash, one 64-bit lane per 16 hex characters.
fn rolling_hex(input: &str, length: usize) -> String {
    let mut out = String::with_capacity(length + 16);
    let mut lane: u64 = 0;
    while out.len() < length {
        let mut h: u64 = 0xcbf2_9ce4_8422_2325 ^ lane.wrapping_mul(0x9e37_79b9_7f4a_7c15);
        for b in input.bytes() {
            h = h.wrapping_mul(31).wrapping_add(u64::from(b));
            h ^= h >> 29;
        }
        let _ = write!(&mut out, "{:016x}", h);
        lane += 1;
    }
    out
}
