//! Principal domain model.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Role discriminator carried by an authenticated actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ActorRole {
    #[default]
    Researcher,
    Admin,
}

impl ActorRole {
    /// Parses a role claim. Unknown values map to `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "researcher" => Some(Self::Researcher),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

/// The identity that owns locally cached and remotely persisted state.
///
/// Exactly one principal is active at a time. Its [`Principal::id`] is the
/// key every scope-cache entry and every remote call is threaded with.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Principal {
    /// A participant who never logs in, identified by the device identity.
    Anonymous { participant_id: String },
    /// A researcher or admin identified by the bearer token's subject.
    Authenticated { subject: String, role: ActorRole },
}

impl Principal {
    pub fn anonymous(participant_id: impl Into<String>) -> Self {
        Self::Anonymous {
            participant_id: participant_id.into(),
        }
    }

    pub fn authenticated(subject: impl Into<String>, role: ActorRole) -> Self {
        Self::Authenticated {
            subject: subject.into(),
            role,
        }
    }

    /// Principal id used as the cache / remote key.
    pub fn id(&self) -> &str {
        match self {
            Self::Anonymous { participant_id } => participant_id,
            Self::Authenticated { subject, .. } => subject,
        }
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, Self::Anonymous { .. })
    }

    pub fn role(&self) -> Option<ActorRole> {
        match self {
            Self::Anonymous { .. } => None,
            Self::Authenticated { role, .. } => Some(*role),
        }
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous { participant_id } => write!(f, "participant:{}", participant_id),
            Self::Authenticated { subject, role } => write!(f, "{:?}:{}", role, subject),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_principal_id() {
        assert_eq!(Principal::anonymous("fp_abc").id(), "fp_abc");
        assert_eq!(
            Principal::authenticated("user-7", ActorRole::Admin).id(),
            "user-7"
        );
    }

    #[test]
    fn test_role_parse() {
        assert_eq!(ActorRole::parse("Admin"), Some(ActorRole::Admin));
        assert_eq!(ActorRole::parse(" researcher "), Some(ActorRole::Researcher));
        assert_eq!(ActorRole::parse("participant"), None);
    }
}
