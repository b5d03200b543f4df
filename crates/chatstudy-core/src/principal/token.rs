//! Bearer token payload decoding.
//!
//! Only the non-sensitive payload segment of a `header.payload.signature`
//! token is read. The signature is never verified here; the remote
//! authority does that on every request.

use super::model::{ActorRole, Principal};
use crate::error::{Result, StudyError};
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

/// Claims read from a bearer token payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenClaims {
    pub subject: String,
    pub role: ActorRole,
    pub expires_at: Option<DateTime<Utc>>,
}

impl TokenClaims {
    /// Returns true if the token carries an expiry at or before `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }

    pub fn into_principal(self) -> Principal {
        Principal::authenticated(self.subject, self.role)
    }
}

/// Decodes the payload of a bearer token.
///
/// Accepts an optional `Bearer ` prefix, padded or unpadded base64url, and
/// the standard base64 alphabet. The subject is read from `sub`, falling
/// back to `user_id` and then `id`; numeric subjects are stringified.
/// A missing or unknown `role` defaults to `researcher`.
pub fn decode_bearer_token(token: &str) -> Result<TokenClaims> {
    let token = token.trim();
    let token = token.strip_prefix("Bearer ").unwrap_or(token).trim();

    let mut segments = token.split('.');
    let payload = match (segments.next(), segments.next()) {
        (Some(_header), Some(payload)) if !payload.is_empty() => payload,
        _ => return Err(StudyError::token("token has no payload segment")),
    };

    let normalized: String = payload
        .trim_end_matches('=')
        .chars()
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            other => other,
        })
        .collect();
    let bytes = URL_SAFE_NO_PAD.decode(normalized.as_bytes())?;
    let claims: Value = serde_json::from_slice(&bytes)?;

    let subject = ["sub", "user_id", "id"]
        .iter()
        .find_map(|key| claim_as_string(&claims, key))
        .ok_or_else(|| StudyError::token("token payload has no subject"))?;

    let role = claims
        .get("role")
        .and_then(Value::as_str)
        .and_then(ActorRole::parse)
        .unwrap_or_default();

    let expires_at = claims
        .get("exp")
        .and_then(Value::as_i64)
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single());

    Ok(TokenClaims {
        subject,
        role,
        expires_at,
    })
}

fn claim_as_string(claims: &Value, key: &str) -> Option<String> {
    match claims.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_token(payload: &str) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let body = URL_SAFE_NO_PAD.encode(payload.as_bytes());
        format!("{}.{}.c2lnbmF0dXJl", header, body)
    }

    #[test]
    fn test_decodes_subject_and_role() {
        let token = make_token(r#"{"sub":"researcher-42","role":"admin","exp":4102444800}"#);
        let claims = decode_bearer_token(&token).unwrap();

        assert_eq!(claims.subject, "researcher-42");
        assert_eq!(claims.role, ActorRole::Admin);
        assert_eq!(
            claims.expires_at,
            Some(Utc.with_ymd_and_hms(2100, 1, 1, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_bearer_prefix_and_numeric_user_id() {
        let token = format!("Bearer {}", make_token(r#"{"user_id":17}"#));
        let claims = decode_bearer_token(&token).unwrap();

        assert_eq!(claims.subject, "17");
        assert_eq!(claims.role, ActorRole::Researcher);
        assert!(claims.expires_at.is_none());
    }

    #[test]
    fn test_expiry_check() {
        let token = make_token(r#"{"sub":"r1","exp":1000}"#);
        let claims = decode_bearer_token(&token).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        assert!(claims.is_expired_at(now));
    }

    #[test]
    fn test_rejects_malformed_tokens() {
        assert!(decode_bearer_token("not-a-token").is_err());
        assert!(decode_bearer_token("a.!!!.c").is_err());
        assert!(decode_bearer_token(&make_token(r#"{"role":"admin"}"#)).is_err());
        assert!(decode_bearer_token(&make_token("not json")).is_err());
    }
}
