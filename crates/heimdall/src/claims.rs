//! Token payload decoding.
//!
//! Claims are for display only. The signature is never verified here and no
//! authorization decision may be based on these values; the backend enforces
//! access with its own validation.

use crate::{AuthError, AuthResult};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// Claims derived from a bearer token payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenClaims {
    pub subject: Option<String>,
    /// `preferred_username`
    pub username: Option<String>,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub email: Option<String>,
    /// `realm_access.roles`
    pub roles: BTreeSet<String>,
    pub issued_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl TokenClaims {
    /// Decode `raw` as `header.payload.signature`.
    ///
    /// Segments may use either base64 alphabet, with or without padding.
    pub fn decode(raw: &str) -> AuthResult<Self> {
        let parts: Vec<&str> = raw.trim().split('.').collect();
        if parts.len() != 3 {
            return Err(AuthError::TokenMalformed(format!(
                "expected 3 segments, found {}",
                parts.len()
            )));
        }
        if parts.iter().any(|p| p.is_empty()) {
            return Err(AuthError::TokenMalformed("empty token segment".into()));
        }

        let payload = decode_segment(parts[1])?;
        let value: Value = serde_json::from_slice(&payload)
            .map_err(|e| AuthError::TokenMalformed(format!("payload is not JSON: {e}")))?;
        let Value::Object(map) = value else {
            return Err(AuthError::TokenMalformed(
                "payload is not a JSON object".into(),
            ));
        };

        Ok(Self::from_payload(&map))
    }

    fn from_payload(map: &Map<String, Value>) -> Self {
        let text = |key: &str| map.get(key).and_then(Value::as_str).map(str::to_string);
        let time = |key: &str| {
            map.get(key)
                .and_then(Value::as_i64)
                .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        };

        let roles = map
            .get("realm_access")
            .and_then(|access| access.get("roles"))
            .and_then(Value::as_array)
            .map(|roles| {
                roles
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            subject: text("sub"),
            username: text("preferred_username"),
            given_name: text("given_name"),
            family_name: text("family_name"),
            email: text("email"),
            roles,
            issued_at: time("iat"),
            expires_at: time("exp"),
        }
    }

    /// Expired once `now` reaches `exp`. A token without `exp` never expires.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| now >= exp)
    }

    /// True when the token expires within `window` of `now` (or already has).
    pub fn expires_within(&self, now: DateTime<Utc>, window: chrono::Duration) -> bool {
        self.expires_at.is_some_and(|exp| exp - now <= window)
    }

    /// "Given Family", falling back to the username.
    pub fn display_name(&self) -> Option<String> {
        match (&self.given_name, &self.family_name) {
            (Some(given), Some(family)) => Some(format!("{given} {family}")),
            (Some(given), None) => Some(given.clone()),
            (None, Some(family)) => Some(family.clone()),
            (None, None) => self.username.clone(),
        }
    }
}

fn decode_segment(segment: &str) -> AuthResult<Vec<u8>> {
    let normalized: String = segment
        .trim_end_matches('=')
        .chars()
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            other => other,
        })
        .collect();

    URL_SAFE_NO_PAD
        .decode(normalized.as_bytes())
        .map_err(|e| AuthError::TokenMalformed(format!("segment is not base64: {e}")))
}


#[cfg(test)]
mod tests {
    use super::test_tokens::*;
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_full_payload() {
        let claims = TokenClaims::decode(&token_with(&json!({
            "sub": "abc",
            "preferred_username": "test-doctor",
            "given_name": "Test",
            "family_name": "Doctor",
            "email": "test.doctor@datamed.com",
            "realm_access": { "roles": ["doctor", "user", "doctor"] },
            "iat": 1_700_000_000,
            "exp": 1_700_003_600,
        })))
        .unwrap();

        assert_eq!(claims.subject.as_deref(), Some("abc"));
        assert_eq!(claims.username.as_deref(), Some("test-doctor"));
        assert_eq!(claims.display_name().as_deref(), Some("Test Doctor"));
        assert_eq!(claims.roles.len(), 2);
        assert!(claims.roles.contains("doctor"));
        assert_eq!(claims.expires_at.unwrap().timestamp(), 1_700_003_600);
        assert_eq!(claims.issued_at.unwrap().timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_decode_padded_standard_base64() {
        let claims = TokenClaims::decode(&padded_token(&json!({
            "preferred_username": "test-doctor",
            "exp": 1_700_003_600,
        })))
        .unwrap();
        assert_eq!(claims.username.as_deref(), Some("test-doctor"));
    }

    #[test]
    fn test_missing_claims_are_empty() {
        let claims = TokenClaims::decode(&token_with(&json!({}))).unwrap();
        assert!(claims.roles.is_empty());
        assert!(claims.expires_at.is_none());
        assert!(claims.display_name().is_none());
    }

    #[test]
    fn test_rejects_wrong_segment_count() {
        assert!(matches!(
            TokenClaims::decode("a.b"),
            Err(AuthError::TokenMalformed(_))
        ));
        assert!(matches!(
            TokenClaims::decode("a.b.c.d"),
            Err(AuthError::TokenMalformed(_))
        ));
        assert!(matches!(
            TokenClaims::decode(""),
            Err(AuthError::TokenMalformed(_))
        ));
    }

    #[test]
    fn test_rejects_non_json_payload() {
        let raw = format!(
            "{}.{}.{}",
            URL_SAFE_NO_PAD.encode("{}"),
            URL_SAFE_NO_PAD.encode("not json"),
            URL_SAFE_NO_PAD.encode("sig")
        );
        assert!(matches!(
            TokenClaims::decode(&raw),
            Err(AuthError::TokenMalformed(_))
        ));
    }

    #[test]
    fn test_rejects_non_object_payload() {
        let raw = token_with(&json!(["a", "b"]));
        assert!(matches!(
            TokenClaims::decode(&raw),
            Err(AuthError::TokenMalformed(_))
        ));
    }

    #[test]
    fn test_expiry_boundaries() {
        let claims = TokenClaims::decode(&token_expiring_at(1_000)).unwrap();
        let at = |secs| Utc.timestamp_opt(secs, 0).unwrap();

        assert!(!claims.is_expired_at(at(999)));
        assert!(claims.is_expired_at(at(1_000)));
        assert!(claims.expires_within(at(995), chrono::Duration::seconds(5)));
        assert!(!claims.expires_within(at(990), chrono::Duration::seconds(5)));
    }

    #[test]
    fn test_no_expiry_never_expires() {
        let claims = TokenClaims::decode(&token_with(&json!({ "sub": "x" }))).unwrap();
        assert!(!claims.is_expired_at(Utc::now() + chrono::Duration::days(10_000)));
        assert!(!claims.expires_within(Utc::now(), chrono::Duration::days(1)));
    }
}
