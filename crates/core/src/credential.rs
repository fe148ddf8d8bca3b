//! Session credential and claim decoding.
//!
//! A [`Credential`] is the signed token issued by the identity provider. The
//! storefront never verifies the signature (the catalog API does); it only
//! reads the payload to decide what to show. Decoding is a pure function and
//! never fails loudly: anything that is not a readable JWT payload yields an
//! empty [`GroupSet`].

use core::fmt;
use std::collections::BTreeSet;

use base64::Engine;
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// Claim carrying group membership in Cognito-issued tokens.
pub const GROUPS_CLAIM: &str = "cognito:groups";

const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

const STANDARD_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// A signed session token.
///
/// Holds only the raw token; claims are derived from it on demand so the
/// group set can never drift from the token it came from.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Wrap a token string. Any string is accepted.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token, for `Authorization: Bearer` headers and storage.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decoded claims, or `None` if the payload is unreadable.
    #[must_use]
    pub fn claims(&self) -> Option<Claims> {
        decode_claims(&self.0)
    }

    /// Group membership; empty if the payload is unreadable.
    #[must_use]
    pub fn groups(&self) -> GroupSet {
        groups_from_token(&self.0)
    }

    /// Whether the token's `exp` claim is at or before `now`.
    ///
    /// Tokens without a readable expiry are treated as unexpired; the
    /// catalog API has the final say.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.claims()
            .and_then(|claims| claims.expires_at)
            .is_some_and(|expires_at| expires_at <= now)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Credential").field(&"[REDACTED]").finish()
    }
}

/// Claims read from a token payload.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Claims {
    /// Groups the user belongs to.
    pub groups: GroupSet,
    /// Expiry (`exp`), if present.
    pub expires_at: Option<DateTime<Utc>>,
    /// Subject (`sub`), the provider's user id.
    pub subject: Option<String>,
    /// Email address, present on ID tokens.
    pub email: Option<String>,
}

/// Decode the payload segment of a JWT-shaped token.
///
/// Returns `None` when the token has no payload segment, the segment is not
/// base64, or the payload is not a JSON object. Each claim is read on its
/// own: a claim of an unexpected type is dropped without affecting the rest.
#[must_use]
pub fn decode_claims(token: &str) -> Option<Claims> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_LENIENT
        .decode(payload)
        .or_else(|_| STANDARD_LENIENT.decode(payload))
        .ok()?;
    let value: Value = serde_json::from_slice(&bytes).ok()?;
    let claims = value.as_object()?;

    let groups = claims
        .get(GROUPS_CLAIM)
        .and_then(Value::as_array)
        .map(|groups| groups.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    let expires_at = claims.get("exp").and_then(timestamp_claim);

    Some(Claims {
        groups,
        expires_at,
        subject: string_claim(claims, "sub"),
        email: string_claim(claims, "email"),
    })
}

fn string_claim(claims: &Map<String, Value>, name: &str) -> Option<String> {
    claims.get(name).and_then(Value::as_str).map(str::to_owned)
}

// NumericDate may carry a fractional part.
#[allow(clippy::cast_possible_truncation)]
fn timestamp_claim(value: &Value) -> Option<DateTime<Utc>> {
    let seconds = value
        .as_i64()
        .or_else(|| value.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))?;
    DateTime::<Utc>::from_timestamp(seconds, 0)
}

/// Group set carried by a token, or the empty set if it cannot be decoded.
#[must_use]
pub fn groups_from_token(token: &str) -> GroupSet {
    decode_claims(token)
        .map(|claims| claims.groups)
        .unwrap_or_default()
}

/// A set of group (role) names.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GroupSet(BTreeSet<String>);

impl GroupSet {
    /// The empty set (anonymous or undecodable credential).
    #[must_use]
    pub const fn empty() -> Self {
        Self(BTreeSet::new())
    }

    #[must_use]
    pub fn contains(&self, group: &str) -> bool {
        self.0.contains(group)
    }

    /// Whether any of `roles` is a member of this set.
    #[must_use]
    pub fn intersects<S: AsRef<str>>(&self, roles: &[S]) -> bool {
        roles.iter().any(|role| self.contains(role.as_ref()))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for GroupSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for GroupSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("(none)");
        }
        let joined = self.iter().collect::<Vec<_>>().join(", ");
        f.write_str(&joined)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    use super::*;

    fn token_with(payload: &serde_json::Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","kid":"test"}"#);
        let body = URL_SAFE_NO_PAD.encode(payload.to_string());
        format!("{header}.{body}.signature")
    }

    #[test]
    fn test_decode_groups_and_expiry() {
        let token = token_with(&serde_json::json!({
            "sub": "abc-123",
            "email": "admin@shop.com",
            "cognito:groups": ["admin", "user"],
            "exp": 1_900_000_000,
        }));

        let claims = decode_claims(&token).unwrap();
        assert!(claims.groups.contains("admin"));
        assert!(claims.groups.contains("user"));
        assert_eq!(claims.groups.len(), 2);
        assert_eq!(claims.subject.as_deref(), Some("abc-123"));
        assert_eq!(claims.email.as_deref(), Some("admin@shop.com"));
        assert_eq!(claims.expires_at.unwrap().timestamp(), 1_900_000_000);
    }

    #[test]
    fn test_missing_groups_claim_is_empty_set() {
        let token = token_with(&serde_json::json!({ "sub": "abc" }));
        assert!(decode_claims(&token).unwrap().groups.is_empty());
    }

    #[test]
    fn test_malformed_tokens_yield_empty_groups() {
        assert!(groups_from_token("").is_empty());
        assert!(groups_from_token("not-a-jwt").is_empty());
        assert!(groups_from_token("a.!!!.c").is_empty());

        let not_json = format!("a.{}.c", URL_SAFE_NO_PAD.encode("hello"));
        assert!(groups_from_token(&not_json).is_empty());

        let wrong_shape = token_with(&serde_json::json!({ "cognito:groups": 42 }));
        assert!(groups_from_token(&wrong_shape).is_empty());
    }

    #[test]
    fn test_fractional_exp_keeps_groups() {
        let token = token_with(&serde_json::json!({
            "cognito:groups": ["admin"],
            "exp": 1_900_000_000.5,
        }));

        let claims = decode_claims(&token).unwrap();
        assert!(claims.groups.contains("admin"));
        assert_eq!(claims.expires_at.unwrap().timestamp(), 1_900_000_000);
    }

    #[test]
    fn test_mistyped_claims_do_not_drop_groups() {
        let token = token_with(&serde_json::json!({
            "cognito:groups": ["admin"],
            "sub": 12345,
            "email": ["not", "a", "string"],
            "exp": "tomorrow",
        }));

        assert!(groups_from_token(&token).contains("admin"));
        let claims = decode_claims(&token).unwrap();
        assert_eq!(claims.subject, None);
        assert_eq!(claims.email, None);
        assert_eq!(claims.expires_at, None);
    }

    #[test]
    fn test_non_string_group_entries_are_skipped() {
        let token = token_with(&serde_json::json!({ "cognito:groups": ["admin", 7, null] }));
        let groups = groups_from_token(&token);
        assert_eq!(groups.len(), 1);
        assert!(groups.contains("admin"));
    }

    #[test]
    fn test_non_object_payload_is_unreadable() {
        let token = token_with(&serde_json::json!(["cognito:groups", "admin"]));
        assert!(decode_claims(&token).is_none());
        assert!(groups_from_token(&token).is_empty());
    }

    #[test]
    fn test_padded_standard_payload_is_accepted() {
        let body = base64::engine::general_purpose::STANDARD
            .encode(serde_json::json!({ "cognito:groups": ["user"] }).to_string());
        let token = format!("h.{body}.s");
        assert!(groups_from_token(&token).contains("user"));
    }

    #[test]
    fn test_credential_expiry() {
        let token = token_with(&serde_json::json!({ "exp": 1_000 }));
        let credential = Credential::new(token);
        let now = DateTime::<Utc>::from_timestamp(2_000, 0).unwrap();
        assert!(credential.is_expired_at(now));

        let opaque = Credential::new("opaque");
        assert!(!opaque.is_expired_at(now));
    }

    #[test]
    fn test_credential_debug_redacts_token() {
        let credential = Credential::new("super-secret-token");
        let debug = format!("{credential:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("super-secret-token"));
    }

    #[test]
    fn test_group_set_intersects() {
        let groups: GroupSet = ["admin", "user"].into_iter().collect();
        assert!(groups.intersects(&["admin"]));
        assert!(!groups.intersects(&["editor"]));
        assert!(!groups.intersects::<&str>(&[]));
        assert_eq!(groups.to_string(), "admin, user");
        assert_eq!(GroupSet::empty().to_string(), "(none)");
    }
}
