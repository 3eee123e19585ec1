//! Client-side decoding of bearer credential claims.
//!
//! Credentials are three dot-separated segments with a base64url-encoded JSON
//! payload in the middle. The signature is NOT verified here: authenticity is
//! checked by the service on every request. Decoded claims only drive local
//! UX decisions (proactive logout timing, role-based gating) and must never
//! be used as an authorization check.

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine as _;
use serde_json::Value;
use tracing::debug;

use super::session::Role;

/// Number of segments in a well-formed credential (header.payload.signature)
const CREDENTIAL_SEGMENTS: usize = 3;

/// Accepts payload segments with or without trailing `=` padding.
const PAYLOAD_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Claims embedded in a credential's payload segment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Claims {
    pub user_id: Option<String>,
    pub sub: Option<String>,
    pub role: Option<Role>,
    /// Expiry, seconds since the Unix epoch
    pub exp: Option<i64>,
    /// Issued-at, seconds since the Unix epoch
    pub iat: Option<i64>,
}

impl Claims {
    /// The subject id: `user_id` when present, otherwise `sub`.
    pub fn subject(&self) -> Option<&str> {
        self.user_id.as_deref().or(self.sub.as_deref())
    }
}

/// Decode the payload segment of a credential.
///
/// Returns `None` on any malformation: wrong segment count, invalid base64,
/// or a payload that is not a JSON object.
pub fn decode_claims(token: &str) -> Option<Claims> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != CREDENTIAL_SEGMENTS {
        debug!(segments = segments.len(), "Credential has unexpected segment count");
        return None;
    }

    let bytes = PAYLOAD_ENGINE.decode(segments[1]).ok()?;
    let payload: Value = serde_json::from_slice(&bytes).ok()?;
    let payload = payload.as_object()?;

    Some(Claims {
        user_id: string_claim(payload.get("user_id")),
        sub: string_claim(payload.get("sub")),
        role: payload
            .get("role")
            .and_then(Value::as_str)
            .and_then(|r| r.parse().ok()),
        exp: numeric_claim(payload.get("exp")),
        iat: numeric_claim(payload.get("iat")),
    })
}

/// Decode the `exp` claim of a credential.
///
/// `None` means the expiry is unknown, either because the credential is
/// malformed or because it carries no numeric `exp` claim.
pub fn decode_expiry(token: &str) -> Option<i64> {
    decode_claims(token).and_then(|c| c.exp)
}

/// Whether the credential is provably expired at `now` (epoch seconds).
///
/// An unknown expiry is never treated as expired; the service gets to decide
/// on the next request.
pub fn is_expired(token: &str, now: i64) -> bool {
    match decode_expiry(token) {
        Some(exp) => exp <= now,
        None => false,
    }
}

fn string_claim(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn numeric_claim(value: Option<&Value>) -> Option<i64> {
    let value = value?;
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f.floor() as i64))
}

#[cfg(test)]
pub(crate) mod test_support {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine as _;

    /// Build an unsigned credential around an arbitrary JSON payload.
    pub fn credential_with_payload(payload: &serde_json::Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let body = URL_SAFE_NO_PAD.encode(payload.to_string());
        format!("{}.{}.signature", header, body)
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::credential_with_payload;
    use super::*;
    use serde_json::json;

    const NOW: i64 = 1_700_000_000;

    #[test]
    fn test_decode_claims_full_payload() {
        let token = credential_with_payload(&json!({
            "user_id": "2b1e6a0c-8f4d-4c8e-9a57-0d6f3c1b2a90",
            "role": "admin",
            "exp": NOW + 3600,
            "iat": NOW,
        }));

        let claims = decode_claims(&token).expect("claims should decode");
        assert_eq!(claims.subject(), Some("2b1e6a0c-8f4d-4c8e-9a57-0d6f3c1b2a90"));
        assert_eq!(claims.role, Some(Role::Admin));
        assert_eq!(claims.exp, Some(NOW + 3600));
        assert_eq!(claims.iat, Some(NOW));
    }

    #[test]
    fn test_subject_falls_back_to_sub() {
        let token = credential_with_payload(&json!({ "sub": "42", "exp": NOW }));
        let claims = decode_claims(&token).unwrap();
        assert_eq!(claims.subject(), Some("42"));
    }

    #[test]
    fn test_is_expired_boundaries() {
        let past = credential_with_payload(&json!({ "exp": NOW - 10 }));
        let exact = credential_with_payload(&json!({ "exp": NOW }));
        let future = credential_with_payload(&json!({ "exp": NOW + 1 }));

        assert!(is_expired(&past, NOW));
        assert!(is_expired(&exact, NOW));
        assert!(!is_expired(&future, NOW));
    }

    #[test]
    fn test_malformed_credentials_are_unknown_not_expired() {
        let cases = [
            "",
            "not-a-token",
            "a.b",
            "a.b.c.d",
            "header.!!!not-base64!!!.sig",
            "header.bm90IGpzb24.sig", // "not json"
        ];
        for token in cases {
            assert_eq!(decode_expiry(token), None, "token {:?}", token);
            assert!(!is_expired(token, NOW), "token {:?}", token);
        }
    }

    #[test]
    fn test_missing_or_non_numeric_exp_is_unknown() {
        let missing = credential_with_payload(&json!({ "role": "user" }));
        let text = credential_with_payload(&json!({ "exp": "tomorrow" }));
        assert_eq!(decode_expiry(&missing), None);
        assert_eq!(decode_expiry(&text), None);
        assert!(!is_expired(&text, i64::MAX));
    }

    #[test]
    fn test_fractional_exp_is_floored() {
        let token = credential_with_payload(&json!({ "exp": 1700000000.9 }));
        assert_eq!(decode_expiry(&token), Some(1_700_000_000));
    }

    #[test]
    fn test_padded_payload_decodes() {
        let header = "eyJhbGciOiJIUzI1NiJ9";
        let payload = base64::engine::general_purpose::URL_SAFE.encode(r#"{"exp":55}"#);
        assert!(payload.ends_with('='));
        let token = format!("{}.{}.sig", header, payload);
        assert_eq!(decode_expiry(&token), Some(55));
    }

    #[test]
    fn test_unknown_role_is_dropped() {
        let token = credential_with_payload(&json!({ "role": "superuser", "exp": NOW }));
        assert_eq!(decode_claims(&token).unwrap().role, None);
    }
}
