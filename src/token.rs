// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Bearer token codec.
//!
//! Tokens are decoded without signature verification: the client only needs
//! the expiry claims to schedule refreshes. The server remains the authority
//! on whether a token is accepted.

use crate::error::SessionError;
use base64::{
    engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD},
    Engine as _,
};
use serde_json::Value;

const BEARER_SCHEME: &str = "bearer";

/// Expiry-related claims carried in a token payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Claims {
    /// Expiration time (Unix timestamp, seconds)
    pub exp: Option<i64>,
    /// Issued at (Unix timestamp, seconds)
    pub iat: Option<i64>,
}

impl Claims {
    /// Expiry in epoch milliseconds, if the token expires at all.
    pub fn expires_at_millis(&self) -> Option<i64> {
        self.exp.map(|exp| exp.saturating_mul(1000))
    }

    /// Whether the claims are still valid at `now_ms`.
    ///
    /// A token without `exp` never expires. Equal-to-now counts as expired.
    pub fn is_valid_at(&self, now_ms: i64) -> bool {
        match self.expires_at_millis() {
            Some(exp_ms) => exp_ms > now_ms,
            None => true,
        }
    }
}

/// Strip an optional authorization-scheme prefix and surrounding whitespace.
///
/// Every read of a stored token and every outbound attach goes through here.
pub fn normalize(raw: &str) -> &str {
    let trimmed = raw.trim();
    match trimmed.split_once(char::is_whitespace) {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case(BEARER_SCHEME) => rest.trim_start(),
        _ => trimmed,
    }
}

/// Whether a token has the three non-empty dot-separated segments.
pub fn is_well_formed(raw: &str) -> bool {
    segments(normalize(raw)).is_some()
}

/// Return the normalized token if it is well formed, `None` otherwise.
pub fn sanitize(raw: &str) -> Option<String> {
    let token = normalize(raw);
    segments(token).map(|_| token.to_string())
}

/// Value for an `Authorization` header, or `None` for an unusable token.
pub fn bearer_header(raw: &str) -> Option<String> {
    sanitize(raw).map(|token| format!("Bearer {token}"))
}

/// Decode the claims carried in a token's payload segment.
pub fn decode(raw: &str) -> Result<Claims, SessionError> {
    let token = normalize(raw);
    let [_, payload, _] = segments(token).ok_or(SessionError::MalformedToken)?;

    let bytes = decode_segment(payload).ok_or(SessionError::MalformedToken)?;
    let value: Value = serde_json::from_slice(&bytes).map_err(|_| SessionError::MalformedToken)?;
    let object = value.as_object().ok_or(SessionError::MalformedToken)?;

    Ok(Claims {
        exp: object.get("exp").and_then(numeric_claim),
        iat: object.get("iat").and_then(numeric_claim),
    })
}

/// Whether a token is usable at `now_ms`. Malformed tokens are never valid.
pub fn is_valid(raw: &str, now_ms: i64) -> bool {
    decode(raw).is_ok_and(|claims| claims.is_valid_at(now_ms))
}

fn segments(token: &str) -> Option<[&str; 3]> {
    let mut parts = token.split('.');
    let header = parts.next()?;
    let payload = parts.next()?;
    let signature = parts.next()?;

    if parts.next().is_some() || [header, payload, signature].iter().any(|s| s.is_empty()) {
        return None;
    }

    Some([header, payload, signature])
}

fn decode_segment(segment: &str) -> Option<Vec<u8>> {
    let unpadded = segment.trim_end_matches('=');
    URL_SAFE_NO_PAD
        .decode(unpadded)
        .or_else(|_| STANDARD_NO_PAD.decode(unpadded))
        .ok()
}

fn numeric_claim(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f.floor() as i64))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_with_payload(payload: &str) -> String {
        format!(
            "{}.{}.sig",
            URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#),
            URL_SAFE_NO_PAD.encode(payload)
        )
    }

    #[test]
    fn normalize_strips_scheme() {
        assert_eq!(normalize("Bearer a.b.c"), "a.b.c");
        assert_eq!(normalize("bearer   a.b.c "), "a.b.c");
        assert_eq!(normalize("a.b.c"), "a.b.c");
        assert_eq!(normalize("Basic a.b.c"), "Basic a.b.c");
    }

    #[test]
    fn decode_reads_exp_and_iat() {
        let token = token_with_payload(r#"{"sub":"42","exp":2000,"iat":1000}"#);
        let claims = decode(&token).unwrap();
        assert_eq!(claims.exp, Some(2000));
        assert_eq!(claims.iat, Some(1000));

        let prefixed = format!("Bearer {token}");
        assert_eq!(decode(&prefixed).unwrap(), claims);
    }

    #[test]
    fn decode_rejects_bad_shapes() {
        assert!(matches!(decode("abc"), Err(SessionError::MalformedToken)));
        assert!(matches!(decode("a..c"), Err(SessionError::MalformedToken)));
        assert!(matches!(decode("a.b.c.d"), Err(SessionError::MalformedToken)));
        assert!(matches!(
            decode("a.!!!notbase64.c"),
            Err(SessionError::MalformedToken)
        ));

        let not_json = format!("a.{}.c", URL_SAFE_NO_PAD.encode("hello"));
        assert!(matches!(decode(&not_json), Err(SessionError::MalformedToken)));

        let not_object = token_with_payload("[1,2]");
        assert!(matches!(
            decode(&not_object),
            Err(SessionError::MalformedToken)
        ));
    }

    #[test]
    fn padded_payload_is_accepted() {
        let payload = base64::engine::general_purpose::URL_SAFE.encode(r#"{"exp":1}"#);
        let token = format!("h.{payload}.s");
        assert_eq!(decode(&token).unwrap().exp, Some(1));
    }

    #[test]
    fn validity_follows_exp() {
        let now_ms = 1_700_000_000_000;
        let past = token_with_payload(r#"{"exp":1699999999}"#);
        let future = token_with_payload(r#"{"exp":1700000001}"#);
        let exact = token_with_payload(r#"{"exp":1700000000}"#);
        let forever = token_with_payload(r#"{"sub":"1"}"#);

        assert!(!is_valid(&past, now_ms));
        assert!(is_valid(&future, now_ms));
        assert!(!is_valid(&exact, now_ms));
        assert!(is_valid(&forever, now_ms));
        assert!(!is_valid("garbage", now_ms));
    }

    #[test]
    fn bearer_header_requires_shape() {
        assert_eq!(bearer_header("bearer a.b.c").as_deref(), Some("Bearer a.b.c"));
        assert_eq!(bearer_header("not-a-token"), None);
        assert_eq!(bearer_header(""), None);
    }
}
