// JWT claim inspection without signature verification.
//
// The client never validates signatures (the server does that); it only needs
// the `exp` claim to decide whether a token is still usable or due for renewal.

use crate::error::{CivicLinkError, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;

/// Extract the `exp` claim (Unix seconds) from a JWT **without verifying the signature**.
pub fn extract_expiry_unverified(token: &str) -> Result<i64> {
    let parts: Vec<&str> = token.splitn(3, '.').collect();
    if parts.len() < 2 {
        return Err(CivicLinkError::AuthenticationError(
            "Invalid JWT format: less than 2 segments".into(),
        ));
    }

    // Some issuers pad their segments; strip it so URL_SAFE_NO_PAD accepts them.
    let payload_bytes = URL_SAFE_NO_PAD
        .decode(parts[1].trim_end_matches('='))
        .map_err(|e| {
            CivicLinkError::AuthenticationError(format!("Invalid JWT payload base64: {}", e))
        })?;

    let payload: serde_json::Value = serde_json::from_slice(&payload_bytes).map_err(|e| {
        CivicLinkError::AuthenticationError(format!("Invalid JWT payload JSON: {}", e))
    })?;

    payload
        .get("exp")
        .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
        .ok_or_else(|| CivicLinkError::AuthenticationError("Missing 'exp' claim".into()))
}

/// `true` when `now_secs >= exp`. Tokens whose expiry cannot be read count as expired.
pub fn is_expired_at(token: &str, now_secs: i64) -> bool {
    match extract_expiry_unverified(token) {
        Ok(exp) => now_secs >= exp,
        Err(e) => {
            log::debug!("[civic-link] Treating undecodable token as expired: {}", e);
            true
        },
    }
}

/// Seconds left before expiry (negative once expired), or `None` if undecodable.
pub fn remaining_secs(token: &str, now_secs: i64) -> Option<i64> {
    extract_expiry_unverified(token).ok().map(|exp| exp - now_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_with_payload(payload: &str) -> String {
        format!(
            "{}.{}.sig",
            URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#),
            URL_SAFE_NO_PAD.encode(payload.as_bytes())
        )
    }

    #[test]
    fn test_extract_expiry() {
        let token = token_with_payload(r#"{"sub":"u1","exp":1700000000}"#);
        assert_eq!(extract_expiry_unverified(&token).unwrap(), 1_700_000_000);
    }

    #[test]
    fn test_expiry_boundary() {
        let token = token_with_payload(r#"{"exp":1000}"#);
        assert!(!is_expired_at(&token, 999));
        assert!(is_expired_at(&token, 1000));
        assert!(is_expired_at(&token, 1001));
    }

    #[test]
    fn test_missing_exp_is_expired() {
        let token = token_with_payload(r#"{"sub":"u1"}"#);
        assert!(extract_expiry_unverified(&token).is_err());
        assert!(is_expired_at(&token, 0));
    }

    #[test]
    fn test_garbage_is_expired() {
        assert!(is_expired_at("not-a-jwt", 0));
        assert!(is_expired_at("a.!!!.c", 0));
        assert_eq!(remaining_secs("nope", 0), None);
    }

    #[test]
    fn test_remaining_secs() {
        let token = token_with_payload(r#"{"exp":600}"#);
        assert_eq!(remaining_secs(&token, 100), Some(500));
        assert_eq!(remaining_secs(&token, 700), Some(-100));
    }

    #[test]
    fn test_float_exp_accepted() {
        let token = token_with_payload(r#"{"exp":1234.0}"#);
        assert_eq!(extract_expiry_unverified(&token).unwrap(), 1234);
    }
}
