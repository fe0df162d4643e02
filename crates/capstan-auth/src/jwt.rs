//! Reading claims from JWTs without signature verification.
//!
//! Exchanged tokens (ACR refresh tokens, Kubernetes ServiceAccount
//! tokens) are only inspected for their expiry and subject. The issuing
//! call is authenticated over TLS, so the signature is deliberately not
//! verified here.

use crate::error::AuthError;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use serde::Deserialize;

#[derive(Deserialize)]
struct Claims {
    #[serde(default)]
    exp: Option<i64>,
    #[serde(default)]
    sub: Option<String>,
}

fn claims(token: &str) -> Result<Claims, AuthError> {
    let payload = token
        .split('.')
        .nth(1)
        .ok_or_else(|| AuthError::InvalidJwt("token is not a JWT".to_string()))?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|e| AuthError::InvalidJwt(format!("invalid payload encoding: {e}")))?;
    serde_json::from_slice(&bytes).map_err(|e| AuthError::InvalidJwt(format!("invalid claims: {e}")))
}

/// The `exp` claim of a JWT as an absolute timestamp.
pub fn expiration_from_jwt(token: &str) -> Result<DateTime<Utc>, AuthError> {
    let exp = claims(token)?
        .exp
        .ok_or_else(|| AuthError::InvalidJwt("missing 'exp' claim".to_string()))?;
    DateTime::<Utc>::from_timestamp(exp, 0)
        .ok_or_else(|| AuthError::InvalidJwt(format!("'exp' claim out of range: {exp}")))
}

/// The `sub` claim of a JWT.
pub fn subject_from_jwt(token: &str) -> Result<String, AuthError> {
    claims(token)?
        .sub
        .ok_or_else(|| AuthError::InvalidJwt("missing 'sub' claim".to_string()))
}

/// Build an unsigned JWT for tests and fixtures.
#[cfg(test)]
pub fn unsigned_jwt(claims: &serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims).unwrap());
    format!("{header}.{payload}.")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_expiry_claim() {
        let token = unsigned_jwt(&serde_json::json!({"exp": 1_900_000_000, "sub": "user"}));
        let expiry = expiration_from_jwt(&token).unwrap();
        assert_eq!(expiry.timestamp(), 1_900_000_000);
    }

    #[test]
    fn test_reads_subject_claim() {
        let token = unsigned_jwt(&serde_json::json!({"sub": "system:serviceaccount:ns:app"}));
        assert_eq!(subject_from_jwt(&token).unwrap(), "system:serviceaccount:ns:app");
    }

    #[test]
    fn test_missing_expiry_is_an_error() {
        let token = unsigned_jwt(&serde_json::json!({"sub": "user"}));
        let err = expiration_from_jwt(&token).unwrap_err();
        assert!(err.to_string().contains("missing 'exp' claim"));
    }

    #[test]
    fn test_non_jwt_input_is_an_error() {
        assert!(expiration_from_jwt("not-a-jwt").is_err());
    }
}
