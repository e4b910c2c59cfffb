//! Access token decoding and verification

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use super::AuthError;

type HmacSha256 = Hmac<Sha256>;

/// JWT claims from a Supabase auth token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject (user ID)
    pub sub: String,
    /// Audience
    #[serde(default)]
    pub aud: Option<String>,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    #[serde(default)]
    pub iat: i64,
    /// Email (if available)
    #[serde(default)]
    pub email: Option<String>,
    /// Role
    #[serde(default)]
    pub role: Option<String>,
}

/// Split a token into its three base64url segments
fn segments(token: &str) -> Result<(&str, &str, &str), AuthError> {
    let mut parts = token.split('.');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(header), Some(payload), Some(signature), None) => Ok((header, payload, signature)),
        _ => Err(AuthError::InvalidToken),
    }
}

fn parse_claims(payload_b64: &str) -> Result<JwtClaims, AuthError> {
    let payload_json = URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|_| AuthError::InvalidToken)?;

    let claims: JwtClaims =
        serde_json::from_slice(&payload_json).map_err(|_| AuthError::InvalidToken)?;

    if claims.exp < chrono::Utc::now().timestamp() {
        return Err(AuthError::TokenExpired);
    }

    Ok(claims)
}

/// Decode claims without checking the signature.
///
/// Clients normally don't hold the project JWT secret; the backend checks
/// the signature on every request anyway.
pub fn decode_claims(token: &str) -> Result<JwtClaims, AuthError> {
    let (_, payload_b64, _) = segments(token)?;
    parse_claims(payload_b64)
}

/// Verify an HS256 token against the project secret and extract claims
pub fn verify_jwt(token: &str, secret: &str) -> Result<JwtClaims, AuthError> {
    let (header_b64, payload_b64, signature_b64) = segments(token)?;

    let message = format!("{}.{}", header_b64, payload_b64);

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| AuthError::InvalidToken)?;
    mac.update(message.as_bytes());

    let provided_signature = URL_SAFE_NO_PAD
        .decode(signature_b64)
        .map_err(|_| AuthError::InvalidToken)?;

    mac.verify_slice(&provided_signature)
        .map_err(|_| AuthError::InvalidToken)?;

    parse_claims(payload_b64)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Sign a token the way the auth server does
    pub(crate) fn sign(claims: &serde_json::Value, secret: &str) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(format!("{}.{}", header, payload).as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        format!("{}.{}.{}", header, payload, signature)
    }

    fn claims(exp_offset: i64) -> serde_json::Value {
        let now = chrono::Utc::now().timestamp();
        serde_json::json!({
            "sub": "9b0c6a4e-user",
            "aud": "authenticated",
            "exp": now + exp_offset,
            "iat": now,
            "email": "owner@example.com",
            "role": "authenticated",
        })
    }

    #[test]
    fn verifies_token_signed_with_secret() {
        let token = sign(&claims(3600), "super-secret");
        let decoded = verify_jwt(&token, "super-secret").unwrap();
        assert_eq!(decoded.sub, "9b0c6a4e-user");
        assert_eq!(decoded.email.as_deref(), Some("owner@example.com"));
    }

    #[test]
    fn rejects_wrong_secret() {
        let token = sign(&claims(3600), "super-secret");
        assert!(matches!(
            verify_jwt(&token, "other-secret"),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn rejects_expired_token() {
        let token = sign(&claims(-60), "super-secret");
        assert!(matches!(
            verify_jwt(&token, "super-secret"),
            Err(AuthError::TokenExpired)
        ));
        assert!(matches!(decode_claims(&token), Err(AuthError::TokenExpired)));
    }

    #[test]
    fn decode_ignores_signature() {
        let token = sign(&claims(3600), "whatever");
        assert_eq!(decode_claims(&token).unwrap().sub, "9b0c6a4e-user");
    }

    #[test]
    fn rejects_malformed_token() {
        assert!(matches!(decode_claims("abc.def"), Err(AuthError::InvalidToken)));
        assert!(matches!(decode_claims("a.b.c.d"), Err(AuthError::InvalidToken)));
        assert!(matches!(decode_claims("a.!!!.c"), Err(AuthError::InvalidToken)));
    }
}
