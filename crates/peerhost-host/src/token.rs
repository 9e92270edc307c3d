//! Token signing and verification for peer-to-peer authorization.
//!
//! Tokens are compact HS256 JWTs: `base64url(header).base64url(claims).
//! base64url(hmac)`. A host signs tokens with the *recipient's* shared
//! secret, so possession of a host's secret is what authorizes calls to it.
//! Signature comparison is constant-time.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use peerhost_types::{HostError, HostResult, TokenClaims};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Fixed JWT header for HS256 tokens.
const JWT_HEADER: &[u8] = br#"{"alg":"HS256","typ":"JWT"}"#;

/// Signs and verifies bearer tokens.
///
/// Stateless by itself; per-peer sequence bookkeeping lives in the peer
/// table. Abstracting the JWT mechanics here keeps the rest of the host
/// independent of the token encoding.
pub struct TokenAuthority;

impl TokenAuthority {
    /// Sign claims with a shared secret, producing a compact JWT.
    pub fn sign(claims: &TokenClaims, secret: &str) -> HostResult<String> {
        let header = URL_SAFE_NO_PAD.encode(JWT_HEADER);
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims)?);
        let signing_input = format!("{header}.{payload}");

        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .expect("HMAC accepts any key size");
        mac.update(signing_input.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        Ok(format!("{signing_input}.{signature}"))
    }

    /// Verify a token against a shared secret and return its claims.
    ///
    /// Checks structure, signature (constant-time), and expiry. Does not
    /// check the anti-replay sequence; that is the peer table's job.
    pub fn verify(token: &str, secret: &str) -> HostResult<TokenClaims> {
        Self::verify_at(token, secret, Utc::now().timestamp())
    }

    /// Verify with an explicit clock, for deterministic tests.
    pub fn verify_at(token: &str, secret: &str, now: i64) -> HostResult<TokenClaims> {
        let mut parts = token.split('.');
        let (header, payload, signature) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(h), Some(p), Some(s), None) => (h, p, s),
            _ => return Err(HostError::AuthInvalid("malformed token".to_string())),
        };

        let signing_input = format!("{header}.{payload}");
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .expect("HMAC accepts any key size");
        mac.update(signing_input.as_bytes());
        let expected = mac.finalize().into_bytes();

        let presented = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| HostError::AuthInvalid("bad signature encoding".to_string()))?;
        let matches: bool =
            subtle::ConstantTimeEq::ct_eq(expected.as_slice(), presented.as_slice()).into();
        if !matches {
            return Err(HostError::AuthInvalid("signature mismatch".to_string()));
        }

        let claims_bytes = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| HostError::AuthInvalid("bad claims encoding".to_string()))?;
        let claims: TokenClaims = serde_json::from_slice(&claims_bytes)
            .map_err(|e| HostError::AuthInvalid(format!("bad claims: {e}")))?;

        if claims.is_expired(now) {
            return Err(HostError::AuthInvalid("token expired".to_string()));
        }

        Ok(claims)
    }
}

/// Generate a fresh shared secret (32 random bytes, hex-encoded).
pub fn generate_secret() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
