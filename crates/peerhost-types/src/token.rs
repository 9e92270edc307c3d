//! Bearer token claims exchanged between peer hosts.

use serde::{Deserialize, Serialize};

/// Default token lifetime in seconds.
pub const DEFAULT_TOKEN_TTL_SECS: i64 = 300;

/// Claims carried by a peer-to-peer bearer token.
///
/// Tokens are signed with the *recipient's* shared secret, so only the
/// intended host can verify them. `seq` is strictly increasing per
/// issuer/recipient pair; the recipient rejects any token whose sequence is
/// not above the highest it has already accepted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenClaims {
    /// Issuer host id.
    pub hid: String,
    /// Anti-replay sequence number.
    pub seq: u64,
    /// Issued-at, seconds since the epoch.
    pub iat: i64,
    /// Expiry, seconds since the epoch.
    pub exp: i64,
}

impl TokenClaims {
    /// Build claims for the given issuer and sequence with the default TTL.
    pub fn new(hid: impl Into<String>, seq: u64, now: i64) -> Self {
        Self {
            hid: hid.into(),
            seq,
            iat: now,
            exp: now + DEFAULT_TOKEN_TTL_SECS,
        }
    }

    /// Whether the token has expired at the given time.
    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.exp
    }
}
