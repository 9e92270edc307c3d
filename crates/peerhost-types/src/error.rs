//! Shared error types for the peerhost system.

use thiserror::Error;

/// Top-level error type for the peerhost system.
///
/// Structural errors (unknown type/instance, auth failures, bad routes)
/// propagate to the transport layer and map onto HTTP status codes there.
/// Method-invocation errors inside `call` are deliberately *not* represented
/// here; they are contained as errors-as-data in the call result payload.
#[derive(Error, Debug)]
pub enum HostError {
    /// No local or peer-advertised type matches the requested name.
    #[error("Unknown type: {0}")]
    UnknownType(String),

    /// No instance is registered under the requested name.
    #[error("Unknown instance: {0}")]
    UnknownInstance(String),

    /// The instance does not expose the requested method.
    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    /// No environ descriptor matches the requested id.
    #[error("Unknown environ: {0}")]
    UnknownEnviron(String),

    /// The request carried no bearer token.
    #[error("Authorization required: {0}")]
    AuthRequired(String),

    /// The bearer token failed signature or expiry verification.
    #[error("Authorization invalid: {0}")]
    AuthInvalid(String),

    /// The bearer token's sequence number was already accepted.
    #[error("Token replayed: peer {hid} sequence {seq} already seen")]
    AuthReplayed {
        /// Issuer host id carried by the token.
        hid: String,
        /// Rejected sequence number.
        seq: u64,
    },

    /// The request matched no route.
    #[error("No such route: {0}")]
    RouteNotFound(String),

    /// A delegated request to a peer failed at the transport level.
    #[error("Peer unreachable: {0}")]
    PeerUnreachable(String),

    /// Launching a peer subprocess failed, or its handshake was malformed.
    #[error("Spawn failed: {0}")]
    SpawnFailed(String),

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An internal error occurred.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Alias for Result with HostError.
pub type HostResult<T> = Result<T, HostError>;

impl HostError {
    /// Whether this error is an authorization failure (maps to HTTP 403).
    pub fn is_auth(&self) -> bool {
        matches!(
            self,
            HostError::AuthRequired(_) | HostError::AuthInvalid(_) | HostError::AuthReplayed { .. }
        )
    }

    /// Machine-readable error code for `{error, details}` response bodies.
    pub fn code(&self) -> &'static str {
        match self {
            HostError::UnknownType(_) => "unknown-type",
            HostError::UnknownInstance(_) => "unknown-instance",
            HostError::UnknownMethod(_) => "unknown-method",
            HostError::UnknownEnviron(_) => "unknown-environ",
            HostError::AuthRequired(_) => "auth-required",
            HostError::AuthInvalid(_) => "auth-invalid",
            HostError::AuthReplayed { .. } => "auth-replayed",
            HostError::RouteNotFound(_) => "route-not-found",
            HostError::PeerUnreachable(_) => "peer-unreachable",
            HostError::SpawnFailed(_) => "spawn-failed",
            HostError::Io(_) => "io",
            HostError::Serialization(_) => "serialization",
            HostError::Internal(_) => "internal",
        }
    }

    /// Whether this error means a named thing does not exist (maps to 404).
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            HostError::UnknownInstance(_)
                | HostError::UnknownMethod(_)
                | HostError::UnknownEnviron(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_classification() {
        assert!(HostError::AuthRequired("no token".into()).is_auth());
        assert!(HostError::AuthInvalid("bad signature".into()).is_auth());
        assert!(HostError::AuthReplayed {
            hid: "h1".into(),
            seq: 3
        }
        .is_auth());
        assert!(!HostError::UnknownType("Foo".into()).is_auth());
    }

    #[test]
    fn test_not_found_classification() {
        assert!(HostError::UnknownInstance("ctx1".into()).is_not_found());
        assert!(HostError::UnknownEnviron("local".into()).is_not_found());
        assert!(!HostError::RouteNotFound("/x".into()).is_not_found());
    }

    #[test]
    fn test_display_messages() {
        let e = HostError::AuthReplayed {
            hid: "host-a".into(),
            seq: 7,
        };
        assert_eq!(e.to_string(), "Token replayed: peer host-a sequence 7 already seen");
    }
}
