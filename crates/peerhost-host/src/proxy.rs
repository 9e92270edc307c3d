//! Proxy: client stub for an instance that lives on a peer.
//!
//! A proxy is stored in the instance registry under a local name, so callers
//! cannot tell remote instances from local ones. It holds the remote
//! instance URL and the owning peer's id; the host mints a fresh bearer
//! token per request (tokens are single-use by design).

use peerhost_types::{HostError, HostResult};
use serde_json::Value;

/// Remote handle to an instance hosted by a peer.
#[derive(Debug, Clone)]
pub struct Proxy {
    /// Peer that hosts the instance; used by the host to mint tokens.
    pub peer_id: String,
    /// Full URL of the remote instance, e.g. `http://127.0.0.1:2010/nodeContext1`.
    pub url: String,
}

impl Proxy {
    /// Create a proxy for a remote instance.
    pub fn new(peer_id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            peer_id: peer_id.into(),
            url: url.into(),
        }
    }

    /// Fetch the remote instance's representation.
    pub async fn get(&self, client: &reqwest::Client, token: &str) -> HostResult<Value> {
        let response = client
            .get(&self.url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| HostError::PeerUnreachable(format!("{}: {e}", self.url)))?;
        Self::read_json(response).await
    }

    /// Call a method on the remote instance: `PUT <url>!<method>`.
    pub async fn call(
        &self,
        client: &reqwest::Client,
        token: &str,
        method: &str,
        args: Value,
    ) -> HostResult<Value> {
        let url = format!("{}!{}", self.url, method);
        let response = client
            .put(&url)
            .bearer_auth(token)
            .json(&args)
            .send()
            .await
            .map_err(|e| HostError::PeerUnreachable(format!("{url}: {e}")))?;
        Self::read_json(response).await
    }

    async fn read_json(response: reqwest::Response) -> HostResult<Value> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| HostError::PeerUnreachable(e.to_string()))?;
        if !status.is_success() {
            return Err(HostError::PeerUnreachable(format!(
                "peer responded {status}: {body}"
            )));
        }
        serde_json::from_str(&body).map_err(HostError::from)
    }
}
