//! Remote connector identity lookup.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ConnectorError;

/// Identity a peer's wallet publishes at its host root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostInfo {
    /// Hex encoded X25519 public key of the peer's connector.
    pub public_key: String,
    /// Endpoint accepting RPC calls for channels to this peer.
    pub peers_rpc_uri: String,
}

#[async_trait]
pub trait HostLookup: Send + Sync {
    async fn lookup(&self, uri: &str) -> Result<HostInfo, ConnectorError>;
}

/// Looks up host identities with `GET {uri}`.
pub struct HttpHostLookup {
    client: reqwest::Client,
}

impl HttpHostLookup {
    pub fn new(timeout: Duration) -> Result<Self, ConnectorError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConnectorError::Discovery {
                host: String::new(),
                reason: e.to_string(),
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HostLookup for HttpHostLookup {
    async fn lookup(&self, uri: &str) -> Result<HostInfo, ConnectorError> {
        let discovery = |reason: String| ConnectorError::Discovery {
            host: uri.to_string(),
            reason,
        };

        let resp = self
            .client
            .get(uri)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| discovery(e.to_string()))?;

        let resp = resp
            .error_for_status()
            .map_err(|e| discovery(e.to_string()))?;

        let info: HostInfo = resp.json().await.map_err(|e| discovery(e.to_string()))?;
        if info.public_key.is_empty() || info.peers_rpc_uri.is_empty() {
            return Err(discovery("host did not publish a connector identity".into()));
        }
        Ok(info)
    }
}
