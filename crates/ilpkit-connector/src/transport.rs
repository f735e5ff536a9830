//! Settlement channel transport abstraction.
//!
//! The connector does not speak any ledger protocol itself; it registers one
//! channel per online peer with a [`ChannelTransport`] and exchanges
//! [`ChannelMessage`]s over the resulting [`Channel`].

use std::sync::Arc;

use async_trait::async_trait;
use ilpkit_core::Amount;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

use crate::error::ConnectorError;

/// A message travelling over a settlement channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelMessage {
    /// Namespace of the channel.
    pub ledger: String,
    /// Account of the sender, `{namespace}{public key}`.
    pub from: String,
    /// Account of the recipient.
    pub to: String,
    pub data: Value,
}

/// Everything a transport needs to open a channel to a peer.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelConfig {
    /// Display name, the peer's hostname.
    pub name: String,
    pub prefix: String,
    pub currency: String,
    pub currency_symbol: String,
    /// Credit limit extended to the peer.
    pub max_balance: Amount,
    pub peer_public_key: String,
    pub rpc_uri: String,
    pub precision: u32,
    pub scale: u32,
    /// Account of the connector on the far side of the channel.
    pub connector_account: String,
}

#[async_trait]
pub trait Channel: Send + Sync {
    /// Namespace the channel is registered under.
    fn prefix(&self) -> &str;

    async fn balance(&self) -> Result<Amount, ConnectorError>;

    async fn send(&self, message: ChannelMessage) -> Result<(), ConnectorError>;

    /// Subscribe to messages arriving from the peer.
    fn subscribe(&self) -> broadcast::Receiver<ChannelMessage>;

    /// Handle an RPC call the peer made against our public RPC endpoint.
    async fn rpc(&self, method: &str, params: Value) -> Result<Value, ConnectorError>;
}

#[async_trait]
pub trait ChannelTransport: Send + Sync {
    async fn register_channel(
        &self,
        namespace: &str,
        config: ChannelConfig,
    ) -> Result<(), ConnectorError>;

    async fn unregister_channel(&self, namespace: &str) -> Result<(), ConnectorError>;

    fn channel(&self, namespace: &str) -> Option<Arc<dyn Channel>>;
}
