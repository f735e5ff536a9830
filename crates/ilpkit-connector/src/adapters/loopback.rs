use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

use async_trait::async_trait;
use dashmap::DashMap;
use ilpkit_core::Amount;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tokio::sync::broadcast;

use crate::error::ConnectorError;
use crate::transport::{Channel, ChannelConfig, ChannelMessage, ChannelTransport};

const INBOUND_CAPACITY: usize = 64;

/// In-process network connecting loopback transports.
///
/// A channel registered by node A for peer B receives whatever node B sends
/// on its channel for peer A. Used by the development node and tests where
/// no ledger plugin is available.
#[derive(Default)]
pub struct LoopbackNetwork {
    /// (owner public key, peer public key) -> channel owned by `owner`.
    endpoints: DashMap<(String, String), Arc<LoopbackChannel>>,
}

impl LoopbackNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn attach(&self, channel: Arc<LoopbackChannel>) {
        let key = (channel.owner_key.clone(), channel.config.peer_public_key.clone());
        self.endpoints.insert(key, channel);
    }

    fn detach(&self, owner_key: &str, peer_key: &str) {
        self.endpoints
            .remove(&(owner_key.to_string(), peer_key.to_string()));
    }

    fn route(&self, owner_key: &str, peer_key: &str) -> Option<Arc<LoopbackChannel>> {
        self.endpoints
            .get(&(owner_key.to_string(), peer_key.to_string()))
            .map(|entry| entry.value().clone())
    }

    /// Number of attached channel endpoints.
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

pub struct LoopbackChannel {
    owner_key: String,
    config: ChannelConfig,
    network: Weak<LoopbackNetwork>,
    inbound: broadcast::Sender<ChannelMessage>,
    balance: Mutex<Amount>,
}

impl LoopbackChannel {
    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    pub fn set_balance(&self, balance: Amount) {
        if let Ok(mut current) = self.balance.lock() {
            *current = balance;
        }
    }

    fn current_balance(&self) -> Result<Amount, ConnectorError> {
        self.balance
            .lock()
            .map(|b| *b)
            .map_err(|_| ConnectorError::Channel("balance lock poisoned".into()))
    }
}

#[async_trait]
impl Channel for LoopbackChannel {
    fn prefix(&self) -> &str {
        &self.config.prefix
    }

    async fn balance(&self) -> Result<Amount, ConnectorError> {
        self.current_balance()
    }

    async fn send(&self, message: ChannelMessage) -> Result<(), ConnectorError> {
        let network = self
            .network
            .upgrade()
            .ok_or_else(|| ConnectorError::Channel("loopback network dropped".into()))?;
        let remote = network
            .route(&self.config.peer_public_key, &self.owner_key)
            .ok_or_else(|| {
                ConnectorError::Channel(format!(
                    "peer has no channel open under {}",
                    self.config.prefix
                ))
            })?;
        // A remote without subscribers drops the message, like an idle plugin.
        let _ = remote.inbound.send(message);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<ChannelMessage> {
        self.inbound.subscribe()
    }

    async fn rpc(&self, method: &str, _params: Value) -> Result<Value, ConnectorError> {
        match method {
            "get_balance" => Ok(Value::String(self.current_balance()?.to_string())),
            "get_info" => Ok(json!({
                "prefix": self.config.prefix,
                "currency_code": self.config.currency,
                "currency_symbol": self.config.currency_symbol,
                "precision": self.config.precision,
                "scale": self.config.scale,
                "connectors": [self.config.connector_account],
            })),
            other => Err(ConnectorError::Channel(format!(
                "unsupported rpc method: {other}"
            ))),
        }
    }
}

/// [`ChannelTransport`] for one node on a [`LoopbackNetwork`].
pub struct LoopbackTransport {
    network: Arc<LoopbackNetwork>,
    owner_key: String,
    channels: DashMap<String, Arc<LoopbackChannel>>,
    registrations: AtomicUsize,
}

impl LoopbackTransport {
    pub fn new(network: Arc<LoopbackNetwork>, owner_public_key: impl Into<String>) -> Self {
        Self {
            network,
            owner_key: owner_public_key.into(),
            channels: DashMap::new(),
            registrations: AtomicUsize::new(0),
        }
    }

    pub fn loopback_channel(&self, namespace: &str) -> Option<Arc<LoopbackChannel>> {
        self.channels.get(namespace).map(|c| c.value().clone())
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Total successful registrations since creation.
    pub fn registrations(&self) -> usize {
        self.registrations.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ChannelTransport for LoopbackTransport {
    async fn register_channel(
        &self,
        namespace: &str,
        config: ChannelConfig,
    ) -> Result<(), ConnectorError> {
        if self.channels.contains_key(namespace) {
            return Err(ConnectorError::ChannelRegistration {
                namespace: namespace.to_string(),
                reason: "already registered".into(),
            });
        }

        let (inbound, _) = broadcast::channel(INBOUND_CAPACITY);
        let channel = Arc::new(LoopbackChannel {
            owner_key: self.owner_key.clone(),
            config,
            network: Arc::downgrade(&self.network),
            inbound,
            balance: Mutex::new(Decimal::ZERO),
        });
        self.network.attach(channel.clone());
        self.channels.insert(namespace.to_string(), channel);
        self.registrations.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(namespace, "loopback channel registered");
        Ok(())
    }

    async fn unregister_channel(&self, namespace: &str) -> Result<(), ConnectorError> {
        let (_, channel) = self
            .channels
            .remove(namespace)
            .ok_or_else(|| ConnectorError::UnknownChannel(namespace.to_string()))?;
        self.network
            .detach(&channel.owner_key, &channel.config.peer_public_key);

        tracing::debug!(namespace, "loopback channel unregistered");
        Ok(())
    }

    fn channel(&self, namespace: &str) -> Option<Arc<dyn Channel>> {
        self.channels
            .get(namespace)
            .map(|c| c.value().clone() as Arc<dyn Channel>)
    }
}
