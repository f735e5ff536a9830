//! Peer connection manager.
//!
//! Owns the [`PeerRegistry`] and drives each peer through discovery, channel
//! registration and settlement method negotiation. All operations are safe to
//! call concurrently; connect and disconnect of a single peer are serialized
//! by that peer's registry lock.

use std::sync::Arc;

use futures::future::join_all;
use ilpkit_core::{
    currency_symbol, Amount, Peer, PeerId, SettlementMethodDescriptor, SettlementMethodStore,
};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::ConnectorConfig;
use crate::error::ConnectorError;
use crate::lookup::HostLookup;
use crate::negotiation::{build_descriptors, PendingNegotiations};
use crate::protocol::SettlementMessage;
use crate::registry::{PeerConnectionState, PeerRegistry};
use crate::token::NodeKey;
use crate::transport::{Channel, ChannelConfig, ChannelMessage, ChannelTransport};

/// Result of a connection attempt that did not fail outright.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    Connected,
    AlreadyOnline,
    /// Identity lookup failed; the peer stays offline.
    Unreachable(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeerStatus {
    pub online: bool,
    /// Channel balance, only known while online.
    pub balance: Option<Amount>,
}

impl PeerStatus {
    fn offline() -> Self {
        Self {
            online: false,
            balance: None,
        }
    }
}

struct Discovered {
    public_key: String,
    rpc_uri: String,
    namespace: String,
}

#[derive(Clone)]
pub struct PeerManager {
    config: Arc<ConnectorConfig>,
    key: Arc<NodeKey>,
    registry: Arc<PeerRegistry>,
    transport: Arc<dyn ChannelTransport>,
    lookup: Arc<dyn HostLookup>,
    methods: Arc<dyn SettlementMethodStore>,
    negotiations: Arc<PendingNegotiations>,
}

impl PeerManager {
    pub fn new(
        config: ConnectorConfig,
        transport: Arc<dyn ChannelTransport>,
        lookup: Arc<dyn HostLookup>,
        methods: Arc<dyn SettlementMethodStore>,
    ) -> Result<Self, ConnectorError> {
        let key = NodeKey::from_hex(&config.secret_key)?;
        Ok(Self {
            config: Arc::new(config),
            key: Arc::new(key),
            registry: Arc::new(PeerRegistry::new()),
            transport,
            lookup,
            methods,
            negotiations: Arc::new(PendingNegotiations::new()),
        })
    }

    /// Hex encoded public key peers use to derive our shared namespace.
    pub fn public_key(&self) -> String {
        self.key.public_key_hex()
    }

    pub fn registry(&self) -> &PeerRegistry {
        &self.registry
    }

    pub fn pending_negotiations(&self) -> usize {
        self.negotiations.len()
    }

    /// Bring a peer online. Idempotent.
    pub async fn connect(&self, peer: &Peer) -> Result<ConnectOutcome, ConnectorError> {
        loop {
            let cell = self.registry.entry(peer.id);
            let mut state = cell.lock().await;

            // A disconnect removed this entry while we waited for the lock.
            if state.retired {
                continue;
            }

            if state.online {
                return Ok(ConnectOutcome::AlreadyOnline);
            }

            if !state.is_discovered() {
                match self.discover(peer).await {
                    Ok(found) => state.set_identity(found.public_key, found.rpc_uri, found.namespace),
                    Err(e) => {
                        warn!(peer_id = %peer.id, host = %peer.hostname, error = %e, "peer unreachable");
                        return Ok(ConnectOutcome::Unreachable(e.to_string()));
                    }
                }
            }

            self.open_channel(peer, &mut state).await?;
            return Ok(ConnectOutcome::Connected);
        }
    }

    /// Take a peer offline and forget it. Idempotent; failures are logged.
    pub async fn disconnect(&self, peer: &Peer) {
        self.disconnect_peer(peer.id).await;
    }

    /// Connection status, connecting first if needed.
    pub async fn status(&self, peer: &Peer) -> PeerStatus {
        match self.connect(peer).await {
            Ok(ConnectOutcome::Unreachable(reason)) => {
                debug!(peer_id = %peer.id, reason = %reason, "status of unreachable peer");
            }
            Ok(_) => {}
            Err(e) => debug!(peer_id = %peer.id, error = %e, "connect failed during status"),
        }

        let Some(snapshot) = self.registry.snapshot(peer.id).await else {
            return PeerStatus::offline();
        };
        if !snapshot.online {
            return PeerStatus::offline();
        }
        let Some(namespace) = snapshot.namespace else {
            return PeerStatus::offline();
        };

        let balance = match self.transport.channel(&namespace) {
            Some(channel) => match channel.balance().await {
                Ok(balance) => Some(balance),
                Err(e) => {
                    warn!(peer_id = %peer.id, namespace = %namespace, error = %e, "balance unavailable");
                    None
                }
            },
            None => None,
        };

        PeerStatus {
            online: true,
            balance,
        }
    }

    /// Re-open the channel so it picks up changed peer settings.
    pub async fn reconnect(&self, peer: &Peer) -> Result<PeerStatus, ConnectorError> {
        self.disconnect(peer).await;
        self.connect(peer).await?;
        Ok(self.status(peer).await)
    }

    /// Connect every peer, logging failures. Returns how many are online.
    pub async fn connect_all(&self, peers: &[Peer]) -> usize {
        let results = join_all(peers.iter().map(|peer| self.connect(peer))).await;

        let mut online = 0;
        for (peer, result) in peers.iter().zip(results) {
            match result {
                Ok(ConnectOutcome::Connected | ConnectOutcome::AlreadyOnline) => online += 1,
                Ok(ConnectOutcome::Unreachable(reason)) => {
                    warn!(peer_id = %peer.id, host = %peer.hostname, reason = %reason, "peer not connected");
                }
                Err(e) => error!(peer_id = %peer.id, host = %peer.hostname, error = %e, "peer not connected"),
            }
        }

        info!(online, total = peers.len(), "peers connected");
        online
    }

    pub async fn disconnect_all(&self) {
        for peer_id in self.registry.peer_ids() {
            self.disconnect_peer(peer_id).await;
        }
    }

    /// Forward an RPC call from a peer to the channel registered under `prefix`.
    pub async fn rpc(
        &self,
        prefix: &str,
        method: &str,
        params: Value,
    ) -> Result<Value, ConnectorError> {
        let channel = self
            .transport
            .channel(prefix)
            .ok_or_else(|| ConnectorError::UnknownChannel(prefix.to_string()))?;
        channel.rpc(method, params).await
    }

    /// Ask an online peer which settlement methods it accepts.
    pub async fn request_settlement_methods(
        &self,
        peer: &Peer,
    ) -> Result<Vec<SettlementMethodDescriptor>, ConnectorError> {
        let snapshot = self
            .registry
            .snapshot(peer.id)
            .await
            .filter(|s| s.online)
            .ok_or(ConnectorError::PeerOffline(peer.id))?;
        let (Some(namespace), Some(peer_key)) = (snapshot.namespace, snapshot.public_key) else {
            return Err(ConnectorError::PeerOffline(peer.id));
        };
        let channel = self
            .transport
            .channel(&namespace)
            .ok_or_else(|| ConnectorError::UnknownChannel(namespace.clone()))?;

        let (id, rx) = self.negotiations.register(&namespace);
        let result: Result<Vec<SettlementMethodDescriptor>, ConnectorError> = async {
            let message = ChannelMessage {
                ledger: namespace.clone(),
                from: format!("{namespace}{}", self.public_key()),
                to: format!("{namespace}{peer_key}"),
                data: SettlementMessage::SettlementMethodsRequest { id: Some(id) }.encode()?,
            };
            channel.send(message).await?;

            match tokio::time::timeout(self.config.negotiation_timeout(), rx).await {
                Ok(Ok(methods)) => Ok(methods),
                Ok(Err(_)) => Err(ConnectorError::NegotiationAbandoned(peer.id)),
                Err(_) => Err(ConnectorError::NegotiationTimeout(peer.id)),
            }
        }
        .await;
        self.negotiations.remove(&id);

        match &result {
            Ok(methods) => debug!(peer_id = %peer.id, count = methods.len(), "settlement methods received"),
            Err(e) => warn!(peer_id = %peer.id, error = %e, "settlement method negotiation failed"),
        }
        result
    }

    async fn discover(&self, peer: &Peer) -> Result<Discovered, ConnectorError> {
        let info = self.lookup.lookup(&peer.host_uri()).await?;
        let namespace = self.key.namespace(&info.public_key, &peer.currency)?;
        debug!(peer_id = %peer.id, namespace = %namespace, "peer identity discovered");
        Ok(Discovered {
            public_key: info.public_key,
            rpc_uri: info.peers_rpc_uri,
            namespace,
        })
    }

    async fn open_channel(
        &self,
        peer: &Peer,
        state: &mut PeerConnectionState,
    ) -> Result<(), ConnectorError> {
        let (Some(public_key), Some(rpc_uri), Some(namespace)) = (
            state.public_key.clone(),
            state.rpc_uri.clone(),
            state.namespace.clone(),
        ) else {
            return Err(ConnectorError::ChannelRegistration {
                namespace: String::new(),
                reason: "peer identity not discovered".into(),
            });
        };

        let config = ChannelConfig {
            name: peer.hostname.clone(),
            prefix: namespace.clone(),
            currency: peer.currency.clone(),
            currency_symbol: currency_symbol(&peer.currency).to_string(),
            max_balance: peer.limit,
            connector_account: format!("{namespace}{public_key}"),
            peer_public_key: public_key,
            rpc_uri,
            precision: self.config.precision,
            scale: self.config.scale,
        };

        if let Err(e) = self.transport.register_channel(&namespace, config).await {
            error!(peer_id = %peer.id, namespace = %namespace, error = %e, "channel registration failed");
            return Err(match e {
                ConnectorError::ChannelRegistration { .. } => e,
                other => ConnectorError::ChannelRegistration {
                    namespace,
                    reason: other.to_string(),
                },
            });
        }

        let Some(channel) = self.transport.channel(&namespace) else {
            if let Err(e) = self.transport.unregister_channel(&namespace).await {
                debug!(namespace = %namespace, error = %e, "cleanup after missing channel failed");
            }
            return Err(ConnectorError::ChannelRegistration {
                namespace,
                reason: "transport returned no channel".into(),
            });
        };

        state.handler = Some(self.spawn_inbound_handler(peer.clone(), channel));
        state.online = true;
        info!(peer_id = %peer.id, namespace = %namespace, "peer connected");
        Ok(())
    }

    async fn disconnect_peer(&self, peer_id: PeerId) {
        let Some(cell) = self.registry.get(peer_id) else {
            return;
        };
        let mut state = cell.lock().await;
        if state.retired {
            return;
        }
        state.retired = true;
        self.registry.remove(peer_id, &cell);

        if let Some(handler) = state.handler.take() {
            handler.abort();
        }

        if state.online {
            state.online = false;
            if let Some(namespace) = state.namespace.as_deref() {
                self.negotiations.abandon(namespace);
                match self.transport.unregister_channel(namespace).await {
                    Ok(()) => info!(peer_id = %peer_id, namespace, "peer disconnected"),
                    Err(e) => {
                        error!(peer_id = %peer_id, namespace, error = %e, "channel unregistration failed")
                    }
                }
            }
        } else {
            debug!(peer_id = %peer_id, "offline peer removed");
        }
    }

    fn spawn_inbound_handler(&self, peer: Peer, channel: Arc<dyn Channel>) -> JoinHandle<()> {
        let mut inbox = channel.subscribe();
        let responder = Responder {
            config: self.config.clone(),
            methods: self.methods.clone(),
            negotiations: self.negotiations.clone(),
        };

        tokio::spawn(async move {
            loop {
                match inbox.recv().await {
                    Ok(message) => {
                        if let Err(e) = responder.handle(&peer, channel.as_ref(), message).await {
                            warn!(peer_id = %peer.id, error = %e, "failed to handle channel message");
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(peer_id = %peer.id, skipped, "inbound messages dropped");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!(peer_id = %peer.id, "inbound handler stopped");
        })
    }
}

/// Handles negotiation messages arriving on one peer's channel.
struct Responder {
    config: Arc<ConnectorConfig>,
    methods: Arc<dyn SettlementMethodStore>,
    negotiations: Arc<PendingNegotiations>,
}

impl Responder {
    async fn handle(
        &self,
        peer: &Peer,
        channel: &dyn Channel,
        message: ChannelMessage,
    ) -> Result<(), ConnectorError> {
        match SettlementMessage::decode(&message.data) {
            Some(SettlementMessage::SettlementMethodsRequest { id }) => {
                self.answer(peer, channel, &message, id).await
            }
            Some(SettlementMessage::SettlementMethodsResponse {
                id,
                settlement_methods,
            }) => {
                if !self
                    .negotiations
                    .resolve(channel.prefix(), id, settlement_methods)
                {
                    debug!(peer_id = %peer.id, "settlement methods response matched no request");
                }
                Ok(())
            }
            Some(SettlementMessage::Unknown) | None => Ok(()),
        }
    }

    async fn answer(
        &self,
        peer: &Peer,
        channel: &dyn Channel,
        request: &ChannelMessage,
        id: Option<uuid::Uuid>,
    ) -> Result<(), ConnectorError> {
        let balance = match channel.balance().await {
            Ok(balance) => balance,
            Err(e) => {
                warn!(peer_id = %peer.id, error = %e, "balance unavailable, advertising zero");
                Decimal::ZERO
            }
        };
        let methods = self.methods.find_enabled().await?;
        let settlement_methods = build_descriptors(&methods, peer, balance, &self.config);
        debug!(peer_id = %peer.id, count = settlement_methods.len(), "answering settlement methods request");

        let reply = ChannelMessage {
            ledger: request.ledger.clone(),
            from: request.to.clone(),
            to: request.from.clone(),
            data: SettlementMessage::SettlementMethodsResponse {
                id,
                settlement_methods,
            }
            .encode()?,
        };
        channel.send(reply).await
    }
}
