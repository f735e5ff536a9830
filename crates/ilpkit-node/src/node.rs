//! The ilpkit node orchestrator.
//!
//! Seeds the settlement method store from the config, waits for the local
//! ledger, connects the configured peers and keeps logging their status.

use anyhow::Result;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ilpkit_connector::adapters::{LoopbackNetwork, LoopbackTransport};
use ilpkit_connector::{HttpHostLookup, PeerManager};
use ilpkit_core::memory::InMemorySettlementMethodStore;
use ilpkit_core::Peer;

use crate::config::NodeConfig;

pub struct IlpNode {
    config: NodeConfig,
    manager: PeerManager,
    transport: Arc<LoopbackTransport>,
    methods: Arc<InMemorySettlementMethodStore>,
    peers: Vec<Peer>,
}

impl IlpNode {
    pub fn new(config: NodeConfig) -> Result<Self> {
        config.validate()?;

        let methods = Arc::new(InMemorySettlementMethodStore::new());
        for entry in &config.settlement_methods {
            methods.insert(entry.to_method());
        }

        // Channels stay in-process until a ledger plugin transport is wired in.
        let network = LoopbackNetwork::new();
        let key = ilpkit_connector::NodeKey::from_hex(&config.connector.secret_key)?;
        let transport = Arc::new(LoopbackTransport::new(network, key.public_key_hex()));
        let lookup = Arc::new(HttpHostLookup::new(config.connector.lookup_timeout())?);

        let manager = PeerManager::new(
            config.connector.clone(),
            transport.clone(),
            lookup,
            methods.clone(),
        )?;
        let peers = config.peers();

        tracing::info!(
            public_key = %manager.public_key(),
            peers = peers.len(),
            settlement_methods = methods.len(),
            "ilpkit node created"
        );

        Ok(Self {
            config,
            manager,
            transport,
            methods,
            peers,
        })
    }

    pub fn manager(&self) -> &PeerManager {
        &self.manager
    }

    /// Wait for the ledger, then bring the configured peers online.
    pub async fn start(&self) -> Result<()> {
        if self.config.startup.wait_for_ledger {
            self.wait_for_ledger().await?;
        }

        let delay = self.config.startup.peer_connect_delay();
        if !delay.is_zero() {
            tracing::debug!(delay_secs = delay.as_secs(), "delaying peer connections");
            tokio::time::sleep(delay).await;
        }

        let online = self.manager.connect_all(&self.peers).await;
        tracing::info!(
            online,
            configured = self.peers.len(),
            channels = self.transport.channel_count(),
            "startup complete"
        );
        Ok(())
    }

    /// Poll the ledger's public URI until it answers with a success status.
    async fn wait_for_ledger(&self) -> Result<()> {
        let uri = &self.config.spsp.ledger_public_uri;
        let poll = self.config.startup.ledger_poll_interval();
        let timeout = self.config.startup.ledger_wait_timeout();
        let client = reqwest::Client::builder()
            .timeout(poll.max(Duration::from_secs(1)))
            .build()?;
        let started = Instant::now();

        tracing::info!(%uri, "waiting for ledger");
        loop {
            match client.get(uri.as_str()).send().await {
                Ok(resp) if resp.status().is_success() => {
                    tracing::info!(%uri, "ledger is up");
                    return Ok(());
                }
                Ok(resp) => tracing::debug!(status = %resp.status(), "ledger not ready"),
                Err(e) => tracing::debug!(error = %e, "ledger not reachable"),
            }

            if started.elapsed() >= timeout {
                anyhow::bail!("ledger at {uri} did not come up within {}s", timeout.as_secs());
            }
            tokio::time::sleep(poll).await;
        }
    }

    /// Log each peer's status periodically until cancelled.
    pub async fn run(&self) -> Result<()> {
        let secs = self.config.startup.status_interval_secs;
        if secs == 0 {
            return std::future::pending().await;
        }

        let mut interval = tokio::time::interval(Duration::from_secs(secs));
        interval.tick().await;
        loop {
            interval.tick().await;
            self.log_status().await;
        }
    }

    async fn log_status(&self) {
        for peer in &self.peers {
            let status = self.manager.status(peer).await;
            tracing::info!(
                peer_id = %peer.id,
                host = %peer.hostname,
                online = status.online,
                balance = ?status.balance,
                "peer status"
            );
        }
        tracing::debug!(enabled_methods = self.methods.len(), "status sweep done");
    }

    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("shutting down ilpkit node");
        self.manager.disconnect_all().await;
        Ok(())
    }
}
