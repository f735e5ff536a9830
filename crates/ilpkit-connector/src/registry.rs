//! In-memory peer connection table.

use std::sync::Arc;

use dashmap::DashMap;
use ilpkit_core::PeerId;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Live connection state of one peer.
///
/// `online` implies the identity is discovered and a channel is registered
/// under `namespace`.
#[derive(Debug)]
pub struct PeerConnectionState {
    pub peer_id: PeerId,
    pub public_key: Option<String>,
    pub rpc_uri: Option<String>,
    pub namespace: Option<String>,
    pub online: bool,
    /// Set when the entry was removed from the registry.
    pub(crate) retired: bool,
    pub(crate) handler: Option<JoinHandle<()>>,
}

impl PeerConnectionState {
    fn new(peer_id: PeerId) -> Self {
        Self {
            peer_id,
            public_key: None,
            rpc_uri: None,
            namespace: None,
            online: false,
            retired: false,
            handler: None,
        }
    }

    pub fn is_discovered(&self) -> bool {
        self.public_key.is_some() && self.rpc_uri.is_some() && self.namespace.is_some()
    }

    /// Record the discovered identity. Has no effect once set.
    pub(crate) fn set_identity(&mut self, public_key: String, rpc_uri: String, namespace: String) {
        if self.is_discovered() {
            return;
        }
        self.public_key = Some(public_key);
        self.rpc_uri = Some(rpc_uri);
        self.namespace = Some(namespace);
    }

    pub fn snapshot(&self) -> PeerSnapshot {
        PeerSnapshot {
            peer_id: self.peer_id,
            public_key: self.public_key.clone(),
            rpc_uri: self.rpc_uri.clone(),
            namespace: self.namespace.clone(),
            online: self.online,
        }
    }
}

/// Point-in-time copy of a peer's connection state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerSnapshot {
    pub peer_id: PeerId,
    pub public_key: Option<String>,
    pub rpc_uri: Option<String>,
    pub namespace: Option<String>,
    pub online: bool,
}

pub(crate) type PeerCell = Arc<Mutex<PeerConnectionState>>;

/// Peer id to connection state. Each entry carries its own async lock so
/// connect and disconnect of one peer are serialized without blocking others.
#[derive(Default)]
pub struct PeerRegistry {
    peers: DashMap<PeerId, PeerCell>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn entry(&self, peer_id: PeerId) -> PeerCell {
        self.peers
            .entry(peer_id)
            .or_insert_with(|| Arc::new(Mutex::new(PeerConnectionState::new(peer_id))))
            .value()
            .clone()
    }

    pub(crate) fn get(&self, peer_id: PeerId) -> Option<PeerCell> {
        self.peers.get(&peer_id).map(|cell| cell.value().clone())
    }

    /// Remove `cell` if it is still the registered entry for `peer_id`.
    pub(crate) fn remove(&self, peer_id: PeerId, cell: &PeerCell) {
        self.peers.remove_if(&peer_id, |_, current| Arc::ptr_eq(current, cell));
    }

    pub async fn snapshot(&self, peer_id: PeerId) -> Option<PeerSnapshot> {
        let cell = self.get(peer_id)?;
        let state = cell.lock().await;
        Some(state.snapshot())
    }

    pub fn contains(&self, peer_id: PeerId) -> bool {
        self.peers.contains_key(&peer_id)
    }

    pub fn peer_ids(&self) -> Vec<PeerId> {
        self.peers.iter().map(|entry| *entry.key()).collect()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
