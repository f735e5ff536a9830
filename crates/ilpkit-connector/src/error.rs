//! Connector error types.

use ilpkit_core::{CoreError, PeerId};

/// Errors raised by the peer connection manager and its collaborators.
#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    /// The peer's identity could not be looked up.
    #[error("discovery failed for {host}: {reason}")]
    Discovery { host: String, reason: String },

    /// The transport refused to open the settlement channel.
    #[error("channel registration failed for {namespace}: {reason}")]
    ChannelRegistration { namespace: String, reason: String },

    /// The transport failed to close the settlement channel.
    #[error("channel unregistration failed for {namespace}: {reason}")]
    ChannelUnregistration { namespace: String, reason: String },

    #[error("peer {0} is offline")]
    PeerOffline(PeerId),

    #[error("no channel registered under {0}")]
    UnknownChannel(String),

    #[error("settlement method negotiation with peer {0} timed out")]
    NegotiationTimeout(PeerId),

    /// The channel went away while a negotiation was outstanding.
    #[error("settlement method negotiation with peer {0} was abandoned")]
    NegotiationAbandoned(PeerId),

    #[error("channel error: {0}")]
    Channel(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("invalid connector config: {0}")]
    Config(String),

    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("store error: {0}")]
    Store(#[from] CoreError),
}
