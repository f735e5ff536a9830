//! ilpkit connector
//!
//! Keeps one settlement channel registered per online peer and runs the
//! settlement method negotiation protocol over those channels:
//!
//! - **Discovery**: looks up a peer's connector identity over HTTPS
//! - **Namespace derivation**: a routing prefix shared by both ends of a peer pair
//! - **Channel lifecycle**: registers/unregisters channels with the transport
//! - **Negotiation**: answers `settlement_methods_request` messages and
//!   correlates `settlement_methods_response` messages to waiting callers

pub mod error;
pub mod config;
pub mod protocol;
pub mod transport;
pub mod token;
pub mod lookup;
pub mod registry;
pub mod negotiation;
pub mod manager;
pub mod adapters;

pub use config::{ConnectorConfig, SettlementUriStyle};
pub use error::ConnectorError;
pub use lookup::{HostInfo, HostLookup, HttpHostLookup};
pub use manager::{ConnectOutcome, PeerManager, PeerStatus};
pub use protocol::SettlementMessage;
pub use registry::{PeerRegistry, PeerSnapshot};
pub use token::NodeKey;
pub use transport::{Channel, ChannelConfig, ChannelMessage, ChannelTransport};
