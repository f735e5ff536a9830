//! ilpkit core
//!
//! Domain types shared by the connector and the payment orchestrators, the
//! state machine for pending incoming payment requests, and the narrow
//! persistence/notification traits the core consumes.

pub mod error;
pub mod types;
pub mod request_state;
pub mod store;
pub mod memory;

pub use error::CoreError;
pub use request_state::{RequestEvent, RequestState, RequestStateMachine};
pub use store::{PaymentNotifier, PaymentStore, SettlementMethodStore};
pub use types::{
    currency_symbol, Amount, PaymentRecord, PaymentState, Peer, PeerId, SettlementMethod,
    SettlementMethodDescriptor,
};
