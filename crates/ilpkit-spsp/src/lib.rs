//! ilpkit payment orchestration
//!
//! - [`pool`]: reference counted sender/receiver sessions per user
//! - [`sender`]: quoting and paying through pooled sender sessions
//! - [`receiver`]: issuing payment requests and settling them when the
//!   matching conditional transfer arrives

pub mod error;
pub mod config;
pub mod pool;
pub mod runtime;
pub mod setup;
pub mod sender;
pub mod receiver;

pub use config::SpspConfig;
pub use error::SpspError;
pub use pool::{Lease, SessionPool, Teardown};
pub use receiver::ReceiverService;
pub use runtime::{
    IncomingTransfer, PaymentParams, PaymentRequest, Receiver, ReceiverFactory, RuntimeConfig,
    Sender, SenderFactory,
};
pub use sender::{
    PayDestination, PayRequest, PaymentSource, Quote, QuoteDestination, QuoteRequest, SenderService,
};
pub use setup::{HttpPaymentSetup, PaymentSetup, SetupRequest};
