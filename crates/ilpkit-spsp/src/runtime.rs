//! Interfaces of the sender and receiver runtimes that execute payments.
//!
//! The conditional transfer engine itself lives outside this crate; the
//! orchestrators only see these traits.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ilpkit_core::Amount;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::SpspError;
use crate::pool::Teardown;

/// Connection details handed to a runtime for one local user.
#[derive(Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub prefix: String,
    /// Ledger account the runtime acts for.
    pub account: String,
    pub admin_username: String,
    pub admin_password: String,
}

impl std::fmt::Debug for RuntimeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeConfig")
            .field("prefix", &self.prefix)
            .field("account", &self.account)
            .field("admin_username", &self.admin_username)
            .finish_non_exhaustive()
    }
}

/// A payment request issued by a receiver. Also the body a payee's setup
/// endpoint answers with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRequest {
    /// ILP address the payment must be sent to; ends with the request id.
    pub address: String,
    pub amount: Amount,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    pub condition: String,
    #[serde(default)]
    pub data: Option<Value>,
}

/// Everything a sender needs to execute one payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentParams {
    #[serde(default)]
    pub uuid: Option<Uuid>,
    pub source_amount: Amount,
    pub destination_amount: Amount,
    pub destination_account: String,
    #[serde(default)]
    pub connector_account: Option<String>,
    pub execution_condition: String,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub data: Option<Value>,
}

/// A conditional transfer a receiver saw arrive for one of its requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomingTransfer {
    pub id: Uuid,
    pub request_id: String,
    pub execution_condition: String,
    pub amount: Amount,
}

#[async_trait]
pub trait Sender: Teardown {
    /// Destination amount delivered when sending `source_amount`.
    async fn quote_source_amount(
        &self,
        destination_address: &str,
        source_amount: Amount,
    ) -> Result<Amount, SpspError>;

    /// Source amount needed to deliver `destination_amount`.
    async fn quote_destination_amount(
        &self,
        destination_address: &str,
        destination_amount: Amount,
    ) -> Result<Amount, SpspError>;

    async fn quote_request(&self, request: &PaymentRequest) -> Result<PaymentParams, SpspError>;

    async fn pay_request(&self, params: &PaymentParams) -> Result<(), SpspError>;
}

#[async_trait]
pub trait Receiver: Teardown {
    /// Start listening for incoming transfers on the ledger.
    async fn listen(&self) -> Result<(), SpspError>;

    async fn create_request(&self, amount: Amount) -> Result<PaymentRequest, SpspError>;

    fn subscribe(&self) -> broadcast::Receiver<IncomingTransfer>;
}

#[async_trait]
pub trait SenderFactory: Send + Sync {
    async fn create_sender(&self, config: RuntimeConfig) -> Result<Arc<dyn Sender>, SpspError>;
}

#[async_trait]
pub trait ReceiverFactory: Send + Sync {
    async fn create_receiver(&self, config: RuntimeConfig)
        -> Result<Arc<dyn Receiver>, SpspError>;
}
