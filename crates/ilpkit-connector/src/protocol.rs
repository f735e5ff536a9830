//! Settlement method negotiation messages.
//!
//! Carried as JSON in [`ChannelMessage::data`](crate::transport::ChannelMessage).
//! The `id` field correlates a response to its request; peers that do not
//! echo it are still understood.

use ilpkit_core::SettlementMethodDescriptor;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::ConnectorError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum SettlementMessage {
    SettlementMethodsRequest {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<Uuid>,
    },
    SettlementMethodsResponse {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<Uuid>,
        settlement_methods: Vec<SettlementMethodDescriptor>,
    },
    /// Any other `method`; ignored by the connector.
    #[serde(other)]
    Unknown,
}

impl SettlementMessage {
    /// Decode a message payload. Payloads without a `method` field are not
    /// negotiation messages and yield `None`.
    pub fn decode(data: &Value) -> Option<Self> {
        serde_json::from_value(data.clone()).ok()
    }

    pub fn encode(&self) -> Result<Value, ConnectorError> {
        Ok(serde_json::to_value(self)?)
    }
}
