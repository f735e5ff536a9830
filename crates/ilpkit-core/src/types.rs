use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::CoreError;

/// Ledger amount. Amounts travel as decimal strings on the wire.
pub type Amount = Decimal;

/// Identifier of a stored peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(pub i64);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A peer connector this node extends credit to.
///
/// Owned by the persistence layer; the core only reads these fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    pub id: PeerId,
    /// Host name without scheme, e.g. `wallet.example.com`.
    pub hostname: String,
    /// ISO currency code of the trustline.
    pub currency: String,
    /// Maximum balance the peer may owe us.
    pub limit: Amount,
    /// Identifier the peer uses when settling with us.
    pub destination: String,
}

impl Peer {
    /// Create a peer record with a freshly generated settlement destination.
    pub fn new(id: PeerId, hostname: &str, currency: &str, limit: Amount) -> Self {
        let destination = rand::thread_rng().gen_range(0..1_000_000u32).to_string();
        Self {
            id,
            hostname: Self::normalize_hostname(hostname),
            currency: currency.to_string(),
            limit,
            destination,
        }
    }

    /// Strip any `scheme://` prefixes from a user supplied host.
    pub fn normalize_hostname(hostname: &str) -> String {
        let mut rest = hostname.trim();
        while let Some(idx) = rest.find("://") {
            rest = &rest[idx + 3..];
        }
        rest.to_string()
    }

    /// URI queried to discover the peer's connector identity.
    pub fn host_uri(&self) -> String {
        format!("https://{}", self.hostname)
    }
}

/// A settlement method configured by the node operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementMethod {
    pub id: Uuid,
    /// Method type, e.g. `paypal`, `bitcoin` or `custom`.
    #[serde(rename = "type")]
    pub method_type: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Stored URI, used as-is by direct (custom) methods.
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub logo_url: Option<String>,
    #[serde(default)]
    pub enabled: bool,
}

impl SettlementMethod {
    pub fn new(method_type: &str, name: &str) -> Self {
        Self {
            id: Uuid::now_v7(),
            method_type: method_type.to_string(),
            name: name.to_string(),
            description: None,
            uri: None,
            logo_url: None,
            enabled: true,
        }
    }
}

/// A settlement method as advertised to a peer during negotiation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementMethodDescriptor {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Action endpoint the peer opens to settle.
    pub uri: String,
    #[serde(default)]
    pub logo: Option<String>,
}

/// State of a persisted payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentState {
    Pending,
    Success,
    Failed,
}

impl PaymentState {
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}

impl fmt::Display for PaymentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// A persisted payment, referenced by its execution condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub id: Uuid,
    /// Condition correlating an incoming conditional transfer to this payment.
    pub execution_condition: String,
    pub state: PaymentState,
    #[serde(default)]
    pub source_identifier: Option<String>,
    #[serde(default)]
    pub destination_identifier: Option<String>,
    #[serde(default)]
    pub source_amount: Option<Amount>,
    #[serde(default)]
    pub destination_amount: Option<Amount>,
    #[serde(default)]
    pub memo: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentRecord {
    /// Create a pending payment awaiting the given execution condition.
    pub fn new(execution_condition: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            execution_condition: execution_condition.into(),
            state: PaymentState::Pending,
            source_identifier: None,
            destination_identifier: None,
            source_amount: None,
            destination_amount: None,
            memo: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Transition a pending payment to `success`.
    pub fn mark_success(&mut self) -> Result<(), CoreError> {
        if self.state.is_final() {
            return Err(CoreError::InvalidPaymentTransition {
                from: self.state,
                to: PaymentState::Success,
            });
        }
        self.state = PaymentState::Success;
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// Display symbol for a currency code, falling back to the code itself.
pub fn currency_symbol(code: &str) -> &str {
    match code {
        "USD" | "CAD" | "AUD" => "$",
        "GBP" => "£",
        "EUR" => "€",
        "CNY" | "JPY" => "¥",
        other => other,
    }
}
