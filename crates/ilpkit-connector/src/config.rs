//! Connector configuration.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::error::ConnectorError;

/// How the advertised URI of a settlement method is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettlementUriStyle {
    /// `{stored uri}?destination={peer destination}`
    Direct,
    /// `{client_host}/settle/{type}/{peer destination}?amount={balance}`
    Hosted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectorConfig {
    /// Hex encoded X25519 secret of this node.
    #[serde(default)]
    pub secret_key: String,
    /// Public base URL of the wallet client, used for hosted settlement URIs.
    #[serde(default = "default_client_host")]
    pub client_host: String,
    #[serde(default = "default_negotiation_timeout_secs")]
    pub negotiation_timeout_secs: u64,
    #[serde(default = "default_lookup_timeout_secs")]
    pub lookup_timeout_secs: u64,
    #[serde(default = "default_precision")]
    pub precision: u32,
    #[serde(default = "default_scale")]
    pub scale: u32,
    /// URI style per settlement method type. Types not listed are hosted.
    #[serde(default = "default_uri_styles")]
    pub uri_styles: HashMap<String, SettlementUriStyle>,
}

fn default_client_host() -> String {
    "https://localhost".into()
}

fn default_negotiation_timeout_secs() -> u64 {
    10
}

fn default_lookup_timeout_secs() -> u64 {
    5
}

fn default_uri_styles() -> HashMap<String, SettlementUriStyle> {
    HashMap::from([("custom".to_string(), SettlementUriStyle::Direct)])
}

fn default_precision() -> u32 {
    10
}

fn default_scale() -> u32 {
    10
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            secret_key: String::new(),
            client_host: default_client_host(),
            negotiation_timeout_secs: default_negotiation_timeout_secs(),
            lookup_timeout_secs: default_lookup_timeout_secs(),
            precision: default_precision(),
            scale: default_scale(),
            uri_styles: default_uri_styles(),
        }
    }
}

impl ConnectorConfig {
    pub fn negotiation_timeout(&self) -> Duration {
        Duration::from_secs(self.negotiation_timeout_secs)
    }

    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_secs(self.lookup_timeout_secs)
    }

    pub fn uri_style(&self, method_type: &str) -> SettlementUriStyle {
        self.uri_styles
            .get(method_type)
            .copied()
            .unwrap_or(SettlementUriStyle::Hosted)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConnectorError> {
        if self.secret_key.len() != 64 || hex::decode(&self.secret_key).is_err() {
            return Err(ConnectorError::Config(
                "secret_key must be 32 bytes of hex".into(),
            ));
        }
        if self.client_host.is_empty() {
            return Err(ConnectorError::Config(
                "client_host must not be empty".into(),
            ));
        }
        Ok(())
    }
}
