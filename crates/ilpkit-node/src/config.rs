//! Node configuration loading and management.

use ilpkit_connector::ConnectorConfig;
use ilpkit_core::{Amount, Peer, PeerId, SettlementMethod};
use ilpkit_spsp::SpspConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Full configuration for the ilpkit node.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NodeConfig {
    #[serde(default)]
    pub connector: ConnectorConfig,

    /// Local ledger and payment runtime settings.
    #[serde(default)]
    pub spsp: SpspConfig,

    #[serde(default)]
    pub startup: StartupConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Peers connected at startup.
    #[serde(default)]
    pub peers: Vec<PeerEntry>,

    /// Settlement methods advertised to peers.
    #[serde(default)]
    pub settlement_methods: Vec<SettlementMethodEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartupConfig {
    /// Poll the ledger until it answers before connecting peers.
    #[serde(default = "default_true")]
    pub wait_for_ledger: bool,
    #[serde(default = "default_ledger_poll_interval_secs")]
    pub ledger_poll_interval_secs: u64,
    /// Give up waiting for the ledger after this long.
    #[serde(default = "default_ledger_wait_timeout_secs")]
    pub ledger_wait_timeout_secs: u64,
    /// Delay between the ledger coming up and connecting peers.
    #[serde(default = "default_peer_connect_delay_secs")]
    pub peer_connect_delay_secs: u64,
    /// Interval of the peer status log. Zero disables it.
    #[serde(default = "default_status_interval_secs")]
    pub status_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (text, json).
    #[serde(default = "default_log_format")]
    pub format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerEntry {
    pub id: i64,
    pub hostname: String,
    #[serde(default = "default_currency")]
    pub currency: String,
    pub limit: Amount,
    /// Settlement destination; generated when absent.
    #[serde(default)]
    pub destination: Option<String>,
}

impl PeerEntry {
    pub fn to_peer(&self) -> Peer {
        let mut peer = Peer::new(PeerId(self.id), &self.hostname, &self.currency, self.limit);
        if let Some(destination) = &self.destination {
            peer.destination = destination.clone();
        }
        peer
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementMethodEntry {
    #[serde(rename = "type")]
    pub method_type: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub logo_url: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl SettlementMethodEntry {
    pub fn to_method(&self) -> SettlementMethod {
        let mut method = SettlementMethod::new(&self.method_type, &self.name);
        method.description = self.description.clone();
        method.uri = self.uri.clone();
        method.logo_url = self.logo_url.clone();
        method.enabled = self.enabled;
        method
    }
}

// Default value functions
fn default_true() -> bool {
    true
}
fn default_ledger_poll_interval_secs() -> u64 {
    1
}
fn default_ledger_wait_timeout_secs() -> u64 {
    120
}
fn default_peer_connect_delay_secs() -> u64 {
    5
}
fn default_status_interval_secs() -> u64 {
    60
}
fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "text".into()
}
fn default_currency() -> String {
    "USD".into()
}

impl Default for StartupConfig {
    fn default() -> Self {
        Self {
            wait_for_ledger: true,
            ledger_poll_interval_secs: default_ledger_poll_interval_secs(),
            ledger_wait_timeout_secs: default_ledger_wait_timeout_secs(),
            peer_connect_delay_secs: default_peer_connect_delay_secs(),
            status_interval_secs: default_status_interval_secs(),
        }
    }
}

impl StartupConfig {
    pub fn ledger_poll_interval(&self) -> Duration {
        Duration::from_secs(self.ledger_poll_interval_secs)
    }

    pub fn ledger_wait_timeout(&self) -> Duration {
        Duration::from_secs(self.ledger_wait_timeout_secs)
    }

    pub fn peer_connect_delay(&self) -> Duration {
        Duration::from_secs(self.peer_connect_delay_secs)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl NodeConfig {
    /// Load config from a TOML file, falling back to defaults for missing fields.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            let config: NodeConfig = toml::from_str(&contents)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save the current config to a TOML file.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.connector.validate()?;
        self.spsp.validate()?;

        let mut ids: Vec<i64> = self.peers.iter().map(|p| p.id).collect();
        ids.sort_unstable();
        if ids.windows(2).any(|w| w[0] == w[1]) {
            anyhow::bail!("[[peers]] ids must be unique");
        }
        Ok(())
    }

    pub fn peers(&self) -> Vec<Peer> {
        self.peers.iter().map(PeerEntry::to_peer).collect()
    }
}
