use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::SpspError;
use crate::runtime::RuntimeConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpspConfig {
    /// ILP address prefix of the local ledger, e.g. `us.usd.red.`.
    #[serde(default = "default_ledger_prefix")]
    pub ledger_prefix: String,
    #[serde(default = "default_ledger_public_uri")]
    pub ledger_public_uri: String,
    #[serde(default = "default_admin_username")]
    pub admin_username: String,
    #[serde(default)]
    pub admin_password: String,
    /// How long an issued payment request waits for its transfer.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_setup_timeout_secs")]
    pub setup_timeout_secs: u64,
}

fn default_ledger_prefix() -> String {
    "example.red.".into()
}

fn default_ledger_public_uri() -> String {
    "http://localhost:3101".into()
}

fn default_admin_username() -> String {
    "admin".into()
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_setup_timeout_secs() -> u64 {
    30
}

impl Default for SpspConfig {
    fn default() -> Self {
        Self {
            ledger_prefix: default_ledger_prefix(),
            ledger_public_uri: default_ledger_public_uri(),
            admin_username: default_admin_username(),
            admin_password: String::new(),
            request_timeout_ms: default_request_timeout_ms(),
            setup_timeout_secs: default_setup_timeout_secs(),
        }
    }
}

impl SpspConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn setup_timeout(&self) -> Duration {
        Duration::from_secs(self.setup_timeout_secs)
    }

    /// Ledger account URI of a local user.
    pub fn account_uri(&self, username: &str) -> String {
        format!(
            "{}/accounts/{}",
            self.ledger_public_uri.trim_end_matches('/'),
            username
        )
    }

    pub fn runtime_config(&self, username: &str) -> RuntimeConfig {
        RuntimeConfig {
            prefix: self.ledger_prefix.clone(),
            account: self.account_uri(username),
            admin_username: self.admin_username.clone(),
            admin_password: self.admin_password.clone(),
        }
    }

    /// The part of a request address that identifies the request.
    pub fn request_id<'a>(&self, username: &str, address: &'a str) -> &'a str {
        let user_prefix = format!("{}{}.", self.ledger_prefix, username);
        address.strip_prefix(&user_prefix).unwrap_or(address)
    }

    pub fn validate(&self) -> Result<(), SpspError> {
        if !self.ledger_prefix.ends_with('.') {
            return Err(SpspError::Config("ledger_prefix must end with '.'".into()));
        }
        if self.ledger_public_uri.is_empty() {
            return Err(SpspError::Config(
                "ledger_public_uri must not be empty".into(),
            ));
        }
        if self.request_timeout_ms == 0 {
            return Err(SpspError::Config(
                "request_timeout_ms must be positive".into(),
            ));
        }
        Ok(())
    }
}
