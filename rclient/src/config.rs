//! Client configuration.
//!
//! Loaded from a JSON file where every field is optional:
//!
//! ```json
//! {
//!   "node": { "host": "localhost", "port": 40403, "timeout_secs": 30 },
//!   "phlo": { "limit": 1000000, "price": 1 },
//!   "poll": { "interval_ms": 5000, "max_attempts": 60 },
//!   "keystore": "keystore.json",
//!   "registry": "registry.json",
//!   "tools_module": "tools.rho"
//! }
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::deploy::{HttpDeployClient, PollPolicy, PriceInfo};
use crate::error::{Error, Result};

/// Environment variable naming a config file.
pub const CONFIG_ENV: &str = "RCLIENT_CONFIG";

/// Node connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Node host name.
    pub host: String,
    /// Node HTTP API port.
    pub port: u16,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_owned(),
            port: 40403,
            timeout_secs: 30,
        }
    }
}

impl NodeConfig {
    /// Base URL of the node HTTP API.
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// Deploy pricing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhloConfig {
    /// Computation limit per deploy.
    pub limit: u64,
    /// Price per computation unit.
    pub price: u64,
}

impl Default for PhloConfig {
    fn default() -> Self {
        Self {
            limit: 1_000_000,
            price: 1,
        }
    }
}

/// Top-level client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Node connection.
    pub node: NodeConfig,
    /// Deploy pricing.
    pub phlo: PhloConfig,
    /// Result polling.
    pub poll: PollPolicy,
    /// Keystore file.
    pub keystore: PathBuf,
    /// Module registry file.
    pub registry: PathBuf,
    /// Wallet contract source.
    pub tools_module: PathBuf,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            node: NodeConfig::default(),
            phlo: PhloConfig::default(),
            poll: PollPolicy::default(),
            keystore: PathBuf::from("keystore.json"),
            registry: PathBuf::from("registry.json"),
            tools_module: PathBuf::from("tools.rho"),
        }
    }
}

impl ClientConfig {
    /// Read a config file.
    ///
    /// # Errors
    ///
    /// I/O or JSON errors, or a config that fails [`validate`](Self::validate).
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::config(format!("cannot read {}: {e}", path.display())))?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| Error::config(format!("invalid {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the settings make sense.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] naming the first bad field.
    pub fn validate(&self) -> Result<()> {
        if self.node.host.trim().is_empty() {
            return Err(Error::config("node.host is empty"));
        }
        if self.node.port == 0 {
            return Err(Error::config("node.port must be non-zero"));
        }
        if self.phlo.limit == 0 {
            return Err(Error::config("phlo.limit must be non-zero"));
        }
        if self.poll.max_attempts == 0 {
            return Err(Error::config("poll.max_attempts must be non-zero"));
        }
        Ok(())
    }

    /// Fresh pricing for one deploy.
    #[must_use]
    pub fn price(&self) -> PriceInfo {
        PriceInfo::new(self.phlo.limit, self.phlo.price)
    }

    /// HTTP client for the configured node.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn deploy_client(&self) -> Result<HttpDeployClient> {
        Ok(HttpDeployClient::builder()
            .base_url(self.node.base_url())
            .timeout_secs(self.node.timeout_secs)
            .poll(self.poll)
            .build()?)
    }
}

#[cfg(test)]
mod tests {
    use tokio_test::{assert_err, assert_ok};

    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.node.base_url(), "http://localhost:40403");
        assert_eq!(config.phlo.limit, 1_000_000);
        assert_eq!(config.poll.max_attempts, 60);
        assert_eq!(config.tools_module, PathBuf::from("tools.rho"));
        assert_ok!(config.validate());

        let price = config.price();
        assert_eq!((price.phlo_limit, price.phlo_price), (1_000_000, 1));
    }

    #[test]
    fn test_partial_json() {
        let config: ClientConfig =
            serde_json::from_str(r#"{"node": {"port": 40413}, "poll": {"max_attempts": 5}}"#)
                .unwrap();
        assert_eq!(config.node.host, "localhost");
        assert_eq!(config.node.port, 40413);
        assert_eq!(config.poll.max_attempts, 5);
        assert_eq!(config.poll.interval_ms, 5_000);
    }

    #[test]
    fn test_validate() {
        let mut config = ClientConfig::default();
        config.node.port = 0;
        assert_err!(config.validate());

        let mut config = ClientConfig::default();
        config.phlo.limit = 0;
        assert_err!(config.validate());

        let mut config = ClientConfig::default();
        config.poll.max_attempts = 0;
        assert_err!(config.validate());
    }

    #[tokio::test]
    async fn test_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rclient.json");
        tokio::fs::write(&path, r#"{"keystore": "/tmp/keys.json"}"#)
            .await
            .unwrap();

        let config = ClientConfig::load(&path).await.unwrap();
        assert_eq!(config.keystore, PathBuf::from("/tmp/keys.json"));

        tokio::fs::write(&path, r#"{"node": {"port": 0}}"#).await.unwrap();
        assert!(matches!(
            ClientConfig::load(&path).await.unwrap_err(),
            Error::Config(_)
        ));

        let missing = ClientConfig::load(dir.path().join("nope.json")).await;
        assert!(matches!(missing.unwrap_err(), Error::Config(_)));
    }
}
