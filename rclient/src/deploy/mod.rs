//! Talking to the node: submitting sources and carrying calls.
//!
//! [`DeployClient`] is the seam between the client logic and the network.
//! [`HttpDeployClient`] implements it against the RNode HTTP API; tests use
//! an in-process fake.

mod error;
mod http;
mod poll;
pub mod rho;

use std::path::Path;

use async_trait::async_trait;
use serde_json::Value;

use crate::invoke::{InvokeError, InvokeRequest};
use crate::registry::ModuleAddress;
use crate::util::timestamp_ms;

pub use error::DeployError;
pub use http::{DEFAULT_NODE_URL, HttpDeployClient, HttpDeployClientBuilder};
pub use poll::PollPolicy;

/// Deployer key used for unsigned deploys.
pub const DEFAULT_DEPLOYER_HEX: &str =
    "1111111111111111222222222222222233333333333333334444444444444444";

/// Pricing and identity attached to every deploy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceInfo {
    /// Maximum computation units the deploy may consume.
    pub phlo_limit: u64,
    /// Price per computation unit.
    pub phlo_price: u64,
    /// Public key the deploy is attributed to.
    pub deployer: Vec<u8>,
    /// Sequence number of the deploy.
    pub nonce: u64,
    /// Deploy timestamp (Unix milliseconds).
    pub timestamp: u64,
}

impl PriceInfo {
    /// Fresh pricing with the default deployer and the current time.
    #[must_use]
    pub fn new(phlo_limit: u64, phlo_price: u64) -> Self {
        Self {
            phlo_limit,
            phlo_price,
            deployer: default_deployer(),
            nonce: 1,
            timestamp: timestamp_ms(),
        }
    }

    /// Attribute the deploy to another public key.
    #[must_use]
    pub fn with_deployer(mut self, deployer: Vec<u8>) -> Self {
        self.deployer = deployer;
        self
    }

    /// Hex form of the deployer key.
    #[must_use]
    pub fn deployer_hex(&self) -> String {
        hex::encode(&self.deployer)
    }
}

fn default_deployer() -> Vec<u8> {
    hex::decode(DEFAULT_DEPLOYER_HEX).unwrap_or_default()
}

/// A named piece of Rholang source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceText {
    /// Display name, usually the file name.
    pub name: String,
    /// Source code.
    pub text: String,
}

impl SourceText {
    /// Create a source from memory.
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
        }
    }

    /// Read a source file; its file name becomes the source name.
    pub async fn read(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path).await?;
        let name = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
        Ok(Self { name, text })
    }
}

/// Identifier the node assigns to an accepted deploy.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeployId(pub String);

impl DeployId {
    /// Borrow the id string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DeployId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Node operations the client depends on.
#[async_trait]
pub trait DeployClient: Send + Sync {
    /// Submit a raw term.
    async fn deploy(&self, term: &str, price: &PriceInfo) -> Result<DeployId, DeployError>;

    /// Deploy sources that register themselves, returning one address per
    /// source in input order. Fails as a whole if any source fails.
    async fn submit(
        &self,
        sources: &[SourceText],
        price: &PriceInfo,
    ) -> Result<Vec<ModuleAddress>, DeployError>;

    /// Preview the unforgeable names the next deploy with `price` will
    /// create, in order.
    async fn reserve_names(
        &self,
        price: &PriceInfo,
        count: usize,
    ) -> Result<Vec<String>, InvokeError>;

    /// Carry a call to its module and return the raw reply.
    async fn invoke(&self, request: &InvokeRequest) -> Result<Value, InvokeError>;
}
