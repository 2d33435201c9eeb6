//! RNode HTTP API client.
//!
//! Endpoints used:
//!
//! | Endpoint               | Purpose                                   |
//! |------------------------|-------------------------------------------|
//! | `POST /api/deploy`       | submit a term, answer carries the deploy id |
//! | `POST /api/data-at-name` | read data sent on an unforgeable name       |
//! | `POST /api/prepare-deploy` | preview names the next deploy will create |
//!
//! Results are not available when a deploy is accepted: they appear once
//! the deploy lands in a block, so every read goes through [`PollPolicy`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::try_join_all;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use super::rho::{first_datum, invoke_term};
use super::{DeployClient, DeployError, DeployId, PollPolicy, PriceInfo, SourceText};
use crate::invoke::{InvokeError, InvokeRequest, ReturnChannel};
use crate::registry::ModuleAddress;

/// Default node URL.
pub const DEFAULT_NODE_URL: &str = "http://localhost:40403";

const DEPLOY_ID_MARKER: &str = "DeployId is:";
const MODULE_URI_PREFIX: &str = "rho:id:";

/// HTTP client for an RNode validator or read-only node.
#[derive(Clone)]
pub struct HttpDeployClient {
    http_client: reqwest::Client,
    base_url: Arc<str>,
    poll: PollPolicy,
}

impl std::fmt::Debug for HttpDeployClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpDeployClient")
            .field("base_url", &self.base_url)
            .field("poll", &self.poll)
            .finish_non_exhaustive()
    }
}

impl HttpDeployClient {
    /// Create a client builder.
    #[must_use]
    pub fn builder() -> HttpDeployClientBuilder {
        HttpDeployClientBuilder::default()
    }

    /// Base URL requests are sent to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Polling policy for deploy results.
    #[must_use]
    pub const fn poll_policy(&self) -> PollPolicy {
        self.poll
    }

    async fn post(&self, endpoint: &str, body: &Value) -> Result<String, NodeFailure> {
        let url = format!("{}/api/{endpoint}", self.base_url);
        let response = self.http_client.post(&url).json(body).send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            warn!(endpoint, status = status.as_u16(), "node returned an error");
            return Err(NodeFailure::Status {
                status: status.as_u16(),
                body: text,
            });
        }
        Ok(text)
    }

    async fn deploy_at(
        &self,
        term: &str,
        price: &PriceInfo,
        timestamp: u64,
    ) -> Result<DeployId, NodeFailure> {
        let body = json!({
            "data": {
                "term": term,
                "timestamp": timestamp,
                "phloPrice": price.phlo_price,
                "phloLimit": price.phlo_limit,
                "validAfterBlockNumber": 0,
            },
            "deployer": price.deployer_hex(),
            "signature": "",
            "sigAlgorithm": "N/A",
        });
        let text = self.post("deploy", &body).await?;
        let id = parse_deploy_id(&text)?;
        debug!(deploy_id = %id, "deploy accepted");
        Ok(id)
    }

    async fn data_at(&self, name: &Value) -> Result<Option<Value>, NodeFailure> {
        let body = json!({ "name": name, "depth": 1 });
        let text = self.post("data-at-name", &body).await?;
        let response: Value = serde_json::from_str(&text)
            .map_err(|e| NodeFailure::Malformed(format!("data-at-name: {e}")))?;
        first_datum(&response).map_err(NodeFailure::Malformed)
    }

    async fn await_datum(&self, name: Value) -> Result<Value, NodeFailure> {
        let name = &name;
        self.poll
            .run(|_| self.data_at(name))
            .await?
            .ok_or(NodeFailure::Timeout {
                attempts: self.poll.max_attempts,
            })
    }

    async fn register_one(
        &self,
        source: &SourceText,
        price: &PriceInfo,
        timestamp: u64,
    ) -> Result<ModuleAddress, DeployError> {
        info!(source = %source.name, "deploying module");
        let id = self
            .deploy_at(&source.text, price, timestamp)
            .await
            .map_err(|f| f.into_deploy_error(&source.name))?;

        let datum = self
            .await_datum(unforgeable("UnforgDeploy", id.as_str()))
            .await
            .map_err(|f| f.into_deploy_error(&source.name))?;

        match datum {
            Value::String(uri) if uri.starts_with(MODULE_URI_PREFIX) => {
                info!(source = %source.name, address = %uri, "module registered");
                Ok(ModuleAddress::new(uri))
            }
            other => Err(DeployError::protocol(format!(
                "{} did not report a registry URI, got {other}",
                source.name
            ))),
        }
    }
}

#[async_trait]
impl DeployClient for HttpDeployClient {
    async fn deploy(&self, term: &str, price: &PriceInfo) -> Result<DeployId, DeployError> {
        self.deploy_at(term, price, price.timestamp)
            .await
            .map_err(DeployError::from)
    }

    async fn submit(
        &self,
        sources: &[SourceText],
        price: &PriceInfo,
    ) -> Result<Vec<ModuleAddress>, DeployError> {
        // Concurrent deploys from one deployer need distinct timestamps.
        let deploys = sources
            .iter()
            .zip(price.timestamp..)
            .map(|(source, timestamp)| self.register_one(source, price, timestamp));
        try_join_all(deploys).await
    }

    async fn reserve_names(
        &self,
        price: &PriceInfo,
        count: usize,
    ) -> Result<Vec<String>, InvokeError> {
        let body = json!({
            "deployer": price.deployer_hex(),
            "timestamp": price.timestamp,
            "nameQty": count,
        });
        let text = self.post("prepare-deploy", &body).await?;
        let response: Value = serde_json::from_str(&text)
            .map_err(|e| InvokeError::protocol(format!("prepare-deploy: {e}")))?;

        let names: Vec<String> = response
            .get("names")
            .and_then(Value::as_array)
            .map(|names| {
                names
                    .iter()
                    .filter_map(|n| n.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();
        if names.len() < count {
            return Err(InvokeError::protocol(format!(
                "asked for {count} names, node previewed {}",
                names.len()
            )));
        }
        debug!(count, "names reserved");
        Ok(names)
    }

    async fn invoke(&self, request: &InvokeRequest) -> Result<Value, InvokeError> {
        let term = invoke_term(request)?;
        debug!(method = %request.method, address = %request.address, "sending call");
        let id = self.deploy_at(&term, &request.price, request.price.timestamp).await?;

        let channel = match &request.return_channel {
            ReturnChannel::DeployId => unforgeable("UnforgDeploy", id.as_str()),
            ReturnChannel::Reserved(name) => unforgeable("UnforgPrivate", name),
        };
        Ok(self.await_datum(channel).await?)
    }
}

/// Builder for [`HttpDeployClient`].
#[derive(Debug, Default)]
pub struct HttpDeployClientBuilder {
    base_url: Option<String>,
    timeout_secs: Option<u64>,
    poll: Option<PollPolicy>,
}

impl HttpDeployClientBuilder {
    /// Set the node base URL.
    #[must_use]
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Set the per-request timeout in seconds.
    #[must_use]
    pub const fn timeout_secs(mut self, timeout: u64) -> Self {
        self.timeout_secs = Some(timeout);
        self
    }

    /// Set the polling policy for deploy results.
    #[must_use]
    pub const fn poll(mut self, poll: PollPolicy) -> Self {
        self.poll = Some(poll);
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<HttpDeployClient, DeployError> {
        let base_url = self
            .base_url
            .unwrap_or_else(|| DEFAULT_NODE_URL.to_owned());
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = self.timeout_secs {
            builder = builder.timeout(Duration::from_secs(timeout));
        }
        let http_client = builder
            .build()
            .map_err(|e| DeployError::transport(format!("cannot build HTTP client: {e}")))?;

        Ok(HttpDeployClient {
            http_client,
            base_url: base_url.trim_end_matches('/').into(),
            poll: self.poll.unwrap_or_default(),
        })
    }
}

/// Failure talking to the node, before it is classified for a caller.
#[derive(Debug)]
enum NodeFailure {
    Transport(String),
    Status { status: u16, body: String },
    Malformed(String),
    Timeout { attempts: u32 },
}

impl NodeFailure {
    fn into_deploy_error(self, module: &str) -> DeployError {
        match self {
            Self::Status { status: 400, body } if looks_like_compile_error(&body) => {
                DeployError::compile(module, body)
            }
            other => other.into(),
        }
    }
}

impl From<reqwest::Error> for NodeFailure {
    fn from(err: reqwest::Error) -> Self {
        match DeployError::from(err) {
            DeployError::Protocol(msg) => Self::Malformed(msg),
            other => Self::Transport(other.to_string()),
        }
    }
}

impl From<NodeFailure> for DeployError {
    fn from(failure: NodeFailure) -> Self {
        match failure {
            NodeFailure::Transport(msg) => Self::Transport(msg),
            NodeFailure::Status { status, body } if status >= 500 => {
                Self::Transport(format!("HTTP {status}: {body}"))
            }
            NodeFailure::Status { status, body } => Self::Rejected(format!("HTTP {status}: {body}")),
            NodeFailure::Malformed(msg) => Self::Protocol(msg),
            NodeFailure::Timeout { attempts } => Self::Timeout { attempts },
        }
    }
}

impl From<NodeFailure> for InvokeError {
    fn from(failure: NodeFailure) -> Self {
        match failure {
            NodeFailure::Transport(msg) => Self::Transport(msg),
            NodeFailure::Status { status, body } if status >= 500 => {
                Self::Transport(format!("HTTP {status}: {body}"))
            }
            NodeFailure::Status { status, body } => Self::Rejected(format!("HTTP {status}: {body}")),
            NodeFailure::Malformed(msg) => Self::Protocol(msg),
            NodeFailure::Timeout { attempts } => Self::Timeout { attempts },
        }
    }
}

fn looks_like_compile_error(body: &str) -> bool {
    let lower = body.to_lowercase();
    ["syntax error", "parse error", "parsing error", "unbound variable", "free variable"]
        .iter()
        .any(|needle| lower.contains(needle))
}

fn unforgeable(kind: &str, id: &str) -> Value {
    json!({ kind: { "data": id } })
}

fn parse_deploy_id(text: &str) -> Result<DeployId, NodeFailure> {
    // The node answers with a JSON string; older nodes send it bare.
    let message = serde_json::from_str::<String>(text).unwrap_or_else(|_| text.to_owned());
    message
        .split_once(DEPLOY_ID_MARKER)
        .map(|(_, rest)| rest.trim())
        .filter(|id| !id.is_empty())
        .map(|id| DeployId(id.to_owned()))
        .ok_or_else(|| NodeFailure::Malformed(format!("no deploy id in response: {message}")))
}
