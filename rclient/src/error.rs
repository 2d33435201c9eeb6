//! Unified error types for rclient.
//!
//! Each subsystem owns a focused error enum:
//! - [`RegistryError`]: module registry persistence and the write-once invariant
//! - [`DeployError`]: module submission to the node
//! - [`InvokeError`]: remote method calls and envelope decoding
//! - [`KeyringError`]: local key storage, decryption and signing
//!
//! All of them fold into [`Error`]. Wallet flows additionally tag failures
//! with the [`Stage`] that failed so operators can tell a local problem (bad
//! password) from a remote one (the chain rejected the call).

use std::fmt;

use crate::deploy::DeployError;
use crate::invoke::InvokeError;
use crate::keyring::KeyringError;
use crate::registry::RegistryError;

/// Result type alias for rclient operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for rclient.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Module registry error.
    #[error("registry: {0}")]
    Registry(#[from] RegistryError),

    /// Module deployment error.
    #[error("deploy: {0}")]
    Deploy(#[from] DeployError),

    /// Remote invocation error.
    #[error("{0}")]
    Invoke(#[from] InvokeError),

    /// Local key error.
    #[error("{0}")]
    Keyring(#[from] KeyringError),

    /// A module a flow depends on was never registered.
    #[error("rholang module not loaded: {name} (run `register` first)")]
    ModuleNotLoaded {
        /// Name of the source that could not be resolved.
        name: String,
    },

    /// A wallet flow failed at a specific stage.
    #[error("{stage} failed: {source}")]
    Stage {
        /// The stage that failed.
        stage: Stage,
        /// The underlying failure.
        #[source]
        source: Box<Error>,
    },

    /// Invalid user input (amounts, labels, file contents).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Configuration error.
    #[error("config: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Tag an error with the wallet flow stage it happened in.
    ///
    /// Errors that already carry a stage keep their original one.
    #[must_use]
    pub fn at(stage: Stage, err: impl Into<Self>) -> Self {
        match err.into() {
            tagged @ Self::Stage { .. } => tagged,
            other => Self::Stage {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// Create an invalid input error.
    #[must_use]
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a config error.
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// The stage this error was tagged with, if any.
    #[must_use]
    pub const fn stage(&self) -> Option<Stage> {
        match self {
            Self::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// The error with any stage tag removed.
    #[must_use]
    pub fn root(&self) -> &Self {
        match self {
            Self::Stage { source, .. } => source.root(),
            other => other,
        }
    }

    /// Whether the caller may retry the failed operation.
    ///
    /// Only transport-level failures qualify; semantic rejections, protocol
    /// violations and local key errors never do.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self.root() {
            Self::Deploy(e) => e.is_retryable(),
            Self::Invoke(e) => e.is_retryable(),
            _ => false,
        }
    }
}

/// Stage of a wallet flow, used to label failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Resolving the contract module through the registry.
    Resolution,
    /// Loading and decrypting the local key.
    KeyAccess,
    /// Computing a local signature.
    Signing,
    /// Submitting a call to the chain.
    Submission,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Resolution => "module resolution",
            Self::KeyAccess => "key access",
            Self::Signing => "signing",
            Self::Submission => "submission",
        })
    }
}
