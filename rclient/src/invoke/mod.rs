//! Remote method invocation.
//!
//! A [`SignedInvocationProxy`] stands in for a deployed contract module:
//! each call becomes a deploy that looks the module up by address, sends
//! the method name with positional arguments, and waits for the reply on a
//! return channel. Replies are decoded through the [`Envelope`] convention.
//!
//! Calls that need values only known at submission time (a name reserved on
//! chain, the result of an earlier call) go through a [`CallPlan`]: each step
//! may carry a [`RewriteHook`] that sees the reserved names and prior
//! outcomes and replaces placeholder arguments before the call is sent.

mod args;
mod envelope;
mod error;
mod plan;
mod proxy;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::deploy::PriceInfo;
use crate::registry::ModuleAddress;

pub use args::{RhoArg, is_uri_literal};
pub use envelope::{Envelope, FAILURE_KEY, SUCCESS_KEY};
pub use error::InvokeError;
pub use plan::{CallPlan, CallStep, Prior, RewriteHook};
pub use proxy::{PriceSource, SignedInvocationProxy};

/// Methods exposed by the wallet contract module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Method {
    /// Create a wallet for a public key; replies with `{toSign, uri}`.
    CreateWallet,
    /// Start publishing a claimed wallet; replies with bytes to sign.
    PrepareToPublish,
    /// Finish publishing a claimed wallet.
    PublishClaimed,
    /// Finish publishing a newly created wallet.
    PublishRegistered,
    /// Move funds between vaults.
    Transfer,
    /// Read a vault balance.
    Balance,
    /// Claim a legacy (Ethereum-style) balance.
    Claim,
    /// Mint funds into a vault (test networks).
    GenVault,
}

impl Method {
    /// Wire name sent to the contract.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::CreateWallet => "createWallet",
            Self::PrepareToPublish => "prepareToPublish",
            Self::PublishClaimed => "publishClaimed",
            Self::PublishRegistered => "publishRegistered",
            Self::Transfer => "transfer",
            Self::Balance => "balance",
            Self::Claim => "claim",
            Self::GenVault => "genVault",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where the reply to a call is delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReturnChannel {
    /// The deploy's own unforgeable id channel.
    DeployId,
    /// A name reserved ahead of time through the node.
    Reserved(String),
}

/// A fully prepared call, ready for the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvokeRequest {
    /// Module to look up.
    pub address: ModuleAddress,
    /// Method to call.
    pub method: Method,
    /// Final positional arguments; the return channel is appended on chain.
    pub args: Vec<RhoArg>,
    /// Pricing and deployer identity for the carrying deploy.
    pub price: PriceInfo,
    /// Channel the reply is read from.
    pub return_channel: ReturnChannel,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_names_match_serde() {
        for method in [
            Method::CreateWallet,
            Method::PrepareToPublish,
            Method::PublishClaimed,
            Method::PublishRegistered,
            Method::Transfer,
            Method::Balance,
            Method::Claim,
            Method::GenVault,
        ] {
            let json = serde_json::to_value(method).unwrap();
            assert_eq!(json, method.name());
        }
    }
}
