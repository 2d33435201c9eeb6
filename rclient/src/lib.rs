//! rclient is a wallet and deploy client for RChain nodes.
//!
//! It keeps a content-addressed registry of deployed Rholang modules so each
//! source is deployed once, turns method calls on those modules into
//! deploys through a [`SignedInvocationProxy`](invoke::SignedInvocationProxy),
//! and drives the wallet lifecycle (claim, publish, balance, transfer) with
//! locally held keys.
//!
//! ```text
//! ModulePublisher ──► RegistryStore (memory | JSON file)
//!        │
//!        └──────────► DeployClient (RNode HTTP API)
//!                         ▲
//! WalletProtocol ──► CallPlan ──► SignedInvocationProxy
//!        │
//!        └──► SigningContext ◄── FileKeyStore
//! ```

pub mod config;
pub mod deploy;
pub mod digest;
pub mod error;
pub mod events;
pub mod invoke;
pub mod keyring;
pub mod prelude;
pub mod publisher;
pub mod registry;
pub mod util;
pub mod wallet;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{Error, Result, Stage};
