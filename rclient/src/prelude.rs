//! Commonly used types.

pub use crate::config::ClientConfig;
pub use crate::deploy::{DeployClient, HttpDeployClient, PollPolicy, PriceInfo, SourceText};
pub use crate::digest::{ContentDigest, Hasher, Keccak256Hasher};
pub use crate::error::{Error, Result, Stage};
pub use crate::events::{Event, NoopObserver, Observer, TracingObserver};
pub use crate::invoke::{CallPlan, CallStep, Method, RhoArg, SignedInvocationProxy};
pub use crate::keyring::{DerivedIdentities, FileKeyStore, KeyringAccess, SigningContext};
pub use crate::publisher::{LoadReport, LoadStatus, ModulePublisher};
pub use crate::registry::{
    FileRegistry, MemoryRegistry, ModuleAddress, ModuleDescriptor, RegistryStore,
};
pub use crate::wallet::{Flow, FlowReport, WalletProtocol};
