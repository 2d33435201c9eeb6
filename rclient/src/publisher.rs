//! Make sure sources are deployed exactly once.
//!
//! [`ModulePublisher::ensure_loaded`] hashes each source, asks the registry
//! which digests are already known, submits only the rest in one batch, and
//! records the new addresses. Running it twice over the same sources deploys
//! nothing the second time.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::deploy::{DeployClient, DeployError, PriceInfo, SourceText};
use crate::digest::{ContentDigest, Hasher, Keccak256Hasher};
use crate::error::{Error, Result};
use crate::registry::{ModuleDescriptor, RegistryStore};

/// Whether a source had to be deployed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadStatus {
    /// An identical source was registered earlier.
    #[serde(rename = "reused")]
    Reused,
    /// The source was deployed by this call.
    #[serde(rename = "newly loaded")]
    NewlyLoaded,
}

impl fmt::Display for LoadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Reused => "reused",
            Self::NewlyLoaded => "newly loaded",
        })
    }
}

/// Outcome for one input source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadReport {
    /// Name of the source.
    pub source: String,
    /// Whether it was deployed now.
    pub status: LoadStatus,
    /// Registry entry for it.
    #[serde(flatten)]
    pub descriptor: ModuleDescriptor,
}

/// Deploys sources through a [`DeployClient`] and remembers them in a
/// [`RegistryStore`].
#[derive(Clone)]
pub struct ModulePublisher {
    registry: Arc<dyn RegistryStore>,
    client: Arc<dyn DeployClient>,
    hasher: Arc<dyn Hasher>,
}

impl fmt::Debug for ModulePublisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModulePublisher").finish_non_exhaustive()
    }
}

impl ModulePublisher {
    /// Create a publisher hashing with Keccak-256.
    pub fn new(registry: Arc<dyn RegistryStore>, client: Arc<dyn DeployClient>) -> Self {
        Self {
            registry,
            client,
            hasher: Arc::new(Keccak256Hasher),
        }
    }

    /// Use a different content hasher.
    #[must_use]
    pub fn with_hasher(mut self, hasher: Arc<dyn Hasher>) -> Self {
        self.hasher = hasher;
        self
    }

    /// Ensure every source is deployed, returning one report per source in
    /// input order.
    ///
    /// Identical sources in the input are deployed once. Nothing is written
    /// to the registry unless the whole batch was deployed.
    ///
    /// # Errors
    ///
    /// Registry failures (including conflicts), submission failures, and a
    /// protocol error if the node returns the wrong number of addresses.
    pub async fn ensure_loaded(
        &self,
        sources: &[SourceText],
        price: &PriceInfo,
    ) -> Result<Vec<LoadReport>> {
        let digests: Vec<ContentDigest> = sources
            .iter()
            .map(|s| self.hasher.digest(s.text.as_bytes()))
            .collect();

        let known = self.registry.lookup(&digests).await?;

        let mut seen = HashSet::new();
        let pending: Vec<(ContentDigest, SourceText)> = sources
            .iter()
            .zip(&digests)
            .filter(|(_, d)| !known.contains_key(*d) && seen.insert(**d))
            .map(|(s, d)| (*d, s.clone()))
            .collect();
        debug!(
            total = sources.len(),
            known = known.len(),
            pending = pending.len(),
            "checked registry"
        );

        let mut fresh: HashMap<ContentDigest, ModuleDescriptor> = HashMap::new();
        if !pending.is_empty() {
            let batch: Vec<SourceText> = pending.iter().map(|(_, s)| s.clone()).collect();
            let addresses = self.client.submit(&batch, price).await?;
            if addresses.len() != batch.len() {
                return Err(DeployError::protocol(format!(
                    "submitted {} sources, node returned {} addresses",
                    batch.len(),
                    addresses.len()
                ))
                .into());
            }

            let descriptors: Vec<ModuleDescriptor> = pending
                .iter()
                .zip(addresses)
                .map(|((digest, _), address)| ModuleDescriptor::new(*digest, address))
                .collect();
            self.registry.upsert_all(&descriptors).await?;

            for (descriptor, (_, source)) in descriptors.iter().zip(&pending) {
                info!(
                    source = %source.name,
                    address = %descriptor.address,
                    "module registered"
                );
            }
            fresh.extend(descriptors.into_iter().map(|d| (d.digest, d)));
        }

        sources
            .iter()
            .zip(digests)
            .map(|(source, digest)| {
                let (descriptor, status) = match (known.get(&digest), fresh.get(&digest)) {
                    (Some(d), _) => (d.clone(), LoadStatus::Reused),
                    (None, Some(d)) => (d.clone(), LoadStatus::NewlyLoaded),
                    (None, None) => {
                        return Err(Error::ModuleNotLoaded {
                            name: source.name.clone(),
                        });
                    }
                };
                Ok(LoadReport {
                    source: source.name.clone(),
                    status,
                    descriptor,
                })
            })
            .collect()
    }

    /// Find the descriptor of an already-deployed source.
    ///
    /// # Errors
    ///
    /// [`Error::ModuleNotLoaded`] when the source was never registered.
    pub async fn resolve(&self, source: &SourceText) -> Result<ModuleDescriptor> {
        let digest = self.hasher.digest(source.text.as_bytes());
        let mut found = self.registry.lookup(&[digest]).await?;
        found.remove(&digest).ok_or_else(|| Error::ModuleNotLoaded {
            name: source.name.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{MemoryRegistry, ModuleAddress, RegistryError};
    use crate::testing::FakeNode;

    fn setup() -> (Arc<MemoryRegistry>, Arc<FakeNode>, ModulePublisher) {
        let registry = Arc::new(MemoryRegistry::new());
        let node = Arc::new(FakeNode::new());
        let publisher = ModulePublisher::new(
            Arc::clone(&registry) as Arc<dyn RegistryStore>,
            Arc::clone(&node) as Arc<dyn DeployClient>,
        );
        (registry, node, publisher)
    }

    fn price() -> PriceInfo {
        PriceInfo::new(1_000, 1)
    }

    #[tokio::test]
    async fn test_loads_once() {
        let (registry, node, publisher) = setup();
        let tools = SourceText::new("tools.rho", "new tools in { Nil }");

        let first = publisher
            .ensure_loaded(std::slice::from_ref(&tools), &price())
            .await
            .unwrap();
        assert_eq!(first[0].status, LoadStatus::NewlyLoaded);
        assert_eq!(
            first[0].descriptor.address,
            FakeNode::address_for(&tools.text)
        );

        let second = publisher
            .ensure_loaded(std::slice::from_ref(&tools), &price())
            .await
            .unwrap();
        assert_eq!(second[0].status, LoadStatus::Reused);
        assert_eq!(second[0].descriptor, first[0].descriptor);

        assert_eq!(node.submissions().len(), 1);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_only_unknown_sources_are_submitted() {
        let (_, node, publisher) = setup();
        let a = SourceText::new("a.rho", "a");
        let b = SourceText::new("b.rho", "b");
        let c = SourceText::new("c.rho", "c");
        publisher
            .ensure_loaded(std::slice::from_ref(&b), &price())
            .await
            .unwrap();

        let reports = publisher
            .ensure_loaded(&[a, b, c], &price())
            .await
            .unwrap();

        let statuses: Vec<_> = reports.iter().map(|r| (r.source.as_str(), r.status)).collect();
        assert_eq!(
            statuses,
            vec![
                ("a.rho", LoadStatus::NewlyLoaded),
                ("b.rho", LoadStatus::Reused),
                ("c.rho", LoadStatus::NewlyLoaded),
            ]
        );
        assert_eq!(
            node.submissions(),
            vec![
                vec!["b.rho".to_owned()],
                vec!["a.rho".to_owned(), "c.rho".to_owned()]
            ]
        );
    }

    #[tokio::test]
    async fn test_duplicate_inputs_deploy_once() {
        let (_, node, publisher) = setup();
        let one = SourceText::new("one.rho", "same text");
        let two = SourceText::new("two.rho", "same text");

        let reports = publisher.ensure_loaded(&[one, two], &price()).await.unwrap();

        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].descriptor, reports[1].descriptor);
        assert_eq!(node.submissions(), vec![vec!["one.rho".to_owned()]]);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let (_, node, publisher) = setup();
        let reports = publisher.ensure_loaded(&[], &price()).await.unwrap();
        assert!(reports.is_empty());
        assert!(node.submissions().is_empty());
    }

    #[tokio::test]
    async fn test_failed_submission_records_nothing() {
        let (registry, node, publisher) = setup();
        node.fail_submit(DeployError::compile("bad.rho", "syntax error"));

        let err = publisher
            .ensure_loaded(&[SourceText::new("bad.rho", "new x in {")], &price())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Deploy(DeployError::Compile { .. })));
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_existing_entry_is_never_replaced() {
        let (registry, _, publisher) = setup();
        let source = SourceText::new("a.rho", "a");
        let digest = Keccak256Hasher.digest(b"a");
        // Registered by another client under a different address.
        registry
            .upsert_all(&[ModuleDescriptor::new(
                digest,
                ModuleAddress::new("rho:id:elsewhere"),
            )])
            .await
            .unwrap();

        let reports = publisher
            .ensure_loaded(std::slice::from_ref(&source), &price())
            .await
            .unwrap();
        assert_eq!(reports[0].status, LoadStatus::Reused);
        assert_eq!(reports[0].descriptor.address.as_str(), "rho:id:elsewhere");

        let err = registry
            .upsert_all(&[ModuleDescriptor::new(
                digest,
                FakeNode::address_for("a"),
            )])
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_resolve() {
        let (_, _, publisher) = setup();
        let tools = SourceText::new("tools.rho", "tools");

        let err = publisher.resolve(&tools).await.unwrap_err();
        assert!(matches!(err, Error::ModuleNotLoaded { ref name } if name == "tools.rho"));

        publisher
            .ensure_loaded(std::slice::from_ref(&tools), &price())
            .await
            .unwrap();
        let descriptor = publisher.resolve(&tools).await.unwrap();
        assert_eq!(descriptor.address, FakeNode::address_for("tools"));
    }

    #[test]
    fn test_report_json_shape() {
        let report = LoadReport {
            source: "tools.rho".to_owned(),
            status: LoadStatus::NewlyLoaded,
            descriptor: ModuleDescriptor::new(
                Keccak256Hasher.digest(b"tools"),
                ModuleAddress::new("rho:id:abc"),
            ),
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "newly loaded");
        assert_eq!(json["address"], "rho:id:abc");
        assert_eq!(json["source"], "tools.rho");
    }
}
