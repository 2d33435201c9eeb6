//! In-memory registry backend.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{ModuleDescriptor, RegistryResult, RegistryStore, merge_entries};
use crate::digest::ContentDigest;

/// Process-local registry.
///
/// Fast but not persistent across restarts.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    modules: RwLock<HashMap<ContentDigest, ModuleDescriptor>>,
}

impl MemoryRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored descriptor.
    pub async fn entries(&self) -> Vec<ModuleDescriptor> {
        self.modules.read().await.values().cloned().collect()
    }

    /// Number of stored descriptors.
    pub async fn len(&self) -> usize {
        self.modules.read().await.len()
    }

    /// Whether the registry is empty.
    pub async fn is_empty(&self) -> bool {
        self.modules.read().await.is_empty()
    }
}

#[async_trait]
impl RegistryStore for MemoryRegistry {
    async fn lookup(
        &self,
        digests: &[ContentDigest],
    ) -> RegistryResult<HashMap<ContentDigest, ModuleDescriptor>> {
        let modules = self.modules.read().await;
        Ok(digests
            .iter()
            .filter_map(|d| modules.get(d).map(|m| (*d, m.clone())))
            .collect())
    }

    async fn upsert_all(&self, entries: &[ModuleDescriptor]) -> RegistryResult<()> {
        let mut modules = self.modules.write().await;
        merge_entries(&mut modules, entries)?;
        Ok(())
    }
}
