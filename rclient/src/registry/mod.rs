//! Content-addressed registry of deployed modules.
//!
//! The registry maps a [`ContentDigest`] of some source text to the
//! [`ModuleDescriptor`] produced when that source was deployed. It is
//! write-once per digest: storing the same descriptor again is a no-op,
//! while storing a different address for a known digest fails with
//! [`RegistryError::Conflict`] and leaves the registry untouched.
//!
//! # Backends
//!
//! ```text
//! RegistryStore (trait)
//!   ├── MemoryRegistry  → process-local map, used by tests and embedders
//!   └── FileRegistry    → JSON file, merged on every write
//! ```

mod error;
mod file;
mod memory;

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::digest::ContentDigest;
use crate::util::timestamp_ms;

pub use error::{RegistryError, RegistryResult};
pub use file::FileRegistry;
pub use memory::MemoryRegistry;

/// Opaque on-chain identifier of a deployed module (e.g. `rho:id:...`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleAddress(String);

impl ModuleAddress {
    /// Wrap an address string.
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    /// Borrow the address string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModuleAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Record binding a content digest to its deployed address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleDescriptor {
    /// Digest of the deployed source.
    pub digest: ContentDigest,
    /// Address the module was registered under.
    pub address: ModuleAddress,
    /// Registration time (Unix milliseconds).
    pub registered_at: u64,
}

impl ModuleDescriptor {
    /// Create a descriptor stamped with the current time.
    #[must_use]
    pub fn new(digest: ContentDigest, address: ModuleAddress) -> Self {
        Self {
            digest,
            address,
            registered_at: timestamp_ms(),
        }
    }
}

/// Persistence abstraction for the module registry.
///
/// Implementations must keep the write-once invariant: `upsert_all` either
/// merges every entry or none of them.
#[async_trait]
pub trait RegistryStore: Send + Sync {
    /// Look up descriptors for a set of digests. Absent digests are simply
    /// missing from the result; lookups never create entries.
    async fn lookup(
        &self,
        digests: &[ContentDigest],
    ) -> RegistryResult<HashMap<ContentDigest, ModuleDescriptor>>;

    /// Merge descriptors into the registry, all or nothing.
    async fn upsert_all(&self, entries: &[ModuleDescriptor]) -> RegistryResult<()>;
}

/// Merge `entries` into `state`, validating every entry before applying any.
///
/// Returns the number of entries that were actually new. Re-inserting an
/// identical address keeps the original descriptor.
pub(crate) fn merge_entries(
    state: &mut HashMap<ContentDigest, ModuleDescriptor>,
    entries: &[ModuleDescriptor],
) -> RegistryResult<usize> {
    let mut staged: HashMap<ContentDigest, &ModuleDescriptor> = HashMap::new();
    for entry in entries {
        let known = state
            .get(&entry.digest)
            .map(|d| &d.address)
            .or_else(|| staged.get(&entry.digest).map(|d| &d.address));
        match known {
            Some(existing) if existing != &entry.address => {
                return Err(RegistryError::conflict(
                    entry.digest,
                    existing.clone(),
                    entry.address.clone(),
                ));
            }
            Some(_) => {}
            None => {
                staged.insert(entry.digest, entry);
            }
        }
    }

    let added = staged.len();
    for (digest, entry) in staged {
        state.insert(digest, entry.clone());
    }
    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::{Hasher, Keccak256Hasher};

    fn descriptor(src: &str, address: &str) -> ModuleDescriptor {
        ModuleDescriptor::new(
            Keccak256Hasher.digest(src.as_bytes()),
            ModuleAddress::new(address),
        )
    }

    #[test]
    fn test_merge_adds_new_entries() {
        let mut state = HashMap::new();
        let added = merge_entries(&mut state, &[descriptor("a", "rho:id:a")]).unwrap();
        assert_eq!(added, 1);
        assert_eq!(state.len(), 1);
    }

    #[test]
    fn test_merge_same_address_is_noop() {
        let mut state = HashMap::new();
        let mut first = descriptor("a", "rho:id:a");
        first.registered_at = 1;
        merge_entries(&mut state, std::slice::from_ref(&first)).unwrap();

        let again = descriptor("a", "rho:id:a");
        let added = merge_entries(&mut state, &[again]).unwrap();
        assert_eq!(added, 0);
        assert_eq!(state[&first.digest].registered_at, 1);
    }

    #[test]
    fn test_merge_conflict_leaves_state_unchanged() {
        let mut state = HashMap::new();
        merge_entries(&mut state, &[descriptor("a", "rho:id:a")]).unwrap();
        let before = state.clone();

        let err = merge_entries(
            &mut state,
            &[descriptor("b", "rho:id:b"), descriptor("a", "rho:id:other")],
        )
        .unwrap_err();

        assert!(err.is_conflict());
        assert_eq!(state, before);
    }

    #[test]
    fn test_merge_conflict_within_one_batch() {
        let mut state = HashMap::new();
        let err = merge_entries(
            &mut state,
            &[descriptor("a", "rho:id:1"), descriptor("a", "rho:id:2")],
        )
        .unwrap_err();
        assert!(err.is_conflict());
        assert!(state.is_empty());
    }

    #[test]
    fn test_descriptor_serde_shape() {
        let d = descriptor("a", "rho:id:a");
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["address"], "rho:id:a");
        assert!(json["registeredAt"].is_u64());
        assert_eq!(json["digest"], d.digest.to_hex());
    }
}
