//! Error types for the module registry.
//!
//! [`RegistryError`] integrates into the crate-level [`Error`](crate::Error)
//! hierarchy via `Error::Registry`.

use crate::digest::ContentDigest;

use super::ModuleAddress;

/// Error type for registry operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum RegistryError {
    /// A digest is already bound to a different address.
    ///
    /// The registry is write-once per digest, so this always indicates a
    /// caller bug and is never retried.
    #[error("digest {digest} is registered at {existing}, refusing to rebind it to {proposed}")]
    Conflict {
        /// The digest being re-registered.
        digest: ContentDigest,
        /// Address already on record.
        existing: ModuleAddress,
        /// Address the caller tried to store.
        proposed: ModuleAddress,
    },

    /// The registry file could not be read or written.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// The registry file is not valid JSON for the expected shape.
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

impl RegistryError {
    /// Create a conflict error.
    #[must_use]
    pub const fn conflict(
        digest: ContentDigest,
        existing: ModuleAddress,
        proposed: ModuleAddress,
    ) -> Self {
        Self::Conflict {
            digest,
            existing,
            proposed,
        }
    }

    /// Returns `true` for the write-once invariant violation.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// Convenience alias for registry-scoped results.
pub type RegistryResult<T> = Result<T, RegistryError>;
