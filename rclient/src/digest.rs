//! Content digests used to address deployed modules.
//!
//! A [`ContentDigest`] is the registry key for a piece of source text: equal
//! payloads always hash to equal digests, so a module that was deployed once
//! can be found again without touching the chain.

use std::fmt;
use std::str::FromStr;

use alloy::primitives::keccak256;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Length of a [`ContentDigest`] in bytes.
pub const DIGEST_LEN: usize = 32;

/// Fixed-length digest identifying a source payload.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentDigest([u8; DIGEST_LEN]);

impl ContentDigest {
    /// Wrap raw digest bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; DIGEST_LEN]) -> Self {
        Self(bytes)
    }

    /// Borrow the raw digest bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    /// Lowercase hex rendering, as stored in the registry file.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentDigest({})", self.to_hex())
    }
}

/// Error returned when a digest string is not 32 bytes of hex.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid content digest '{0}'")]
pub struct ParseDigestError(String);

impl FromStr for ContentDigest {
    type Err = ParseDigestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(raw).map_err(|_| ParseDigestError(s.to_owned()))?;
        let bytes: [u8; DIGEST_LEN] = bytes
            .try_into()
            .map_err(|_| ParseDigestError(s.to_owned()))?;
        Ok(Self(bytes))
    }
}

impl Serialize for ContentDigest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ContentDigest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Produces content digests for arbitrary payloads.
///
/// Implementations must be deterministic: the same bytes always give the same
/// digest, across processes and runs.
pub trait Hasher: Send + Sync {
    /// Digest a byte payload.
    fn digest(&self, bytes: &[u8]) -> ContentDigest;
}

/// Keccak-256 hasher, the digest the node tooling uses for source text.
#[derive(Debug, Clone, Copy, Default)]
pub struct Keccak256Hasher;

impl Hasher for Keccak256Hasher {
    fn digest(&self, bytes: &[u8]) -> ContentDigest {
        ContentDigest(keccak256(bytes).0)
    }
}
