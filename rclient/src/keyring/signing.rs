//! Identities and signatures derived from one secret.
//!
//! The same 32-byte secret serves two schemes: secp256k1 for the legacy
//! (Ethereum-style) identity and Ed25519 for the native one.

use std::fmt;

use alloy::primitives::{B256, Signature, keccak256};
use alloy::signers::SignerSync;
use alloy::signers::local::PrivateKeySigner;
use ed25519_dalek::Signer as _;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use super::KeyringError;

/// Version prefix of native addresses.
pub const NATIVE_ADDRESS_PREFIX: [u8; 4] = [0, 0, 0, 0];

/// Signature scheme used for a local signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureScheme {
    /// ECDSA over secp256k1 with a Keccak-256 prehash.
    Secp256k1,
    /// Ed25519 over the raw message.
    Ed25519,
}

impl fmt::Display for SignatureScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Secp256k1 => "secp256k1",
            Self::Ed25519 => "ed25519",
        })
    }
}

/// Public identities of a key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedIdentities {
    /// `0x`-prefixed Ethereum-style address.
    pub legacy_address: String,
    /// Base58 native address.
    pub native_address: String,
    /// Uncompressed secp256k1 public key without the `04` tag.
    #[serde(with = "hex::serde")]
    pub public_key: Vec<u8>,
    /// Ed25519 public key.
    #[serde(with = "hex::serde")]
    pub native_public_key: [u8; 32],
}

/// A secp256k1 signature over the Keccak-256 hash of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LegacySignature(Signature);

impl LegacySignature {
    /// `r || s`, 64 bytes.
    #[must_use]
    pub fn to_compact(&self) -> [u8; 64] {
        let mut out = [0u8; 64];
        out[..32].copy_from_slice(&self.0.r().to_be_bytes::<32>());
        out[32..].copy_from_slice(&self.0.s().to_be_bytes::<32>());
        out
    }

    /// ASN.1 DER `SEQUENCE { r INTEGER, s INTEGER }`.
    ///
    /// # Errors
    ///
    /// [`KeyringError::Signing`] if `r` or `s` is not a valid scalar.
    pub fn to_der(&self) -> Result<Vec<u8>, KeyringError> {
        let signature = k256::ecdsa::Signature::from_slice(&self.to_compact())
            .map_err(|e| KeyringError::signing(e.to_string()))?;
        Ok(signature.to_der().as_bytes().to_vec())
    }
}

/// An unlocked key, able to sign with both schemes.
pub struct SigningContext {
    signer: PrivateKeySigner,
    native: ed25519_dalek::SigningKey,
    identities: DerivedIdentities,
}

impl fmt::Debug for SigningContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningContext")
            .field("identities", &self.identities)
            .finish_non_exhaustive()
    }
}

impl SigningContext {
    /// Build a context from a raw 32-byte secret.
    ///
    /// # Errors
    ///
    /// [`KeyringError::InvalidKey`] if the bytes are not a valid secp256k1
    /// scalar.
    pub fn from_secret(secret: &[u8]) -> Result<Self, KeyringError> {
        let seed: Zeroizing<[u8; 32]> = Zeroizing::new(
            secret
                .try_into()
                .map_err(|_| KeyringError::invalid_key(format!("expected 32 bytes, got {}", secret.len())))?,
        );
        let signer = PrivateKeySigner::from_slice(seed.as_slice())
            .map_err(|e| KeyringError::invalid_key(e.to_string()))?;
        let native = ed25519_dalek::SigningKey::from_bytes(&seed);

        let point = signer.credential().verifying_key().to_encoded_point(false);
        let public_key = point.as_bytes()[1..].to_vec();
        let native_public_key = native.verifying_key().to_bytes();

        let identities = DerivedIdentities {
            legacy_address: legacy_address(&public_key),
            native_address: native_address(&native_public_key),
            public_key,
            native_public_key,
        };
        Ok(Self {
            signer,
            native,
            identities,
        })
    }

    /// Public identities of this key.
    #[must_use]
    pub const fn identities(&self) -> &DerivedIdentities {
        &self.identities
    }

    /// Sign the Keccak-256 hash of `message` with secp256k1.
    ///
    /// # Errors
    ///
    /// [`KeyringError::Signing`] if the signer fails.
    pub fn sign_legacy(&self, message: &[u8]) -> Result<LegacySignature, KeyringError> {
        let hash: B256 = keccak256(message);
        self.signer
            .sign_hash_sync(&hash)
            .map(LegacySignature)
            .map_err(|e| KeyringError::signing(e.to_string()))
    }

    /// Sign `message` with Ed25519.
    #[must_use]
    pub fn sign_native(&self, message: &[u8]) -> [u8; 64] {
        self.native.sign(message).to_bytes()
    }
}

/// `0x` followed by the last 20 bytes of the Keccak-256 hash of an
/// uncompressed public key (without its `04` tag).
#[must_use]
pub fn legacy_address(public_key: &[u8]) -> String {
    let hash = keccak256(public_key);
    format!("0x{}", hex::encode(&hash[12..]))
}

/// Base58 native address of an Ed25519 public key.
///
/// Layout: prefix, last 20 bytes of the Keccak-256 hash of the key, then the
/// first 4 bytes of the Keccak-256 hash of everything before as checksum.
#[must_use]
pub fn native_address(public_key: &[u8; 32]) -> String {
    let hash = keccak256(public_key);
    let mut payload = Vec::with_capacity(NATIVE_ADDRESS_PREFIX.len() + 20 + 4);
    payload.extend_from_slice(&NATIVE_ADDRESS_PREFIX);
    payload.extend_from_slice(&hash[12..]);
    let checksum = keccak256(&payload);
    payload.extend_from_slice(&checksum[..4]);
    bs58::encode(payload).into_string()
}

/// Check a native address's prefix and checksum.
#[must_use]
pub fn is_valid_native_address(address: &str) -> bool {
    let Ok(bytes) = bs58::decode(address).into_vec() else {
        return false;
    };
    if bytes.len() != NATIVE_ADDRESS_PREFIX.len() + 24 || !bytes.starts_with(&NATIVE_ADDRESS_PREFIX)
    {
        return false;
    }
    let (payload, checksum) = bytes.split_at(bytes.len() - 4);
    keccak256(payload)[..4] == *checksum
}
