//! Local key storage and signing.
//!
//! Keys are stored sealed under a password ([`SealedKey`]) in a
//! [`FileKeyStore`]. Unlocking a key yields a [`SigningContext`] holding
//! both the secp256k1 and the Ed25519 form of the secret, along with the
//! [`DerivedIdentities`] published to the chain.

mod error;
mod sealed;
mod signing;
mod store;

use async_trait::async_trait;
use zeroize::Zeroizing;

pub use error::KeyringError;
pub use sealed::{KdfParams, SealedKey};
pub use signing::{
    DerivedIdentities, LegacySignature, NATIVE_ADDRESS_PREFIX, SignatureScheme, SigningContext,
    is_valid_native_address, legacy_address, native_address,
};
pub use store::{FileKeyStore, is_web3_keystore};

/// Source of decrypted key material.
#[async_trait]
pub trait KeyringAccess: Send + Sync {
    /// Decrypt the key stored under `label`.
    async fn decrypt(&self, label: &str, password: &str)
    -> Result<Zeroizing<Vec<u8>>, KeyringError>;

    /// Decrypt the key under `label` and prepare it for signing.
    async fn unlock(&self, label: &str, password: &str) -> Result<SigningContext, KeyringError> {
        let secret = self.decrypt(label, password).await?;
        SigningContext::from_secret(&secret)
    }
}
