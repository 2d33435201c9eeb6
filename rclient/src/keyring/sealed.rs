//! Password-sealed key records.
//!
//! A key is encrypted with AES-256-GCM under a key stretched from the
//! password with Argon2id. Salt and nonce are fresh for every seal.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use argon2::{Algorithm, Argon2, Params, Version};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use zeroize::Zeroizing;

use super::KeyringError;
use crate::util::timestamp_ms;

const RECORD_VERSION: u32 = 1;
const KDF_ALGORITHM: &str = "argon2id";
const CIPHER: &str = "aes-256-gcm";
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;

/// Argon2id parameters stored with each record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Always `argon2id`.
    pub algorithm: String,
    /// Hex-encoded salt.
    pub salt: String,
    /// Memory cost in KiB.
    pub m_cost: u32,
    /// Iterations.
    pub t_cost: u32,
    /// Parallelism.
    pub p_cost: u32,
}

/// An encrypted private key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedKey {
    /// Record id.
    pub id: Uuid,
    /// Record format version.
    pub version: u32,
    /// Key derivation parameters.
    pub kdf: KdfParams,
    /// Always `aes-256-gcm`.
    pub cipher: String,
    /// Hex-encoded nonce.
    pub nonce: String,
    /// Hex-encoded ciphertext with tag.
    pub ciphertext: String,
    /// Creation time (Unix milliseconds).
    pub created_at: u64,
}

impl SealedKey {
    /// Encrypt `secret` under `password`.
    ///
    /// # Errors
    ///
    /// Returns an error if key derivation or encryption fails.
    pub fn seal(secret: &[u8], password: &str) -> Result<Self, KeyringError> {
        let salt: [u8; SALT_LEN] = rand::random();
        let nonce: [u8; NONCE_LEN] = rand::random();
        let kdf = KdfParams {
            algorithm: KDF_ALGORITHM.to_owned(),
            salt: hex::encode(salt),
            m_cost: Params::DEFAULT_M_COST,
            t_cost: Params::DEFAULT_T_COST,
            p_cost: Params::DEFAULT_P_COST,
        };

        let key = derive_key(password, &salt, &kdf)?;
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_slice()));
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), secret)
            .map_err(|e| KeyringError::corrupt(format!("encryption failed: {e}")))?;

        Ok(Self {
            id: Uuid::new_v4(),
            version: RECORD_VERSION,
            kdf,
            cipher: CIPHER.to_owned(),
            nonce: hex::encode(nonce),
            ciphertext: hex::encode(ciphertext),
            created_at: timestamp_ms(),
        })
    }

    /// Decrypt with `password`. `label` only names the key in errors.
    ///
    /// # Errors
    ///
    /// [`KeyringError::BadPassword`] when authentication fails,
    /// [`KeyringError::Corrupt`] for unsupported or malformed records.
    pub fn open(&self, password: &str, label: &str) -> Result<Zeroizing<Vec<u8>>, KeyringError> {
        if self.kdf.algorithm != KDF_ALGORITHM {
            return Err(KeyringError::corrupt(format!(
                "unsupported kdf {}",
                self.kdf.algorithm
            )));
        }
        if self.cipher != CIPHER {
            return Err(KeyringError::corrupt(format!(
                "unsupported cipher {}",
                self.cipher
            )));
        }

        let salt = decode_hex("salt", &self.kdf.salt)?;
        let nonce = decode_hex("nonce", &self.nonce)?;
        if nonce.len() != NONCE_LEN {
            return Err(KeyringError::corrupt("nonce has the wrong length"));
        }
        let ciphertext = decode_hex("ciphertext", &self.ciphertext)?;

        let key = derive_key(password, &salt, &self.kdf)?;
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_slice()));
        cipher
            .decrypt(Nonce::from_slice(&nonce), ciphertext.as_slice())
            .map(Zeroizing::new)
            .map_err(|_| KeyringError::bad_password(label))
    }
}

fn derive_key(
    password: &str,
    salt: &[u8],
    kdf: &KdfParams,
) -> Result<Zeroizing<[u8; 32]>, KeyringError> {
    let params = Params::new(kdf.m_cost, kdf.t_cost, kdf.p_cost, Some(32))
        .map_err(|e| KeyringError::corrupt(format!("bad kdf parameters: {e}")))?;
    let mut key = Zeroizing::new([0u8; 32]);
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
        .hash_password_into(password.as_bytes(), salt, key.as_mut_slice())
        .map_err(|e| KeyringError::corrupt(format!("key derivation failed: {e}")))?;
    Ok(key)
}

fn decode_hex(field: &str, value: &str) -> Result<Vec<u8>, KeyringError> {
    hex::decode(value).map_err(|e| KeyringError::corrupt(format!("{field}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_and_open() {
        let secret = [0x42u8; 32];
        let sealed = SealedKey::seal(&secret, "hunter2").unwrap();

        assert_eq!(sealed.kdf.algorithm, "argon2id");
        assert_eq!(sealed.cipher, "aes-256-gcm");
        assert_ne!(sealed.ciphertext, hex::encode(secret));

        let opened = sealed.open("hunter2", "alice").unwrap();
        assert_eq!(opened.as_slice(), &secret);
    }

    #[test]
    fn test_wrong_password() {
        let sealed = SealedKey::seal(&[1u8; 32], "right").unwrap();
        let err = sealed.open("wrong", "alice").unwrap_err();
        assert!(matches!(err, KeyringError::BadPassword(ref l) if l == "alice"));
    }

    #[test]
    fn test_fresh_salt_and_nonce() {
        let a = SealedKey::seal(&[1u8; 32], "pw").unwrap();
        let b = SealedKey::seal(&[1u8; 32], "pw").unwrap();
        assert_ne!(a.kdf.salt, b.kdf.salt);
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let mut sealed = SealedKey::seal(&[1u8; 32], "pw").unwrap();
        let mut bytes = hex::decode(&sealed.ciphertext).unwrap();
        bytes[0] ^= 0xff;
        sealed.ciphertext = hex::encode(bytes);
        assert!(matches!(
            sealed.open("pw", "k").unwrap_err(),
            KeyringError::BadPassword(_)
        ));
    }

    #[test]
    fn test_unsupported_parameters() {
        let mut sealed = SealedKey::seal(&[1u8; 32], "pw").unwrap();
        sealed.kdf.algorithm = "scrypt".to_owned();
        assert!(matches!(
            sealed.open("pw", "k").unwrap_err(),
            KeyringError::Corrupt(_)
        ));

        let mut sealed = SealedKey::seal(&[1u8; 32], "pw").unwrap();
        sealed.nonce = "zz".to_owned();
        assert!(matches!(
            sealed.open("pw", "k").unwrap_err(),
            KeyringError::Corrupt(_)
        ));
    }
}
