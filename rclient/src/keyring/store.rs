//! JSON keystore file.
//!
//! The file maps labels to [`SealedKey`] records. Writes go through a
//! temporary file and a rename, and the file is readable by its owner only.
//! Key derivation runs on the blocking pool.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info};
use zeroize::Zeroizing;

use super::{DerivedIdentities, KeyringAccess, KeyringError, SealedKey, SigningContext};

type Entries = BTreeMap<String, SealedKey>;

/// Password-protected keys in a JSON file.
#[derive(Debug)]
pub struct FileKeyStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileKeyStore {
    /// Open the keystore at `path`. The file is created on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Labels of every stored key, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub async fn labels(&self) -> Result<Vec<String>, KeyringError> {
        Ok(self.load().await?.into_keys().collect())
    }

    /// The sealed record stored under `label`.
    ///
    /// # Errors
    ///
    /// [`KeyringError::NotFound`] if there is no such key.
    pub async fn get(&self, label: &str) -> Result<SealedKey, KeyringError> {
        self.load()
            .await?
            .remove(label)
            .ok_or_else(|| KeyringError::not_found(label))
    }

    /// Generate a new random key under `label`.
    ///
    /// # Errors
    ///
    /// [`KeyringError::AlreadyExists`] if the label is taken, or any
    /// storage failure.
    pub async fn generate(
        &self,
        label: &str,
        password: &str,
    ) -> Result<DerivedIdentities, KeyringError> {
        let secret = loop {
            let candidate: Zeroizing<[u8; 32]> = Zeroizing::new(rand::random());
            if PrivateKeySigner::from_slice(candidate.as_slice()).is_ok() {
                break candidate;
            }
        };
        let identities = SigningContext::from_secret(secret.as_slice())?
            .identities()
            .clone();
        let password = Zeroizing::new(password.to_owned());
        let sealed = blocking(move || SealedKey::seal(secret.as_slice(), &password)).await?;
        self.insert(label, sealed).await?;
        info!(label, address = %identities.native_address, "key generated");
        Ok(identities)
    }

    /// Store an externally sealed key under `label`.
    ///
    /// The record must open with `password` before it is stored.
    ///
    /// # Errors
    ///
    /// [`KeyringError::BadPassword`] if it does not open,
    /// [`KeyringError::AlreadyExists`] if the label is taken.
    pub async fn import(
        &self,
        label: &str,
        sealed: SealedKey,
        password: &str,
    ) -> Result<DerivedIdentities, KeyringError> {
        let password = Zeroizing::new(password.to_owned());
        let owned_label = label.to_owned();
        let (sealed, secret) = blocking(move || {
            let secret = sealed.open(&password, &owned_label)?;
            Ok((sealed, secret))
        })
        .await?;
        let identities = SigningContext::from_secret(&secret)?.identities().clone();
        self.insert(label, sealed).await?;
        info!(label, address = %identities.native_address, "key imported");
        Ok(identities)
    }

    /// Import an Ethereum (Web3 Secret Storage v3) keystore file under
    /// `label`, resealing its key with the same password.
    ///
    /// # Errors
    ///
    /// [`KeyringError::Corrupt`] if the file is not a v3 keystore,
    /// [`KeyringError::BadPassword`] if it does not decrypt,
    /// [`KeyringError::AlreadyExists`] if the label is taken.
    pub async fn import_web3(
        &self,
        label: &str,
        keystore: impl AsRef<Path>,
        password: &str,
    ) -> Result<DerivedIdentities, KeyringError> {
        let keystore = keystore.as_ref().to_path_buf();
        let content = tokio::fs::read_to_string(&keystore).await?;
        if !is_web3_keystore(&serde_json::from_str(&content)?) {
            return Err(KeyringError::corrupt(format!(
                "{} is not a v3 keystore",
                keystore.display()
            )));
        }

        let password = Zeroizing::new(password.to_owned());
        let owned_label = label.to_owned();
        let (identities, sealed) = blocking(move || {
            let signer = PrivateKeySigner::decrypt_keystore(&keystore, password.as_bytes())
                .map_err(|_| KeyringError::bad_password(&owned_label))?;
            let secret = Zeroizing::new(signer.credential().to_bytes().to_vec());
            let identities = SigningContext::from_secret(&secret)?.identities().clone();
            let sealed = SealedKey::seal(&secret, &password)?;
            Ok((identities, sealed))
        })
        .await?;
        self.insert(label, sealed).await?;
        info!(label, address = %identities.legacy_address, "keystore imported");
        Ok(identities)
    }

    async fn insert(&self, label: &str, sealed: SealedKey) -> Result<(), KeyringError> {
        let _guard = self.write_lock.lock().await;
        let mut entries = self.load().await?;
        if entries.contains_key(label) {
            return Err(KeyringError::AlreadyExists(label.to_owned()));
        }
        entries.insert(label.to_owned(), sealed);
        self.persist(&entries).await
    }

    async fn load(&self) -> Result<Entries, KeyringError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Entries::new()),
            Err(e) => return Err(e.into()),
        };
        if content.trim().is_empty() {
            return Ok(Entries::new());
        }
        Ok(serde_json::from_str(&content)?)
    }

    async fn persist(&self, entries: &Entries) -> Result<(), KeyringError> {
        let content = serde_json::to_string_pretty(entries)?;
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = self
            .path
            .with_extension(format!("tmp-{}", uuid::Uuid::new_v4().simple()));
        tokio::fs::write(&tmp, content).await?;
        restrict_permissions(&tmp).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        debug!(path = %self.path.display(), keys = entries.len(), "keystore saved");
        Ok(())
    }
}

/// Whether `value` has the shape of a Web3 Secret Storage v3 keystore.
#[must_use]
pub fn is_web3_keystore(value: &Value) -> bool {
    let crypto = value.get("crypto").or_else(|| value.get("Crypto"));
    value.get("version").and_then(Value::as_u64) == Some(3)
        && crypto.is_some_and(|c| c.get("ciphertext").is_some() && c.get("kdf").is_some())
}

async fn blocking<T, F>(task: F) -> Result<T, KeyringError>
where
    F: FnOnce() -> Result<T, KeyringError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| KeyringError::Io(std::io::Error::other(e)))?
}

#[cfg(unix)]
async fn restrict_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await
}

#[cfg(not(unix))]
async fn restrict_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

#[async_trait]
impl KeyringAccess for FileKeyStore {
    async fn decrypt(
        &self,
        label: &str,
        password: &str,
    ) -> Result<Zeroizing<Vec<u8>>, KeyringError> {
        let sealed = self.get(label).await?;
        let password = Zeroizing::new(password.to_owned());
        let label = label.to_owned();
        blocking(move || sealed.open(&password, &label)).await
    }
}
