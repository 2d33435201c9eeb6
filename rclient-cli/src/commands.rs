//! Command execution.
//!
//! Every command returns the JSON records it produced; printing is left to
//! the caller.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use rclient::config::ClientConfig;
use rclient::deploy::{DeployClient, PriceInfo, SourceText};
use rclient::events::TracingObserver;
use rclient::invoke::SignedInvocationProxy;
use rclient::keyring::{
    FileKeyStore, KeyringAccess, SealedKey, SigningContext, is_web3_keystore,
};
use rclient::publisher::ModulePublisher;
use rclient::registry::{FileRegistry, ModuleAddress};
use rclient::util::timestamp_ms;
use rclient::wallet::WalletProtocol;
use rclient::{Error, Stage};
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::Command;

type PasswordSource = Box<dyn Fn(&str) -> std::io::Result<String> + Send + Sync>;

/// Executes commands against one configuration.
pub struct Runner {
    config: ClientConfig,
    passwords: PasswordSource,
}

impl fmt::Debug for Runner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runner")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Runner {
    /// Runner that reads passwords from the terminal without echo.
    #[must_use]
    pub fn new(config: ClientConfig) -> Self {
        Self::with_password_source(config, |prompt: &str| rpassword::prompt_password(prompt))
    }

    /// Runner with a custom password source.
    pub fn with_password_source(
        config: ClientConfig,
        passwords: impl Fn(&str) -> std::io::Result<String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            config,
            passwords: Box::new(passwords),
        }
    }

    /// Run `command` and return its output records.
    ///
    /// # Errors
    ///
    /// Any failure of the command, tagged with the stage it happened in
    /// where one applies.
    pub async fn run(&self, command: Command) -> Result<Vec<Value>> {
        match command {
            Command::Keygen { label } => self.keygen(&label).await,
            Command::Import { label, file } => self.import(&label, &file).await,
            Command::Info { label } => self.info(&label).await,
            Command::Sign { label, json, file } => self.sign(&label, json, &file).await,
            Command::Deploy { file } => self.deploy(&file).await,
            Command::Register { modules } => self.register(&modules).await,
            Command::GenVault { label, amount } => {
                self.wallet(&label, WalletCall::GenVault { amount }).await
            }
            Command::Claim { label } => self.wallet(&label, WalletCall::Claim).await,
            Command::Balance { label } => self.wallet(&label, WalletCall::Balance).await,
            Command::Publish {
                label,
                claimed,
                nonce,
            } => {
                let nonce = publish_nonce(nonce);
                self.wallet(&label, WalletCall::Publish { claimed, nonce })
                    .await
            }
            Command::Transfer { from, to, amount } => {
                self.wallet(&from, WalletCall::Transfer { to, amount })
                    .await
            }
        }
    }

    fn keystore(&self) -> FileKeyStore {
        FileKeyStore::new(&self.config.keystore)
    }

    fn password(&self, prompt: &str) -> Result<String> {
        (self.passwords)(prompt).context("cannot read password")
    }

    async fn unlock(&self, label: &str) -> Result<SigningContext> {
        let password = self.password(&format!("Password for {label}: "))?;
        self.keystore()
            .unlock(label, &password)
            .await
            .map_err(|e| Error::at(Stage::KeyAccess, e).into())
    }

    async fn keygen(&self, label: &str) -> Result<Vec<Value>> {
        let password = self.password(&format!("New password for {label}: "))?;
        let confirm = self.password("Repeat password: ")?;
        if password != confirm {
            bail!("passwords do not match");
        }
        let identities = self.keystore().generate(label, &password).await?;
        Ok(vec![json!({ "label": label, "identities": identities })])
    }

    async fn import(&self, label: &str, file: &Path) -> Result<Vec<Value>> {
        let content = tokio::fs::read_to_string(file)
            .await
            .with_context(|| format!("cannot read {}", file.display()))?;
        let record: Value = serde_json::from_str(&content)
            .with_context(|| format!("{} is not JSON", file.display()))?;
        let password = self.password(&format!("Password for {}: ", file.display()))?;
        let identities = if is_web3_keystore(&record) {
            self.keystore().import_web3(label, file, &password).await?
        } else {
            let sealed: SealedKey = serde_json::from_value(record)
                .with_context(|| format!("{} is not a sealed key", file.display()))?;
            self.keystore().import(label, sealed, &password).await?
        };
        Ok(vec![json!({ "label": label, "identities": identities })])
    }

    async fn info(&self, label: &str) -> Result<Vec<Value>> {
        let signer = self.unlock(label).await?;
        Ok(vec![json!({ "label": label, "identities": signer.identities() })])
    }

    async fn sign(&self, label: &str, as_json: bool, file: &Path) -> Result<Vec<Value>> {
        let data = tokio::fs::read(file)
            .await
            .with_context(|| format!("cannot read {}", file.display()))?;
        let message = if as_json {
            canonical_json(&data).with_context(|| format!("{} is not JSON", file.display()))?
        } else {
            data
        };
        let signer = self.unlock(label).await?;
        let signature = signer
            .sign_legacy(&message)
            .map_err(|e| Error::at(Stage::Signing, e))?;
        Ok(vec![json!({
            "label": label,
            "address": signer.identities().legacy_address,
            "signature": hex::encode(signature.to_compact()),
        })])
    }

    async fn deploy(&self, file: &Path) -> Result<Vec<Value>> {
        let source = SourceText::read(file)
            .await
            .with_context(|| format!("cannot read {}", file.display()))?;
        let client = self.config.deploy_client()?;
        let id = client
            .deploy(&source.text, &self.config.price())
            .await
            .map_err(|e| Error::at(Stage::Submission, e))?;
        info!(source = %source.name, deploy_id = %id, "deployed");
        Ok(vec![json!({ "source": source.name, "deployId": id.as_str() })])
    }

    async fn register(&self, modules: &[PathBuf]) -> Result<Vec<Value>> {
        let mut sources = Vec::with_capacity(modules.len());
        for path in modules {
            let source = SourceText::read(path)
                .await
                .with_context(|| format!("cannot read {}", path.display()))?;
            sources.push(source);
        }
        let reports = self
            .publisher()?
            .ensure_loaded(&sources, &self.config.price())
            .await?;
        reports
            .iter()
            .map(|report| serde_json::to_value(report).map_err(Into::into))
            .collect()
    }

    fn publisher(&self) -> Result<ModulePublisher> {
        let registry = Arc::new(FileRegistry::new(&self.config.registry));
        let client: Arc<dyn DeployClient> = Arc::new(self.config.deploy_client()?);
        Ok(ModulePublisher::new(registry, client))
    }

    async fn tools_address(&self) -> Result<ModuleAddress> {
        let path = &self.config.tools_module;
        let source = SourceText::read(path)
            .await
            .map_err(|e| Error::at(Stage::Resolution, e))
            .with_context(|| format!("cannot read {}", path.display()))?;
        let descriptor = self
            .publisher()?
            .resolve(&source)
            .await
            .map_err(|e| Error::at(Stage::Resolution, e))?;
        debug!(address = %descriptor.address, "wallet module resolved");
        Ok(descriptor.address)
    }

    /// Resolve the wallet module, unlock `label` and run one flow.
    async fn wallet(&self, label: &str, call: WalletCall) -> Result<Vec<Value>> {
        let address = self.tools_address().await?;
        let signer = self.unlock(label).await?;

        let client: Arc<dyn DeployClient> = Arc::new(self.config.deploy_client()?);
        let phlo = self.config.phlo;
        let proxy = SignedInvocationProxy::new(client, address, move || {
            PriceInfo::new(phlo.limit, phlo.price)
        });
        let observer = TracingObserver;
        let wallet = WalletProtocol::new(&proxy, &signer, label, &observer);
        let report = match call {
            WalletCall::GenVault { amount } => wallet.gen_vault(amount).await?,
            WalletCall::Claim => wallet.claim().await?,
            WalletCall::Balance => wallet.balance().await?,
            WalletCall::Publish { claimed, nonce } => wallet.publish(claimed, nonce).await?,
            WalletCall::Transfer { to, amount } => wallet.transfer(&to, amount).await?,
        };
        Ok(vec![serde_json::to_value(report)?])
    }
}

enum WalletCall {
    GenVault { amount: u64 },
    Claim,
    Balance,
    Publish { claimed: bool, nonce: u64 },
    Transfer { to: String, amount: u64 },
}

/// The explicit nonce, or the current time in milliseconds.
#[must_use]
pub fn publish_nonce(explicit: Option<u64>) -> u64 {
    explicit.unwrap_or_else(timestamp_ms)
}

/// Compact JSON with object keys in sorted order.
///
/// # Errors
///
/// Returns an error if `data` is not valid JSON.
pub fn canonical_json(data: &[u8]) -> serde_json::Result<Vec<u8>> {
    let value: Value = serde_json::from_slice(data)?;
    serde_json::to_vec(&value)
}
