//! JSON file registry backend.
//!
//! The file holds a single object keyed by hex digest:
//!
//! ```text
//! {
//!   "5f1c...": { "digest": "5f1c...", "address": "rho:id:...", "registeredAt": 1700000000000 }
//! }
//! ```
//!
//! Every write takes an exclusive OS lock on a sidecar `<file>.lock`, then
//! re-reads the file, merges, and replaces it through a rename. A crash
//! mid-write never leaves a truncated registry, and writers in different
//! processes merge instead of overwriting each other.

use std::collections::{BTreeMap, HashMap};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use fs2::FileExt;
use tokio::sync::Mutex;
use tracing::debug;

use super::{ModuleDescriptor, RegistryResult, RegistryStore, merge_entries};
use crate::digest::ContentDigest;

/// Registry persisted as a JSON file.
#[derive(Debug)]
pub struct FileRegistry {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileRegistry {
    /// Create a registry backed by `path`. The file is created on first write.
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

    /// Read the whole registry. A missing file is an empty registry.
    pub async fn load(&self) -> RegistryResult<HashMap<ContentDigest, ModuleDescriptor>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(e) => return Err(e.into()),
        };
        if content.trim().is_empty() {
            return Ok(HashMap::new());
        }
        let modules: HashMap<ContentDigest, ModuleDescriptor> = serde_json::from_str(&content)?;
        Ok(modules)
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".lock");
        self.path.with_file_name(name)
    }

    /// Block until this process holds the cross-process write lock.
    ///
    /// The lock is released when the returned file is dropped.
    async fn lock_file(&self) -> RegistryResult<File> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        let lock_path = self.lock_path();
        let file = tokio::task::spawn_blocking(move || -> std::io::Result<File> {
            let file = OpenOptions::new()
                .create(true)
                .truncate(false)
                .write(true)
                .open(&lock_path)?;
            file.lock_exclusive()?;
            Ok(file)
        })
        .await
        .map_err(std::io::Error::other)??;
        Ok(file)
    }

    async fn persist(
        &self,
        modules: &HashMap<ContentDigest, ModuleDescriptor>,
    ) -> RegistryResult<()> {
        // Sorted keys keep the file stable under version control.
        let ordered: BTreeMap<String, &ModuleDescriptor> =
            modules.iter().map(|(k, v)| (k.to_hex(), v)).collect();
        let content = serde_json::to_string_pretty(&ordered)?;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = self.path.with_extension(format!(
            "tmp-{}-{}",
            std::process::id(),
            uuid::Uuid::new_v4().simple()
        ));
        tokio::fs::write(&tmp, content).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }
}

#[async_trait]
impl RegistryStore for FileRegistry {
    async fn lookup(
        &self,
        digests: &[ContentDigest],
    ) -> RegistryResult<HashMap<ContentDigest, ModuleDescriptor>> {
        let mut modules = self.load().await?;
        Ok(digests
            .iter()
            .filter_map(|d| modules.remove(d).map(|m| (*d, m)))
            .collect())
    }

    async fn upsert_all(&self, entries: &[ModuleDescriptor]) -> RegistryResult<()> {
        let _guard = self.write_lock.lock().await;
        let _file_lock = self.lock_file().await?;

        let mut modules = self.load().await?;
        let added = merge_entries(&mut modules, entries)?;
        if added == 0 {
            debug!(path = %self.path.display(), "registry already up to date");
            return Ok(());
        }

        self.persist(&modules).await?;
        debug!(path = %self.path.display(), added, total = modules.len(), "registry saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::{Hasher, Keccak256Hasher};
    use crate::registry::ModuleAddress;

    fn entry(src: &str, address: &str) -> ModuleDescriptor {
        ModuleDescriptor::new(
            Keccak256Hasher.digest(src.as_bytes()),
            ModuleAddress::new(address),
        )
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let registry = FileRegistry::new(dir.path().join("registry.json"));
        assert!(registry.load().await.unwrap().is_empty());
        assert!(!registry.path().exists());
    }

    #[tokio::test]
    async fn test_file_round_trip_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("registry.json");

        let tools = entry("tools", "rho:id:tools");
        FileRegistry::new(&path)
            .upsert_all(std::slice::from_ref(&tools))
            .await
            .unwrap();

        // A second process sees the first one's writes.
        let reopened = FileRegistry::new(&path);
        let found = reopened.lookup(&[tools.digest]).await.unwrap();
        assert_eq!(found[&tools.digest], tools);
    }

    #[tokio::test]
    async fn test_writers_merge_instead_of_clobbering() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");
        let first = FileRegistry::new(&path);
        let second = FileRegistry::new(&path);

        first.upsert_all(&[entry("a", "rho:id:a")]).await.unwrap();
        second.upsert_all(&[entry("b", "rho:id:b")]).await.unwrap();
        // Same digest, same address: accepted repeatedly.
        second.upsert_all(&[entry("a", "rho:id:a")]).await.unwrap();

        assert_eq!(first.load().await.unwrap().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writers_keep_every_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");

        for round in 0..20 {
            // Separate instances share no in-process lock, like two processes.
            let first = FileRegistry::new(&path);
            let second = FileRegistry::new(&path);
            let a = entry(&format!("a{round}"), &format!("rho:id:a{round}"));
            let b = entry(&format!("b{round}"), &format!("rho:id:b{round}"));

            let (ra, rb) = tokio::join!(
                tokio::spawn(async move { first.upsert_all(&[a]).await }),
                tokio::spawn(async move { second.upsert_all(&[b]).await }),
            );
            ra.unwrap().unwrap();
            rb.unwrap().unwrap();

            let modules = FileRegistry::new(&path).load().await.unwrap();
            assert_eq!(modules.len(), 2 * (round + 1), "round {round}");
        }
        assert!(path.with_file_name("registry.json.lock").exists());
    }

    #[tokio::test]
    async fn test_conflict_leaves_file_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");
        let registry = FileRegistry::new(&path);
        registry.upsert_all(&[entry("a", "rho:id:a")]).await.unwrap();
        let before = tokio::fs::read_to_string(&path).await.unwrap();

        let err = registry
            .upsert_all(&[entry("b", "rho:id:b"), entry("a", "rho:id:x")])
            .await
            .unwrap_err();

        assert!(err.is_conflict());
        assert_eq!(tokio::fs::read_to_string(&path).await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");
        tokio::fs::write(&path, "not json").await.unwrap();

        let err = FileRegistry::new(&path).lookup(&[]).await.unwrap_err();
        assert!(matches!(err, crate::registry::RegistryError::Json(_)));
    }
}
