//! Encrypted local secret store.
//!
//! A JSON file mapping alias → sealed entry. Entries are encrypted one by one,
//! so a corrupt entry only loses itself. A missing or unreadable file is an
//! empty store.
//!
//! All writes are read-modify-write cycles. They are serialized through an
//! async lock per store instance and, across instances and processes, through
//! an exclusive `<store>.lock` file. Files are replaced atomically (temp file
//! + rename).

use super::crypto::StoreKey;
use crate::error::StoreError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

const STORE_VERSION: u32 = 1;

const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(20);
const LOCK_TIMEOUT: Duration = Duration::from_secs(10);
/// A lock file older than this is left over from a crashed writer.
const LOCK_STALE_AFTER: Duration = Duration::from_secs(30);

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    #[serde(default)]
    version: u32,
    #[serde(default)]
    entries: BTreeMap<String, String>,
}

/// Local, file-backed secret cache.
#[derive(Debug)]
pub struct LocalSecretStore {
    path: PathBuf,
    key: StoreKey,
    write_lock: Mutex<()>,
}

impl LocalSecretStore {
    pub fn new(path: impl Into<PathBuf>, key: StoreKey) -> Self {
        Self {
            path: path.into(),
            key,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn key(&self) -> &StoreKey {
        &self.key
    }

    /// Decrypt every readable entry. Entries that fail to decrypt are logged
    /// and left out.
    pub async fn load_secrets(&self) -> HashMap<String, String> {
        let file = self.read_file().await;
        let mut secrets = HashMap::with_capacity(file.entries.len());
        for (alias, sealed) in &file.entries {
            match self.open_entry(alias, sealed) {
                Ok(value) => {
                    secrets.insert(alias.clone(), value);
                }
                Err(e) => warn!("Dropping local secret entry: {e}"),
            }
        }
        debug!(
            "Loaded {} of {} local secret(s) from {}",
            secrets.len(),
            file.entries.len(),
            self.path.display()
        );
        secrets
    }

    /// Replace the whole store with `secrets`.
    pub async fn save_secrets(&self, secrets: &HashMap<String, String>) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let _lock = self.acquire_file_lock().await?;
        let file = StoreFile {
            version: STORE_VERSION,
            entries: secrets
                .iter()
                .map(|(alias, value)| (alias.clone(), self.key.seal(value.as_bytes())))
                .collect(),
        };
        self.write_file(&file).await
    }

    /// Insert or overwrite one entry.
    pub async fn store_secret(&self, alias: &str, value: &str) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let _lock = self.acquire_file_lock().await?;
        let mut file = self.read_file().await;
        file.entries
            .insert(alias.to_string(), self.key.seal(value.as_bytes()));
        self.write_file(&file).await
    }

    /// Insert an entry only if the file has nothing under `alias`. Returns
    /// whether the store was written.
    ///
    /// An entry this key cannot decrypt is still an entry and is left alone:
    /// it may belong to the real key while this process runs with another.
    pub async fn store_if_absent(&self, alias: &str, value: &str) -> Result<bool, StoreError> {
        let _guard = self.write_lock.lock().await;
        let _lock = self.acquire_file_lock().await?;
        let mut file = self.read_file().await;
        if file.entries.contains_key(alias) {
            return Ok(false);
        }
        file.entries
            .insert(alias.to_string(), self.key.seal(value.as_bytes()));
        self.write_file(&file).await?;
        Ok(true)
    }

    /// Delete one entry. Returns whether it existed.
    pub async fn remove_secret(&self, alias: &str) -> Result<bool, StoreError> {
        let _guard = self.write_lock.lock().await;
        let _lock = self.acquire_file_lock().await?;
        let mut file = self.read_file().await;
        if file.entries.remove(alias).is_none() {
            return Ok(false);
        }
        self.write_file(&file).await?;
        Ok(true)
    }

    /// Aliases present in the file, readable or not.
    pub async fn aliases(&self) -> Vec<String> {
        self.read_file().await.entries.into_keys().collect()
    }

    fn open_entry(&self, alias: &str, sealed: &str) -> Result<String, StoreError> {
        self.key
            .open(sealed)
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .ok_or_else(|| StoreError::Decryption {
                alias: alias.to_string(),
            })
    }

    async fn read_file(&self) -> StoreFile {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return StoreFile::default(),
            Err(e) => {
                warn!(
                    "Cannot read secret store '{}': {e}; using an empty store",
                    self.path.display()
                );
                return StoreFile::default();
            }
        };

        match serde_json::from_str(&content) {
            Ok(file) => file,
            Err(e) => {
                warn!(
                    "Secret store '{}' is not valid JSON ({e}); using an empty store",
                    self.path.display()
                );
                StoreFile::default()
            }
        }
    }

    async fn write_file(&self, file: &StoreFile) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(file)?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_atomic(&path, &bytes))
            .await
            .map_err(|e| StoreError::Persist(e.to_string()))??;

        debug!(
            "Wrote {} secret entr(ies) to {}",
            file.entries.len(),
            self.path.display()
        );
        Ok(())
    }

    /// Take the exclusive lock file, waiting for other writers.
    async fn acquire_file_lock(&self) -> Result<FileLock, StoreError> {
        let lock_path = lock_path_for(&self.path);
        if let Some(dir) = lock_path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }

        let started = tokio::time::Instant::now();
        loop {
            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&lock_path)
                .await
            {
                Ok(_) => return Ok(FileLock { path: lock_path }),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if lock_is_stale(&lock_path).await {
                        warn!("Removing stale secret store lock '{}'", lock_path.display());
                        let _ = tokio::fs::remove_file(&lock_path).await;
                        continue;
                    }
                    if started.elapsed() >= LOCK_TIMEOUT {
                        return Err(StoreError::Locked(lock_path.display().to_string()));
                    }
                    tokio::time::sleep(LOCK_RETRY_INTERVAL).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Held lock file. Removed on drop.
#[derive(Debug)]
struct FileLock {
    path: PathBuf,
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(
                "Failed to release secret store lock '{}': {e}",
                self.path.display()
            );
        }
    }
}

fn lock_path_for(store: &Path) -> PathBuf {
    let mut name = store.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

async fn lock_is_stale(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .ok()
        .and_then(|meta| meta.modified().ok())
        .and_then(|modified| modified.elapsed().ok())
        .map_or(false, |age| age > LOCK_STALE_AFTER)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }
    tmp.write_all(bytes)?;
    tmp.flush()?;
    tmp.persist(path)
        .map_err(|e| StoreError::Persist(e.to_string()))?;
    Ok(())
}
