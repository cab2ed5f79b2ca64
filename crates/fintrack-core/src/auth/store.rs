//! Durable storage for the access and refresh credentials.
//!
//! Stores are plain key/value holders: nothing here inspects or validates
//! the tokens. The session guard receives a store through `Arc<dyn TokenStore>`
//! so tests can substitute `MemoryTokenStore`.

use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Context, Result};
use keyring::Entry;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::config::{Config, StorageKeys, TokenBackend};

/// Token file name in the cache directory
const TOKEN_FILE: &str = "tokens.json";

/// Keychain service name for `KeyringTokenStore`
const SERVICE_NAME: &str = "fintrack";

pub trait TokenStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove both credentials.
    fn clear(&self) -> Result<()>;
}

/// In-process store. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-populated with the given entries
    pub fn with_entries<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let map = entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Self {
            entries: Mutex::new(map),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|_| anyhow::anyhow!("Token store lock poisoned"))
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.lock()?.clear();
        Ok(())
    }
}

/// JSON file in the cache directory holding a flat key/value object.
///
/// Every write goes to a temporary file in the same directory which is then
/// renamed over `tokens.json`, so readers never see a half-written file.
pub struct FileTokenStore {
    cache_dir: PathBuf,
    // Serialises reads and read-modify-write cycles within this process
    file_lock: Mutex<()>,
}

impl FileTokenStore {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self {
            cache_dir,
            file_lock: Mutex::new(()),
        }
    }

    fn token_path(&self) -> PathBuf {
        self.cache_dir.join(TOKEN_FILE)
    }

    fn lock(&self) -> Result<MutexGuard<'_, ()>> {
        self.file_lock
            .lock()
            .map_err(|_| anyhow::anyhow!("Token file lock poisoned"))
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>> {
        let contents = match std::fs::read_to_string(self.token_path()) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(e).context("Failed to read token file"),
        };
        serde_json::from_str(&contents).context("Failed to parse token file")
    }

    fn write_all(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        std::fs::create_dir_all(&self.cache_dir)
            .with_context(|| format!("Failed to create {}", self.cache_dir.display()))?;

        let mut file = NamedTempFile::new_in(&self.cache_dir).context("Failed to create temporary token file")?;
        serde_json::to_writer_pretty(&mut file, entries)?;
        file.flush()?;
        file.persist(self.token_path())
            .map_err(|e| e.error)
            .context("Failed to replace token file")?;
        Ok(())
    }
}

impl TokenStore for FileTokenStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.lock()?;
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.lock()?;
        let mut entries = self.read_all()?;
        entries.insert(key.to_string(), value.to_string());
        self.write_all(&entries)
    }

    fn clear(&self) -> Result<()> {
        let _guard = self.lock()?;
        match std::fs::remove_file(self.token_path()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).context("Failed to remove token file"),
        }
    }
}

/// OS keychain, one entry per storage key.
pub struct KeyringTokenStore {
    service: String,
    keys: StorageKeys,
}

impl KeyringTokenStore {
    pub fn new(keys: StorageKeys) -> Self {
        Self::with_service(SERVICE_NAME, keys)
    }

    pub fn with_service(service: &str, keys: StorageKeys) -> Self {
        Self {
            service: service.to_string(),
            keys,
        }
    }

    fn entry(&self, key: &str) -> Result<Entry> {
        Entry::new(&self.service, key).context("Failed to create keyring entry")
    }
}

impl TokenStore for KeyringTokenStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).context("Failed to retrieve token from keychain"),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entry(key)?
            .set_password(value)
            .context("Failed to store token in keychain")
    }

    fn clear(&self) -> Result<()> {
        for key in [&self.keys.access, &self.keys.refresh] {
            match self.entry(key)?.delete_credential() {
                Ok(()) | Err(keyring::Error::NoEntry) => {}
                Err(e) => return Err(e).context("Failed to delete token from keychain"),
            }
            debug!(key = %key, "Removed keychain entry");
        }
        Ok(())
    }
}

/// Open the store selected by the configuration
pub fn open_store(config: &Config) -> Result<Arc<dyn TokenStore>> {
    let store: Arc<dyn TokenStore> = match config.token_backend {
        TokenBackend::File => Arc::new(FileTokenStore::new(config.cache_dir()?)),
        TokenBackend::Keyring => Arc::new(KeyringTokenStore::new(config.storage_keys.clone())),
    };
    debug!(backend = ?config.token_backend, "Opened token store");
    Ok(store)
}
