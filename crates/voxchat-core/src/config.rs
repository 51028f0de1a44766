//! Application configuration management.
//!
//! This module handles loading and saving the application configuration:
//! backend URL, request timeout, credential backend and last used account.
//!
//! Configuration is stored at `~/.config/voxchat/config.json`; environment
//! variables override the file.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::api::client::DEFAULT_TIMEOUT_SECS;
use crate::auth::vault::CREDENTIALS_FILE;
use crate::auth::{CredentialStore, EncryptedFileStore, KeyringStore, MemoryStore, VaultKey};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "voxchat";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Backend used when nothing is configured
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000";

pub const ENV_API_BASE_URL: &str = "VOXCHAT_API_BASE_URL";
pub const ENV_CREDENTIAL_BACKEND: &str = "VOXCHAT_CREDENTIAL_BACKEND";
pub const ENV_VAULT_PASSPHRASE: &str = "VOXCHAT_VAULT_PASSPHRASE";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialBackend {
    /// One secret in the OS keychain
    #[default]
    Keyring,
    /// Encrypted file in the cache directory
    File,
}

impl std::str::FromStr for CredentialBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "keyring" => Ok(CredentialBackend::Keyring),
            "file" => Ok(CredentialBackend::File),
            other => bail!("Unknown credential backend: {}", other),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub api_base_url: Option<String>,
    pub request_timeout_secs: Option<u64>,
    #[serde(default)]
    pub credential_backend: CredentialBackend,
    pub last_account: Option<String>,
    /// Never written to disk; only taken from the environment
    #[serde(skip)]
    pub vault_passphrase: Option<String>,
}

impl Config {
    /// Load the config file and apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_file()?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Load the config file only. Use this before `save` so overrides
    /// from the environment are not written back.
    pub fn load_file() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            Ok(serde_json::from_str(&contents)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Apply overrides from `lookup` (the process environment in `load`).
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(url) = lookup(ENV_API_BASE_URL).filter(|v| !v.trim().is_empty()) {
            debug!(url = %url, "API base URL overridden from environment");
            self.api_base_url = Some(url);
        }
        if let Some(backend) = lookup(ENV_CREDENTIAL_BACKEND) {
            self.credential_backend = backend.parse()?;
        }
        if let Some(passphrase) = lookup(ENV_VAULT_PASSPHRASE).filter(|v| !v.is_empty()) {
            self.vault_passphrase = Some(passphrase);
        }
        Ok(())
    }

    pub fn api_base_url(&self) -> &str {
        self.api_base_url.as_deref().unwrap_or(DEFAULT_API_BASE_URL)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    /// Open the configured credential store.
    pub fn open_credential_store(&self) -> Result<Arc<dyn CredentialStore>> {
        match self.credential_backend {
            CredentialBackend::Keyring => Ok(Arc::new(KeyringStore::new())),
            CredentialBackend::File => {
                let key = match &self.vault_passphrase {
                    Some(passphrase) => VaultKey::Passphrase(passphrase.clone()),
                    None => VaultKey::os_keyring(),
                };
                let path = self.cache_dir()?.join(CREDENTIALS_FILE);
                let store = EncryptedFileStore::open(path, key)?;
                info!(path = %store.path().display(), "Using encrypted credential file");
                Ok(Arc::new(store))
            }
        }
    }

    /// Open the configured credential store, or keep the session in memory
    /// when it is unavailable. Never fails: a missing store means logged out.
    pub fn credential_store_or_memory(&self) -> Arc<dyn CredentialStore> {
        memory_fallback(self.open_credential_store())
    }
}

fn memory_fallback(opened: Result<Arc<dyn CredentialStore>>) -> Arc<dyn CredentialStore> {
    match opened {
        Ok(store) => store,
        Err(e) => {
            warn!(error = %e, "Credential store unavailable, session kept in memory only");
            Arc::new(MemoryStore::new())
        }
    }
}
