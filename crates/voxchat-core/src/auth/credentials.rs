use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use keyring::Entry;
use serde::{Deserialize, Serialize};

/// Keyring service name shared by every voxchat secret
pub(crate) const SERVICE_NAME: &str = "voxchat";

/// Keyring user under which the session record is stored
const SESSION_ENTRY: &str = "session";

/// Persisted form of the session: three secrets written as one group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub account_id: Option<String>,
}

impl CredentialRecord {
    pub fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none() && self.account_id.is_none()
    }
}

/// Persistent storage for the credential record.
///
/// Implementations report failures; `SessionState` decides how to degrade.
/// `load` returns `Ok(None)` when nothing has been stored yet.
pub trait CredentialStore: Send + Sync {
    fn load(&self) -> Result<Option<CredentialRecord>>;
    fn save(&self, record: &CredentialRecord) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

/// Stores the record in the OS keychain as a single JSON secret.
pub struct KeyringStore {
    service: String,
}

impl KeyringStore {
    pub fn new() -> Self {
        Self::with_service(SERVICE_NAME)
    }

    pub fn with_service(service: &str) -> Self {
        Self {
            service: service.to_string(),
        }
    }

    fn entry(&self) -> Result<Entry> {
        Entry::new(&self.service, SESSION_ENTRY).context("Failed to create keyring entry")
    }
}

impl Default for KeyringStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialStore for KeyringStore {
    fn load(&self) -> Result<Option<CredentialRecord>> {
        match self.entry()?.get_password() {
            Ok(json) => {
                let record = serde_json::from_str(&json)
                    .context("Failed to parse credential record from keychain")?;
                Ok(Some(record))
            }
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(anyhow!(e).context("Failed to read credentials from keychain")),
        }
    }

    fn save(&self, record: &CredentialRecord) -> Result<()> {
        let json = serde_json::to_string(record)?;
        self.entry()?
            .set_password(&json)
            .context("Failed to store credentials in keychain")
    }

    fn clear(&self) -> Result<()> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(anyhow!(e).context("Failed to delete credentials from keychain")),
        }
    }
}

/// Process-local store. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryStore {
    record: Mutex<Option<CredentialRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with a record already present, as if persisted by a previous run.
    pub fn with_record(record: CredentialRecord) -> Self {
        Self {
            record: Mutex::new(Some(record)),
        }
    }

    /// Current stored record, for inspection.
    pub fn snapshot(&self) -> Option<CredentialRecord> {
        self.record.lock().ok().and_then(|r| r.clone())
    }
}

impl CredentialStore for MemoryStore {
    fn load(&self) -> Result<Option<CredentialRecord>> {
        let guard = self
            .record
            .lock()
            .map_err(|_| anyhow!("credential store lock poisoned"))?;
        Ok(guard.clone())
    }

    fn save(&self, record: &CredentialRecord) -> Result<()> {
        let mut guard = self
            .record
            .lock()
            .map_err(|_| anyhow!("credential store lock poisoned"))?;
        *guard = Some(record.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let mut guard = self
            .record
            .lock()
            .map_err(|_| anyhow!("credential store lock poisoned"))?;
        *guard = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_starts_empty() {
        let store = MemoryStore::new();
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn test_memory_store_save_and_clear() {
        let store = MemoryStore::new();
        let record = CredentialRecord {
            access_token: Some("a".into()),
            refresh_token: Some("r".into()),
            account_id: Some("user@example.com".into()),
        };
        store.save(&record).unwrap();
        assert_eq!(store.load().unwrap(), Some(record));

        store.clear().unwrap();
        assert_eq!(store.snapshot(), None);
    }

    #[test]
    fn test_record_uses_fixed_keys() {
        let record = CredentialRecord {
            access_token: Some("a".into()),
            refresh_token: None,
            account_id: None,
        };
        let json: serde_json::Value = serde_json::to_value(&record).unwrap();
        assert_eq!(json["access_token"], "a");
        assert!(json["refresh_token"].is_null());
        assert!(json.get("account_id").is_some());
    }

    /// Keyring under a throwaway service, or `None` when the machine has no
    /// usable secret service (headless CI).
    fn scratch_keyring(name: &str) -> Option<KeyringStore> {
        let service = format!("voxchat-test-{}-{}", name, std::process::id());
        let store = KeyringStore::with_service(&service);
        let canary = CredentialRecord {
            account_id: Some("canary".into()),
            ..Default::default()
        };
        match store.save(&canary) {
            Ok(()) => Some(store),
            Err(e) => {
                eprintln!("skipping keyring test, no secret service: {e:#}");
                None
            }
        }
    }

    #[test]
    fn test_keyring_record_survives_new_store_instance() {
        let Some(store) = scratch_keyring("reload") else {
            return;
        };
        let record = CredentialRecord {
            access_token: Some("A1".into()),
            refresh_token: Some("R1".into()),
            account_id: Some("ada@example.com".into()),
        };
        store.save(&record).unwrap();

        let fresh = KeyringStore::with_service(&store.service);
        let loaded = fresh.load();
        store.clear().unwrap();

        assert_eq!(loaded.unwrap(), Some(record));
        assert_eq!(fresh.load().unwrap(), None);
    }

    #[test]
    fn test_keyring_session_survives_restart() {
        use crate::auth::SessionState;
        use std::sync::Arc;

        let Some(store) = scratch_keyring("restart") else {
            return;
        };
        let service = store.service.clone();
        let session = SessionState::load(Arc::new(store));
        session.login("A1".into(), "R1".into(), "ada@example.com".into());

        let restarted = SessionState::load(Arc::new(KeyringStore::with_service(&service)));
        let authenticated = restarted.is_authenticated();
        let token = restarted.refresh_token();
        restarted.logout();

        assert!(authenticated);
        assert_eq!(token.as_deref(), Some("R1"));
    }

    #[test]
    fn test_record_is_empty() {
        assert!(CredentialRecord::default().is_empty());
        let record = CredentialRecord {
            account_id: Some("x".into()),
            ..Default::default()
        };
        assert!(!record.is_empty());
    }
}
