//! Encrypted on-disk credential store.
//!
//! File layout: `VXC` | version | salt (16) | nonce (24) | ciphertext.
//! The ciphertext is the JSON credential record sealed with
//! XChaCha20-Poly1305. The key comes either from a passphrase stretched
//! with Argon2id over the header salt, or from a random key held in the
//! OS keyring.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use argon2::Argon2;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use keyring::Entry;
use rand::rngs::OsRng;
use rand::RngCore;
use tracing::debug;

use super::credentials::{CredentialRecord, CredentialStore, SERVICE_NAME};

/// Default file name inside the cache directory
pub const CREDENTIALS_FILE: &str = "credentials.bin";

const FILE_MAGIC: [u8; 3] = *b"VXC";
const FILE_VERSION: u8 = 1;
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 24;
const KEY_LEN: usize = 32;
const HEADER_LEN: usize = FILE_MAGIC.len() + 1 + SALT_LEN + NONCE_LEN;

/// Keyring user holding the random file key
const KEY_ENTRY: &str = "vault-key";

/// Where the file encryption key comes from.
#[derive(Clone)]
pub enum VaultKey {
    /// Derive the key from a passphrase (headless machines without a keyring).
    Passphrase(String),
    /// Random key generated on first use and kept in the OS keyring under
    /// this service name.
    Keyring(String),
}

impl VaultKey {
    /// Random key in the OS keyring under the application's service name.
    pub fn os_keyring() -> Self {
        VaultKey::Keyring(SERVICE_NAME.to_string())
    }
}

impl std::fmt::Debug for VaultKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VaultKey::Passphrase(_) => write!(f, "Passphrase(REDACTED)"),
            VaultKey::Keyring(service) => write!(f, "Keyring({service})"),
        }
    }
}

pub struct EncryptedFileStore {
    path: PathBuf,
    salt: [u8; SALT_LEN],
    cipher: XChaCha20Poly1305,
}

impl EncryptedFileStore {
    /// Open (or prepare to create) the credential file at `path`.
    ///
    /// An existing file's salt is reused so the same passphrase keeps
    /// decrypting it.
    pub fn open(path: impl Into<PathBuf>, key: VaultKey) -> Result<Self> {
        let path = path.into();
        let salt = match read_salt(&path) {
            Some(salt) => salt,
            None => {
                let mut salt = [0u8; SALT_LEN];
                OsRng.fill_bytes(&mut salt);
                salt
            }
        };

        let key_bytes = match key {
            VaultKey::Passphrase(ref passphrase) => derive_key(passphrase, &salt)?,
            VaultKey::Keyring(ref service) => keyring_key(service)?,
        };
        let cipher = XChaCha20Poly1305::new(Key::from_slice(&key_bytes));

        debug!(path = %path.display(), "Encrypted credential store opened");
        Ok(Self { path, salt, cipher })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);
        let ciphertext = self
            .cipher
            .encrypt(XNonce::from_slice(&nonce), plaintext)
            .map_err(|e| anyhow!("Failed to encrypt credentials: {e}"))?;

        let mut out = Vec::with_capacity(HEADER_LEN + ciphertext.len());
        out.extend_from_slice(&FILE_MAGIC);
        out.push(FILE_VERSION);
        out.extend_from_slice(&self.salt);
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    fn open_sealed(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        if bytes.len() < HEADER_LEN || bytes[..FILE_MAGIC.len()] != FILE_MAGIC {
            bail!("Credential file is not a voxchat credential file");
        }
        let version = bytes[FILE_MAGIC.len()];
        if version != FILE_VERSION {
            bail!("Unsupported credential file version: {version}");
        }
        let nonce_start = FILE_MAGIC.len() + 1 + SALT_LEN;
        let nonce = XNonce::from_slice(&bytes[nonce_start..HEADER_LEN]);
        self.cipher
            .decrypt(nonce, &bytes[HEADER_LEN..])
            .map_err(|_| anyhow!("Failed to decrypt credential file (wrong key or tampered)"))
    }
}

impl CredentialStore for EncryptedFileStore {
    fn load(&self) -> Result<Option<CredentialRecord>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).context("Failed to read credential file"),
        };
        let plaintext = self.open_sealed(&bytes)?;
        let record =
            serde_json::from_slice(&plaintext).context("Failed to parse credential record")?;
        Ok(Some(record))
    }

    fn save(&self, record: &CredentialRecord) -> Result<()> {
        let plaintext = serde_json::to_vec(record)?;
        let sealed = self.seal(&plaintext)?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        // Write beside the target and rename so a crash never leaves half a record
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, &sealed).context("Failed to write credential file")?;
        restrict_permissions(&tmp)?;
        fs::rename(&tmp, &self.path).context("Failed to replace credential file")?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).context("Failed to remove credential file"),
        }
    }
}

fn read_salt(path: &Path) -> Option<[u8; SALT_LEN]> {
    let bytes = fs::read(path).ok()?;
    if bytes.len() < HEADER_LEN || bytes[..FILE_MAGIC.len()] != FILE_MAGIC {
        return None;
    }
    let start = FILE_MAGIC.len() + 1;
    let mut salt = [0u8; SALT_LEN];
    salt.copy_from_slice(&bytes[start..start + SALT_LEN]);
    Some(salt)
}

fn derive_key(passphrase: &str, salt: &[u8]) -> Result<[u8; KEY_LEN]> {
    let mut key = [0u8; KEY_LEN];
    Argon2::default()
        .hash_password_into(passphrase.as_bytes(), salt, &mut key)
        .map_err(|e| anyhow!("Failed to derive credential key: {e}"))?;
    Ok(key)
}

fn key_entry(service: &str) -> Result<Entry> {
    Entry::new(service, KEY_ENTRY).context("Failed to create keyring entry")
}

fn keyring_key(service: &str) -> Result<[u8; KEY_LEN]> {
    match key_entry(service)?.get_secret() {
        Ok(secret) => secret
            .try_into()
            .map_err(|_| anyhow!("Keyring credential key has wrong length")),
        Err(keyring::Error::NoEntry) => {
            let mut key = [0u8; KEY_LEN];
            OsRng.fill_bytes(&mut key);
            key_entry(service)?
                .set_secret(&key)
                .context("Failed to store credential key in keychain")?;

            // A key the keyring does not hand back would lock the file on the next run
            let stored = key_entry(service)?
                .get_secret()
                .context("Failed to read back credential key from keychain")?;
            if stored != key {
                bail!("Keyring did not retain the credential key");
            }
            debug!(service, "Generated credential file key");
            Ok(key)
        }
        Err(e) => Err(anyhow!(e).context("Failed to read credential key from keychain")),
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}
