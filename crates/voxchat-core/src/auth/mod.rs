//! Authentication module for managing the token session.
//!
//! This module provides:
//! - `SessionState`: observable in-memory session mirrored to a credential store
//! - `CredentialStore`: persistence backends (OS keyring, encrypted file, memory)
//! - `RefreshCoordinator`: single-flight access token refresh
//! - `RequestAuthorizer`: bearer header decoration for protected requests
//! - `RetryOnExpiry`: one-shot replay of requests rejected for expired credentials

pub mod authorizer;
pub mod credentials;
pub mod error;
pub mod refresh;
pub mod retry;
pub mod session;
pub mod vault;

pub use authorizer::{apply_bearer, bearer_token_of, is_credential_endpoint, RequestAuthorizer};
pub use credentials::{CredentialRecord, CredentialStore, KeyringStore, MemoryStore};
pub use error::AuthError;
pub use refresh::RefreshCoordinator;
pub use retry::{RetryBudget, RetryDecision, RetryOnExpiry};
pub use session::{Session, SessionState};
pub use vault::{EncryptedFileStore, VaultKey};
