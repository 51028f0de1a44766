//! Core library for voxchat.
//!
//! Owns everything below the screens of the voice assistant client:
//! - `auth`: session state, credential storage, token refresh and the
//!   request authorization pipeline
//! - `api`: REST client for the conversation backend
//! - `models`: request/response types shared with front-ends
//! - `transcript`: turns voice transcription segments into chat messages
//! - `config`: persisted settings and environment overrides

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
pub mod transcript;

pub use api::{ApiClient, ApiError};
pub use auth::{
    AuthError, CredentialRecord, CredentialStore, EncryptedFileStore, KeyringStore, MemoryStore,
    RefreshCoordinator, RequestAuthorizer, RetryOnExpiry, Session, SessionState,
};
pub use config::Config;
