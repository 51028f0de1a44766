//! REST API client module for the voice assistant backend.
//!
//! This module provides the `ApiClient` for logging in and for managing
//! conversations, messages and voice sessions.
//!
//! The API uses bearer token authentication; expired access tokens are
//! renewed through the refresh endpoint and the failed request replayed.

pub mod client;
pub mod error;

pub use client::ApiClient;
pub use error::ApiError;
