//! Single-flight access token refresh.
//!
//! Every entry point funnels through one async mutex. A caller that queued
//! behind a refresh in progress returns that round's outcome instead of
//! calling the endpoint again.

use std::sync::atomic::{AtomicU64, Ordering};

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::error::AuthError;
use super::session::SessionState;

/// Path of the refresh endpoint, relative to the API base URL
pub const REFRESH_PATH: &str = "/api/v1/auth/refresh";

#[derive(Debug, Serialize)]
struct RefreshTokenRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Debug, Deserialize)]
struct RefreshTokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

pub struct RefreshCoordinator {
    http: Client,
    refresh_url: String,
    session: SessionState,
    gate: Mutex<Option<Result<(), AuthError>>>,
    rounds: AtomicU64,
    runtime: Option<Handle>,
}

impl RefreshCoordinator {
    /// `http` must be a plain client: the refresh call never goes through
    /// the authorizing pipeline.
    pub fn new(http: Client, base_url: &str, session: SessionState) -> Self {
        Self {
            http,
            refresh_url: format!("{}{}", base_url.trim_end_matches('/'), REFRESH_PATH),
            session,
            gate: Mutex::new(None),
            rounds: AtomicU64::new(0),
            runtime: Handle::try_current().ok(),
        }
    }

    /// Refresh the access token, reporting only success.
    pub async fn refresh(&self) -> bool {
        self.try_refresh().await.is_ok()
    }

    /// Refresh the access token.
    ///
    /// On `InvalidRefreshToken` the session has been cleared; on any other
    /// error it is left as it was.
    pub async fn try_refresh(&self) -> Result<(), AuthError> {
        let observed = self.rounds.load(Ordering::Acquire);
        let mut last = self.gate.lock().await;

        if self.rounds.load(Ordering::Acquire) != observed {
            if let Some(outcome) = last.as_ref() {
                debug!(ok = outcome.is_ok(), "Joined refresh that completed while waiting");
                return outcome.clone();
            }
        }

        let outcome = self.run_refresh().await;
        *last = Some(outcome.clone());
        self.rounds.fetch_add(1, Ordering::Release);
        outcome
    }

    /// Blocking variant for synchronous callers.
    ///
    /// Inside a multi-thread runtime the worker is handed off with
    /// `block_in_place`. From a plain thread the multi-thread runtime
    /// captured at construction drives the call, or a temporary one if
    /// there is none. A current-thread runtime cannot be blocked on, so
    /// the refresh is refused there.
    pub fn refresh_blocking(&self) -> bool {
        match Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(|| handle.block_on(self.refresh()))
            }
            Ok(_) => {
                error!("refresh_blocking called on a current-thread runtime, refusing to block");
                false
            }
            Err(_) => match &self.runtime {
                Some(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                    handle.block_on(self.refresh())
                }
                _ => match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                    Ok(rt) => rt.block_on(self.refresh()),
                    Err(e) => {
                        error!(error = %e, "Failed to start runtime for blocking refresh");
                        false
                    }
                },
            },
        }
    }

    /// Number of refresh rounds that reached the critical section.
    pub fn rounds(&self) -> u64 {
        self.rounds.load(Ordering::Acquire)
    }

    async fn run_refresh(&self) -> Result<(), AuthError> {
        let Some(refresh_token) = self.session.refresh_token() else {
            warn!("No refresh token available, cannot refresh");
            return Err(AuthError::NoRefreshToken);
        };

        info!("Attempting to refresh access token");
        let response = self
            .http
            .post(&self.refresh_url)
            .json(&RefreshTokenRequest {
                refresh_token: &refresh_token,
            })
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Network error during token refresh");
                AuthError::TransientRefreshFailure(format!("network error: {}", e))
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            error!(error = %e, "Failed to read refresh response");
            AuthError::TransientRefreshFailure(format!("failed to read response: {}", e))
        })?;

        if status.is_success() {
            let parsed: RefreshTokenResponse = serde_json::from_str(&body).map_err(|e| {
                error!(error = %e, "Failed to parse refresh response");
                AuthError::TransientRefreshFailure(format!("invalid response: {}", e))
            })?;
            self.session
                .apply_refresh(parsed.access_token, parsed.refresh_token, parsed.expires_in);
            info!("Access token refreshed");
            return Ok(());
        }

        match status.as_u16() {
            code @ (400 | 401 | 403) => {
                warn!(status = code, "Refresh token invalid or expired, logging out");
                self.session.logout();
                Err(AuthError::InvalidRefreshToken { status: code })
            }
            code => {
                error!(status = code, "Token refresh failed");
                Err(AuthError::TransientRefreshFailure(format!("server returned {}", status)))
            }
        }
    }
}
