use std::sync::Arc;

use reqwest::{Request, StatusCode};
use tracing::{debug, error, info, warn};

use super::authorizer::{bearer_token_of, is_credential_endpoint};
use super::error::AuthError;
use super::refresh::RefreshCoordinator;
use super::session::SessionState;

/// How many times one original request may be replayed.
#[derive(Debug, Clone, Copy)]
pub struct RetryBudget {
    remaining: u8,
}

impl RetryBudget {
    pub fn once() -> Self {
        Self { remaining: 1 }
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }

    fn take(&mut self) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        true
    }
}

impl Default for RetryBudget {
    fn default() -> Self {
        Self::once()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Replay the request with this access token.
    Retry { token: String },
    /// Return the failed response to the caller.
    GiveUp,
}

/// Decides whether a response rejected for expired credentials is replayed.
#[derive(Clone)]
pub struct RetryOnExpiry {
    session: SessionState,
    coordinator: Arc<RefreshCoordinator>,
}

impl RetryOnExpiry {
    pub fn new(session: SessionState, coordinator: Arc<RefreshCoordinator>) -> Self {
        Self {
            session,
            coordinator,
        }
    }

    /// Inspect a completed `request` that came back with `status`.
    ///
    /// Waits for any refresh it triggers before deciding. A `Retry` consumes
    /// `budget`; an exhausted budget always gives up.
    pub async fn on_response(
        &self,
        request: &Request,
        status: StatusCode,
        budget: &mut RetryBudget,
    ) -> RetryDecision {
        if status != StatusCode::UNAUTHORIZED && status != StatusCode::BAD_REQUEST {
            return RetryDecision::GiveUp;
        }

        let path = request.url().path();
        let expired = AuthError::RequestAuthorizationExpired {
            status: status.as_u16(),
        };
        debug!(path = %path, reason = %expired, "Authorization failure");

        if budget.is_exhausted() {
            warn!(path = %path, "Request already replayed once, giving up");
            return RetryDecision::GiveUp;
        }

        if is_credential_endpoint(path) {
            debug!(path = %path, "Credential endpoint, not attempting refresh");
            return RetryDecision::GiveUp;
        }

        let used = bearer_token_of(request);
        if let Some(current) = self.session.access_token() {
            if used != Some(current.as_str()) {
                debug!(path = %path, "Token changed while request was in flight, retrying");
                return self.retry(budget, current);
            }
        }

        info!(path = %path, "Access token rejected, attempting refresh");
        if !self.coordinator.refresh().await {
            warn!(path = %path, "Token refresh failed, not retrying request");
            return RetryDecision::GiveUp;
        }

        match self.session.access_token() {
            Some(token) => {
                info!(path = %path, "Token refreshed, retrying request");
                self.retry(budget, token)
            }
            None => {
                error!(path = %path, "Refresh reported success but no access token is set");
                RetryDecision::GiveUp
            }
        }
    }

    fn retry(&self, budget: &mut RetryBudget, token: String) -> RetryDecision {
        if budget.take() {
            RetryDecision::Retry { token }
        } else {
            RetryDecision::GiveUp
        }
    }
}
