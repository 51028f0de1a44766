use anyhow::{Context, Result};
use reqwest::header::{HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::Request;
use tracing::{debug, warn};

use super::session::SessionState;

/// Secondary header carrying the same credential with a lowercase scheme
pub const API_AUTH_HEADER: &str = "x-api-auth";

/// Path fragments of endpoints that issue credentials and must never carry them
const CREDENTIAL_PATHS: [&str; 3] = ["/auth/login", "/auth/register", "/auth/refresh"];

/// Whether `path` targets login, register or refresh.
pub fn is_credential_endpoint(path: &str) -> bool {
    CREDENTIAL_PATHS.iter().any(|p| path.contains(p))
}

/// Set both authorization headers on `request`, replacing earlier values.
pub fn apply_bearer(request: &mut Request, token: &str) -> Result<()> {
    let standard = HeaderValue::from_str(&format!("Bearer {}", token))
        .context("Access token is not a valid header value")?;
    let secondary = HeaderValue::from_str(&format!("bearer {}", token))
        .context("Access token is not a valid header value")?;

    let headers = request.headers_mut();
    headers.insert(AUTHORIZATION, standard);
    headers.insert(HeaderName::from_static(API_AUTH_HEADER), secondary);
    Ok(())
}

/// The bearer token a request was sent with, if any.
pub fn bearer_token_of(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

/// Attaches the current access token to outgoing protected requests.
#[derive(Clone)]
pub struct RequestAuthorizer {
    session: SessionState,
}

impl RequestAuthorizer {
    pub fn new(session: SessionState) -> Self {
        Self { session }
    }

    /// Decorate `request` in place.
    ///
    /// Requests without a token are passed through untouched and left for
    /// the server to reject.
    pub fn authorize(&self, request: &mut Request) {
        let path = request.url().path().to_string();
        if is_credential_endpoint(&path) {
            debug!(path = %path, "Skipping auth headers for credential endpoint");
            return;
        }

        match self.session.access_token() {
            Some(token) => {
                if let Err(e) = apply_bearer(request, &token) {
                    warn!(path = %path, error = %e, "Could not attach access token");
                } else {
                    debug!(path = %path, "Attached auth headers");
                }
            }
            None => warn!(path = %path, "No access token for protected request"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::MemoryStore;
    use reqwest::{Method, Url};
    use std::sync::Arc;

    fn request(path: &str) -> Request {
        let url = Url::parse(&format!("https://api.example.com{}", path)).unwrap();
        Request::new(Method::GET, url)
    }

    fn logged_in() -> SessionState {
        let state = SessionState::load(Arc::new(MemoryStore::new()));
        state.login("A1".into(), "R1".into(), "ada@example.com".into());
        state
    }

    #[test]
    fn test_is_credential_endpoint() {
        assert!(is_credential_endpoint("/api/v1/auth/login"));
        assert!(is_credential_endpoint("/api/v1/auth/register"));
        assert!(is_credential_endpoint("/api/v1/auth/refresh"));
        assert!(!is_credential_endpoint("/api/v1/auth/logout"));
        assert!(!is_credential_endpoint("/api/v1/conversations/"));
    }

    #[test]
    fn test_protected_request_gets_both_headers() {
        let authorizer = RequestAuthorizer::new(logged_in());
        let mut req = request("/api/v1/conversations/");
        authorizer.authorize(&mut req);

        assert_eq!(req.headers()[AUTHORIZATION], "Bearer A1");
        assert_eq!(req.headers()[API_AUTH_HEADER], "bearer A1");
        assert_eq!(bearer_token_of(&req), Some("A1"));
    }

    #[test]
    fn test_login_request_is_never_decorated() {
        let authorizer = RequestAuthorizer::new(logged_in());
        let mut req = request("/api/v1/auth/login");
        authorizer.authorize(&mut req);

        assert!(req.headers().get(AUTHORIZATION).is_none());
        assert!(req.headers().get(API_AUTH_HEADER).is_none());
    }

    #[test]
    fn test_logged_out_request_passes_through() {
        let state = SessionState::load(Arc::new(MemoryStore::new()));
        let authorizer = RequestAuthorizer::new(state);
        let mut req = request("/api/v1/conversations/");
        authorizer.authorize(&mut req);

        assert!(req.headers().is_empty());
        assert_eq!(bearer_token_of(&req), None);
    }

    #[test]
    fn test_apply_bearer_replaces_previous_token() {
        let mut req = request("/api/v1/users/me");
        apply_bearer(&mut req, "old").unwrap();
        apply_bearer(&mut req, "new").unwrap();

        assert_eq!(req.headers().get_all(AUTHORIZATION).iter().count(), 1);
        assert_eq!(bearer_token_of(&req), Some("new"));
    }

    #[test]
    fn test_apply_bearer_rejects_control_characters() {
        let mut req = request("/api/v1/users/me");
        assert!(apply_bearer(&mut req, "bad\ntoken").is_err());
    }
}
