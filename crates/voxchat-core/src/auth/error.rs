use thiserror::Error;

/// Failures of the token lifecycle.
///
/// `Clone` so that callers coalesced onto one refresh round can all
/// receive the same outcome.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("No refresh token available - login required")]
    NoRefreshToken,

    #[error("Refresh token rejected by server (status {status})")]
    InvalidRefreshToken { status: u16 },

    #[error("Token refresh failed: {0}")]
    TransientRefreshFailure(String),

    #[error("Request authorization expired (status {status})")]
    RequestAuthorizationExpired { status: u16 },
}

impl AuthError {
    /// Whether the local session was cleared as a consequence of this error.
    pub fn forces_logout(&self) -> bool {
        matches!(self, AuthError::InvalidRefreshToken { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_invalid_refresh_token_forces_logout() {
        assert!(AuthError::InvalidRefreshToken { status: 401 }.forces_logout());
        assert!(!AuthError::NoRefreshToken.forces_logout());
        assert!(!AuthError::TransientRefreshFailure("timeout".into()).forces_logout());
        assert!(!AuthError::RequestAuthorizationExpired { status: 401 }.forces_logout());
    }

    #[test]
    fn test_display_includes_status() {
        let err = AuthError::InvalidRefreshToken { status: 403 };
        assert_eq!(err.to_string(), "Refresh token rejected by server (status 403)");
    }
}
