use serde::Deserialize;
use thiserror::Error;

use crate::auth::AuthError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Error body shape used by the backend. Any field may be missing.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    error: Option<String>,
    errors: Option<Vec<String>>,
    detail: Option<String>,
}

impl ErrorBody {
    fn summary(self) -> Option<String> {
        let joined = self.errors.map(|errors| errors.join(", "));
        [self.message, self.detail, self.error, joined]
            .into_iter()
            .flatten()
            .find(|s| !s.trim().is_empty())
    }
}

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            return body.to_string();
        }
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
    }

    /// The backend's own message if the body has one, otherwise the raw body.
    fn describe_body(body: &str) -> String {
        match serde_json::from_str::<ErrorBody>(body) {
            Ok(parsed) => parsed.summary().unwrap_or_default(),
            Err(_) => Self::truncate_body(body),
        }
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let described = Self::describe_body(body);
        match status.as_u16() {
            400 => ApiError::BadRequest(described),
            401 => ApiError::Auth(AuthError::RequestAuthorizationExpired { status: 401 }),
            403 => ApiError::AccessDenied(described),
            404 => ApiError::NotFound(described),
            429 => ApiError::RateLimited,
            500..=599 => ApiError::ServerError(described),
            _ => ApiError::InvalidResponse(format!("Status {}: {}", status, described)),
        }
    }

    /// Like `from_status`, for login and register: a 401 there means the
    /// submitted credentials were wrong, not that a token expired.
    pub fn from_credential_status(status: reqwest::StatusCode, body: &str) -> Self {
        if status == reqwest::StatusCode::UNAUTHORIZED {
            ApiError::InvalidCredentials(Self::describe_body(body))
        } else {
            Self::from_status(status, body)
        }
    }

    /// Sentence suitable for showing to the user.
    pub fn user_message(&self) -> String {
        let backend = |msg: &str| (!msg.trim().is_empty()).then(|| msg.to_string());
        match self {
            ApiError::BadRequest(msg) => backend(msg.as_str()).unwrap_or_else(|| {
                "Invalid request. Please check your input and try again.".into()
            }),
            ApiError::InvalidCredentials(msg) => {
                backend(msg.as_str()).unwrap_or_else(|| "Incorrect email or password.".into())
            }
            ApiError::Auth(AuthError::NoRefreshToken)
            | ApiError::Auth(AuthError::InvalidRefreshToken { .. })
            | ApiError::Auth(AuthError::RequestAuthorizationExpired { .. }) => {
                "Authentication failed. Please log in again.".into()
            }
            ApiError::Auth(AuthError::TransientRefreshFailure(_)) => {
                "Could not renew your session. Please try again later.".into()
            }
            ApiError::AccessDenied(msg) => backend(msg.as_str())
                .unwrap_or_else(|| "You do not have permission to perform this action.".into()),
            ApiError::NotFound(msg) => backend(msg.as_str())
                .unwrap_or_else(|| "The requested information could not be found.".into()),
            ApiError::RateLimited => "Too many requests. Please wait and try again.".into(),
            ApiError::ServerError(msg) => backend(msg.as_str()).unwrap_or_else(|| {
                "The server encountered an error. Please try again later.".into()
            }),
            ApiError::NetworkError(_) => "Network error. Check your connection.".into(),
            ApiError::InvalidResponse(_) => "Error parsing server response.".into(),
        }
    }
}
