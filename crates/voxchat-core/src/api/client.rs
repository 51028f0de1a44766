//! API client for the voice assistant backend.
//!
//! Protected calls go through `execute`, which attaches the access token
//! and replays a request at most once after a token refresh. Credential
//! endpoints (login, register, refresh) bypass that pipeline.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::{Client, Method, Request, Response};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info, warn};

use crate::auth::{
    apply_bearer, AuthError, RefreshCoordinator, RequestAuthorizer, RetryBudget, RetryDecision,
    RetryOnExpiry, SessionState,
};
use crate::models::{
    Conversation, CreateConversationRequest, CreateMessageRequest, CreateVoiceSessionRequest,
    DeleteVoiceSessionResponse, LoginRequest, LoginResponse, LogoutResponse, Message,
    MessageRole, RegisterRequest, UpdateConversationRequest, UpdateUserProfileRequest, UserProfile,
    UserProfileResponse, VoiceSessionResponse,
};

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// Prefix shared by every backend route
const API_PREFIX: &str = "/api/v1";

/// HTTP timeout in seconds, applied to connect and to the whole request.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

const LOGIN_PATH: &str = "/auth/login";
const REGISTER_PATH: &str = "/auth/register";
const LOGOUT_PATH: &str = "/auth/logout";
const PROFILE_PATH: &str = "/users/me";
const CONVERSATIONS_PATH: &str = "/conversations/";
const VOICE_SESSION_CREATE_PATH: &str = "/voice/session/create";

/// API client for the voice assistant backend.
/// Clone is cheap - reqwest::Client and the auth components share state via Arc.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    session: SessionState,
    authorizer: RequestAuthorizer,
    retry: RetryOnExpiry,
    refresher: Arc<RefreshCoordinator>,
}

impl ApiClient {
    /// Create a client with the default timeout
    pub fn new(base_url: &str, session: SessionState) -> Result<Self> {
        Self::with_timeout(base_url, Duration::from_secs(DEFAULT_TIMEOUT_SECS), session)
    }

    pub fn with_timeout(base_url: &str, timeout: Duration, session: SessionState) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        let base_url = base_url.trim_end_matches('/').to_string();
        // Same pool, but the refresh call never passes through the authorizer
        let refresher = Arc::new(RefreshCoordinator::new(
            client.clone(),
            &base_url,
            session.clone(),
        ));

        Ok(Self {
            authorizer: RequestAuthorizer::new(session.clone()),
            retry: RetryOnExpiry::new(session.clone(), Arc::clone(&refresher)),
            client,
            base_url,
            session,
            refresher,
        })
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn refresher(&self) -> &Arc<RefreshCoordinator> {
        &self.refresher
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}{}", self.base_url, API_PREFIX, path)
    }

    // ------------------------------------------------------------------------
    // Authorized request pipeline
    // ------------------------------------------------------------------------

    /// Send a protected request.
    ///
    /// The final response is returned as-is, whatever its status; a request
    /// is sent at most twice.
    pub async fn execute(&self, mut request: Request) -> Result<Response> {
        self.authorizer.authorize(&mut request);
        let mut budget = RetryBudget::once();

        loop {
            let method = request.method().clone();
            let url = request.url().clone();
            let replay = request.try_clone();

            let response = self
                .client
                .execute(request)
                .await
                .map_err(ApiError::from)
                .with_context(|| format!("Failed to send {} request to {}", method, url))?;

            if response.status().is_success() {
                return Ok(response);
            }
            // Streaming bodies cannot be sent twice
            let Some(mut replay) = replay else {
                return Ok(response);
            };

            match self.retry.on_response(&replay, response.status(), &mut budget).await {
                RetryDecision::Retry { token } => {
                    debug!(method = %method, url = %url, "Replaying request");
                    apply_bearer(&mut replay, &token)?;
                    request = replay;
                }
                RetryDecision::GiveUp => return Ok(response),
            }
        }
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: Response) -> Result<Response> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body).into())
        }
    }

    async fn parse_json<T: DeserializeOwned>(response: Response) -> Result<T> {
        let body = response.text().await.map_err(ApiError::from)?;
        serde_json::from_str(&body)
            .map_err(|e| ApiError::InvalidResponse(e.to_string()).into())
    }

    fn build(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        self.client.request(method, self.url(path))
    }

    async fn send<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T> {
        let request = request.build().context("Failed to build request")?;
        let response = self.execute(request).await?;
        let response = Self::check_response(response).await?;
        Self::parse_json(response).await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send(self.build(Method::GET, path)).await
    }

    async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        self.send(self.build(Method::POST, path).json(body)).await
    }

    async fn patch<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        self.send(self.build(Method::PATCH, path).json(body)).await
    }

    // ------------------------------------------------------------------------
    // Credential endpoints
    // ------------------------------------------------------------------------

    /// Log in and seed the session with the issued tokens
    pub async fn login(&self, email: &str, password: &str) -> Result<()> {
        let response = self
            .client
            .post(self.url(LOGIN_PATH))
            .json(&LoginRequest {
                email: email.to_string(),
                password: password.to_string(),
            })
            .send()
            .await
            .map_err(ApiError::from)
            .context("Failed to send login request")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_credential_status(status, &body).into());
        }

        let login: LoginResponse = Self::parse_json(response)
            .await
            .context("Failed to parse login response")?;
        debug!(token_type = %login.token_type, "Login accepted");
        self.session
            .login(login.access_token, login.refresh_token, email.to_string());
        Ok(())
    }

    /// Create an account. Does not log in.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        first_name: &str,
        last_name: &str,
    ) -> Result<UserProfileResponse> {
        let response = self
            .client
            .post(self.url(REGISTER_PATH))
            .json(&RegisterRequest {
                email: email.to_string(),
                password: password.to_string(),
                first_name: first_name.to_string(),
                last_name: last_name.to_string(),
            })
            .send()
            .await
            .map_err(ApiError::from)
            .context("Failed to send register request")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_credential_status(status, &body).into());
        }

        let profile: UserProfileResponse = Self::parse_json(response)
            .await
            .context("Failed to parse register response")?;
        info!(user_id = %profile.id, "Account registered");
        Ok(profile)
    }

    /// Log out on the server and clear the local session, returning the
    /// server's confirmation message when it sent one.
    ///
    /// A 401 means the server already considers the session gone, so the
    /// local session is cleared as well. Other failures keep it.
    pub async fn logout(&self) -> Result<Option<String>> {
        if !self.session.is_authenticated() {
            bail!("Not logged in");
        }

        let request = self
            .build(Method::POST, LOGOUT_PATH)
            .json(&serde_json::json!({}))
            .build()
            .context("Failed to build logout request")?;
        let response = self.execute(request).await?;

        let status = response.status();
        if status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<LogoutResponse>(&body)
                .ok()
                .map(|r| r.message);
            info!("Logout successful");
            self.session.logout();
            return Ok(message);
        }
        if status == reqwest::StatusCode::UNAUTHORIZED {
            warn!("Server rejected logout token, clearing local session");
            self.session.logout();
            return Ok(None);
        }

        let body = response.text().await.unwrap_or_default();
        Err(ApiError::from_status(status, &body)).context("Logout failed")
    }

    /// Refresh the access token now, outside of any failed request.
    pub async fn refresh_session(&self) -> Result<(), AuthError> {
        self.refresher.try_refresh().await
    }

    // ------------------------------------------------------------------------
    // Profile
    // ------------------------------------------------------------------------

    pub async fn fetch_profile(&self) -> Result<UserProfile> {
        self.get(PROFILE_PATH).await
    }

    pub async fn update_profile(&self, update: &UpdateUserProfileRequest) -> Result<UserProfile> {
        self.patch(PROFILE_PATH, update).await
    }

    // ------------------------------------------------------------------------
    // Conversations and messages
    // ------------------------------------------------------------------------

    pub async fn fetch_conversations(&self) -> Result<Vec<Conversation>> {
        let conversations: Vec<Conversation> = self.get(CONVERSATIONS_PATH).await?;
        debug!(count = conversations.len(), "Fetched conversations");
        Ok(conversations)
    }

    pub async fn create_conversation(&self, title: &str) -> Result<Conversation> {
        let conversation: Conversation = self
            .post(CONVERSATIONS_PATH, &CreateConversationRequest::titled(title))
            .await?;
        info!(conversation_id = %conversation.id, "Conversation created");
        Ok(conversation)
    }

    pub async fn update_conversation(
        &self,
        conversation_id: &str,
        update: &UpdateConversationRequest,
    ) -> Result<Conversation> {
        let path = format!("{}{}", CONVERSATIONS_PATH, conversation_id);
        self.patch(&path, update).await
    }

    /// Messages of a conversation, oldest first. An empty body means none.
    pub async fn fetch_messages(&self, conversation_id: &str) -> Result<Vec<Message>> {
        let path = format!("{}{}/messages", CONVERSATIONS_PATH, conversation_id);
        let request = self
            .build(Method::GET, &path)
            .build()
            .context("Failed to build request")?;
        let response = self.execute(request).await?;
        let response = Self::check_response(response).await?;

        let body = response.text().await.map_err(ApiError::from)?;
        if body.trim().is_empty() {
            return Ok(Vec::new());
        }
        let messages: Vec<Message> = serde_json::from_str(&body)
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))?;
        debug!(conversation_id, count = messages.len(), "Fetched messages");
        Ok(messages)
    }

    pub async fn send_message(
        &self,
        conversation_id: &str,
        message: &CreateMessageRequest,
    ) -> Result<Message> {
        let path = format!("{}{}/messages", CONVERSATIONS_PATH, conversation_id);
        self.post(&path, message).await
    }

    /// Convenience for a typed-in user message.
    pub async fn send_text(&self, conversation_id: &str, content: &str) -> Result<Message> {
        self.send_message(conversation_id, &CreateMessageRequest::text(MessageRole::User, content))
            .await
    }

    // ------------------------------------------------------------------------
    // Voice sessions
    // ------------------------------------------------------------------------

    /// Open a voice session for a conversation; the response carries the
    /// voice-room token.
    pub async fn create_voice_session(
        &self,
        conversation_id: &str,
    ) -> Result<VoiceSessionResponse> {
        let session: VoiceSessionResponse = self
            .post(
                VOICE_SESSION_CREATE_PATH,
                &CreateVoiceSessionRequest {
                    conversation_id: conversation_id.to_string(),
                    metadata: None,
                },
            )
            .await?;
        info!(session_id = %session.id, conversation_id, "Voice session created");
        Ok(session)
    }

    pub async fn end_voice_session(&self, session_id: &str) -> Result<DeleteVoiceSessionResponse> {
        let path = format!("/voice/session/{}", session_id);
        self.send(self.build(Method::DELETE, &path)).await
    }
}
