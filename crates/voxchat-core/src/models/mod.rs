//! Data models for the voice assistant backend.
//!
//! - `auth`: login, register and token payloads
//! - `user`: the signed-in user's profile
//! - `conversation`: conversations and their chat messages
//! - `voice`: voice sessions that carry the voice-room token

pub mod auth;
pub mod conversation;
pub mod user;
pub mod voice;

pub use auth::{LoginRequest, LoginResponse, LogoutResponse, RegisterRequest};
pub use conversation::{
    Conversation, CreateConversationRequest, CreateMessageRequest, Message, MessageRole,
    UpdateConversationRequest,
};
pub use user::{UpdateUserProfileRequest, UserProfile, UserProfileResponse};
pub use voice::{CreateVoiceSessionRequest, DeleteVoiceSessionResponse, VoiceSessionResponse};
