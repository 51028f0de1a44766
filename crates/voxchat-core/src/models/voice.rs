use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize)]
pub struct CreateVoiceSessionRequest {
    pub conversation_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VoiceSessionResponse {
    pub id: String,
    pub user_id: String,
    pub conversation_id: String,
    pub status: String,
    /// Token for joining the voice room
    pub token: String,
    pub metadata: Option<Value>,
    pub config: Option<Value>,
    pub created_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeleteVoiceSessionResponse {
    pub message: String,
}
