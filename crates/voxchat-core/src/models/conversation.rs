use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Only message type the backend currently accepts from clients
pub const TEXT_MESSAGE_TYPE: &str = "text";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub metadata: Option<Value>,
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub is_archived: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl Conversation {
    pub fn display_title(&self) -> &str {
        if self.title.trim().is_empty() {
            "Untitled conversation"
        } else {
            &self.title
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateConversationRequest {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

impl CreateConversationRequest {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            metadata: None,
            tags: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct UpdateConversationRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_archived: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    /// Kept as text: the backend may add roles this client does not know
    pub role: String,
    pub content: String,
    pub message_type: String,
    pub voice_url: Option<String>,
    pub metadata: Option<Value>,
    pub created_at: String,
}

impl Message {
    pub fn is_from_user(&self) -> bool {
        self.role == MessageRole::User.as_str()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateMessageRequest {
    pub role: MessageRole,
    pub content: String,
    pub message_type: String,
}

impl CreateMessageRequest {
    pub fn text(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            message_type: TEXT_MESSAGE_TYPE.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_message_serializes_lowercase_role() {
        let req = CreateMessageRequest::text(MessageRole::Assistant, "hello");
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["role"], "assistant");
        assert_eq!(json["message_type"], "text");
    }

    #[test]
    fn test_create_conversation_omits_empty_fields() {
        let json = serde_json::to_value(CreateConversationRequest::titled("Sleep")).unwrap();
        assert_eq!(json, serde_json::json!({"title": "Sleep"}));
    }

    #[test]
    fn test_message_tolerates_unknown_role() {
        let msg: Message = serde_json::from_str(
            r#"{"id":"m1","conversation_id":"c1","role":"system","content":"hi",
                "message_type":"text","voice_url":null,"metadata":null,"created_at":"2024-01-01"}"#,
        )
        .unwrap();
        assert!(!msg.is_from_user());
    }

    #[test]
    fn test_display_title_fallback() {
        let conv: Conversation = serde_json::from_str(
            r#"{"id":"c1","user_id":"u1","title":"  ","metadata":null,"tags":null,
                "created_at":"2024-01-01","updated_at":"2024-01-01"}"#,
        )
        .unwrap();
        assert_eq!(conv.display_title(), "Untitled conversation");
        assert!(!conv.is_archived);
    }
}
