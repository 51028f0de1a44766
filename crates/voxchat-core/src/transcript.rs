//! Bridges voice transcription into chat messages.
//!
//! The voice SDK streams segments for every participant in the room,
//! revising each one until it is marked final. Only final segments become
//! messages, and each segment is delivered once.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::{CreateMessageRequest, MessageRole};

/// Who spoke a segment, relative to this device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    /// The local participant (the user)
    Local,
    /// Anyone else in the room (the assistant agent)
    Remote,
}

impl Speaker {
    pub fn role(&self) -> MessageRole {
        match self {
            Speaker::Local => MessageRole::User,
            Speaker::Remote => MessageRole::Assistant,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub id: String,
    pub text: String,
    #[serde(rename = "final", default)]
    pub is_final: bool,
    pub speaker: Speaker,
}

#[derive(Debug, Default)]
pub struct TranscriptBridge {
    delivered: HashSet<String>,
}

impl TranscriptBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// The message to post for `segment`, if it should become one.
    pub fn accept(&mut self, segment: &TranscriptSegment) -> Option<CreateMessageRequest> {
        if !segment.is_final {
            return None;
        }
        let text = segment.text.trim();
        if text.is_empty() {
            debug!(segment_id = %segment.id, "Skipping empty final segment");
            return None;
        }
        if !self.delivered.insert(segment.id.clone()) {
            return None;
        }
        Some(CreateMessageRequest::text(segment.speaker.role(), text))
    }

    pub fn delivered_count(&self) -> usize {
        self.delivered.len()
    }
}
