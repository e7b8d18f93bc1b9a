//! Message and part types.
//!
//! Messages belong to a session; parts belong to a message. Both are kept
//! ordered by id inside a directory store.

use serde::{Deserialize, Serialize};

/// Represents the role of a message in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Message from the user.
    User,
    /// Message from the AI assistant.
    Assistant,
}

/// A provider/model pair used to produce an assistant message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelRef {
    pub provider_id: String,
    pub model_id: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageTime {
    pub created: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<i64>,
}

/// A single message header. Content lives in its parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub session_id: String,
    pub role: MessageRole,
    #[serde(default)]
    pub time: MessageTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Pending,
    Running,
    Completed,
    Error,
}

/// Type-tagged part payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum PartKind {
    Text {
        text: String,
        #[serde(default)]
        synthetic: bool,
    },
    Reasoning {
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    Tool {
        call_id: String,
        tool: String,
        status: ToolStatus,
        #[serde(default)]
        input: serde_json::Value,
        #[serde(default)]
        output: String,
    },
    File {
        mime: String,
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filename: Option<String>,
    },
    StepStart,
    StepFinish {
        reason: String,
    },
}

/// One piece of message content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    pub id: String,
    pub session_id: String,
    pub message_id: String,
    #[serde(flatten)]
    pub kind: PartKind,
}

impl Part {
    /// Appends `delta` to the string field named `field`.
    ///
    /// Returns false when the part kind has no such string field.
    pub fn append_field(&mut self, field: &str, delta: &str) -> bool {
        let target = match (&mut self.kind, field) {
            (PartKind::Text { text, .. }, "text") => text,
            (PartKind::Reasoning { text }, "text") => text,
            (PartKind::Tool { output, .. }, "output") => output,
            _ => return false,
        };
        target.push_str(delta);
        true
    }

    /// Returns the text payload for text and reasoning parts.
    pub fn text(&self) -> Option<&str> {
        match &self.kind {
            PartKind::Text { text, .. } | PartKind::Reasoning { text } => Some(text),
            _ => None,
        }
    }
}

/// A message together with its parts, as returned by paginated fetches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageWithParts {
    pub info: Message,
    #[serde(default)]
    pub parts: Vec<Part>,
}
