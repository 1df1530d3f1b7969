//! Wire types for the local model endpoint.
//!
//! The endpoint accepts `{model, stream, messages:[{role, content}]}` and
//! answers either a single JSON object (non-streamed) or newline-delimited
//! JSON fragments shaped as `{message:{content}, done}`.

use serde::{Deserialize, Serialize};

/// Role of a prompt message as the model endpoint understands it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptRole {
    System,
    User,
    Assistant,
}

/// One message in the model's message-list format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMessage {
    pub role: PromptRole,
    pub content: String,
}

impl ModelMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: PromptRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: PromptRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: PromptRole::Assistant,
            content: content.into(),
        }
    }
}

/// Request body for the completion endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub stream: bool,
    pub messages: Vec<ModelMessage>,
}

/// Non-streamed response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub message: ModelMessage,
}

/// One newline-delimited fragment of a streamed response. The final
/// fragment carries `done=true` and no further content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatStreamFragment {
    #[serde(default)]
    pub message: Option<FragmentMessage>,
    #[serde(default)]
    pub done: bool,
}

/// Content part of a streamed fragment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FragmentMessage {
    #[serde(default)]
    pub content: String,
}
