//! Persisted chat message model shared by the transcript store, the session
//! controller, and bridge implementations.
//!
//! On-disk field names follow the established transcript format, which mixes
//! snake_case protocol fields (`tool_calls`, `tool_call_id`) with camelCase
//! display fields (`toolName`, `toolPhase`, ...).

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Role discriminant of a [`ChatMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    User,
    Assistant,
    Tool,
    System,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
            Self::System => "system",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which half of a tool invocation a tool message records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolPhase {
    Start,
    End,
}

/// Tool call declared by an assistant message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

/// Non-text payload paired with a user turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Attachment {
    Image { data_url: String },
}

/// Also reads the multimodal shape where `content` is an array of `text` and
/// `image_url` parts; the first image becomes the attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "StoredUserMessage")]
pub struct UserMessage {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<Attachment>,
    #[serde(
        rename = "checkpointPath",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub checkpoint_path: Option<String>,
}

#[derive(Deserialize)]
struct StoredUserMessage {
    content: UserContent,
    #[serde(default)]
    attachment: Option<Attachment>,
    #[serde(rename = "checkpointPath", default)]
    checkpoint_path: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum UserContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct ImageUrl {
    url: String,
}

impl From<StoredUserMessage> for UserMessage {
    fn from(stored: StoredUserMessage) -> Self {
        let mut attachment = stored.attachment;
        let content = match stored.content {
            UserContent::Text(text) => text,
            UserContent::Parts(parts) => {
                let mut texts = Vec::new();
                for part in parts {
                    match part {
                        ContentPart::Text { text } => texts.push(text),
                        ContentPart::ImageUrl { image_url } => {
                            attachment.get_or_insert(Attachment::Image {
                                data_url: image_url.url,
                            });
                        }
                        ContentPart::Other => {}
                    }
                }
                texts.join("\n")
            }
        };

        Self {
            content,
            attachment,
            checkpoint_path: stored.checkpoint_path,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssistantMessage {
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolMessage {
    pub tool_call_id: String,
    #[serde(default)]
    pub content: String,
    #[serde(rename = "toolName", default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(rename = "toolPhase", default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<ToolPhase>,
    #[serde(rename = "toolInput", default, skip_serializing_if = "Option::is_none")]
    pub tool_input: Option<String>,
    #[serde(rename = "toolOutput", default, skip_serializing_if = "Option::is_none")]
    pub tool_output: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemMessage {
    pub content: String,
}

/// One append-only transcript item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum ChatMessage {
    User(UserMessage),
    Assistant(AssistantMessage),
    Tool(ToolMessage),
    System(SystemMessage),
}

impl ChatMessage {
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::User(UserMessage {
            content: content.into(),
            attachment: None,
            checkpoint_path: None,
        })
    }

    /// Assistant message with no declared tool calls.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::Assistant(AssistantMessage {
            content: content.into(),
            tool_calls: Vec::new(),
        })
    }

    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::System(SystemMessage {
            content: content.into(),
        })
    }

    #[must_use]
    pub fn role(&self) -> Role {
        match self {
            Self::User(_) => Role::User,
            Self::Assistant(_) => Role::Assistant,
            Self::Tool(_) => Role::Tool,
            Self::System(_) => Role::System,
        }
    }

    #[must_use]
    pub fn content(&self) -> &str {
        match self {
            Self::User(message) => &message.content,
            Self::Assistant(message) => &message.content,
            Self::Tool(message) => &message.content,
            Self::System(message) => &message.content,
        }
    }

    /// Returns true when this is an assistant message declaring a tool call
    /// with the given id.
    #[must_use]
    pub fn declares_tool_call(&self, call_id: &str) -> bool {
        match self {
            Self::Assistant(message) => message.tool_calls.iter().any(|call| call.id == call_id),
            _ => false,
        }
    }
}
