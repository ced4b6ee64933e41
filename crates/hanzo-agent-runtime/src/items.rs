//! Conversation items: what a run produces and what the model consumes

use crate::types::{ModelOutput, ToolCall};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Role of a provider message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

/// Provider-agnostic input item for the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InputItem {
    #[serde(rename = "message")]
    Message {
        role: Role,
        #[serde(default)]
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
        /// Agent an assistant reply handed off to; kept for history, never sent
        #[serde(default, skip_serializing_if = "Option::is_none")]
        handoff: Option<String>,
    },

    #[serde(rename = "tool_result")]
    ToolResult {
        #[serde(default)]
        tool_call_id: Option<String>,
        name: String,
        content: Value,
    },

    /// Items of a kind the runtime does not interpret
    #[serde(rename = "other")]
    Other {
        item_type: String,
        content: Value,
    },
}

impl InputItem {
    /// Create a user message
    pub fn user_message(content: impl Into<String>) -> Self {
        InputItem::Message {
            role: Role::User,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            handoff: None,
        }
    }

    /// Create an assistant message
    pub fn assistant_message(content: impl Into<String>) -> Self {
        InputItem::Message {
            role: Role::Assistant,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            handoff: None,
        }
    }

    /// Create a system message
    pub fn system_message(content: impl Into<String>) -> Self {
        InputItem::Message {
            role: Role::System,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            handoff: None,
        }
    }

    /// The role this item is sent under, if it is a message or tool result
    pub fn role(&self) -> Option<Role> {
        match self {
            InputItem::Message { role, .. } => Some(*role),
            InputItem::ToolResult { .. } => Some(Role::Tool),
            InputItem::Other { .. } => None,
        }
    }
}

/// The input a run starts from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RunInput {
    Text(String),
    Items(Vec<InputItem>),
}

impl RunInput {
    /// Normalize to a list of input items; text becomes one user message
    pub fn to_input_list(&self) -> Vec<InputItem> {
        match self {
            RunInput::Text(text) => vec![InputItem::user_message(text.clone())],
            RunInput::Items(items) => items.clone(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            RunInput::Text(text) => Some(text),
            RunInput::Items(_) => None,
        }
    }
}

impl From<String> for RunInput {
    fn from(s: String) -> Self {
        RunInput::Text(s)
    }
}

impl From<&str> for RunInput {
    fn from(s: &str) -> Self {
        RunInput::Text(s.to_string())
    }
}

impl From<Vec<InputItem>> for RunInput {
    fn from(items: Vec<InputItem>) -> Self {
        RunInput::Items(items)
    }
}

/// Item generated during agent run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content")]
pub enum RunItem {
    /// The raw model reply for one turn
    #[serde(rename = "ai_message")]
    AiMessage(ModelOutput),

    #[serde(rename = "tool_result")]
    ToolResult {
        #[serde(default)]
        tool_call_id: Option<String>,
        tool_name: String,
        result: Value,
    },

    #[serde(rename = "user_message")]
    UserMessage(String),

    #[serde(rename = "other")]
    Other { item_type: String, content: Value },
}

impl RunItem {
    /// Kind tag of this item
    pub fn item_type(&self) -> &str {
        match self {
            RunItem::AiMessage(_) => "ai_message",
            RunItem::ToolResult { .. } => "tool_result",
            RunItem::UserMessage(_) => "user_message",
            RunItem::Other { item_type, .. } => item_type,
        }
    }

    /// Convert to input item for next turn
    pub fn to_input_item(&self) -> InputItem {
        match self {
            RunItem::AiMessage(output) => InputItem::Message {
                role: Role::Assistant,
                content: output.content.clone(),
                tool_calls: output.tool_calls.clone(),
                handoff: output.handoff.clone(),
            },
            RunItem::ToolResult {
                tool_call_id,
                tool_name,
                result,
            } => InputItem::ToolResult {
                tool_call_id: tool_call_id.clone(),
                name: tool_name.clone(),
                content: result.clone(),
            },
            RunItem::UserMessage(content) => InputItem::user_message(content.clone()),
            RunItem::Other { item_type, content } => InputItem::Other {
                item_type: item_type.clone(),
                content: content.clone(),
            },
        }
    }

    /// Rebuild a run item from a provider message
    ///
    /// Inverse of [`RunItem::to_input_item`] for the four item kinds. System
    /// messages have no run-item kind and degrade to `Other`.
    pub fn from_input_item(item: &InputItem) -> RunItem {
        match item {
            InputItem::Message {
                role: Role::Assistant,
                content,
                tool_calls,
                handoff,
            } => RunItem::AiMessage(ModelOutput {
                content: content.clone(),
                tool_calls: tool_calls.clone(),
                handoff: handoff.clone(),
            }),
            InputItem::Message {
                role: Role::User,
                content,
                ..
            } => RunItem::UserMessage(content.clone().unwrap_or_default()),
            InputItem::Message { role, content, .. } => RunItem::Other {
                item_type: role.as_str().to_string(),
                content: content.clone().map(Value::String).unwrap_or(Value::Null),
            },
            InputItem::ToolResult {
                tool_call_id,
                name,
                content,
            } => RunItem::ToolResult {
                tool_call_id: tool_call_id.clone(),
                tool_name: name.clone(),
                result: content.clone(),
            },
            InputItem::Other { item_type, content } => RunItem::Other {
                item_type: item_type.clone(),
                content: content.clone(),
            },
        }
    }
}

/// Join the text content of every `ai_message` item with newlines
pub fn text_message_outputs(items: &[RunItem]) -> String {
    items
        .iter()
        .filter_map(|item| match item {
            RunItem::AiMessage(output) => output.content.as_deref(),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}
