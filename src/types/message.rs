//! Conversation message types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use super::generation::FinishReason;
use super::usage::Usage;
use crate::error::BujjiError;

/// Tool name used for the self-discussion pseudo tool message.
pub const SELF_DISCUSSION_TOOL: &str = "self_discussion";

/// Who authored a message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MessageKind {
    Human,
    Ai,
    Tool,
    System,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: serde_json::Value,
}

/// A single conversation message.
///
/// Tool messages carry the id of the call they answer; AI messages may
/// carry the tool calls they requested plus generation metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: String,
    pub kind: MessageKind,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Message {
    fn new(kind: MessageKind, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_name: None,
            tool_call_id: None,
            usage: None,
            finish_reason: None,
            model: None,
            timestamp: Utc::now(),
        }
    }

    /// Create a human message.
    pub fn human(text: impl Into<String>) -> Self {
        Self::new(MessageKind::Human, text)
    }

    /// Create an AI message.
    pub fn ai(text: impl Into<String>) -> Self {
        Self::new(MessageKind::Ai, text)
    }

    /// Create a system message.
    pub fn system(text: impl Into<String>) -> Self {
        Self::new(MessageKind::System, text)
    }

    /// Create an AI message that requests tool calls.
    pub fn ai_with_tool_calls(text: impl Into<String>, tool_calls: Vec<ToolCallRequest>) -> Self {
        let mut msg = Self::new(MessageKind::Ai, text);
        msg.tool_calls = tool_calls;
        msg
    }

    /// Create a tool result message answering `tool_call_id`.
    pub fn tool(
        tool_name: impl Into<String>,
        tool_call_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let mut msg = Self::new(MessageKind::Tool, content);
        msg.tool_name = Some(tool_name.into());
        msg.tool_call_id = Some(tool_call_id.into());
        msg
    }

    /// Wrap self-discussion output as a tool message with a fresh call id.
    pub fn self_discussion(content: impl Into<String>) -> Self {
        Self::tool(SELF_DISCUSSION_TOOL, Uuid::new_v4().to_string(), content)
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn with_finish_reason(mut self, reason: FinishReason) -> Self {
        self.finish_reason = Some(reason);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// True for an AI message that requested at least one tool.
    pub fn has_tool_calls(&self) -> bool {
        self.kind == MessageKind::Ai && !self.tool_calls.is_empty()
    }

    /// True for the self-discussion pseudo tool message.
    pub fn is_self_discussion(&self) -> bool {
        self.kind == MessageKind::Tool && self.tool_name.as_deref() == Some(SELF_DISCUSSION_TOOL)
    }
}

/// Tone the assistant uses for its final answer.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "PascalCase", ascii_case_insensitive)]
pub enum ResponseMode {
    Casual,
    Scientific,
    Story,
    Kids,
    #[default]
    Auto,
}

/// Parse a response mode, reporting unknown names as invalid arguments.
pub fn parse_response_mode(value: &str) -> Result<ResponseMode, BujjiError> {
    value.trim().parse().map_err(|_| {
        BujjiError::InvalidArgument(format!(
            "unknown response mode '{value}'; expected Casual, Scientific, Story, Kids or Auto"
        ))
    })
}
