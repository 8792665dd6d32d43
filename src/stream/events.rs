//! Chat event vocabulary and patch descriptors.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::FaultClass;
use crate::types::{FinishReason, Usage};

pub const CONVERSATION_ID_PATH: &str = "/conversation_id";
pub const MESSAGE_PATH: &str = "/message";
pub const CONTENT_PATH: &str = "/message/content";
pub const SELF_DISCUSSION_PATH: &str = "/message/sources/self_discussion_context";
pub const TOOL_RESPONSES_PATH: &str = "/message/sources/tool_responses/-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchOp {
    /// Set the value at `path` (or push, for a path ending in `/-`).
    Add,
    /// Concatenate a string onto the value at `path`.
    Append,
}

/// Where in the conversation document an event's fragment applies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    pub path: String,
    pub op: PatchOp,
    pub value: Value,
}

impl Patch {
    pub fn add(path: impl Into<String>, value: Value) -> Self {
        Self {
            path: path.into(),
            op: PatchOp::Add,
            value,
        }
    }

    pub fn append(path: impl Into<String>, text: &str) -> Self {
        Self {
            path: path.into(),
            op: PatchOp::Append,
            value: Value::String(text.to_string()),
        }
    }
}

/// One tool result as recorded in the assistant turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResponse {
    pub tool_name: String,
    pub tool_call_id: String,
    pub content: String,
}

/// Events delivered to the caller, in order. The wire name is the `event`
/// tag; terminal events carry no patch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ChatEvent {
    NewConversation {
        conversation_id: String,
        patch: Option<Patch>,
    },
    InitNode {
        message_id: String,
        patch: Option<Patch>,
    },
    SelfDiscussionStart {
        patch: Option<Patch>,
    },
    /// Self-discussion text fragment.
    Delta {
        text: String,
        patch: Option<Patch>,
    },
    SelfDiscussionEnd {
        patch: Option<Patch>,
    },
    ToolCallStart {
        patch: Option<Patch>,
    },
    ToolCallResponse {
        response: ToolResponse,
        patch: Option<Patch>,
    },
    ToolCallEnd {
        patch: Option<Patch>,
    },
    /// Answer text fragment.
    FinalResponse {
        text: String,
        patch: Option<Patch>,
    },
    Done {
        conversation_id: String,
        /// False when the memory flush failed; the answer was still delivered.
        saved: bool,
        #[serde(default)]
        usage: Usage,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        finish_reason: Option<FinishReason>,
        elapsed_ms: u64,
    },
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fault: Option<FaultClass>,
    },
}

impl ChatEvent {
    pub fn new_conversation(conversation_id: &str) -> Self {
        Self::NewConversation {
            conversation_id: conversation_id.to_string(),
            patch: Some(Patch::add(CONVERSATION_ID_PATH, json!(conversation_id))),
        }
    }

    pub fn init_node(message_id: &str) -> Self {
        Self::InitNode {
            message_id: message_id.to_string(),
            patch: Some(Patch::add(
                MESSAGE_PATH,
                json!({
                    "id": message_id,
                    "role": "ai",
                    "status": "in_progress",
                    "content": "",
                    "sources": {
                        "self_discussion_context": "",
                        "tool_responses": [],
                    },
                }),
            )),
        }
    }

    pub fn self_discussion_start() -> Self {
        Self::SelfDiscussionStart {
            patch: Some(Patch::add(SELF_DISCUSSION_PATH, json!(""))),
        }
    }

    pub fn delta(text: &str) -> Self {
        Self::Delta {
            text: text.to_string(),
            patch: Some(Patch::append(SELF_DISCUSSION_PATH, text)),
        }
    }

    pub fn self_discussion_end() -> Self {
        Self::SelfDiscussionEnd { patch: None }
    }

    pub fn tool_call_start() -> Self {
        Self::ToolCallStart { patch: None }
    }

    pub fn tool_call_response(response: ToolResponse) -> Self {
        let value = serde_json::to_value(&response).unwrap_or(Value::Null);
        Self::ToolCallResponse {
            response,
            patch: Some(Patch::add(TOOL_RESPONSES_PATH, value)),
        }
    }

    pub fn tool_call_end() -> Self {
        Self::ToolCallEnd { patch: None }
    }

    pub fn final_response(text: &str) -> Self {
        Self::FinalResponse {
            text: text.to_string(),
            patch: Some(Patch::append(CONTENT_PATH, text)),
        }
    }

    /// Stable wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::NewConversation { .. } => "new_conversation",
            Self::InitNode { .. } => "init_node",
            Self::SelfDiscussionStart { .. } => "self_discussion_start",
            Self::Delta { .. } => "delta",
            Self::SelfDiscussionEnd { .. } => "self_discussion_end",
            Self::ToolCallStart { .. } => "tool_call_start",
            Self::ToolCallResponse { .. } => "tool_call_response",
            Self::ToolCallEnd { .. } => "tool_call_end",
            Self::FinalResponse { .. } => "final_response",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }

    pub fn patch(&self) -> Option<&Patch> {
        match self {
            Self::NewConversation { patch, .. }
            | Self::InitNode { patch, .. }
            | Self::SelfDiscussionStart { patch }
            | Self::Delta { patch, .. }
            | Self::SelfDiscussionEnd { patch }
            | Self::ToolCallStart { patch }
            | Self::ToolCallResponse { patch, .. }
            | Self::ToolCallEnd { patch }
            | Self::FinalResponse { patch, .. } => patch.as_ref(),
            Self::Done { .. } | Self::Error { .. } => None,
        }
    }
}
