//! The assistant turn as the caller sees it, folded from chat events.

use serde::{Deserialize, Serialize};
use strum::Display;

use super::events::{ChatEvent, ToolResponse};
use crate::types::{FinishReason, Usage};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TurnStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnSources {
    pub self_discussion_context: String,
    pub tool_responses: Vec<ToolResponse>,
}

/// Key-value view of one assistant turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnDocument {
    pub conversation_id: Option<String>,
    pub message_id: Option<String>,
    pub status: TurnStatus,
    pub content: String,
    pub sources: TurnSources,
    pub usage: Usage,
    pub finish_reason: Option<FinishReason>,
    pub saved: Option<bool>,
    pub elapsed_ms: Option<u64>,
    pub error: Option<String>,
}

impl TurnDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a whole event sequence.
    pub fn from_events<'a>(events: impl IntoIterator<Item = &'a ChatEvent>) -> Self {
        let mut doc = Self::new();
        for event in events {
            doc.apply(event);
        }
        doc
    }

    pub fn apply(&mut self, event: &ChatEvent) {
        // A finished turn never changes again.
        if matches!(self.status, TurnStatus::Completed | TurnStatus::Failed) {
            return;
        }
        match event {
            ChatEvent::NewConversation { conversation_id, .. } => {
                self.conversation_id = Some(conversation_id.clone());
            }
            ChatEvent::InitNode { message_id, .. } => {
                self.message_id = Some(message_id.clone());
                self.status = TurnStatus::InProgress;
            }
            ChatEvent::SelfDiscussionStart { .. } => self.sources.self_discussion_context.clear(),
            ChatEvent::Delta { text, .. } => self.sources.self_discussion_context.push_str(text),
            ChatEvent::ToolCallResponse { response, .. } => {
                self.sources.tool_responses.push(response.clone());
            }
            ChatEvent::FinalResponse { text, .. } => self.content.push_str(text),
            ChatEvent::Done {
                conversation_id,
                saved,
                usage,
                finish_reason,
                elapsed_ms,
            } => {
                self.conversation_id = Some(conversation_id.clone());
                self.status = TurnStatus::Completed;
                self.saved = Some(*saved);
                self.usage = usage.clone();
                self.finish_reason = *finish_reason;
                self.elapsed_ms = Some(*elapsed_ms);
            }
            ChatEvent::Error { message, .. } => {
                self.status = TurnStatus::Failed;
                self.error = Some(message.clone());
            }
            ChatEvent::SelfDiscussionEnd { .. }
            | ChatEvent::ToolCallStart { .. }
            | ChatEvent::ToolCallEnd { .. } => {}
        }
    }
}
