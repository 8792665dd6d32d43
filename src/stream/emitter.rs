//! Maps workflow steps onto the ordered chat event sequence.

use std::time::Instant;

use uuid::Uuid;

use super::events::{ChatEvent, ToolResponse};
use crate::error::BujjiError;
use crate::types::{FinishReason, Message, MessageKind, Usage};
use crate::workflow::{NodeId, WorkflowStep};

/// Phase bookkeeping for one run.
///
/// Brackets (`self_discussion_start/end`, `tool_call_start/end`) never
/// nest and are always closed before the terminal event. After `done` or
/// `error` the emitter stays silent.
#[derive(Debug)]
pub struct StreamEmitter {
    conversation_id: String,
    message_id: String,
    started: Instant,
    self_discussion_seen: bool,
    self_discussion_open: bool,
    tools_open: bool,
    /// Whether the node currently running streamed any text.
    node_streamed: bool,
    usage: Usage,
    finish_reason: Option<FinishReason>,
    answer: String,
    finished: bool,
}

impl StreamEmitter {
    pub fn new(conversation_id: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            message_id: Uuid::new_v4().to_string(),
            started: Instant::now(),
            self_discussion_seen: false,
            self_discussion_open: false,
            tools_open: false,
            node_streamed: false,
            usage: Usage::default(),
            finish_reason: None,
            answer: String::new(),
            finished: false,
        }
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    /// Everything relayed as `final_response` so far.
    pub fn answer(&self) -> &str {
        &self.answer
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// The turn-initialized event, sent before the workflow starts.
    pub fn init(&self) -> ChatEvent {
        ChatEvent::init_node(&self.message_id)
    }

    pub fn on_step(&mut self, step: &WorkflowStep) -> Vec<ChatEvent> {
        if self.finished {
            return Vec::new();
        }
        let mut events = Vec::new();
        match step {
            WorkflowStep::Enter { node } => self.enter(*node, &mut events),
            WorkflowStep::Delta { node, text } => self.delta(*node, text, &mut events),
            WorkflowStep::Emit { node, message } => self.emit(*node, message, &mut events),
            WorkflowStep::Finished { state } => {
                self.close_brackets(&mut events);
                events.push(ChatEvent::Done {
                    conversation_id: self.conversation_id.clone(),
                    saved: state.persisted == Some(true),
                    usage: self.usage.clone(),
                    finish_reason: self.finish_reason,
                    elapsed_ms: self.elapsed_ms(),
                });
                self.finished = true;
            }
        }
        events
    }

    /// Close open brackets and emit the single `error` event.
    pub fn fail(&mut self, err: &BujjiError) -> Vec<ChatEvent> {
        if self.finished {
            return Vec::new();
        }
        let mut events = Vec::new();
        self.close_brackets(&mut events);
        events.push(ChatEvent::Error {
            message: err.to_string(),
            fault: Some(err.fault_class()),
        });
        self.finished = true;
        events
    }

    fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    fn enter(&mut self, node: NodeId, events: &mut Vec<ChatEvent>) {
        self.node_streamed = false;
        match node {
            NodeId::CallSelfDiscussion => {
                self.close_tools(events);
                if !self.self_discussion_seen {
                    self.self_discussion_seen = true;
                    self.self_discussion_open = true;
                    events.push(ChatEvent::self_discussion_start());
                }
            }
            NodeId::ToolNode => {
                self.close_self_discussion(events);
                if !self.tools_open {
                    self.tools_open = true;
                    events.push(ChatEvent::tool_call_start());
                }
            }
            NodeId::CallModel | NodeId::SaveMessagesToMemory => self.close_brackets(events),
            NodeId::LoadTools | NodeId::LoadModel | NodeId::LoadMemory => {}
        }
    }

    fn delta(&mut self, node: NodeId, text: &str, events: &mut Vec<ChatEvent>) {
        if text.is_empty() {
            return;
        }
        match node {
            NodeId::CallSelfDiscussion if self.self_discussion_open => {
                self.node_streamed = true;
                events.push(ChatEvent::delta(text));
            }
            NodeId::CallModel => {
                self.node_streamed = true;
                self.answer.push_str(text);
                events.push(ChatEvent::final_response(text));
            }
            _ => {}
        }
    }

    fn emit(&mut self, node: NodeId, message: &Message, events: &mut Vec<ChatEvent>) {
        if let Some(usage) = &message.usage {
            self.usage.merge(usage);
        }
        match node {
            NodeId::CallSelfDiscussion => {
                if !self.node_streamed && self.self_discussion_open && !message.content.is_empty() {
                    events.push(ChatEvent::delta(&message.content));
                }
            }
            NodeId::CallModel if message.kind == MessageKind::Ai => {
                if message.finish_reason.is_some() {
                    self.finish_reason = message.finish_reason;
                }
                // Unstreamed output is relayed in one piece.
                if !self.node_streamed && !message.content.is_empty() {
                    self.answer.push_str(&message.content);
                    events.push(ChatEvent::final_response(&message.content));
                }
            }
            NodeId::ToolNode if message.kind == MessageKind::Tool => {
                events.push(ChatEvent::tool_call_response(ToolResponse {
                    tool_name: message.tool_name.clone().unwrap_or_default(),
                    tool_call_id: message.tool_call_id.clone().unwrap_or_default(),
                    content: message.content.clone(),
                }));
            }
            _ => {}
        }
    }

    fn close_self_discussion(&mut self, events: &mut Vec<ChatEvent>) {
        if self.self_discussion_open {
            self.self_discussion_open = false;
            events.push(ChatEvent::self_discussion_end());
        }
    }

    fn close_tools(&mut self, events: &mut Vec<ChatEvent>) {
        if self.tools_open {
            self.tools_open = false;
            events.push(ChatEvent::tool_call_end());
        }
    }

    fn close_brackets(&mut self, events: &mut Vec<ChatEvent>) {
        self.close_self_discussion(events);
        self.close_tools(events);
    }
}
