//! The record threaded through every workflow node, and how node output
//! merges into it.

use std::sync::Arc;

use crate::memory::Memory;
use crate::provider::BoundModel;
use crate::tools::ToolRegistry;
use crate::types::{Message, MessageKind, ResponseMode};
use crate::vector::VectorStore;

/// Mutable state of one workflow run.
///
/// `messages` only grows during a run. `new_messages` collects what still
/// has to be persisted and is drained once, by the save node.
#[derive(Clone, Default)]
pub struct WorkflowState {
    pub verbose: bool,
    pub response_mode: ResponseMode,
    pub self_discussion: bool,
    pub pre_tools: Vec<String>,
    pub model_name: String,
    pub model: Option<BoundModel>,
    pub memory: Option<Memory>,
    pub vector_db: Option<Arc<dyn VectorStore>>,
    pub user_id: String,
    pub conversation_id: String,
    pub tools: ToolRegistry,
    pub user_query: String,
    pub messages: Vec<Message>,
    pub memory_messages: Vec<Message>,
    pub new_messages: Vec<Message>,
    /// Number of `call_model` executions so far.
    pub model_calls: u32,
    /// Set once the tool-free fallback call has been made.
    pub tool_budget_exhausted: bool,
    /// Outcome of the final flush; `None` until the save node ran.
    pub persisted: Option<bool>,
    pub persistence_error: Option<String>,
}

impl std::fmt::Debug for WorkflowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowState")
            .field("response_mode", &self.response_mode)
            .field("self_discussion", &self.self_discussion)
            .field("pre_tools", &self.pre_tools)
            .field("model_name", &self.model_name)
            .field("user_id", &self.user_id)
            .field("conversation_id", &self.conversation_id)
            .field("tools", &self.tools)
            .field("vector_db", &self.vector_db.as_ref().map(|v| v.backend_name()))
            .field("messages", &self.messages.len())
            .field("memory_messages", &self.memory_messages.len())
            .field("new_messages", &self.new_messages.len())
            .field("model_calls", &self.model_calls)
            .field("persisted", &self.persisted)
            .finish()
    }
}

impl WorkflowState {
    /// Initial state for a query: the human turn is already in `messages`
    /// and pending persistence.
    pub fn new(
        user_query: impl Into<String>,
        user_id: impl Into<String>,
        conversation_id: impl Into<String>,
    ) -> Self {
        let user_query = user_query.into();
        let human = Message::human(user_query.clone());
        Self {
            user_query,
            user_id: user_id.into(),
            conversation_id: conversation_id.into(),
            messages: vec![human.clone()],
            new_messages: vec![human],
            ..Self::default()
        }
    }

    pub fn with_model_name(mut self, model_name: impl Into<String>) -> Self {
        self.model_name = model_name.into();
        self
    }

    pub fn with_response_mode(mut self, mode: ResponseMode) -> Self {
        self.response_mode = mode;
        self
    }

    pub fn with_self_discussion(mut self, enabled: bool) -> Self {
        self.self_discussion = enabled;
        self
    }

    pub fn with_pre_tools(mut self, pre_tools: Vec<String>) -> Self {
        self.pre_tools = pre_tools;
        self
    }

    pub fn with_vector_db(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.vector_db = Some(store);
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// The most recent message of the running transcript.
    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// The latest AI message, if any.
    pub fn last_ai_message(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.kind == MessageKind::Ai)
    }

    /// True when the transcript ends on an AI message requesting tools.
    pub fn has_pending_tool_calls(&self) -> bool {
        self.last_message().is_some_and(Message::has_tool_calls)
    }

    /// Merge a node's output: sequences append, scalars replace.
    pub fn apply(&mut self, update: StateUpdate) {
        if let Some(tools) = update.tools {
            self.tools = tools;
        }
        if let Some(model) = update.model {
            self.model = Some(model);
        }
        if let Some(memory) = update.memory {
            self.memory = Some(memory);
        }
        if let Some(memory_messages) = update.memory_messages {
            self.memory_messages = memory_messages;
        }
        self.messages.extend(update.messages);
        if update.drain_new_messages {
            self.new_messages.clear();
        }
        self.new_messages.extend(update.new_messages);
        if update.model_called {
            self.model_calls += 1;
        }
        if update.tool_budget_exhausted {
            self.tool_budget_exhausted = true;
        }
        if let Some(persisted) = update.persisted {
            self.persisted = Some(persisted);
        }
        if update.persistence_error.is_some() {
            self.persistence_error = update.persistence_error;
        }
    }
}

/// Partial state produced by one node.
#[derive(Clone, Default)]
pub struct StateUpdate {
    pub tools: Option<ToolRegistry>,
    pub model: Option<BoundModel>,
    pub memory: Option<Memory>,
    pub memory_messages: Option<Vec<Message>>,
    /// Appended to `messages`.
    pub messages: Vec<Message>,
    /// Appended to `new_messages`, after the drain below.
    pub new_messages: Vec<Message>,
    pub drain_new_messages: bool,
    pub model_called: bool,
    pub tool_budget_exhausted: bool,
    pub persisted: Option<bool>,
    pub persistence_error: Option<String>,
}

impl StateUpdate {
    /// Append messages to the transcript and to the persistence queue.
    pub fn turn(messages: Vec<Message>) -> Self {
        Self {
            new_messages: messages.clone(),
            messages,
            ..Self::default()
        }
    }
}
