//! Convenience re-exports for common use.

pub use crate::config::{BujjiConfig, WorkflowSettings};
pub use crate::error::{BujjiError, Result};
pub use crate::memory::{Memory, MessageStore, SessionKey};
pub use crate::provider::{BoundModel, ModelProvider, ModelResolver};
pub use crate::stream::{ChatEvent, ChatService, RunRequest, TurnDocument};
pub use crate::tools::{AgentTool, AgentToolParameters, Tool, ToolArguments, ToolRegistry};
pub use crate::types::{FinishReason, Message, MessageKind, ResponseMode, Usage};
pub use crate::vector::VectorStore;
pub use crate::workflow::{WorkflowEngine, WorkflowState, WorkflowStep};
