//! Caller-facing streaming: event vocabulary, step-to-event mapping, the
//! folded turn document and the [`ChatService`] entry point.

pub mod document;
pub mod emitter;
pub mod events;
pub mod service;

pub use document::{TurnDocument, TurnSources, TurnStatus};
pub use emitter::StreamEmitter;
pub use events::{ChatEvent, Patch, PatchOp, ToolResponse};
pub use service::{index_name, ChatService, RunRequest};
