//! The conversational workflow: a closed set of nodes, a transition table,
//! and an engine that threads one state record through them.

pub mod engine;
pub mod graph;
pub mod node;
mod nodes;
pub mod prompts;
pub mod state;

pub use engine::{NodeSink, WorkflowEngine, WorkflowStep};
pub use graph::{next_node, Condition, Edge, ENTRY, GRAPH, TERMINAL};
pub use node::NodeId;
pub use state::{StateUpdate, WorkflowState};
