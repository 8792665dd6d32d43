//! The transition table.

use super::node::NodeId;
use super::state::WorkflowState;

/// Guard on an edge, evaluated against the state after the source node ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    Always,
    SelfDiscussionEnabled,
    SelfDiscussionDisabled,
    /// The latest model output requests tools and the tool budget is not
    /// spent.
    ToolCallsPending,
    NoToolCallsPending,
}

impl Condition {
    pub fn holds(self, state: &WorkflowState) -> bool {
        let tools_pending = state.has_pending_tool_calls() && !state.tool_budget_exhausted;
        match self {
            Condition::Always => true,
            Condition::SelfDiscussionEnabled => state.self_discussion,
            Condition::SelfDiscussionDisabled => !state.self_discussion,
            Condition::ToolCallsPending => tools_pending,
            Condition::NoToolCallsPending => !tools_pending,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub from: NodeId,
    pub when: Condition,
    pub to: NodeId,
}

const fn edge(from: NodeId, when: Condition, to: NodeId) -> Edge {
    Edge { from, when, to }
}

pub const ENTRY: NodeId = NodeId::LoadTools;

pub const TERMINAL: NodeId = NodeId::SaveMessagesToMemory;

/// Edges out of each node, tried in order; the first whose condition holds
/// wins. For every node the conditions are exhaustive and disjoint.
pub const GRAPH: &[Edge] = &[
    edge(NodeId::LoadTools, Condition::Always, NodeId::LoadModel),
    edge(NodeId::LoadModel, Condition::Always, NodeId::LoadMemory),
    edge(NodeId::LoadMemory, Condition::SelfDiscussionEnabled, NodeId::CallSelfDiscussion),
    edge(NodeId::LoadMemory, Condition::SelfDiscussionDisabled, NodeId::CallModel),
    edge(NodeId::CallSelfDiscussion, Condition::Always, NodeId::CallModel),
    edge(NodeId::CallModel, Condition::ToolCallsPending, NodeId::ToolNode),
    edge(NodeId::CallModel, Condition::NoToolCallsPending, NodeId::SaveMessagesToMemory),
    edge(NodeId::ToolNode, Condition::Always, NodeId::CallModel),
];

/// Where to go after `from`, or `None` once the terminal node ran.
pub fn next_node(from: NodeId, state: &WorkflowState) -> Option<NodeId> {
    GRAPH
        .iter()
        .filter(|e| e.from == from)
        .find(|e| e.when.holds(state))
        .map(|e| e.to)
}
