//! Node identities.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

/// Every node of the workflow graph. The set is closed; routing between
/// nodes lives in [`crate::workflow::graph::GRAPH`].
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NodeId {
    LoadTools,
    LoadModel,
    LoadMemory,
    CallSelfDiscussion,
    CallModel,
    ToolNode,
    SaveMessagesToMemory,
}

impl NodeId {
    pub fn as_str(self) -> &'static str {
        self.into()
    }

    /// Nodes that call the model and may stream text.
    pub fn calls_model(self) -> bool {
        matches!(self, NodeId::CallSelfDiscussion | NodeId::CallModel)
    }
}
