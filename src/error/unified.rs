//! Unified error classification and recovery.

use serde::{Deserialize, Serialize};
use strum::Display;

/// Broad error category for routing recovery logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Authentication,
    RateLimit,
    Network,
    Timeout,
    Server,
    Api,
    Configuration,
    Serialization,
    Storage,
    ToolExecution,
    Unknown,
}

/// How a fault is treated by a workflow run.
///
/// Tool faults are recovered inside the tool node, lookup faults are
/// subject to the configured unknown-tool policy, persistence faults only
/// flip the "saved" flag, and model faults abort the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FaultClass {
    ToolFault,
    ModelFault,
    LookupFault,
    PersistenceFault,
}

/// Suggested recovery action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoverySuggestion {
    RetryWithBackoff,
    CheckCredentials,
    CheckConfiguration,
    IncreaseTimeout,
    CheckStorage,
    CheckToolImplementation,
    ContactSupport,
}
