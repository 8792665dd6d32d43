//! Executes model tool-call requests with bounded retries.

use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, warn};

use super::arguments::ToolArguments;
use super::registry::ToolRegistry;
use super::tool::ToolExecutionContext;
use crate::config::{UnknownToolPolicy, WorkflowSettings};
use crate::error::BujjiError;
use crate::provider::format::tool_result_to_string;
use crate::types::{Message, ToolCallRequest};
use crate::util::retry::RetryPolicy;
use crate::util::timeout::with_timeout;

/// Turns tool-call requests into tool result messages.
///
/// Faults never escape: a call that fails on every attempt becomes a
/// diagnostic tool message the model can read.
#[derive(Debug, Clone)]
pub struct ToolInvoker {
    registry: ToolRegistry,
    max_attempts: u32,
    attempt_timeout: Duration,
    unknown_tool_policy: UnknownToolPolicy,
    parallel: bool,
}

impl ToolInvoker {
    pub fn new(registry: ToolRegistry) -> Self {
        Self::from_settings(registry, &WorkflowSettings::default())
    }

    pub fn from_settings(registry: ToolRegistry, settings: &WorkflowSettings) -> Self {
        Self {
            registry,
            max_attempts: settings.tool_max_attempts.max(1),
            attempt_timeout: Duration::from_millis(settings.tool_timeout_ms),
            unknown_tool_policy: settings.unknown_tool_policy,
            parallel: settings.parallel_tools,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn with_unknown_tool_policy(mut self, policy: UnknownToolPolicy) -> Self {
        self.unknown_tool_policy = policy;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Run every call and return the result messages in request order.
    pub async fn invoke_all(
        &self,
        calls: &[ToolCallRequest],
        ctx: &ToolExecutionContext,
    ) -> Vec<Message> {
        let results = if self.parallel {
            join_all(calls.iter().map(|call| self.invoke(call, ctx))).await
        } else {
            let mut out = Vec::with_capacity(calls.len());
            for call in calls {
                out.push(self.invoke(call, ctx).await);
            }
            out
        };
        results.into_iter().flatten().collect()
    }

    /// Run one call. `None` means the call was skipped under the
    /// unknown-tool policy.
    pub async fn invoke(&self, call: &ToolCallRequest, ctx: &ToolExecutionContext) -> Option<Message> {
        let Some(tool) = self.registry.find(&call.name) else {
            warn!(tool = %call.name, call_id = %call.id, "model requested an unregistered tool");
            return match self.unknown_tool_policy {
                UnknownToolPolicy::Skip => None,
                UnknownToolPolicy::Report => Some(Message::tool(
                    call.name.clone(),
                    call.id.clone(),
                    format!("Error: Tool '{}' is not registered.", call.name),
                )),
            };
        };

        let args = ToolArguments::new(call.arguments.clone());
        let policy = RetryPolicy::immediate(self.max_attempts);
        let mut attempt = 0u32;
        let outcome = policy
            .execute(|| {
                attempt += 1;
                debug!(tool = %tool.name(), call_id = %call.id, attempt, "invoking tool");
                with_timeout(self.attempt_timeout, tool.execute(&args, ctx))
            })
            .await;

        let content = match outcome {
            Ok(value) => tool_result_to_string(&value),
            Err(err) => {
                warn!(tool = %tool.name(), call_id = %call.id, error = %err, "tool failed on every attempt");
                format!(
                    "Error: Tool invocation failed after {n}/{n} attempts. Error: {}",
                    fault_message(&err),
                    n = self.max_attempts
                )
            }
        };
        Some(Message::tool(tool.name(), call.id.clone(), content))
    }
}

/// The part of a tool fault worth showing the model.
fn fault_message(err: &BujjiError) -> String {
    match err {
        BujjiError::ToolExecution { message, .. } => message.clone(),
        BujjiError::InvalidArgument(message) => message.clone(),
        other => other.to_string(),
    }
}
