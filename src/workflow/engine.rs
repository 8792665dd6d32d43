//! Drives a [`WorkflowState`] through the graph.

use std::sync::Arc;
use std::time::Instant;

use futures::stream::BoxStream;
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use super::graph::{next_node, ENTRY};
use super::node::NodeId;
use super::nodes;
use super::state::{StateUpdate, WorkflowState};
use crate::config::WorkflowSettings;
use crate::error::{BujjiError, Result};
use crate::memory::{EstimatingTokenCounter, MessageStore, TokenCounter};
use crate::provider::ModelResolver;
use crate::tools::ToolRegistry;
use crate::types::Message;

/// One observable step of a run.
#[derive(Debug, Clone)]
pub enum WorkflowStep {
    /// A node is about to run.
    Enter { node: NodeId },
    /// A text fragment streamed by a model-calling node.
    Delta { node: NodeId, text: String },
    /// A message a node appended to the transcript.
    Emit { node: NodeId, message: Message },
    /// The terminal node ran; carries the final state.
    Finished { state: Box<WorkflowState> },
}

/// Handle through which a running node forwards streamed text.
#[derive(Debug, Clone)]
pub struct NodeSink {
    node: NodeId,
    tx: mpsc::UnboundedSender<String>,
}

impl NodeSink {
    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn delta(&self, text: &str) {
        if text.is_empty() {
            return;
        }
        // The receiver lives as long as the node future.
        let _ = self.tx.send(text.to_string());
    }
}

enum Polled {
    Delta(String),
    Done(Result<StateUpdate>),
}

/// The workflow engine. Collaborators are injected; cloning is cheap.
#[derive(Clone)]
pub struct WorkflowEngine {
    pub(crate) registry: ToolRegistry,
    pub(crate) models: Arc<dyn ModelResolver>,
    pub(crate) store: Arc<dyn MessageStore>,
    pub(crate) counter: Arc<dyn TokenCounter>,
    pub(crate) settings: WorkflowSettings,
}

impl std::fmt::Debug for WorkflowEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowEngine")
            .field("registry", &self.registry)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl WorkflowEngine {
    /// Engine with the built-in tools and default settings.
    pub fn new(models: Arc<dyn ModelResolver>, store: Arc<dyn MessageStore>) -> Self {
        Self {
            registry: ToolRegistry::builtin(),
            models,
            store,
            counter: Arc::new(EstimatingTokenCounter::default()),
            settings: WorkflowSettings::default(),
        }
    }

    pub fn with_registry(mut self, registry: ToolRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_settings(mut self, settings: WorkflowSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_token_counter(mut self, counter: Arc<dyn TokenCounter>) -> Self {
        self.counter = counter;
        self
    }

    pub fn settings(&self) -> &WorkflowSettings {
        &self.settings
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Run the graph from the entry node, yielding every step.
    ///
    /// The stream ends after [`WorkflowStep::Finished`] or after the first
    /// error. Deltas of a node are yielded while that node is still running.
    pub fn stream(&self, initial: WorkflowState) -> BoxStream<'static, Result<WorkflowStep>> {
        let engine = self.clone();
        Box::pin(async_stream::stream! {
            let mut state = initial;
            let mut node = ENTRY;
            let started = Instant::now();
            info!(
                conversation_id = %state.conversation_id,
                user_id = %state.user_id,
                model = %state.model_name,
                self_discussion = state.self_discussion,
                "workflow started"
            );

            loop {
                yield Ok(WorkflowStep::Enter { node });
                let (tx, mut rx) = mpsc::unbounded_channel();
                let sink = NodeSink { node, tx };

                let result = {
                    let fut = nodes::run(node, &engine, &state, &sink);
                    tokio::pin!(fut);
                    loop {
                        let polled = tokio::select! {
                            biased;
                            Some(text) = rx.recv() => Polled::Delta(text),
                            result = &mut fut => Polled::Done(result),
                        };
                        match polled {
                            Polled::Delta(text) => yield Ok(WorkflowStep::Delta { node, text }),
                            Polled::Done(result) => break result,
                        }
                    }
                };
                while let Ok(text) = rx.try_recv() {
                    yield Ok(WorkflowStep::Delta { node, text });
                }

                let update = match result {
                    Ok(update) => update,
                    Err(err) => {
                        error!(
                            node = %node,
                            conversation_id = %state.conversation_id,
                            fault = %err.fault_class(),
                            error = %err,
                            "workflow node failed"
                        );
                        yield Err(err);
                        return;
                    }
                };
                let emitted = update.messages.clone();
                state.apply(update);
                for message in emitted {
                    yield Ok(WorkflowStep::Emit { node, message });
                }

                match next_node(node, &state) {
                    Some(next) => {
                        debug!(from = %node, to = %next, "transition");
                        node = next;
                    }
                    None => break,
                }
            }

            info!(
                conversation_id = %state.conversation_id,
                model_calls = state.model_calls,
                persisted = ?state.persisted,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "workflow finished"
            );
            yield Ok(WorkflowStep::Finished { state: Box::new(state) });
        })
    }

    /// Run the graph to completion and return the final state.
    pub async fn invoke(&self, initial: WorkflowState) -> Result<WorkflowState> {
        let mut steps = self.stream(initial);
        while let Some(step) = steps.next().await {
            if let WorkflowStep::Finished { state } = step? {
                return Ok(*state);
            }
        }
        Err(BujjiError::InvalidState(
            "workflow ended without reaching its terminal node".into(),
        ))
    }
}
