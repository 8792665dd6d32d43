//! Node bodies. Each reads the state and returns a partial update; only
//! the engine mutates state.

use std::time::Duration;

use tracing::{debug, info, warn};

use super::engine::{NodeSink, WorkflowEngine};
use super::node::NodeId;
use super::prompts;
use super::state::{StateUpdate, WorkflowState};
use crate::error::{BujjiError, Result};
use crate::memory::{Memory, SessionKey};
use crate::provider::BoundModel;
use crate::tools::{ToolExecutionContext, ToolInvoker, ToolRegistry};
use crate::types::Message;

/// Name of the retrieval tool, offered only when a vector store is bound.
const VECTOR_TOOL: &str = "vector_db";

fn progress(state: &WorkflowState, node: NodeId, message: &str) {
    if state.verbose {
        info!(node = %node, conversation_id = %state.conversation_id, "{message}");
    } else {
        debug!(node = %node, conversation_id = %state.conversation_id, "{message}");
    }
}

pub(crate) async fn run(
    node: NodeId,
    engine: &WorkflowEngine,
    state: &WorkflowState,
    sink: &NodeSink,
) -> Result<StateUpdate> {
    match node {
        NodeId::LoadTools => load_tools(engine, state),
        NodeId::LoadModel => load_model(engine, state),
        NodeId::LoadMemory => load_memory(engine, state).await,
        NodeId::CallSelfDiscussion => call_self_discussion(engine, state, sink).await,
        NodeId::CallModel => call_model(engine, state, sink).await,
        NodeId::ToolNode => tool_node(engine, state).await,
        NodeId::SaveMessagesToMemory => save_messages_to_memory(state).await,
    }
}

fn load_tools(engine: &WorkflowEngine, state: &WorkflowState) -> Result<StateUpdate> {
    progress(state, NodeId::LoadTools, "loading tools");
    let resolved = engine.registry.resolve(&state.pre_tools);
    let mut tools = ToolRegistry::new();
    for tool in resolved.iter() {
        if tool.name() == VECTOR_TOOL && state.vector_db.is_none() {
            continue;
        }
        tools.register(tool.clone());
    }
    debug!(tools = ?tools.names(), "tools loaded");
    Ok(StateUpdate {
        tools: Some(tools),
        ..StateUpdate::default()
    })
}

fn load_model(engine: &WorkflowEngine, state: &WorkflowState) -> Result<StateUpdate> {
    progress(state, NodeId::LoadModel, &format!("loading model: {}", state.model_name));
    let provider = engine.models.resolve(&state.model_name)?;
    let model = BoundModel::new(provider, state.tools.definitions())
        .with_timeout(Duration::from_millis(engine.settings.model_timeout_ms));
    Ok(StateUpdate {
        model: Some(model),
        ..StateUpdate::default()
    })
}

async fn load_memory(engine: &WorkflowEngine, state: &WorkflowState) -> Result<StateUpdate> {
    progress(state, NodeId::LoadMemory, "loading memory");
    let memory = Memory::new(
        engine.store.clone(),
        SessionKey::new(&state.user_id, &state.conversation_id),
    )
    .with_max_tokens(engine.settings.memory_max_tokens)
    .with_counter(engine.counter.clone());
    let history = memory.load().await?;

    let mut memory_messages = Vec::with_capacity(history.len() + 1);
    memory_messages.push(Message::system(prompts::system_prompt(
        state.response_mode,
        &state.pre_tools,
    )));
    memory_messages.extend(history);
    debug!(history = memory_messages.len() - 1, "memory loaded");

    Ok(StateUpdate {
        memory: Some(memory),
        memory_messages: Some(memory_messages),
        ..StateUpdate::default()
    })
}

fn bound_model(state: &WorkflowState) -> Result<&BoundModel> {
    state
        .model
        .as_ref()
        .ok_or_else(|| BujjiError::InvalidState("model has not been loaded".into()))
}

async fn generate(
    engine: &WorkflowEngine,
    model: &BoundModel,
    messages: &[Message],
    sink: &NodeSink,
) -> Result<Message> {
    if engine.settings.stream_model_output {
        let sink = sink.clone();
        model.stream_with(messages, move |text| sink.delta(text)).await
    } else {
        model.invoke(messages).await
    }
}

async fn call_self_discussion(
    engine: &WorkflowEngine,
    state: &WorkflowState,
    sink: &NodeSink,
) -> Result<StateUpdate> {
    progress(state, NodeId::CallSelfDiscussion, "self-discussion");
    let model = bound_model(state)?.without_tools();
    let prompt = [
        Message::human(state.user_query.clone()),
        Message::human(prompts::self_discussion_prompt(&state.user_query)),
    ];
    let reflection = generate(engine, &model, &prompt, sink).await?;
    let mut message = Message::self_discussion(reflection.content);
    message.usage = reflection.usage;
    message.model = reflection.model;
    Ok(StateUpdate::turn(vec![message]))
}

async fn call_model(
    engine: &WorkflowEngine,
    state: &WorkflowState,
    sink: &NodeSink,
) -> Result<StateUpdate> {
    progress(state, NodeId::CallModel, "calling model");
    let bound = bound_model(state)?;
    let fallback = state.model_calls >= engine.settings.max_tool_iterations;
    let model = if fallback {
        warn!(
            conversation_id = %state.conversation_id,
            model_calls = state.model_calls,
            "tool iteration cap reached; asking for an answer without tools"
        );
        bound.without_tools()
    } else {
        bound.clone()
    };

    let mut prompt = Vec::with_capacity(state.memory_messages.len() + state.messages.len());
    prompt.extend(state.memory_messages.iter().cloned());
    prompt.extend(state.messages.iter().cloned());

    let response = generate(engine, &model, &prompt, sink).await?;
    debug!(
        tool_calls = response.tool_calls.len(),
        chars = response.content.len(),
        "model responded"
    );
    Ok(StateUpdate {
        model_called: true,
        tool_budget_exhausted: fallback,
        ..StateUpdate::turn(vec![response])
    })
}

async fn tool_node(engine: &WorkflowEngine, state: &WorkflowState) -> Result<StateUpdate> {
    progress(state, NodeId::ToolNode, "calling tool node");
    let calls = match state.last_message() {
        Some(message) if message.has_tool_calls() => message.tool_calls.clone(),
        _ => return Ok(StateUpdate::default()),
    };
    let invoker = ToolInvoker::from_settings(state.tools.clone(), &engine.settings);
    let ctx = ToolExecutionContext {
        vector_store: state.vector_db.clone(),
        user_id: Some(state.user_id.clone()),
        conversation_id: Some(state.conversation_id.clone()),
    };
    let results = invoker.invoke_all(&calls, &ctx).await;
    debug!(requested = calls.len(), answered = results.len(), "tools finished");
    Ok(StateUpdate::turn(results))
}

async fn save_messages_to_memory(state: &WorkflowState) -> Result<StateUpdate> {
    progress(state, NodeId::SaveMessagesToMemory, "saving messages");
    let mut update = StateUpdate {
        drain_new_messages: true,
        persisted: Some(true),
        ..StateUpdate::default()
    };
    let Some(memory) = state.memory.as_ref() else {
        update.persisted = Some(false);
        update.persistence_error = Some("memory was not loaded".into());
        return Ok(update);
    };
    for message in &state.new_messages {
        if let Err(err) = memory.add_message(message).await {
            warn!(
                conversation_id = %state.conversation_id,
                error = %err,
                "failed to persist messages"
            );
            update.persisted = Some(false);
            update.persistence_error = Some(err.to_string());
            break;
        }
    }
    Ok(update)
}
