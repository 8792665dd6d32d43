//! Entry point: one request in, one ordered event stream out.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::BoxStream;
use futures::StreamExt;
use serde_json::{json, Map};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::emitter::StreamEmitter;
use super::events::ChatEvent;
use crate::config::BujjiConfig;
use crate::error::{BujjiError, Result};
use crate::memory::{MessageStore, SqliteMessageStore};
use crate::provider::{ConfigModelResolver, ModelResolver};
use crate::types::ResponseMode;
use crate::util::timeout::with_timeout;
use crate::vector::{build_vector_store, VectorStore};
use crate::workflow::{WorkflowEngine, WorkflowState, WorkflowStep};

/// Parameters of one chat turn.
#[derive(Clone, Default)]
pub struct RunRequest {
    pub user_query: String,
    /// Existing conversation; a new one is created when absent.
    pub session_id: Option<String>,
    pub user_id: String,
    pub model_name: Option<String>,
    pub response_mode: ResponseMode,
    pub self_discussion: bool,
    pub pre_tools: Vec<String>,
    pub vector_db: Option<Arc<dyn VectorStore>>,
    pub verbose: bool,
}

impl RunRequest {
    pub fn new(user_query: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            user_query: user_query.into(),
            user_id: user_id.into(),
            ..Self::default()
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_model(mut self, model_name: impl Into<String>) -> Self {
        self.model_name = Some(model_name.into());
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
}

/// Where a run's vector store comes from when the request brings none.
#[derive(Clone)]
enum VectorSource {
    None,
    Shared(Arc<dyn VectorStore>),
    /// One index per user, named after the user id. Stores are built once
    /// and reused by later runs.
    PerUser {
        config: BujjiConfig,
        stores: Arc<Mutex<HashMap<String, Arc<dyn VectorStore>>>>,
    },
}

/// Upper bound on indexing a finished exchange before `done` is sent.
const INDEX_TIMEOUT: Duration = Duration::from_secs(15);

/// Runs chat turns through the workflow and relays them as [`ChatEvent`]s.
#[derive(Clone)]
pub struct ChatService {
    engine: WorkflowEngine,
    vectors: VectorSource,
}

impl ChatService {
    pub fn new(engine: WorkflowEngine) -> Self {
        Self {
            engine,
            vectors: VectorSource::None,
        }
    }

    /// Wire the default collaborators from configuration: configured model
    /// providers, SQLite memory, and a per-user vector index.
    pub fn from_config(config: &BujjiConfig) -> Result<Self> {
        let store: Arc<dyn MessageStore> =
            Arc::new(SqliteMessageStore::open(config.memory_database_path())?);
        let models: Arc<dyn ModelResolver> = Arc::new(ConfigModelResolver::new(config.clone()));
        let engine = WorkflowEngine::new(models, store).with_settings(config.workflow.clone());
        Ok(Self::new(engine).with_per_user_vector_stores(config.clone()))
    }

    /// Give every user their own index from the configured backend.
    pub fn with_per_user_vector_stores(mut self, config: BujjiConfig) -> Self {
        self.vectors = VectorSource::PerUser {
            config,
            stores: Arc::default(),
        };
        self
    }

    /// Bind one vector store to every run that does not bring its own.
    pub fn with_vector_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.vectors = VectorSource::Shared(store);
        self
    }

    pub fn without_vector_store(mut self) -> Self {
        self.vectors = VectorSource::None;
        self
    }

    pub fn engine(&self) -> &WorkflowEngine {
        &self.engine
    }

    async fn vector_store_for(&self, request: &RunRequest) -> Result<Option<Arc<dyn VectorStore>>> {
        if let Some(store) = &request.vector_db {
            return Ok(Some(store.clone()));
        }
        match &self.vectors {
            VectorSource::None => Ok(None),
            VectorSource::Shared(store) => Ok(Some(store.clone())),
            VectorSource::PerUser { config, stores } => {
                let name = index_name(&request.user_id);
                let mut stores = stores.lock().await;
                if let Some(store) = stores.get(&name) {
                    return Ok(Some(store.clone()));
                }
                let store = build_vector_store(config, &name)?;
                debug!(index = %name, backend = store.backend_name(), "vector store opened");
                stores.insert(name, store.clone());
                Ok(Some(store))
            }
        }
    }

    /// Run one turn. The stream always ends with exactly one `done` or
    /// `error` event.
    pub fn run(&self, request: RunRequest) -> BoxStream<'static, ChatEvent> {
        let service = self.clone();
        Box::pin(async_stream::stream! {
            let (conversation_id, created) = match request.session_id.clone() {
                Some(id) => (id, false),
                None => (Uuid::new_v4().to_string(), true),
            };
            if created {
                yield ChatEvent::new_conversation(&conversation_id);
            }
            let mut emitter = StreamEmitter::new(conversation_id.clone());
            yield emitter.init();

            if request.user_query.trim().is_empty() {
                for event in emitter.fail(&BujjiError::InvalidArgument("Prompt is empty".into())) {
                    yield event;
                }
                return;
            }

            let vector_db = match service.vector_store_for(&request).await {
                Ok(store) => store,
                Err(err) => {
                    for event in emitter.fail(&err) {
                        yield event;
                    }
                    return;
                }
            };

            let model_name = request
                .model_name
                .clone()
                .unwrap_or_else(|| service.engine.settings().default_model.clone());
            let mut state = WorkflowState::new(
                request.user_query.clone(),
                request.user_id.clone(),
                conversation_id.clone(),
            )
            .with_model_name(model_name)
            .with_response_mode(request.response_mode)
            .with_self_discussion(request.self_discussion)
            .with_pre_tools(request.pre_tools.clone())
            .with_verbose(request.verbose);
            if let Some(store) = vector_db {
                state = state.with_vector_db(store);
            }

            let mut steps = service.engine.stream(state);
            while let Some(step) = steps.next().await {
                match step {
                    Ok(step) => {
                        if let WorkflowStep::Finished { state } = &step {
                            service.index_exchange(state).await;
                        }
                        for event in emitter.on_step(&step) {
                            yield event;
                        }
                    }
                    Err(err) => {
                        for event in emitter.fail(&err) {
                            yield event;
                        }
                        break;
                    }
                }
            }
            if !emitter.is_finished() {
                let err = BujjiError::InvalidState("workflow stopped without finishing".into());
                for event in emitter.fail(&err) {
                    yield event;
                }
            }
            info!(conversation_id = %conversation_id, "chat turn finished");
        })
    }

    /// Add the finished exchange to the vector store so later runs can
    /// retrieve it. Failures are logged only.
    async fn index_exchange(&self, state: &WorkflowState) {
        if !self.engine.settings().index_exchanges {
            return;
        }
        let Some(store) = &state.vector_db else {
            return;
        };
        let answer = state
            .last_ai_message()
            .map(|m| m.content.as_str())
            .unwrap_or_default();
        if answer.trim().is_empty() {
            return;
        }
        let text = format!("User Query: {}\nChatbot Response: {}", state.user_query, answer);
        let mut metadata = Map::new();
        metadata.insert("conversation_id".into(), json!(state.conversation_id));
        metadata.insert("user_id".into(), json!(state.user_id));
        match with_timeout(INDEX_TIMEOUT, store.add_text(&text, metadata)).await {
            Ok(ids) => debug!(chunks = ids.len(), backend = store.backend_name(), "exchange indexed"),
            Err(err) => warn!(
                conversation_id = %state.conversation_id,
                error = %err,
                "failed to index exchange"
            ),
        }
    }
}

/// Index names accepted by every backend: lowercase ASCII letters, digits
/// and dashes.
pub fn index_name(user_id: &str) -> String {
    let mut name: String = user_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect();
    name = name.trim_matches('-').to_string();
    if name.is_empty() {
        name = "default".to_string();
    }
    format!("bujji-{name}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_names_are_backend_safe() {
        assert_eq!(index_name("42"), "bujji-42");
        assert_eq!(index_name("Alice@Example.com"), "bujji-alice-example-com");
        assert_eq!(index_name("__"), "bujji-default");
    }
}
