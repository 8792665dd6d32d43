//! Configuration system (layered: code > env > TOML file).

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use bon::Builder;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::{BujjiError, Result};

/// Default embedding dimensionality shared by every vector backend.
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 1024;

/// Layered configuration for Bujji.
///
/// Credentials and base URLs live in shared key maps so a cloned config
/// observes later `set_*` calls. Workflow and vector settings are plain
/// values fixed at load time.
#[derive(Clone)]
pub struct BujjiConfig {
    api_keys: Arc<RwLock<HashMap<String, String>>>,
    base_urls: Arc<RwLock<HashMap<String, String>>>,
    pub workflow: WorkflowSettings,
    pub vector: VectorBackendConfig,
    pub embedder: EmbedderConfig,
}

impl fmt::Debug for BujjiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let providers: Vec<String> = self
            .api_keys
            .read()
            .map(|keys| keys.keys().cloned().collect())
            .unwrap_or_default();
        f.debug_struct("BujjiConfig")
            .field("api_keys", &providers)
            .field("base_urls", &self.base_urls)
            .field("workflow", &self.workflow)
            .field("vector", &self.vector)
            .field("embedder", &self.embedder)
            .finish()
    }
}

impl Default for BujjiConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Environment variables mapped onto provider credential slots.
const ENV_API_KEYS: &[(&str, &str)] = &[
    ("GROQ_API_KEY", "groq"),
    ("OPENAI_API_KEY", "openai"),
    ("COHERE_API_KEY", "cohere"),
    ("QDRANT_API_KEY", "qdrant"),
    ("PINECONE_API_KEY", "pinecone"),
];

const ENV_BASE_URLS: &[(&str, &str)] = &[
    ("OPENAI_BASE_URL", "openai"),
    ("GROQ_BASE_URL", "groq"),
    ("QDRANT_HOST", "qdrant"),
];

impl BujjiConfig {
    /// Create an empty config with default settings.
    pub fn new() -> Self {
        Self {
            api_keys: Arc::new(RwLock::new(HashMap::new())),
            base_urls: Arc::new(RwLock::new(HashMap::new())),
            workflow: WorkflowSettings::default(),
            vector: VectorBackendConfig::default(),
            embedder: EmbedderConfig::default(),
        }
    }

    /// Load from environment variables (and `.env` when present).
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        let mut config = Self::new();
        config.apply_env();
        config
    }

    /// Read a TOML file, then overlay environment variables.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            BujjiError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        let file: ConfigFile = toml::from_str(&raw)
            .map_err(|e| BujjiError::Configuration(format!("invalid {}: {e}", path.display())))?;

        let _ = dotenvy::dotenv();
        let mut config = Self::new();
        config.workflow = file.workflow;
        config.vector = file.vector;
        config.embedder = file.embedder;
        for (provider, key) in file.api_keys {
            config.set_api_key(&provider, key);
        }
        for (provider, url) in file.base_urls {
            config.set_base_url(&provider, url);
        }
        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        for (env_var, provider) in ENV_API_KEYS {
            if let Ok(key) = std::env::var(env_var) {
                self.set_api_key(provider, key);
            }
        }
        for (env_var, provider) in ENV_BASE_URLS {
            if let Ok(url) = std::env::var(env_var) {
                self.set_base_url(provider, url);
            }
        }
        if let Ok(db) = std::env::var("MEMORY_DATABASE_URL") {
            self.workflow.memory_database = Some(PathBuf::from(strip_sqlite_scheme(&db)));
        }
    }

    pub fn set_api_key(&self, provider: &str, key: String) {
        if let Ok(mut keys) = self.api_keys.write() {
            keys.insert(provider.to_string(), key);
        }
    }

    pub fn get_api_key(&self, provider: &str) -> Option<String> {
        self.api_keys.read().ok()?.get(provider).cloned()
    }

    /// Resolve an API key or fail with an authentication error.
    pub fn require_api_key(&self, provider: &str) -> Result<String> {
        self.get_api_key(provider).ok_or_else(|| {
            BujjiError::Authentication(format!("missing API key for {provider}"))
        })
    }

    pub fn set_base_url(&self, provider: &str, url: String) {
        if let Ok(mut urls) = self.base_urls.write() {
            urls.insert(provider.to_string(), url);
        }
    }

    pub fn get_base_url(&self, provider: &str) -> Option<String> {
        self.base_urls.read().ok()?.get(provider).cloned()
    }

    pub fn has_credentials(&self, provider: &str) -> bool {
        self.get_api_key(provider).is_some()
    }

    /// SQLite file backing conversation memory.
    pub fn memory_database_path(&self) -> PathBuf {
        self.workflow
            .memory_database
            .clone()
            .unwrap_or_else(|| default_bujji_dir().join("memory.db"))
    }
}

/// Groq-hosted model used when nothing else is configured.
pub const DEFAULT_MODEL: &str = "groq:llama-3.1-8b-instant";

/// What the tool node does with a call naming an unregistered tool.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum UnknownToolPolicy {
    /// Drop the call without producing a tool message.
    #[default]
    Skip,
    /// Answer the call with an error tool message.
    Report,
}

/// Tunables for one workflow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
#[serde(default)]
pub struct WorkflowSettings {
    /// Model used when a run does not name one.
    #[builder(default = DEFAULT_MODEL.to_string(), into)]
    pub default_model: String,
    #[builder(default = 7000)]
    pub memory_max_tokens: usize,
    #[builder(default = 10)]
    pub max_tool_iterations: u32,
    #[builder(default = 2)]
    pub tool_max_attempts: u32,
    #[builder(default = 30_000)]
    pub tool_timeout_ms: u64,
    #[builder(default = 120_000)]
    pub model_timeout_ms: u64,
    #[builder(default = true)]
    pub stream_model_output: bool,
    #[builder(default)]
    pub unknown_tool_policy: UnknownToolPolicy,
    #[builder(default = true)]
    pub index_exchanges: bool,
    #[builder(default = true)]
    pub parallel_tools: bool,
    pub memory_database: Option<PathBuf>,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Vector backend chosen at configuration time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum VectorBackendConfig {
    InMemory {
        #[serde(default = "default_dimension")]
        dimension: usize,
    },
    Qdrant {
        #[serde(default)]
        url: Option<String>,
        #[serde(default)]
        api_key: Option<String>,
        #[serde(default)]
        collection: Option<String>,
        #[serde(default = "default_dimension")]
        dimension: usize,
    },
    Pinecone {
        #[serde(default)]
        api_key: Option<String>,
        #[serde(default)]
        index: Option<String>,
        #[serde(default = "default_cloud")]
        cloud: String,
        #[serde(default = "default_region")]
        region: String,
        #[serde(default = "default_dimension")]
        dimension: usize,
    },
}

impl Default for VectorBackendConfig {
    fn default() -> Self {
        Self::InMemory {
            dimension: DEFAULT_EMBEDDING_DIMENSION,
        }
    }
}

impl VectorBackendConfig {
    pub fn dimension(&self) -> usize {
        match self {
            Self::InMemory { dimension }
            | Self::Qdrant { dimension, .. }
            | Self::Pinecone { dimension, .. } => *dimension,
        }
    }
}

/// Which embedder turns text into vectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EmbedderConfig {
    Cohere {
        #[serde(default = "default_cohere_model")]
        model: String,
    },
    Hashing,
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self::Hashing
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    workflow: WorkflowSettings,
    vector: VectorBackendConfig,
    embedder: EmbedderConfig,
    api_keys: HashMap<String, String>,
    base_urls: HashMap<String, String>,
}

fn default_dimension() -> usize {
    DEFAULT_EMBEDDING_DIMENSION
}

fn default_cloud() -> String {
    "aws".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_cohere_model() -> String {
    "embed-english-v3.0".to_string()
}

fn strip_sqlite_scheme(url: &str) -> &str {
    url.strip_prefix("sqlite:///")
        .or_else(|| url.strip_prefix("sqlite://"))
        .unwrap_or(url)
}

fn default_bujji_dir() -> PathBuf {
    directories::UserDirs::new()
        .map(|dirs| dirs.home_dir().join(".bujji"))
        .unwrap_or_else(|| PathBuf::from(".bujji"))
}
