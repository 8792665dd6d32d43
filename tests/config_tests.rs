//! Tests for configuration system.

use std::io::Write;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

use tempfile::NamedTempFile;

use bujji::config::{BujjiConfig, VectorBackendConfig, WorkflowSettings, DEFAULT_MODEL};
use bujji::error::BujjiError;

static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

const CONFIG_ENV_VARS: [&str; 9] = [
    "GROQ_API_KEY",
    "OPENAI_API_KEY",
    "COHERE_API_KEY",
    "QDRANT_API_KEY",
    "PINECONE_API_KEY",
    "OPENAI_BASE_URL",
    "GROQ_BASE_URL",
    "QDRANT_HOST",
    "MEMORY_DATABASE_URL",
];

struct EnvGuard {
    saved: Vec<(String, Option<String>)>,
}

impl EnvGuard {
    fn capture(keys: &[&str]) -> Self {
        let saved = keys
            .iter()
            .map(|key| ((*key).to_string(), std::env::var(key).ok()))
            .collect();
        Self { saved }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, value) in &self.saved {
            match value {
                Some(v) => std::env::set_var(key, v),
                None => std::env::remove_var(key),
            }
        }
    }
}

fn env_lock_guard() -> std::sync::MutexGuard<'static, ()> {
    ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn clean_env() -> (std::sync::MutexGuard<'static, ()>, EnvGuard) {
    let lock = env_lock_guard();
    let guard = EnvGuard::capture(&CONFIG_ENV_VARS);
    for key in CONFIG_ENV_VARS {
        std::env::remove_var(key);
    }
    (lock, guard)
}

#[test]
fn config_set_get_api_key() {
    let config = BujjiConfig::new();
    config.set_api_key("groq", "gsk-test-123".to_string());
    assert_eq!(config.get_api_key("groq"), Some("gsk-test-123".to_string()));
    assert_eq!(config.get_api_key("openai"), None);
}

#[test]
fn config_require_api_key_reports_provider() {
    let config = BujjiConfig::new();
    match config.require_api_key("pinecone").unwrap_err() {
        BujjiError::Authentication(message) => assert!(message.contains("pinecone")),
        other => panic!("expected authentication error, got {other:?}"),
    }
}

#[test]
fn config_from_env_maps_api_keys_and_base_urls() {
    let _env = clean_env();
    std::env::set_var("GROQ_API_KEY", "test-groq-key");
    std::env::set_var("PINECONE_API_KEY", "test-pinecone-key");
    std::env::set_var("QDRANT_HOST", "http://localhost:6333");

    let config = BujjiConfig::from_env();

    assert_eq!(config.get_api_key("groq"), Some("test-groq-key".to_string()));
    assert_eq!(config.get_api_key("pinecone"), Some("test-pinecone-key".to_string()));
    assert_eq!(
        config.get_base_url("qdrant"),
        Some("http://localhost:6333".to_string())
    );
    assert!(!config.has_credentials("openai"));
}

#[test]
fn memory_database_url_overrides_the_default_path() {
    let _env = clean_env();
    std::env::set_var("MEMORY_DATABASE_URL", "sqlite:///tmp/bujji-test.db");

    let config = BujjiConfig::from_env();
    assert_eq!(config.memory_database_path(), PathBuf::from("tmp/bujji-test.db"));
}

#[test]
fn default_memory_database_lives_under_the_bujji_dir() {
    let path = BujjiConfig::new().memory_database_path();
    assert!(path.ends_with(".bujji/memory.db"));
}

#[test]
fn environment_wins_over_the_config_file() {
    let _env = clean_env();
    std::env::set_var("GROQ_API_KEY", "from-env");

    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[workflow]
default_model = "openai:gpt-4o-mini"
index_exchanges = false

[vector]
backend = "pinecone"
index = "bujji"
dimension = 384

[api_keys]
groq = "from-file"
openai = "sk-file"
"#
    )
    .unwrap();

    let config = BujjiConfig::load(file.path()).unwrap();
    assert_eq!(config.get_api_key("groq").as_deref(), Some("from-env"));
    assert_eq!(config.get_api_key("openai").as_deref(), Some("sk-file"));
    assert_eq!(config.workflow.default_model, "openai:gpt-4o-mini");
    assert!(!config.workflow.index_exchanges);
    assert_eq!(config.workflow.max_tool_iterations, 10);
    assert_eq!(config.vector.dimension(), 384);
    match &config.vector {
        VectorBackendConfig::Pinecone { index, cloud, region, .. } => {
            assert_eq!(index.as_deref(), Some("bujji"));
            assert_eq!(cloud, "aws");
            assert_eq!(region, "us-east-1");
        }
        other => panic!("expected pinecone backend, got {other:?}"),
    }
}

#[test]
fn missing_config_file_is_a_configuration_error() {
    let err = BujjiConfig::load("/nonexistent/bujji.toml").unwrap_err();
    assert!(matches!(err, BujjiError::Configuration(_)));
}

#[test]
fn workflow_settings_builder_overrides_single_fields() {
    let settings = WorkflowSettings::builder()
        .max_tool_iterations(3)
        .default_model("openai:gpt-4o")
        .build();
    assert_eq!(settings.max_tool_iterations, 3);
    assert_eq!(settings.default_model, "openai:gpt-4o");
    assert_eq!(settings.tool_max_attempts, 2);
    assert_eq!(WorkflowSettings::default().default_model, DEFAULT_MODEL);
}
