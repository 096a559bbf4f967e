use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    platform::Platform,
    semantic::embeddings::{DEFAULT_TIMEOUT, MAX_BATCH_SIZE},
    storage::{self, StorageManager},
};

const CONFIG_FILE: &str = "config.yaml";

const DEFAULT_EMBEDDING_BASE_URL: &str = "https://api.siliconflow.cn/v1";
const DEFAULT_EMBEDDING_MODEL: &str = "BAAI/bge-m3";
const DEFAULT_EMBEDDING_DIMENSIONS: usize = 1024;
/// Default embedding batch size (the service accepts at most 64)
const DEFAULT_BATCH_SIZE: usize = 32;
const DEFAULT_PORT: u16 = 6006;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config is malformed: {0}")]
    Malformed(#[from] serde_yml::Error),

    #[error("{field}: {message}")]
    Invalid {
        field: &'static str,
        message: String,
    },
}

impl ConfigError {
    fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            message: message.into(),
        }
    }
}

/// Remote embedding service settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// OpenAI-compatible API root, `/embeddings` is appended
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Bearer token. Prefer EMBEDDING_API_KEY over storing it here.
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Expected vector length; embeddings of another size are rejected
    #[serde(default = "default_dimensions")]
    pub dimensions: Option<usize>,

    /// Texts per embedding request
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: String::new(),
            model: default_model(),
            dimensions: default_dimensions(),
            batch_size: default_batch_size(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_base_url() -> String {
    DEFAULT_EMBEDDING_BASE_URL.to_string()
}

fn default_model() -> String {
    DEFAULT_EMBEDDING_MODEL.to_string()
}

fn default_dimensions() -> Option<usize> {
    Some(DEFAULT_EMBEDDING_DIMENSIONS)
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT.as_secs()
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub server: ServerConfig,

    /// Directory holding `<platform>.tsv` sources, relative to the base path
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Directory holding persisted `<platform>.bin` indexes, relative to the base path
    #[serde(default = "default_index_dir")]
    pub index_dir: String,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            embedding: EmbeddingConfig::default(),
            server: ServerConfig::default(),
            data_dir: default_data_dir(),
            index_dir: default_index_dir(),
            base_path: PathBuf::new(),
        }
    }
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_index_dir() -> String {
    "vectors".to_string()
}

impl Config {
    /// Load `config.yaml` from `base_path`, creating it with defaults when
    /// missing, then apply environment overrides and validate.
    pub fn load_with(base_path: &Path) -> Result<Self, ConfigError> {
        Self::load_with_env(base_path, |key| std::env::var(key).ok())
    }

    pub fn load_with_env(
        base_path: &Path,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let store = storage::BackendLocal::new(base_path)?;

        // create new if does not exist
        if !store.exists(CONFIG_FILE) {
            store.write(CONFIG_FILE, serde_yml::to_string(&Self::default())?.as_bytes())?;
        }

        let config_str = store.read_to_string(CONFIG_FILE)?;
        let mut config: Self = serde_yml::from_str(&config_str)?;
        config.base_path = base_path.to_path_buf();

        // resave in case config version needs an upgrade, before env values
        // get mixed in so secrets never land on disk
        if config_str != serde_yml::to_string(&config)? {
            config.save()?;
        }

        config.apply_env(env)?;
        config.validate()?;

        Ok(config)
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let store = storage::BackendLocal::new(&self.base_path)?;
        let config_str = serde_yml::to_string(&self)?;
        store.write(CONFIG_FILE, config_str.as_bytes())?;
        Ok(())
    }

    fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(url) = env("EMBEDDING_BASE_URL") {
            self.embedding.base_url = url;
        }
        if let Some(key) = env("EMBEDDING_API_KEY") {
            self.embedding.api_key = key;
        }
        if let Some(model) = env("EMBEDDING_MODEL_NAME") {
            self.embedding.model = model;
        }
        if let Some(dimensions) = env("EMBEDDING_DIMENSION") {
            let dimensions = dimensions.trim().parse::<usize>().map_err(|_| {
                ConfigError::invalid("EMBEDDING_DIMENSION", format!("not a number: {dimensions}"))
            })?;
            self.embedding.dimensions = Some(dimensions);
        }
        if let Some(port) = env("PORT") {
            self.server.port = port
                .trim()
                .parse()
                .map_err(|_| ConfigError::invalid("PORT", format!("not a port: {port}")))?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let emb = &self.embedding;

        let url = url::Url::parse(&emb.base_url)
            .map_err(|e| ConfigError::invalid("embedding.base_url", e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::invalid(
                "embedding.base_url",
                format!("unsupported scheme '{}'", url.scheme()),
            ));
        }

        if emb.model.trim().is_empty() {
            return Err(ConfigError::invalid("embedding.model", "must not be empty"));
        }

        if !(1..=MAX_BATCH_SIZE).contains(&emb.batch_size) {
            return Err(ConfigError::invalid(
                "embedding.batch_size",
                format!("must be between 1 and {MAX_BATCH_SIZE}, got {}", emb.batch_size),
            ));
        }

        if emb.timeout_secs == 0 {
            return Err(ConfigError::invalid("embedding.timeout_secs", "must be greater than 0"));
        }

        if emb.dimensions == Some(0) {
            return Err(ConfigError::invalid("embedding.dimensions", "must be greater than 0"));
        }

        Ok(())
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn data_path(&self) -> PathBuf {
        self.base_path.join(&self.data_dir)
    }

    pub fn index_path(&self) -> PathBuf {
        self.base_path.join(&self.index_dir)
    }

    /// File name of the TSV source for `platform` inside `data_path()`.
    pub fn tsv_name(platform: Platform) -> String {
        format!("{}.tsv", platform.as_str())
    }
}
