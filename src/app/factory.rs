use crate::{
    app::service::CategoryMapper,
    config::Config,
    semantic::{IndexRegistry, OpenAiConfig, OpenAiEmbeddingClient, VectorStorage},
    storage,
};
use anyhow::{Context, Result};
use homedir::my_home;
use std::path::PathBuf;
use std::sync::Arc;

/// Application factory for creating and configuring application components
pub struct AppFactory;

impl AppFactory {
    /// Load config from the base path and wire the full mapper
    pub fn create_mapper(paths: &AppPaths) -> Result<(Config, CategoryMapper)> {
        let config = Self::create_config(paths)?;
        let mapper = Self::create_mapper_with(&config)?;
        Ok((config, mapper))
    }

    /// Build the embedding client, registry and source storage from `config`
    pub fn create_mapper_with(config: &Config) -> Result<CategoryMapper> {
        let emb = &config.embedding;
        if emb.api_key.trim().is_empty() {
            anyhow::bail!(
                "embedding API key is not set, export EMBEDDING_API_KEY or set embedding.api_key in {}",
                config.base_path().join("config.yaml").display()
            );
        }

        let embedder = OpenAiEmbeddingClient::new(OpenAiConfig {
            base_url: emb.base_url.clone(),
            api_key: emb.api_key.clone(),
            model: emb.model.clone(),
            dimensions: emb.dimensions,
            timeout: emb.timeout(),
        })
        .context("Failed to create embedding client")?;

        let registry = Self::create_registry(config);
        let sources = storage::BackendLocal::new(config.data_path())
            .context("Failed to create taxonomy data directory")?;

        log::debug!(
            "embedding model {} at {}, indexes in {}",
            emb.model,
            emb.base_url,
            config.index_path().display()
        );

        Ok(CategoryMapper::new(
            Arc::new(registry),
            Arc::new(embedder),
            Arc::new(sources),
            emb.batch_size,
        ))
    }

    /// Registry over the configured index directory. Needs no API key.
    pub fn create_registry(config: &Config) -> IndexRegistry {
        IndexRegistry::new(
            VectorStorage::new(config.index_path()),
            &config.embedding.model,
        )
    }

    /// Load and validate configuration
    pub fn create_config(paths: &AppPaths) -> Result<Config> {
        Config::load_with(&paths.base_path).with_context(|| {
            format!(
                "Failed to load {}",
                paths.base_path.join("config.yaml").display()
            )
        })
    }

    /// Get application paths, creating the base directory
    pub fn get_paths() -> Result<AppPaths> {
        let base_path = Self::get_base_path()?;

        std::fs::create_dir_all(&base_path)
            .context("Failed to create application base directory")?;

        Ok(AppPaths { base_path })
    }

    /// Get the base path for the application
    fn get_base_path() -> Result<PathBuf> {
        if let Ok(base_path) = std::env::var("TAXON_BASE_PATH") {
            return Ok(PathBuf::from(base_path));
        }

        let home = my_home()
            .context("Could not determine home directory")?
            .context("Home directory path is empty")?;
        Ok(home.join(".local/share/taxon"))
    }
}

/// Application paths structure
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub base_path: PathBuf,
}
