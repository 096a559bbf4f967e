use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;

use crate::{
    app::errors::MapperError,
    config::Config,
    platform::Platform,
    semantic::{embed_one, EmbeddingClient, IndexRegistry, RegistryError, SearchResult, VectorIndex},
    storage::StorageManager,
    taxonomy::parse_tsv,
};

/// Supported and resident platforms, in declaration order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    pub supported_platforms: Vec<Platform>,
    pub loaded_platforms: Vec<Platform>,
}

/// Category mapping operations shared by the HTTP server and the CLI.
pub struct CategoryMapper {
    registry: Arc<IndexRegistry>,
    embedder: Arc<dyn EmbeddingClient>,
    sources: Arc<dyn StorageManager>,
    batch_size: usize,
}

impl CategoryMapper {
    pub fn new(
        registry: Arc<IndexRegistry>,
        embedder: Arc<dyn EmbeddingClient>,
        sources: Arc<dyn StorageManager>,
        batch_size: usize,
    ) -> Self {
        Self {
            registry,
            embedder,
            sources,
            batch_size,
        }
    }

    #[cfg(test)]
    pub fn registry(&self) -> &IndexRegistry {
        &self.registry
    }

    /// Rebuild `platform` from its `<platform>.tsv` source file.
    ///
    /// Returns the number of indexed categories.
    pub async fn build(&self, platform: Platform) -> Result<usize, MapperError> {
        let sources = self.sources.clone();
        let name = Config::tsv_name(platform);
        let content = tokio::task::spawn_blocking(move || {
            sources.read_to_string(&name).map_err(|e| {
                std::io::Error::new(
                    e.kind(),
                    format!("failed to read {}: {e}", sources.path_of(&name).display()),
                )
            })
        })
        .await
        .map_err(|e| MapperError::Internal(e.to_string()))??;

        self.build_from_tsv(platform, &content).await
    }

    /// Rebuild `platform` from TSV content.
    pub async fn build_from_tsv(
        &self,
        platform: Platform,
        content: &str,
    ) -> Result<usize, MapperError> {
        let categories = parse_tsv(content);
        log::info!("[Build] parsed {} {platform} categories", categories.len());

        let index = self
            .registry
            .build(platform, categories, self.embedder.as_ref(), self.batch_size)
            .await?;

        Ok(index.len())
    }

    /// Rebuild every platform in turn. A failing platform is reported and
    /// does not stop the others.
    pub async fn build_all(&self) -> Vec<(Platform, Result<usize, MapperError>)> {
        let mut results = Vec::with_capacity(Platform::ALL.len());

        for platform in Platform::ALL {
            let result = self.build(platform).await;
            match &result {
                Ok(count) => log::info!("[Build] {platform}: {count} categories indexed"),
                Err(e) => log::warn!("[Build] {platform} failed: {e}"),
            }
            results.push((platform, result));
        }

        results
    }

    /// Make the persisted index for `platform` resident. Returns its size.
    pub async fn load(&self, platform: Platform) -> Result<usize, MapperError> {
        Ok(self.registry.load(platform).await?.len())
    }

    /// Remove `platform` from memory and disk. Idempotent.
    pub async fn delete(&self, platform: Platform) -> Result<(), MapperError> {
        Ok(self.registry.delete(platform).await?)
    }

    /// Top-`k` categories of `platform` for `text`, loading the index on first use.
    pub async fn search(
        &self,
        platform: Platform,
        text: &str,
        k: usize,
    ) -> Result<Vec<SearchResult>, MapperError> {
        let text = validate_query(text, k)?;
        let index = self.ensure_loaded(platform).await?;
        self.search_index(&index, text, k).await
    }

    /// Search several platforms concurrently. Each platform gets its own outcome.
    pub async fn search_all(
        &self,
        platforms: &[Platform],
        text: &str,
        k: usize,
    ) -> Result<Vec<(Platform, Result<Vec<SearchResult>, MapperError>)>, MapperError> {
        let text = validate_query(text, k)?;

        let mut unique: Vec<Platform> = Vec::with_capacity(platforms.len());
        for platform in platforms {
            if !unique.contains(platform) {
                unique.push(*platform);
            }
        }

        let outcomes = join_all(unique.iter().map(|p| self.search(*p, text, k))).await;
        Ok(unique.into_iter().zip(outcomes).collect())
    }

    pub fn status(&self) -> Status {
        Status {
            supported_platforms: Platform::ALL.to_vec(),
            loaded_platforms: self.registry.loaded_platforms(),
        }
    }

    /// Resident index for `platform`, loading it when absent. A missing index
    /// file is reported as not loaded.
    pub(crate) async fn ensure_loaded(
        &self,
        platform: Platform,
    ) -> Result<Arc<VectorIndex>, MapperError> {
        match self.registry.load(platform).await {
            Ok(index) => Ok(index),
            Err(RegistryError::NotFound(p)) => Err(MapperError::NotLoaded(p)),
            Err(e) => Err(e.into()),
        }
    }

    /// Embed `text` and rank it against an already resident index.
    pub(crate) async fn search_index(
        &self,
        index: &VectorIndex,
        text: &str,
        k: usize,
    ) -> Result<Vec<SearchResult>, MapperError> {
        let query = embed_one(self.embedder.as_ref(), text).await?;
        Ok(index.search(&query, k)?)
    }
}

/// Reject empty query text and a zero result count before any I/O.
pub(crate) fn validate_query(text: &str, k: usize) -> Result<&str, MapperError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(MapperError::validation("text must be a non-empty string"));
    }
    if k == 0 {
        return Err(MapperError::validation("k must be at least 1"));
    }
    Ok(text)
}
