//! Process-wide registry of resident vector indexes.
//!
//! Maps each platform to at most one loaded `VectorIndex`. Indexes are shared
//! as `Arc`s, so a rebuild swaps the entry without disturbing searches that
//! already hold the previous index.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use crate::platform::Platform;
use crate::semantic::embeddings::{embed_in_batches, EmbeddingClient, EmbeddingError};
use crate::semantic::index::{IndexError, VectorIndex};
use crate::semantic::storage::{model_id_hash, VectorStorage, VectorStorageError};
use crate::taxonomy::Category;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("index not found for platform {0}")]
    NotFound(Platform),

    #[error("index not loaded for platform {0}")]
    NotLoaded(Platform),

    #[error("embedding model {client} does not match index model {index}")]
    ModelMismatch { index: String, client: String },

    #[error("{0}")]
    Embedding(#[from] EmbeddingError),

    #[error("{0}")]
    Storage(VectorStorageError),

    #[error("{0}")]
    Index(#[from] IndexError),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Registry of loaded indexes, one slot per platform.
pub struct IndexRegistry {
    storage: VectorStorage,
    model: String,
    model_id: [u8; 32],
    indexes: RwLock<HashMap<Platform, Arc<VectorIndex>>>,
    /// Serializes builds of the same platform
    build_locks: HashMap<Platform, tokio::sync::Mutex<()>>,
}

impl IndexRegistry {
    /// Create an empty registry persisting under `storage`, tied to `model_name`.
    pub fn new(storage: VectorStorage, model_name: &str) -> Self {
        Self {
            storage,
            model: model_name.to_string(),
            model_id: model_id_hash(model_name),
            indexes: RwLock::new(HashMap::new()),
            build_locks: Platform::ALL
                .into_iter()
                .map(|p| (p, tokio::sync::Mutex::new(())))
                .collect(),
        }
    }

    pub fn storage(&self) -> &VectorStorage {
        &self.storage
    }

    /// Embed `categories`, persist the result and make it the resident index.
    ///
    /// Nothing is persisted or registered unless every batch embeds
    /// successfully. Concurrent builds of one platform run one after another.
    /// `client` must embed with the model this registry stamps into files.
    pub async fn build(
        &self,
        platform: Platform,
        categories: Vec<Category>,
        client: &dyn EmbeddingClient,
        batch_size: usize,
    ) -> Result<Arc<VectorIndex>, RegistryError> {
        if client.model() != self.model {
            return Err(RegistryError::ModelMismatch {
                index: self.model.clone(),
                client: client.model().to_string(),
            });
        }

        let _guard = self.build_lock(platform).lock().await;
        let started = Instant::now();

        log::info!("[Index] building {platform}: {} categories", categories.len());

        let texts: Vec<String> = categories.iter().map(|c| c.text.clone()).collect();
        let vectors = embed_in_batches(client, &texts, batch_size).await?;
        let index = Arc::new(VectorIndex::from_categories(categories, vectors)?);

        let storage = self.storage.clone();
        let model_id = self.model_id;
        let to_save = index.clone();
        tokio::task::spawn_blocking(move || storage.save(platform, &to_save, &model_id))
            .await?
            .map_err(RegistryError::Storage)?;

        self.write().insert(platform, index.clone());

        log::info!(
            "[Index] {platform} built in {:.2}s, saved to {}",
            started.elapsed().as_secs_f64(),
            self.storage.path(platform).display()
        );

        Ok(index)
    }

    /// Make the persisted index for `platform` resident.
    ///
    /// Returns the existing index when already loaded.
    pub async fn load(&self, platform: Platform) -> Result<Arc<VectorIndex>, RegistryError> {
        if let Ok(index) = self.get(platform) {
            return Ok(index);
        }

        let storage = self.storage.clone();
        let model_id = self.model_id;
        let loaded = tokio::task::spawn_blocking(move || storage.load(platform, &model_id))
            .await?
            .map_err(|e| match e {
                VectorStorageError::NotFound(_) => RegistryError::NotFound(platform),
                other => RegistryError::Storage(other),
            })?;

        // a concurrent load or build may have registered it meanwhile
        let index = self
            .write()
            .entry(platform)
            .or_insert_with(|| Arc::new(loaded))
            .clone();

        log::info!("[Index] loaded {platform}: {} vectors", index.len());
        Ok(index)
    }

    /// Drop `platform` from memory and from disk. Either being absent is fine.
    pub async fn delete(&self, platform: Platform) -> Result<(), RegistryError> {
        let storage = self.storage.clone();
        let removed_file = tokio::task::spawn_blocking(move || storage.delete(platform))
            .await?
            .map_err(RegistryError::Storage)?;
        let removed_index = self.write().remove(&platform).is_some();

        if removed_file || removed_index {
            log::info!("[Index] deleted {platform}");
        }
        Ok(())
    }

    /// The resident index for `platform`, without loading it.
    pub fn get(&self, platform: Platform) -> Result<Arc<VectorIndex>, RegistryError> {
        self.read()
            .get(&platform)
            .cloned()
            .ok_or(RegistryError::NotLoaded(platform))
    }

    /// With a platform: whether that platform is resident.
    /// Without: whether any platform is.
    pub fn is_loaded(&self, platform: Option<Platform>) -> bool {
        let indexes = self.read();
        match platform {
            Some(platform) => indexes.contains_key(&platform),
            None => !indexes.is_empty(),
        }
    }

    /// Resident platforms in declaration order.
    pub fn loaded_platforms(&self) -> Vec<Platform> {
        Platform::ALL
            .into_iter()
            .filter(|p| self.is_loaded(Some(*p)))
            .collect()
    }

    fn build_lock(&self, platform: Platform) -> &tokio::sync::Mutex<()> {
        // populated for every platform in `new`
        &self.build_locks[&platform]
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<Platform, Arc<VectorIndex>>> {
        self.indexes.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<Platform, Arc<VectorIndex>>> {
        self.indexes.write().unwrap_or_else(PoisonError::into_inner)
    }
}
