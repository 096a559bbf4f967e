use crate::platform::{Platform, UnknownPlatform};
use crate::semantic::{EmbeddingError, IndexError, RegistryError, VectorStorageError};

#[derive(thiserror::Error, Debug)]
pub enum MapperError {
    /// Bad request input, rejected before any I/O
    #[error("{0}")]
    Validation(String),

    /// No persisted index; the caller may build one
    #[error("index not found for platform {0}, build it first")]
    NotFound(Platform),

    #[error("index not loaded for platform {0}")]
    NotLoaded(Platform),

    /// Embedding service failure, message kept verbatim
    #[error("{0}")]
    RemoteService(String),

    /// Persisted index failed validation and was not registered
    #[error("corrupt index: {0}")]
    CorruptState(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unexpected error: {0}")]
    Internal(String),
}

impl MapperError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

impl From<UnknownPlatform> for MapperError {
    fn from(err: UnknownPlatform) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<EmbeddingError> for MapperError {
    fn from(err: EmbeddingError) -> Self {
        Self::RemoteService(err.to_string())
    }
}

impl From<IndexError> for MapperError {
    fn from(err: IndexError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<RegistryError> for MapperError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound(platform) => Self::NotFound(platform),
            RegistryError::NotLoaded(platform) => Self::NotLoaded(platform),
            e @ RegistryError::ModelMismatch { .. } => Self::Internal(e.to_string()),
            RegistryError::Embedding(e) => e.into(),
            RegistryError::Storage(VectorStorageError::Io(e)) => Self::Io(e),
            RegistryError::Storage(e) => Self::CorruptState(e.to_string()),
            RegistryError::Index(e) => e.into(),
            RegistryError::Task(e) => Self::Internal(e.to_string()),
        }
    }
}
