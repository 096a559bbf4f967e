//! Vector search over category embeddings.
//!
//! # Architecture
//!
//! - `embeddings`: Remote embedding client and order-preserving batching
//! - `index`: In-memory parallel-array index with exact cosine search
//! - `storage`: Binary per-platform index files with atomic replace
//! - `registry`: Platform -> resident index map with build/load/delete lifecycle

pub mod embeddings;
mod index;
mod registry;
mod storage;

pub use embeddings::{
    embed_one, EmbeddingClient, EmbeddingError, OpenAiConfig, OpenAiEmbeddingClient,
};
pub use index::{IndexError, SearchResult, VectorIndex};
pub use registry::{IndexRegistry, RegistryError};
pub use storage::{VectorStorage, VectorStorageError};

/// Default number of results for a plain search
pub const DEFAULT_TOP_K: usize = 5;

/// Default number of source candidates in chain resolution
pub const DEFAULT_CHAIN_K: usize = 3;
