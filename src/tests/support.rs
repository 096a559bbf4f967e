use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::app::CategoryMapper;
use crate::platform::Platform;
use crate::semantic::embeddings::EmbeddingData;
use crate::semantic::{EmbeddingClient, EmbeddingError, IndexRegistry, VectorStorage};
use crate::storage::{self, StorageManager};

/// Each keyword owns one vector dimension.
const VOCABULARY: [&str; 5] = ["mouse", "keyboard", "headphone", "wireless", "gaming"];

pub const SHOPIFY_TSV: &str = "category_id\tcategory_text\n\
    gid://shopify/TaxonomyCategory/el-1\tWireless Mouse\n\
    gid://shopify/TaxonomyCategory/el-2\tMechanical Keyboard\n";

pub const OZON_TSV: &str = "category_id\tcategory_text\n\
    17028\tMouse\n\
    17029\tKeyboard\n";

pub const YANDEX_TSV: &str = "category_id\tcategory_text\n\
    91013\tComputer mouse\n\
    91014\tKeyboard for PC\n";

/// Deterministic keyword-count embedder. Answers batches in reverse order to
/// exercise index-based reassembly.
#[derive(Default)]
pub struct FakeEmbedder {
    pub calls: AtomicUsize,
    pub fail: AtomicBool,
}

impl FakeEmbedder {
    pub fn embed(text: &str) -> Vec<f32> {
        let text = text.to_lowercase();
        VOCABULARY
            .iter()
            .map(|word| text.matches(word).count() as f32)
            .collect()
    }
}

#[async_trait]
impl EmbeddingClient for FakeEmbedder {
    fn model(&self) -> &str {
        "fake-model"
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<EmbeddingData>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(EmbeddingError::Status {
                status: 503,
                body: "upstream unavailable".to_string(),
            });
        }

        Ok(texts
            .iter()
            .enumerate()
            .rev()
            .map(|(index, text)| EmbeddingData {
                index,
                embedding: Self::embed(text),
            })
            .collect())
    }
}

/// `FakeEmbedder` that yields to the scheduler before every batch, letting
/// other tasks run while a build is in flight.
#[derive(Default)]
pub struct YieldingEmbedder(pub FakeEmbedder);

#[async_trait]
impl EmbeddingClient for YieldingEmbedder {
    fn model(&self) -> &str {
        self.0.model()
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<EmbeddingData>, EmbeddingError> {
        tokio::task::yield_now().await;
        self.0.embed_batch(texts).await
    }
}

/// Mapper over `base`, with sources in `base/data` and indexes in `base/vectors`.
pub fn mapper_at(base: &std::path::Path, embedder: Arc<dyn EmbeddingClient>) -> CategoryMapper {
    let registry = IndexRegistry::new(VectorStorage::new(base.join("vectors")), "fake-model");
    let sources =
        storage::BackendLocal::new(base.join("data")).expect("failed to create data dir");

    CategoryMapper::new(Arc::new(registry), embedder, Arc::new(sources), 2)
}

/// Creates an isolated mapper using a unique temp directory.
pub fn create_mapper() -> (CategoryMapper, Arc<FakeEmbedder>, tempfile::TempDir) {
    let tmp = tempfile::tempdir().expect("failed to create temp dir");
    let embedder = Arc::new(FakeEmbedder::default());
    let mapper = mapper_at(tmp.path(), embedder.clone());
    (mapper, embedder, tmp)
}

/// Write TSV sources for every platform into `base/data`.
pub fn write_sources(base: &std::path::Path) {
    let store = storage::BackendLocal::new(base.join("data")).unwrap();
    for (platform, content) in [
        (Platform::Shopify, SHOPIFY_TSV),
        (Platform::Ozon, OZON_TSV),
        (Platform::Yandex, YANDEX_TSV),
    ] {
        store
            .write(&format!("{platform}.tsv"), content.as_bytes())
            .unwrap();
    }
}

/// Build every platform from the fixture TSVs.
pub async fn build_fixture(mapper: &CategoryMapper) {
    mapper
        .build_from_tsv(Platform::Shopify, SHOPIFY_TSV)
        .await
        .unwrap();
    mapper.build_from_tsv(Platform::Ozon, OZON_TSV).await.unwrap();
    mapper
        .build_from_tsv(Platform::Yandex, YANDEX_TSV)
        .await
        .unwrap();
}
