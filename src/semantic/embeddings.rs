//! Remote embedding generation.
//!
//! Provides:
//! - `EmbeddingClient`, the seam every index build and query goes through
//! - `OpenAiEmbeddingClient`, an OpenAI-compatible `/embeddings` client
//! - `embed_in_batches`, which splits large inputs and restores input order

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Default per-request timeout (60 seconds)
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Largest batch the embedding service accepts in one call
pub const MAX_BATCH_SIZE: usize = 64;

/// One embedding as returned by the service, tagged with the position of its
/// input inside the request.
#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingData {
    pub index: usize,
    pub embedding: Vec<f32>,
}

/// Error type for embedding operations
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("Embedding API error: {status} - {body}")]
    Status { status: u16, body: String },

    #[error("Embedding request timed out after {0} seconds")]
    Timeout(u64),

    #[error("Embedding transport error: {0}")]
    Transport(String),

    #[error("Malformed embedding response: {0}")]
    Malformed(String),
}

/// Turns text into dense vectors.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Name of the model producing the vectors. Persisted indexes are tied to it.
    fn model(&self) -> &str;

    /// Embed one batch. Results may come back in any order; `index` points at
    /// the input they belong to.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<EmbeddingData>, EmbeddingError>;
}

/// Embed a single text.
pub async fn embed_one(
    client: &dyn EmbeddingClient,
    text: &str,
) -> Result<Vec<f32>, EmbeddingError> {
    let mut vectors = embed_in_batches(client, &[text.to_string()], 1).await?;
    vectors
        .pop()
        .ok_or_else(|| EmbeddingError::Malformed("No embedding returned".to_string()))
}

/// Embed `texts` in order-preserving batches of at most `batch_size`.
///
/// Batches are sent one after another. Inside each batch results are re-sorted
/// by their reported index, so `result[i]` is always the vector of `texts[i]`.
/// Any failed batch fails the whole call.
pub async fn embed_in_batches(
    client: &dyn EmbeddingClient,
    texts: &[String],
    batch_size: usize,
) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    let batch_size = batch_size.clamp(1, MAX_BATCH_SIZE);
    let mut embeddings = Vec::with_capacity(texts.len());

    for batch in texts.chunks(batch_size) {
        let mut data = client.embed_batch(batch).await?;
        data.sort_by_key(|d| d.index);

        if data.len() != batch.len() {
            return Err(EmbeddingError::Malformed(format!(
                "expected {} embeddings, got {}",
                batch.len(),
                data.len()
            )));
        }
        if let Some((position, d)) = data.iter().enumerate().find(|(i, d)| d.index != *i) {
            return Err(EmbeddingError::Malformed(format!(
                "unexpected embedding index {} at position {position} of a batch of {}",
                d.index,
                batch.len()
            )));
        }

        embeddings.extend(data.into_iter().map(|d| d.embedding));
        if texts.len() > batch_size {
            log::info!("[Embedding] processed {}/{}", embeddings.len(), texts.len());
        }
    }

    Ok(embeddings)
}

/// Connection settings for an OpenAI-compatible embedding endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    /// Reject responses whose vectors are not this long
    pub dimensions: Option<usize>,
    pub timeout: Duration,
}

/// Client for OpenAI-compatible `/embeddings` endpoints (OpenAI, SiliconFlow, ...).
pub struct OpenAiEmbeddingClient {
    client: Client,
    config: OpenAiConfig,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

impl OpenAiEmbeddingClient {
    pub fn new(config: OpenAiConfig) -> Result<Self, EmbeddingError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .no_proxy()
            .build()
            .map_err(|e| EmbeddingError::Transport(e.to_string()))?;

        Ok(Self { client, config })
    }

    fn map_send_error(&self, err: reqwest::Error) -> EmbeddingError {
        if err.is_timeout() {
            EmbeddingError::Timeout(self.config.timeout.as_secs())
        } else {
            EmbeddingError::Transport(err.to_string())
        }
    }
}

#[async_trait]
impl EmbeddingClient for OpenAiEmbeddingClient {
    fn model(&self) -> &str {
        &self.config.model
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<EmbeddingData>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let request = EmbeddingRequest {
            model: &self.config.model,
            input: texts,
        };

        let response = self
            .client
            .post(format!(
                "{}/embeddings",
                self.config.base_url.trim_end_matches('/')
            ))
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::Malformed(e.to_string()))?;

        if let Some(expected) = self.config.dimensions {
            if let Some(d) = body.data.iter().find(|d| d.embedding.len() != expected) {
                return Err(EmbeddingError::Malformed(format!(
                    "model returned {} dimensions, expected {expected}",
                    d.embedding.len()
                )));
            }
        }

        Ok(body.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Answers every batch in reverse order and records batch sizes.
    struct ReversingClient {
        batches: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl EmbeddingClient for ReversingClient {
        fn model(&self) -> &str {
            "reversing"
        }

        async fn embed_batch(
            &self,
            texts: &[String],
        ) -> Result<Vec<EmbeddingData>, EmbeddingError> {
            self.batches.lock().unwrap().push(texts.len());
            Ok(texts
                .iter()
                .enumerate()
                .rev()
                .map(|(index, t)| EmbeddingData {
                    index,
                    embedding: vec![t.parse::<f32>().unwrap()],
                })
                .collect())
        }
    }

    struct FailingClient;

    #[async_trait]
    impl EmbeddingClient for FailingClient {
        fn model(&self) -> &str {
            "failing"
        }

        async fn embed_batch(&self, _: &[String]) -> Result<Vec<EmbeddingData>, EmbeddingError> {
            Err(EmbeddingError::Status {
                status: 429,
                body: "rate limited".to_string(),
            })
        }
    }

    struct ShortClient;

    #[async_trait]
    impl EmbeddingClient for ShortClient {
        fn model(&self) -> &str {
            "short"
        }

        async fn embed_batch(&self, _: &[String]) -> Result<Vec<EmbeddingData>, EmbeddingError> {
            Ok(vec![EmbeddingData {
                index: 0,
                embedding: vec![1.0],
            }])
        }
    }

    #[tokio::test]
    async fn test_batches_restore_input_order() {
        let client = ReversingClient {
            batches: Mutex::new(Vec::new()),
        };
        let texts: Vec<String> = (0..7).map(|i| i.to_string()).collect();

        let vectors = embed_in_batches(&client, &texts, 3).await.unwrap();

        let flat: Vec<f32> = vectors.into_iter().flatten().collect();
        assert_eq!(flat, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(*client.batches.lock().unwrap(), vec![3, 3, 1]);
    }

    #[tokio::test]
    async fn test_batch_size_capped() {
        let client = ReversingClient {
            batches: Mutex::new(Vec::new()),
        };
        let texts: Vec<String> = (0..100).map(|i| i.to_string()).collect();

        embed_in_batches(&client, &texts, 1000).await.unwrap();
        assert_eq!(*client.batches.lock().unwrap(), vec![64, 36]);
    }

    #[tokio::test]
    async fn test_empty_input_makes_no_calls() {
        let client = ReversingClient {
            batches: Mutex::new(Vec::new()),
        };
        let vectors = embed_in_batches(&client, &[], 32).await.unwrap();
        assert!(vectors.is_empty());
        assert!(client.batches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remote_error_surfaces() {
        let result = embed_one(&FailingClient, "mouse").await;
        match result {
            Err(e @ EmbeddingError::Status { .. }) => {
                assert_eq!(e.to_string(), "Embedding API error: 429 - rate limited");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_embeddings_rejected() {
        let texts = vec!["a".to_string(), "b".to_string()];
        let result = embed_in_batches(&ShortClient, &texts, 8).await;
        match result {
            Err(EmbeddingError::Malformed(msg)) => {
                assert_eq!(msg, "expected 2 embeddings, got 1")
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    struct GappedClient;

    #[async_trait]
    impl EmbeddingClient for GappedClient {
        fn model(&self) -> &str {
            "gapped"
        }

        async fn embed_batch(&self, _: &[String]) -> Result<Vec<EmbeddingData>, EmbeddingError> {
            Ok([0, 2]
                .into_iter()
                .map(|index| EmbeddingData {
                    index,
                    embedding: vec![1.0],
                })
                .collect())
        }
    }

    #[tokio::test]
    async fn test_gapped_indexes_rejected() {
        let texts = vec!["a".to_string(), "b".to_string()];
        let result = embed_in_batches(&GappedClient, &texts, 8).await;
        match result {
            Err(EmbeddingError::Malformed(msg)) => assert_eq!(
                msg,
                "unexpected embedding index 2 at position 1 of a batch of 2"
            ),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
