//! In-memory vector index with exact cosine similarity search.
//!
//! Holds one platform's categories as parallel arrays: `ids[i]`, `texts[i]`
//! and `vectors[i]` always describe the same category.

use std::collections::HashMap;

use serde::Serialize;

use crate::taxonomy::Category;

/// Immutable vector index for one platform.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndex {
    ids: Vec<String>,
    texts: Vec<String>,
    vectors: Vec<Vec<f32>>,
    /// Expected embedding dimensions (0 for an empty index)
    dimensions: usize,
    /// Category id -> first position holding it
    positions: HashMap<String, usize>,
}

/// Search result from the vector index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    /// Category id
    pub id: String,
    /// Cosine similarity rounded to 4 decimal digits
    pub score: f32,
}

impl VectorIndex {
    /// Assemble an index from parallel arrays, checking that they line up and
    /// that every vector has the same dimensionality.
    pub fn from_parts(
        ids: Vec<String>,
        texts: Vec<String>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<Self, IndexError> {
        if ids.len() != vectors.len() || ids.len() != texts.len() {
            return Err(IndexError::LengthMismatch {
                ids: ids.len(),
                texts: texts.len(),
                vectors: vectors.len(),
            });
        }

        let dimensions = vectors.first().map(Vec::len).unwrap_or(0);
        if let Some((position, v)) = vectors
            .iter()
            .enumerate()
            .find(|(_, v)| v.len() != dimensions)
        {
            return Err(IndexError::InconsistentDimensions {
                position,
                expected: dimensions,
                got: v.len(),
            });
        }

        let mut positions = HashMap::with_capacity(ids.len());
        for (i, id) in ids.iter().enumerate() {
            positions.entry(id.clone()).or_insert(i);
        }

        Ok(Self {
            ids,
            texts,
            vectors,
            dimensions,
            positions,
        })
    }

    /// Pair categories with their embeddings, position by position.
    pub fn from_categories(
        categories: Vec<Category>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<Self, IndexError> {
        let (ids, texts) = categories.into_iter().map(|c| (c.id, c.text)).unzip();
        Self::from_parts(ids, texts, vectors)
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    #[cfg(test)]
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    #[cfg(test)]
    pub fn vectors(&self) -> &[Vec<f32>] {
        &self.vectors
    }

    /// Resolve a category id back to the text it was embedded from.
    pub fn text_of(&self, id: &str) -> Option<&str> {
        self.positions.get(id).map(|&i| self.texts[i].as_str())
    }

    /// Iterate `(id, text, vector)` triples in index order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &[f32])> {
        self.ids
            .iter()
            .zip(self.texts.iter())
            .zip(self.vectors.iter())
            .map(|((id, text), v)| (id.as_str(), text.as_str(), v.as_slice()))
    }

    /// Score every stored vector against `query` and return the `limit` best.
    ///
    /// Exhaustive scan. Exact ties keep insertion order (stable sort).
    pub fn search(&self, query: &[f32], limit: usize) -> Result<Vec<SearchResult>, IndexError> {
        if self.is_empty() {
            return Ok(Vec::new());
        }

        if query.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                got: query.len(),
            });
        }

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (i, cosine_similarity(query, v)))
            .collect();

        // sort_by is stable
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);

        Ok(scored
            .into_iter()
            .map(|(i, score)| SearchResult {
                id: self.ids[i].clone(),
                score: round_score(score),
            })
            .collect())
    }
}

/// Cosine similarity. Defined as 0 when either vector has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let norm_a = l2_norm(a);
    let norm_b = l2_norm(b);
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    // float error can push parallel vectors slightly past 1
    (dot_product / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

fn round_score(score: f32) -> f32 {
    ((score as f64 * 10_000.0).round() / 10_000.0) as f32
}

/// Errors that can occur during index operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Parallel arrays differ in length: {ids} ids, {texts} texts, {vectors} vectors")]
    LengthMismatch {
        ids: usize,
        texts: usize,
        vectors: usize,
    },

    #[error("Vector at position {position} has {got} dimensions, expected {expected}")]
    InconsistentDimensions {
        position: usize,
        expected: usize,
        got: usize,
    },
}
