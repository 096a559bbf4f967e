//! Multi-hop mapping: query -> source platform candidates -> best match on
//! every other platform.

use std::collections::BTreeMap;

use futures::future::join_all;
use serde::Serialize;

use crate::{
    app::{
        errors::MapperError,
        service::{validate_query, CategoryMapper},
    },
    platform::Platform,
    semantic::{SearchResult, VectorIndex},
};

/// Source platform candidate with its resolved category text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChainSource {
    pub id: String,
    pub score: f32,
    pub text: String,
}

/// Best match on one target platform, or why there is none.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Mapping {
    Match(SearchResult),
    Failed { error: String },
}

#[cfg(test)]
impl Mapping {
    pub fn as_match(&self) -> Option<&SearchResult> {
        match self {
            Mapping::Match(result) => Some(result),
            Mapping::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Mapping::Match(_) => None,
            Mapping::Failed { error } => Some(error),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChainEntry {
    pub source: ChainSource,
    pub mappings: BTreeMap<Platform, Mapping>,
}

impl CategoryMapper {
    /// Map `text` through the source taxonomy into every other platform.
    ///
    /// Failing to load or search the source platform fails the call. A target
    /// platform failure is recorded in that candidate's mappings only.
    /// Entries keep the candidate ranking order.
    pub async fn chain(&self, text: &str, k: usize) -> Result<Vec<ChainEntry>, MapperError> {
        let text = validate_query(text, k)?;

        let source = self.ensure_loaded(Platform::SOURCE).await?;
        let candidates = self.search_index(&source, text, k).await?;

        log::debug!(
            "[Chain] {} {} candidates for {text:?}",
            candidates.len(),
            Platform::SOURCE
        );

        let entries = join_all(
            candidates
                .into_iter()
                .map(|candidate| self.resolve_candidate(&source, candidate)),
        )
        .await;

        Ok(entries)
    }

    async fn resolve_candidate(&self, source: &VectorIndex, candidate: SearchResult) -> ChainEntry {
        let text = source
            .text_of(&candidate.id)
            .map(str::to_string)
            .unwrap_or_default();

        let targets: Vec<Platform> = Platform::SOURCE.others().collect();
        let matches = join_all(targets.iter().map(|target| self.best_match(*target, &text))).await;

        ChainEntry {
            source: ChainSource {
                id: candidate.id,
                score: candidate.score,
                text,
            },
            mappings: targets.into_iter().zip(matches).collect(),
        }
    }

    async fn best_match(&self, target: Platform, text: &str) -> Mapping {
        match self.search(target, text, 1).await {
            Ok(results) => match results.into_iter().next() {
                Some(best) => Mapping::Match(best),
                None => Mapping::Failed {
                    error: format!("index for platform {target} is empty"),
                },
            },
            Err(e) => {
                log::warn!("[Chain] {target} lookup failed: {e}");
                Mapping::Failed {
                    error: e.to_string(),
                }
            }
        }
    }
}
