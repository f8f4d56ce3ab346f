//! Relevance reranking of pooled retrieval results.
//!
//! Retrieval variants are fused with reciprocal ranks, which preserves no
//! absolute relevance signal. The reranker restores one by scoring every
//! pooled chunk directly against the user's question.

use std::sync::Arc;

use async_trait::async_trait;
use mesa_core::{AppError, AppResult};

use crate::embeddings::EmbeddingProvider;
use crate::index::dense::{dot, normalize};
use crate::retrieve::RetrievedChunk;

/// Scores query-passage pairs. Higher means more relevant.
#[async_trait]
pub trait RelevanceScorer: Send + Sync {
    /// Return one score per passage, aligned by position.
    async fn score_pairs(&self, query: &str, passages: &[String]) -> AppResult<Vec<f32>>;
}

/// Scorer backed by an embedding provider: cosine similarity between the
/// query vector and each passage vector.
pub struct EmbeddingScorer {
    provider: Arc<dyn EmbeddingProvider>,
}

impl EmbeddingScorer {
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl RelevanceScorer for EmbeddingScorer {
    async fn score_pairs(&self, query: &str, passages: &[String]) -> AppResult<Vec<f32>> {
        let mut query_vec = self.provider.embed(query).await?;
        normalize(&mut query_vec);

        let mut passage_vecs = self.provider.embed_batch(passages).await?;
        Ok(passage_vecs
            .iter_mut()
            .map(|vec| {
                normalize(vec);
                dot(&query_vec, vec)
            })
            .collect())
    }
}

/// Re-order a pooled retrieval result by relevance to `question`, keeping
/// the `top_n` best.
///
/// Chunk scores are replaced with the scorer's values. Ties break on chunk
/// id so the ordering is stable across runs.
pub async fn rerank(
    scorer: &dyn RelevanceScorer,
    question: &str,
    pool: Vec<RetrievedChunk>,
    top_n: usize,
) -> AppResult<Vec<RetrievedChunk>> {
    if pool.is_empty() {
        return Ok(pool);
    }

    let passages: Vec<String> = pool.iter().map(|rc| rc.chunk.text.clone()).collect();
    let scores = scorer.score_pairs(question, &passages).await?;

    if scores.len() != pool.len() {
        return Err(AppError::Other(format!(
            "Relevance scorer returned {} scores for {} passages",
            scores.len(),
            pool.len()
        )));
    }

    let mut scored: Vec<RetrievedChunk> = pool
        .into_iter()
        .zip(scores)
        .map(|(mut rc, score)| {
            rc.score = score;
            rc
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk.id.cmp(&b.chunk.id))
    });
    scored.truncate(top_n);
    Ok(scored)
}
