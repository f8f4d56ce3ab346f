//! Answerability gates between retrieval and generation.
//!
//! Generation only runs when the retrieved context clears four checks, in
//! order: enough material exists (volume), the context as a whole is about
//! the question (semantic), at least one question token literally appears
//! in it (anchor), and at least one single chunk is close to the question
//! (similarity). Failing any gate abstains; the model never sees context
//! that could not support an answer.

use mesa_core::AppResult;
use tracing::debug;

use crate::config::RagConfig;
use crate::embeddings::EmbeddingProvider;
use crate::index::dense::{dot, normalize as normalize_vec};
use crate::retrieve::RetrievedChunk;
use crate::text::{normalize, tokenize, CONTENT_TOKEN_LEN};

/// How many top chunks the semantic and anchor gates inspect.
const GATE_CONTEXT_CHUNKS: usize = 5;

/// The gate that stopped a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateStage {
    Volume,
    Semantic,
    Anchor,
    Similarity,
}

/// Decision for one question-context pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    Proceed,
    Abstain(GateStage),
}

/// Evaluate all gates for `question` against the ranked retrieval result.
///
/// The question is embedded as the user wrote it; typo expansion must not
/// influence whether its evidence is judged sufficient. Per-chunk checks
/// reuse the normalized vectors stored on the chunks at index time.
pub async fn evaluate(
    embedder: &dyn EmbeddingProvider,
    question: &str,
    retrieved: &[RetrievedChunk],
    config: &RagConfig,
) -> AppResult<GateOutcome> {
    if retrieved.is_empty() {
        return Ok(GateOutcome::Abstain(GateStage::Volume));
    }

    let total_chars: usize = retrieved
        .iter()
        .map(|rc| rc.chunk.text.chars().count())
        .sum();
    if total_chars < config.min_context_chars {
        debug!(total_chars, "Context below volume threshold");
        return Ok(GateOutcome::Abstain(GateStage::Volume));
    }

    let mut question_vec = embedder.embed(question).await?;
    normalize_vec(&mut question_vec);

    let joined: String = retrieved
        .iter()
        .take(GATE_CONTEXT_CHUNKS)
        .map(|rc| rc.chunk.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");

    let mut context_vec = embedder.embed(&joined).await?;
    normalize_vec(&mut context_vec);

    let context_sim = dot(&question_vec, &context_vec);
    if context_sim < config.ood_min_similarity {
        debug!(context_sim, "Question out of context domain");
        return Ok(GateOutcome::Abstain(GateStage::Semantic));
    }

    let question_tokens = tokenize(&normalize(question), CONTENT_TOKEN_LEN);
    if !question_tokens.is_empty() {
        let haystack = normalize(&joined);
        if !question_tokens.iter().any(|token| haystack.contains(token)) {
            debug!("No question token anchors the context");
            return Ok(GateOutcome::Abstain(GateStage::Anchor));
        }
    }

    let best_chunk_sim = retrieved
        .iter()
        .map(|rc| dot(&question_vec, &rc.chunk.embedding))
        .fold(f32::MIN, f32::max);
    if best_chunk_sim < config.chunk_min_similarity {
        debug!(best_chunk_sim, "No single chunk close enough to the question");
        return Ok(GateOutcome::Abstain(GateStage::Similarity));
    }

    debug!(context_sim, best_chunk_sim, "Gates passed");
    Ok(GateOutcome::Proceed)
}
