//! Hybrid dense+sparse retrieval with optional multi-query fan-out.
//!
//! Each query variant runs one dense and one sparse search whose ranked
//! lists are combined with weighted reciprocal rank fusion. Variant results
//! are pooled, deduplicated, and optionally reranked against the user's
//! original question.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use futures::future::try_join_all;
use mesa_core::AppResult;
use mesa_llm::{LlmClient, LlmRequest};
use regex::Regex;
use tracing::{debug, warn};

use crate::config::RagConfig;
use crate::embeddings::EmbeddingProvider;
use crate::index::SearchIndex;
use crate::rerank::{rerank, RelevanceScorer};
use crate::types::Chunk;

/// Rank offset of reciprocal rank fusion; the conventional value.
const RRF_K: f32 = 60.0;

/// Token budget for the paraphrase generation call.
const PARAPHRASE_MAX_TOKENS: u32 = 200;

/// Numbering or bullet prefixes models add despite being told not to.
static LIST_PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:\d+[.)\-]\s*|[-•*]\s*)").unwrap());

/// One retrieval hit: a chunk and its score in the current ranking.
///
/// The score's meaning depends on the stage: fused reciprocal ranks after
/// retrieval, scorer relevance after reranking.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Run hybrid retrieval for `query` and rank the pooled results.
///
/// `question` is the user's original wording; the reranker scores against
/// it rather than the rewritten query so that expansion terms cannot drag
/// the ranking away from what was actually asked.
///
/// Paraphrase generation failure degrades to single-query retrieval with a
/// warning. Search or embedding failures propagate.
pub async fn retrieve(
    index: &SearchIndex,
    embedder: &dyn EmbeddingProvider,
    generator: &dyn LlmClient,
    scorer: &dyn RelevanceScorer,
    query: &str,
    question: &str,
    config: &RagConfig,
) -> AppResult<Vec<RetrievedChunk>> {
    let mut variants = vec![query.to_string()];
    if config.multi_query {
        match paraphrases(generator, query, config).await {
            Ok(extra) => variants.extend(extra),
            Err(e) => {
                warn!("Paraphrase generation failed, using the original query only: {}", e)
            }
        }
    }

    let passes = try_join_all(
        variants
            .iter()
            .map(|variant| hybrid_once(index, embedder, variant, config)),
    )
    .await?;

    let mut seen = HashSet::new();
    let mut pool = Vec::new();
    for pass in passes {
        for retrieved_chunk in pass {
            if seen.insert(retrieved_chunk.chunk.id.clone()) {
                pool.push(retrieved_chunk);
            }
        }
    }

    debug!(
        variants = variants.len(),
        pooled = pool.len(),
        "Hybrid retrieval complete"
    );

    if config.rerank {
        rerank(scorer, question, pool, config.rerank_top_n).await
    } else {
        Ok(pool)
    }
}

/// One dense+sparse pass for a single query variant.
async fn hybrid_once(
    index: &SearchIndex,
    embedder: &dyn EmbeddingProvider,
    query: &str,
    config: &RagConfig,
) -> AppResult<Vec<RetrievedChunk>> {
    let query_vec = embedder.embed(query).await?;
    let dense = index.search_dense(&query_vec, config.dense_top_k);
    let sparse = index.search_sparse(query, config.sparse_top_k);

    Ok(fuse(&dense, &sparse, config.dense_weight, config.sparse_weight)
        .into_iter()
        .map(|(idx, score)| RetrievedChunk {
            chunk: index.chunk(idx).clone(),
            score,
        })
        .collect())
}

/// Weighted reciprocal rank fusion of two ranked lists.
///
/// Each list contributes `weight / (60 + rank)` per entry with ranks
/// starting at 1. Raw search scores are ignored; only positions matter.
fn fuse(
    dense: &[(usize, f32)],
    sparse: &[(usize, f32)],
    dense_weight: f32,
    sparse_weight: f32,
) -> Vec<(usize, f32)> {
    let mut scores: HashMap<usize, f32> = HashMap::new();
    for (rank, (idx, _)) in dense.iter().enumerate() {
        *scores.entry(*idx).or_insert(0.0) += dense_weight / (RRF_K + (rank + 1) as f32);
    }
    for (rank, (idx, _)) in sparse.iter().enumerate() {
        *scores.entry(*idx).or_insert(0.0) += sparse_weight / (RRF_K + (rank + 1) as f32);
    }

    let mut fused: Vec<(usize, f32)> = scores.into_iter().collect();
    fused.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });
    fused
}

/// Ask the generator for alternative phrasings of the query.
async fn paraphrases(
    generator: &dyn LlmClient,
    query: &str,
    config: &RagConfig,
) -> AppResult<Vec<String>> {
    let prompt = format!(
        "Genera {} reformulaciones distintas de la siguiente pregunta, \
         una por línea, sin numerar ni comentar.\n\nPregunta: {}",
        config.paraphrase_count, query
    );

    let request = LlmRequest::new(prompt, config.generation_model.clone())
        .with_temperature(0.0)
        .with_max_tokens(PARAPHRASE_MAX_TOKENS);

    let response = generator.complete(&request).await?;
    Ok(parse_paraphrases(
        &response.content,
        query,
        config.paraphrase_count,
    ))
}

/// Extract paraphrase lines from a model response.
fn parse_paraphrases(content: &str, original: &str, cap: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    content
        .lines()
        .map(|line| {
            LIST_PREFIX_RE
                .replace(line.trim(), "")
                .trim()
                .to_string()
        })
        .filter(|line| !line.is_empty() && line != original)
        .filter(|line| seen.insert(line.clone()))
        .take(cap)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::{DocumentPage, SourceDocument};
    use crate::embeddings::TrigramEmbeddings;
    use crate::rerank::EmbeddingScorer;
    use mesa_core::AppError;
    use mesa_llm::{LlmResponse, LlmUsage};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    struct ScriptedLlm {
        content: Option<String>,
        called: AtomicBool,
    }

    impl ScriptedLlm {
        fn replying(content: &str) -> Self {
            Self {
                content: Some(content.to_string()),
                called: AtomicBool::new(false),
            }
        }

        fn failing() -> Self {
            Self {
                content: None,
                called: AtomicBool::new(false),
            }
        }
    }

    #[async_trait::async_trait]
    impl LlmClient for ScriptedLlm {
        fn provider_name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, _request: &LlmRequest) -> AppResult<LlmResponse> {
            self.called.store(true, Ordering::SeqCst);
            match &self.content {
                Some(content) => Ok(LlmResponse {
                    content: content.clone(),
                    model: "scripted".to_string(),
                    usage: LlmUsage::default(),
                }),
                None => Err(AppError::Llm("scripted failure".to_string())),
            }
        }
    }

    async fn sample_index(embedder: &TrigramEmbeddings) -> SearchIndex {
        let documents = vec![
            SourceDocument {
                doc_id: "manual.txt".to_string(),
                source_name: "manual.txt".to_string(),
                pages: vec![DocumentPage {
                    page: Some(1),
                    text: "Para reiniciar el router, mantené presionado el botón de reset \
                           durante diez segundos."
                        .to_string(),
                }],
            },
            SourceDocument {
                doc_id: "impresora.txt".to_string(),
                source_name: "impresora.txt".to_string(),
                pages: vec![DocumentPage {
                    page: None,
                    text: "La impresora requiere tóner nuevo cada tres meses.".to_string(),
                }],
            },
        ];
        SearchIndex::build(&documents, embedder, &RagConfig::default())
            .await
            .unwrap()
    }

    fn single_query_config() -> RagConfig {
        RagConfig {
            multi_query: false,
            rerank: false,
            ..RagConfig::default()
        }
    }

    #[test]
    fn test_fuse_weights_and_ranks() {
        let dense = vec![(0, 1.0), (1, 0.9)];
        let sparse = vec![(1, 5.0), (2, 4.0)];

        let fused = fuse(&dense, &sparse, 0.85, 0.5);

        // Chunk 1 appears in both lists and must fuse highest
        assert_eq!(fused[0].0, 1);
        let expected = 0.85 / 62.0 + 0.5 / 61.0;
        assert!((fused[0].1 - expected).abs() < 1e-6);
        assert_eq!(fused[1].0, 0);
        assert_eq!(fused[2].0, 2);
    }

    #[test]
    fn test_fuse_ties_prefer_lower_position() {
        let dense = vec![(3, 1.0)];
        let sparse = vec![(1, 1.0)];

        let fused = fuse(&dense, &sparse, 0.5, 0.5);
        assert_eq!(fused[0].0, 1);
        assert_eq!(fused[1].0, 3);
    }

    #[test]
    fn test_parse_paraphrases_strips_list_markers() {
        let content = "1. ¿Cómo reinicio el módem?\n- ¿Cómo se resetea el router?\n\n2) repetida\n2) repetida";
        let parsed = parse_paraphrases(content, "original", 5);

        assert_eq!(
            parsed,
            vec![
                "¿Cómo reinicio el módem?",
                "¿Cómo se resetea el router?",
                "repetida"
            ]
        );
    }

    #[test]
    fn test_parse_paraphrases_drops_original_and_caps() {
        let content = "original\nvariante uno\nvariante dos\nvariante tres";
        let parsed = parse_paraphrases(content, "original", 2);
        assert_eq!(parsed, vec!["variante uno", "variante dos"]);
    }

    #[tokio::test]
    async fn test_retrieve_single_query_ranks_relevant_first() {
        let embedder = TrigramEmbeddings::new(256);
        let index = sample_index(&embedder).await;
        let llm = ScriptedLlm::failing();
        let scorer = EmbeddingScorer::new(Arc::new(TrigramEmbeddings::new(256)));

        let results = retrieve(
            &index,
            &embedder,
            &llm,
            &scorer,
            "reiniciar router",
            "¿Cómo reinicio el router?",
            &single_query_config(),
        )
        .await
        .unwrap();

        assert!(!results.is_empty());
        assert_eq!(results[0].chunk.doc_id, "manual.txt");
        assert!(!llm.called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_retrieve_pools_paraphrase_variants() {
        let embedder = TrigramEmbeddings::new(256);
        let index = sample_index(&embedder).await;
        // The paraphrase points at the other document
        let llm = ScriptedLlm::replying("¿Cuándo cambio el tóner de la impresora?");
        let scorer = EmbeddingScorer::new(Arc::new(TrigramEmbeddings::new(256)));
        let config = RagConfig {
            multi_query: true,
            rerank: false,
            ..RagConfig::default()
        };

        let results = retrieve(
            &index,
            &embedder,
            &llm,
            &scorer,
            "reiniciar router",
            "¿Cómo reinicio el router?",
            &config,
        )
        .await
        .unwrap();

        assert!(llm.called.load(Ordering::SeqCst));
        let ids: Vec<&str> = results.iter().map(|r| r.chunk.doc_id.as_str()).collect();
        assert!(ids.contains(&"manual.txt"));
        assert!(ids.contains(&"impresora.txt"));
    }

    #[tokio::test]
    async fn test_retrieve_degrades_when_paraphrasing_fails() {
        let embedder = TrigramEmbeddings::new(256);
        let index = sample_index(&embedder).await;
        let llm = ScriptedLlm::failing();
        let scorer = EmbeddingScorer::new(Arc::new(TrigramEmbeddings::new(256)));
        let config = RagConfig {
            multi_query: true,
            rerank: false,
            ..RagConfig::default()
        };

        let results = retrieve(
            &index,
            &embedder,
            &llm,
            &scorer,
            "reiniciar router",
            "¿Cómo reinicio el router?",
            &config,
        )
        .await
        .unwrap();

        assert!(llm.called.load(Ordering::SeqCst));
        assert!(!results.is_empty());
        assert_eq!(results[0].chunk.doc_id, "manual.txt");
    }

    #[tokio::test]
    async fn test_retrieve_rerank_scores_against_question() {
        let embedder = TrigramEmbeddings::new(256);
        let index = sample_index(&embedder).await;
        let llm = ScriptedLlm::failing();
        let scorer = EmbeddingScorer::new(Arc::new(TrigramEmbeddings::new(256)));
        let config = RagConfig {
            multi_query: false,
            rerank: true,
            rerank_top_n: 1,
            ..RagConfig::default()
        };

        let results = retrieve(
            &index,
            &embedder,
            &llm,
            &scorer,
            "reiniciar router",
            "¿Cómo reinicio el router?",
            &config,
        )
        .await
        .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.doc_id, "manual.txt");
    }
}
