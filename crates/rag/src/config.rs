//! Pipeline configuration.
//!
//! All thresholds that gate answers live here as named fields with explicit
//! defaults, so a deployment can tune them in one place (`.mesa/rag.yaml`)
//! and tests can construct exact configurations. Nothing in the pipeline
//! reads the environment at call time.

use std::path::Path;

use mesa_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// Canonical Spanish refusal returned whenever evidence is insufficient.
pub const DEFAULT_REFUSAL_MESSAGE: &str = "No tengo información suficiente para responder a eso. \
     Tu consulta será guardada y enviada al Help Desk. Gracias!";

fn default_refusal_message() -> String {
    DEFAULT_REFUSAL_MESSAGE.to_string()
}

fn default_generation_model() -> String {
    "llama3.2".to_string()
}

fn default_answer_max_tokens() -> u32 {
    800
}

fn default_chunk_size() -> usize {
    900
}

fn default_chunk_overlap() -> usize {
    120
}

fn default_lexicon_cap() -> usize {
    8000
}

fn default_typo_min_similarity() -> f64 {
    0.82
}

fn default_typo_max_additions() -> usize {
    6
}

fn default_prf_terms() -> usize {
    6
}

fn default_dense_top_k() -> usize {
    12
}

fn default_sparse_top_k() -> usize {
    12
}

fn default_dense_weight() -> f32 {
    0.85
}

fn default_sparse_weight() -> f32 {
    0.5
}

fn default_multi_query() -> bool {
    true
}

fn default_paraphrase_count() -> usize {
    3
}

fn default_rerank() -> bool {
    true
}

fn default_rerank_top_n() -> usize {
    8
}

fn default_min_question_chars() -> usize {
    3
}

fn default_min_context_chars() -> usize {
    10
}

fn default_ood_min_similarity() -> f32 {
    0.22
}

fn default_chunk_min_similarity() -> f32 {
    0.35
}

fn default_context_char_limit() -> usize {
    8000
}

fn default_followup_min_similarity() -> f32 {
    0.12
}

fn default_followup_sentence_window() -> usize {
    2
}

fn default_history_window() -> usize {
    6
}

/// Tunable parameters of the answer pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    /// Message returned when the pipeline abstains
    #[serde(default = "default_refusal_message")]
    pub refusal_message: String,

    /// Model used for answer generation and paraphrasing
    #[serde(default = "default_generation_model")]
    pub generation_model: String,

    /// Maximum tokens for generated answers
    #[serde(default = "default_answer_max_tokens")]
    pub answer_max_tokens: u32,

    /// Target chunk size in characters
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Overlap between consecutive chunks in characters
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    /// Maximum number of lexicon terms retained
    #[serde(default = "default_lexicon_cap")]
    pub lexicon_cap: usize,

    /// Minimum Jaro-Winkler similarity for typo-tolerant expansion
    #[serde(default = "default_typo_min_similarity")]
    pub typo_min_similarity: f64,

    /// Maximum terms appended by typo-tolerant expansion
    #[serde(default = "default_typo_max_additions")]
    pub typo_max_additions: usize,

    /// Maximum pseudo-relevance-feedback terms appended
    #[serde(default = "default_prf_terms")]
    pub prf_terms: usize,

    /// Dense retrieval depth per query
    #[serde(default = "default_dense_top_k")]
    pub dense_top_k: usize,

    /// Sparse (BM25) retrieval depth per query
    #[serde(default = "default_sparse_top_k")]
    pub sparse_top_k: usize,

    /// Fusion weight of the dense retriever
    #[serde(default = "default_dense_weight")]
    pub dense_weight: f32,

    /// Fusion weight of the sparse retriever
    #[serde(default = "default_sparse_weight")]
    pub sparse_weight: f32,

    /// Fan retrieval out over LLM paraphrases of the query
    #[serde(default = "default_multi_query")]
    pub multi_query: bool,

    /// Number of paraphrase variants to request
    #[serde(default = "default_paraphrase_count")]
    pub paraphrase_count: usize,

    /// Rerank the fused candidate pool
    #[serde(default = "default_rerank")]
    pub rerank: bool,

    /// Candidates kept after reranking
    #[serde(default = "default_rerank_top_n")]
    pub rerank_top_n: usize,

    /// Questions shorter than this are refused outright
    #[serde(default = "default_min_question_chars")]
    pub min_question_chars: usize,

    /// Minimum total characters across retrieved chunks (volume check)
    #[serde(default = "default_min_context_chars")]
    pub min_context_chars: usize,

    /// Minimum query/context cosine similarity (out-of-domain check)
    #[serde(default = "default_ood_min_similarity")]
    pub ood_min_similarity: f32,

    /// Minimum best per-chunk cosine similarity (similarity check)
    #[serde(default = "default_chunk_min_similarity")]
    pub chunk_min_similarity: f32,

    /// Maximum characters of context passed to generation
    #[serde(default = "default_context_char_limit")]
    pub context_char_limit: usize,

    /// Minimum similarity for semantic follow-up span selection
    #[serde(default = "default_followup_min_similarity")]
    pub followup_min_similarity: f32,

    /// Sentences per fallback window in follow-up span extraction
    #[serde(default = "default_followup_sentence_window")]
    pub followup_sentence_window: usize,

    /// Trailing history turns visible to the follow-up resolver
    #[serde(default = "default_history_window")]
    pub history_window: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            refusal_message: default_refusal_message(),
            generation_model: default_generation_model(),
            answer_max_tokens: default_answer_max_tokens(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            lexicon_cap: default_lexicon_cap(),
            typo_min_similarity: default_typo_min_similarity(),
            typo_max_additions: default_typo_max_additions(),
            prf_terms: default_prf_terms(),
            dense_top_k: default_dense_top_k(),
            sparse_top_k: default_sparse_top_k(),
            dense_weight: default_dense_weight(),
            sparse_weight: default_sparse_weight(),
            multi_query: default_multi_query(),
            paraphrase_count: default_paraphrase_count(),
            rerank: default_rerank(),
            rerank_top_n: default_rerank_top_n(),
            min_question_chars: default_min_question_chars(),
            min_context_chars: default_min_context_chars(),
            ood_min_similarity: default_ood_min_similarity(),
            chunk_min_similarity: default_chunk_min_similarity(),
            context_char_limit: default_context_char_limit(),
            followup_min_similarity: default_followup_min_similarity(),
            followup_sentence_window: default_followup_sentence_window(),
            history_window: default_history_window(),
        }
    }
}

impl RagConfig {
    /// Load configuration from a YAML file, falling back to defaults when
    /// the file does not exist. Missing fields take their defaults.
    pub fn load(path: &Path) -> AppResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&contents).map_err(|e| {
            AppError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Persist configuration as YAML.
    pub fn save(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Check invariants between related fields.
    pub fn validate(&self) -> AppResult<()> {
        if self.chunk_size == 0 {
            return Err(AppError::Config("chunk_size must be positive".to_string()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(AppError::Config(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.dense_top_k == 0 && self.sparse_top_k == 0 {
            return Err(AppError::Config(
                "at least one retriever must have a positive depth".to_string(),
            ));
        }
        if self.rerank && self.rerank_top_n == 0 {
            return Err(AppError::Config(
                "rerank_top_n must be positive when reranking is enabled".to_string(),
            ));
        }
        if self.refusal_message.trim().is_empty() {
            return Err(AppError::Config(
                "refusal_message must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RagConfig::default();
        assert_eq!(config.chunk_size, 900);
        assert_eq!(config.chunk_overlap, 120);
        assert_eq!(config.dense_weight, 0.85);
        assert_eq!(config.sparse_weight, 0.5);
        assert_eq!(config.ood_min_similarity, 0.22);
        assert_eq!(config.chunk_min_similarity, 0.35);
        assert_eq!(config.followup_min_similarity, 0.12);
        assert!(config.refusal_message.contains("Help Desk"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_takes_defaults() {
        let config: RagConfig = serde_yaml::from_str("chunk_size: 500\n").unwrap();
        assert_eq!(config.chunk_size, 500);
        assert_eq!(config.chunk_overlap, 120);
        assert_eq!(config.rerank_top_n, 8);
    }

    #[test]
    fn test_validate_overlap() {
        let mut config = RagConfig::default();
        config.chunk_overlap = config.chunk_size;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = RagConfig::load(&dir.path().join("rag.yaml")).unwrap();
        assert_eq!(config.chunk_size, 900);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("rag.yaml");

        let mut config = RagConfig::default();
        config.dense_top_k = 20;
        config.multi_query = false;
        config.save(&path).unwrap();

        let loaded = RagConfig::load(&path).unwrap();
        assert_eq!(loaded.dense_top_k, 20);
        assert!(!loaded.multi_query);
    }
}
