//! Searchable index over a chunked corpus.
//!
//! [`SearchIndex`] bundles the three retrieval structures built from one
//! corpus pass: a dense vector index, a BM25 index, and the typo-correction
//! lexicon. All three are rebuilt together so they always describe the same
//! chunk list, addressed by position.

pub mod dense;
pub mod sparse;
pub mod store;

use chrono::{DateTime, Utc};
use mesa_core::{AppError, AppResult};
use tracing::debug;

use crate::chunker::split_document;
use crate::config::RagConfig;
use crate::corpus::SourceDocument;
use crate::embeddings::EmbeddingProvider;
use crate::lexicon::Lexicon;
use crate::types::{Chunk, IndexStats};

use dense::DenseIndex;
use sparse::SparseIndex;

pub use store::IndexStore;

/// Immutable search structures for one indexed corpus snapshot.
#[derive(Debug)]
pub struct SearchIndex {
    chunks: Vec<Chunk>,
    dense: DenseIndex,
    sparse: SparseIndex,
    lexicon: Lexicon,
    documents: usize,
    built_at: DateTime<Utc>,
}

impl SearchIndex {
    /// Chunk, embed, and index a set of documents.
    ///
    /// Documents are processed in `doc_id` order so chunk positions, and
    /// with them every tie-break downstream, are deterministic regardless
    /// of how the corpus was enumerated.
    pub async fn build(
        documents: &[SourceDocument],
        embedder: &dyn EmbeddingProvider,
        config: &RagConfig,
    ) -> AppResult<Self> {
        let mut ordered: Vec<&SourceDocument> = documents.iter().collect();
        ordered.sort_by(|a, b| a.doc_id.cmp(&b.doc_id));

        let mut chunks = Vec::new();
        for document in ordered {
            chunks.extend(split_document(document, config)?);
        }

        if chunks.is_empty() {
            return Err(AppError::Index(
                "Corpus produced no chunks to index".to_string(),
            ));
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = embedder.embed_batch(&texts).await?;

        if embeddings.len() != chunks.len() {
            return Err(AppError::Index(format!(
                "Embedder returned {} vectors for {} chunks",
                embeddings.len(),
                chunks.len()
            )));
        }

        let dimensions = embedder.dimensions();
        for embedding in &embeddings {
            if embedding.len() != dimensions {
                return Err(AppError::Index(format!(
                    "Embedding dimension mismatch: got {}, expected {}",
                    embedding.len(),
                    dimensions
                )));
            }
        }

        // Store unit-normalized vectors on the chunks so gate checks can
        // reuse them without re-embedding
        let mut normalized = embeddings;
        for vector in &mut normalized {
            dense::normalize(vector);
        }
        for (chunk, vector) in chunks.iter_mut().zip(&normalized) {
            chunk.embedding = vector.clone();
        }

        let dense = DenseIndex::build(normalized, dimensions);
        let sparse = SparseIndex::build(texts.iter().map(String::as_str));
        let lexicon = Lexicon::build(texts.iter().map(String::as_str), config.lexicon_cap);

        debug!(
            chunks = chunks.len(),
            documents = documents.len(),
            lexicon_terms = lexicon.len(),
            "Built search index"
        );

        Ok(Self {
            chunks,
            dense,
            sparse,
            lexicon,
            documents: documents.len(),
            built_at: Utc::now(),
        })
    }

    /// Reassemble an index from persisted parts.
    ///
    /// Chunk embeddings must already be unit-normalized, which is how
    /// [`build`](Self::build) stores them. The BM25 index and term set are
    /// recomputed from the chunk texts rather than persisted.
    pub fn from_parts(
        chunks: Vec<Chunk>,
        lexicon_terms: Vec<String>,
        documents: usize,
        built_at: DateTime<Utc>,
    ) -> AppResult<Self> {
        if chunks.is_empty() {
            return Err(AppError::Index("Stored index contains no chunks".to_string()));
        }

        let dimensions = chunks[0].embedding.len();
        for chunk in &chunks {
            if chunk.embedding.len() != dimensions {
                return Err(AppError::Index(format!(
                    "Stored chunk '{}' has inconsistent embedding dimensions",
                    chunk.id
                )));
            }
        }

        let vectors: Vec<Vec<f32>> = chunks.iter().map(|c| c.embedding.clone()).collect();
        let dense = DenseIndex::build(vectors, dimensions);
        let sparse = SparseIndex::build(chunks.iter().map(|c| c.text.as_str()));
        let lexicon = Lexicon::from_terms(lexicon_terms);

        Ok(Self {
            chunks,
            dense,
            sparse,
            lexicon,
            documents,
            built_at,
        })
    }

    /// Top-k chunk positions by cosine similarity to a query vector.
    pub fn search_dense(&self, query: &[f32], k: usize) -> Vec<(usize, f32)> {
        self.dense.search(query, k)
    }

    /// Top-k chunk positions by BM25 score for a query string.
    pub fn search_sparse(&self, query: &str, k: usize) -> Vec<(usize, f32)> {
        self.sparse.search(query, k)
    }

    pub fn chunk(&self, idx: usize) -> &Chunk {
        &self.chunks[idx]
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn lexicon(&self) -> &Lexicon {
        &self.lexicon
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn documents(&self) -> usize {
        self.documents
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            documents: self.documents,
            chunks: self.chunks.len(),
            lexicon_terms: self.lexicon.len(),
            embedding_dimensions: self.dense.dimensions(),
            built_at: self.built_at,
        }
    }
}
