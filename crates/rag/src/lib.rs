//! Retrieval-augmented answering over a local document corpus.
//!
//! Builds a hybrid (dense + BM25) index from plain-text documents and
//! answers Spanish help-desk questions grounded in that index, refusing
//! and recording anything the corpus cannot support.

pub mod chunker;
pub mod config;
pub mod corpus;
pub mod embeddings;
pub mod followup;
pub mod gate;
pub mod generate;
pub mod index;
pub mod lexicon;
pub mod pipeline;
pub mod rerank;
pub mod retrieve;
pub mod rewrite;
pub mod sources;
pub mod text;
pub mod types;
pub mod unresolved;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use config::{RagConfig, DEFAULT_REFUSAL_MESSAGE};
pub use corpus::{CorpusSource, DirCorpus, DocumentPage, SourceDocument};
pub use embeddings::{create_provider, EmbeddingProvider, OllamaEmbeddings, TrigramEmbeddings};
pub use gate::{GateOutcome, GateStage};
pub use index::{IndexStore, SearchIndex};
pub use pipeline::{AnswerPipeline, PipelineDeps};
pub use rerank::{EmbeddingScorer, RelevanceScorer};
pub use retrieve::RetrievedChunk;
pub use types::{Answer, Chunk, ConversationTurn, IndexStats, Role, SourceRef};
pub use unresolved::{JsonlUnresolvedSink, UnresolvedRecord, UnresolvedSink};
