//! Embedding generation for dense retrieval and similarity gates.
//!
//! The [`EmbeddingProvider`] trait abstracts over vector generators. Two
//! implementations ship by default: a deterministic trigram hasher that
//! needs no external services, and an Ollama-backed provider for real
//! semantic embeddings.

pub mod provider;
pub mod providers;

pub use provider::{create_provider, EmbeddingProvider};
pub use providers::{OllamaEmbeddings, TrigramEmbeddings};
