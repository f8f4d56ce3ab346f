//! Embedding provider abstraction.

use std::sync::Arc;

use mesa_core::{AppError, AppResult};

use super::providers::{OllamaEmbeddings, TrigramEmbeddings};

/// Generator of fixed-length embedding vectors.
///
/// Implementations must be deterministic for a fixed model: the index stores
/// vectors at build time and compares them against query vectors much later.
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Provider name (e.g., "trigram", "ollama").
    fn provider_name(&self) -> &str;

    /// Model identifier.
    fn model_name(&self) -> &str;

    /// Vector dimensionality.
    fn dimensions(&self) -> usize;

    /// Embed a batch of texts, one vector per input, in input order.
    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>>;

    /// Embed a single text.
    async fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        let mut results = self.embed_batch(&[text.to_string()]).await?;
        results
            .pop()
            .ok_or_else(|| AppError::Llm("Embedding provider returned no vector".to_string()))
    }
}

/// Create an embedding provider by name.
///
/// # Arguments
/// * `provider` - Provider identifier ("trigram", "ollama")
/// * `model` - Model identifier (ignored by the trigram provider)
/// * `dimensions` - Expected vector dimensionality
/// * `endpoint` - Optional endpoint override for HTTP providers
pub async fn create_provider(
    provider: &str,
    model: &str,
    dimensions: usize,
    endpoint: Option<&str>,
) -> AppResult<Arc<dyn EmbeddingProvider>> {
    match provider.to_lowercase().as_str() {
        "trigram" => Ok(Arc::new(TrigramEmbeddings::new(dimensions))),
        "ollama" => {
            let provider = OllamaEmbeddings::new(model, dimensions, endpoint).await?;
            Ok(Arc::new(provider))
        }
        other => Err(AppError::Config(format!(
            "Unknown embedding provider: {}. Supported: trigram, ollama",
            other
        ))),
    }
}
