//! Trigram embedding provider using character trigram-based content-aware embeddings.

use mesa_core::AppResult;

use crate::embeddings::provider::EmbeddingProvider;
use crate::text::{is_stopword, normalize, tokenize};

/// Minimum token length encoded into the vector.
const MIN_TOKEN_LEN: usize = 3;

/// Trigram-based embedding provider for local, offline operation.
///
/// Generates deterministic embeddings from character trigrams and word
/// frequencies over normalized text, so accent variants of the same word
/// land on the same dimensions. Not semantically accurate like neural
/// embedding models, but consistent and content-dependent, which is enough
/// for development, tests, and the similarity gates.
#[derive(Debug)]
pub struct TrigramEmbeddings {
    dimensions: usize,
}

impl TrigramEmbeddings {
    /// Create a new trigram provider with specified dimensions.
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    /// Generate a trigram-based embedding for text.
    fn generate_embedding(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0; self.dimensions];

        // Normalized tokens: lowercase, accents folded, stop-words dropped
        let tokens: Vec<String> = tokenize(&normalize(text), MIN_TOKEN_LEN)
            .into_iter()
            .filter(|t| !is_stopword(t))
            .collect();

        // Build word frequency map
        let mut word_freq = std::collections::HashMap::new();
        for token in &tokens {
            *word_freq.entry(token.as_str()).or_insert(0u32) += 1;
        }

        // Map each unique word to multiple dimensions based on character
        // trigrams; frequency enters sqrt-scaled for better distribution
        for (word, freq) in word_freq.iter() {
            let chars: Vec<char> = word.chars().collect();
            for window in chars.windows(3) {
                let trigram: String = window.iter().collect();
                let trigram_hash = trigram
                    .bytes()
                    .fold(0u64, |acc, b| acc.wrapping_mul(37).wrapping_add(b as u64));

                let dim_idx = (trigram_hash as usize) % self.dimensions;
                embedding[dim_idx] += (*freq as f32).sqrt();
            }

            // Also encode the whole word
            let word_hash = word
                .bytes()
                .fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));
            let base_dim = (word_hash as usize) % self.dimensions;
            embedding[base_dim] += *freq as f32;
        }

        // Normalize to unit vector
        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut embedding {
                *v /= norm;
            }
        }

        embedding
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for TrigramEmbeddings {
    fn provider_name(&self) -> &str {
        "trigram"
    }

    fn model_name(&self) -> &str {
        "trigram-v1"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| self.generate_embedding(text))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[tokio::test]
    async fn test_dimensions_and_names() {
        let provider = TrigramEmbeddings::new(384);
        assert_eq!(provider.dimensions(), 384);
        assert_eq!(provider.provider_name(), "trigram");
        assert_eq!(provider.model_name(), "trigram-v1");
    }

    #[tokio::test]
    async fn test_embed_is_unit_vector() {
        let provider = TrigramEmbeddings::new(384);
        let embedding = provider.embed("reiniciar el router").await.unwrap();

        assert_eq!(embedding.len(), 384);
        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 0.001);
    }

    #[tokio::test]
    async fn test_embed_deterministic() {
        let provider = TrigramEmbeddings::new(384);
        let first = provider.embed("prueba determinista").await.unwrap();
        let second = provider.embed("prueba determinista").await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_accent_variants_match() {
        let provider = TrigramEmbeddings::new(384);
        let accented = provider.embed("botón").await.unwrap();
        let plain = provider.embed("boton").await.unwrap();
        assert_eq!(accented, plain);
    }

    #[tokio::test]
    async fn test_related_text_scores_higher() {
        let provider = TrigramEmbeddings::new(384);
        let query = provider.embed("¿cómo reinicio el router?").await.unwrap();
        let on_topic = provider
            .embed("Para reiniciar el router, mantené presionado el botón 10 segundos.")
            .await
            .unwrap();
        let off_topic = provider
            .embed("La impresora requiere tóner nuevo cada tres meses.")
            .await
            .unwrap();

        assert!(cosine(&query, &on_topic) > cosine(&query, &off_topic));
    }

    #[tokio::test]
    async fn test_empty_text_zero_vector() {
        let provider = TrigramEmbeddings::new(384);
        let embedding = provider.embed("").await.unwrap();
        assert!(embedding.iter().all(|&x| x == 0.0));
    }

    #[tokio::test]
    async fn test_batch_preserves_order() {
        let provider = TrigramEmbeddings::new(128);
        let texts = vec!["router".to_string(), "impresora".to_string()];
        let batch = provider.embed_batch(&texts).await.unwrap();
        let single = provider.embed("router").await.unwrap();

        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0], single);
    }
}
