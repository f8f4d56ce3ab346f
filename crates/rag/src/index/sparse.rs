//! BM25 lexical index over chunk texts.

use std::collections::{HashMap, HashSet};

use crate::text::{normalize, tokenize};

const BM25_K1: f32 = 1.5;
const BM25_B: f32 = 0.75;

/// Tokens scored by BM25 keep every word, stopwords included; IDF already
/// discounts terms that appear everywhere.
fn bm25_tokens(text: &str) -> Vec<String> {
    tokenize(&normalize(text), 1)
}

/// Okapi BM25 index with per-document term frequencies.
#[derive(Debug, Clone, Default)]
pub struct SparseIndex {
    doc_terms: Vec<HashMap<String, u32>>,
    doc_lens: Vec<usize>,
    doc_freqs: HashMap<String, usize>,
    avg_doc_len: f32,
}

impl SparseIndex {
    pub fn build<'a>(texts: impl IntoIterator<Item = &'a str>) -> Self {
        let mut doc_terms = Vec::new();
        let mut doc_lens = Vec::new();
        let mut doc_freqs: HashMap<String, usize> = HashMap::new();

        for text in texts {
            let tokens = bm25_tokens(text);
            let mut terms: HashMap<String, u32> = HashMap::new();
            for token in &tokens {
                *terms.entry(token.clone()).or_insert(0) += 1;
            }
            for term in terms.keys() {
                *doc_freqs.entry(term.clone()).or_insert(0) += 1;
            }
            doc_lens.push(tokens.len());
            doc_terms.push(terms);
        }

        let avg_doc_len = if doc_lens.is_empty() {
            1.0
        } else {
            (doc_lens.iter().sum::<usize>() as f32 / doc_lens.len() as f32).max(1.0)
        };

        Self {
            doc_terms,
            doc_lens,
            doc_freqs,
            avg_doc_len,
        }
    }

    pub fn len(&self) -> usize {
        self.doc_terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc_terms.is_empty()
    }

    /// Top-k positions by BM25 score, highest first.
    ///
    /// Documents scoring zero are dropped. Ties break toward the lower
    /// position.
    pub fn search(&self, query: &str, k: usize) -> Vec<(usize, f32)> {
        let query_tokens = bm25_tokens(query);
        if query_tokens.is_empty() || self.doc_terms.is_empty() {
            return Vec::new();
        }

        let mut scored: Vec<(usize, f32)> = (0..self.doc_terms.len())
            .map(|idx| (idx, self.score(&query_tokens, idx)))
            .filter(|(_, score)| *score > 0.0)
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored.truncate(k);
        scored
    }

    fn score(&self, query_tokens: &[String], idx: usize) -> f32 {
        let terms = &self.doc_terms[idx];
        let doc_len = self.doc_lens[idx] as f32;
        let total_docs = self.doc_terms.len() as f32;

        let mut score = 0.0;
        let mut seen = HashSet::new();
        for token in query_tokens {
            if !seen.insert(token) {
                continue;
            }
            let Some(&tf) = terms.get(token) else {
                continue;
            };
            let df = *self.doc_freqs.get(token).unwrap_or(&0) as f32;

            // ln(1 + x) keeps the IDF positive for terms present in most
            // documents
            let idf = ((total_docs - df + 0.5) / (df + 0.5)).ln_1p().max(0.0);
            let tf = tf as f32;
            let length_norm = 1.0 - BM25_B + BM25_B * doc_len / self.avg_doc_len;
            let denom = tf + BM25_K1 * length_norm;
            if denom > 0.0 {
                score += idf * tf * (BM25_K1 + 1.0) / denom;
            }
        }
        score
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_index() -> SparseIndex {
        SparseIndex::build([
            "Para reiniciar el router, mantené presionado el botón de reset.",
            "La impresora necesita tóner nuevo cada tres meses.",
            "El router pierde conexión si el firmware está desactualizado.",
        ])
    }

    #[test]
    fn test_matches_ranked_above_non_matches() {
        let index = sample_index();
        let results = index.search("reiniciar router", 3);

        assert!(!results.is_empty());
        assert_eq!(results[0].0, 0);
        assert!(results.iter().all(|(idx, _)| *idx != 1));
    }

    #[test]
    fn test_accented_query_matches_folded_terms() {
        let index = sample_index();
        let results = index.search("tóner impresora", 3);

        assert_eq!(results[0].0, 1);
    }

    #[test]
    fn test_no_overlap_returns_empty() {
        let index = sample_index();
        assert!(index.search("astronomía planetaria", 3).is_empty());
    }

    #[test]
    fn test_empty_query_returns_empty() {
        let index = sample_index();
        assert!(index.search("", 3).is_empty());
    }

    #[test]
    fn test_truncates_to_k() {
        let index = sample_index();
        let results = index.search("el router", 1);
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn test_empty_index() {
        let index = SparseIndex::build([]);
        assert!(index.is_empty());
        assert!(index.search("router", 3).is_empty());
    }
}
