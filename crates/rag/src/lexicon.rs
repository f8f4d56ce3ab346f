//! Corpus lexicon.
//!
//! A frequency-ordered list of normalized corpus tokens used exclusively for
//! fuzzy term suggestion during query expansion. Rebuilt with the index,
//! read-only afterward.

use std::collections::{HashMap, HashSet};

use crate::text::{normalize, tokenize};

/// Minimum token length for lexicon membership.
pub const MIN_TOKEN_LEN: usize = 3;

/// Fuzzy suggestions returned per query token.
pub const SUGGESTIONS_PER_TOKEN: usize = 3;

/// Frequency-ordered vocabulary of the indexed corpus.
#[derive(Debug, Clone, Default)]
pub struct Lexicon {
    /// Terms ordered by descending frequency, ties alphabetical
    terms: Vec<String>,

    /// Membership set over the same terms
    set: HashSet<String>,
}

impl Lexicon {
    /// Build from chunk texts, keeping at most `cap` terms.
    ///
    /// Tokens are normalized (lowercase, diacritics stripped) and must be at
    /// least [`MIN_TOKEN_LEN`] characters. Ordering is deterministic:
    /// descending frequency, ties broken alphabetically.
    pub fn build<'a>(texts: impl IntoIterator<Item = &'a str>, cap: usize) -> Self {
        let mut counts: HashMap<String, u64> = HashMap::new();
        for text in texts {
            for token in tokenize(&normalize(text), MIN_TOKEN_LEN) {
                *counts.entry(token).or_insert(0) += 1;
            }
        }

        let mut ranked: Vec<(String, u64)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(cap);

        Self::from_terms(ranked.into_iter().map(|(term, _)| term).collect())
    }

    /// Rebuild from an already-ordered term list (index reload).
    pub fn from_terms(terms: Vec<String>) -> Self {
        let set = terms.iter().cloned().collect();
        Self { terms, set }
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    /// Ordered terms, most frequent first.
    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    /// Exact membership test. The caller supplies the token as it appears in
    /// its source text; only normalized forms are members.
    pub fn contains(&self, token: &str) -> bool {
        self.set.contains(token)
    }

    /// Up to [`SUGGESTIONS_PER_TOKEN`] terms most similar to `token` by
    /// Jaro-Winkler, keeping only scores at or above `min_similarity`.
    ///
    /// The token is normalized before comparison. Ties preserve frequency
    /// order, so more common corpus terms win.
    pub fn suggest(&self, token: &str, min_similarity: f64) -> Vec<String> {
        if self.terms.is_empty() {
            return Vec::new();
        }

        let needle = normalize(token);
        let mut scored: Vec<(&String, f64)> = self
            .terms
            .iter()
            .map(|term| (term, strsim::jaro_winkler(&needle, term)))
            .filter(|(_, score)| *score >= min_similarity)
            .collect();

        // Stable sort keeps frequency order on equal scores
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(SUGGESTIONS_PER_TOKEN);
        scored.into_iter().map(|(term, _)| term.clone()).collect()
    }
}
