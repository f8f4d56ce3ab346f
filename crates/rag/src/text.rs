//! Text normalization and tokenization primitives.
//!
//! Every component that compares query text against corpus text goes through
//! the same normalization: lowercase, NFD decomposition, combining marks
//! removed. This keeps accent variants ("botón" vs "boton") comparable across
//! the lexicon, the sparse index, and the answer gate.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Minimum token length for content-bearing terms (query anchors, PRF).
pub const CONTENT_TOKEN_LEN: usize = 4;

/// Word characters, including the accented letters that survive lowercasing
/// but not normalization. Tokenization runs on lowercased text that may or
/// may not have been normalized, so both forms must match.
static WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[a-záéíóúüñ0-9]+").expect("word regex"));

/// Combined Spanish and English function-word list. Tokens in this set carry
/// no retrieval signal and are excluded from PRF terms and embeddings.
pub static STOPWORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        // Spanish
        "de", "del", "la", "el", "los", "las", "un", "una", "y", "o", "u", "que", "con", "en",
        "por", "para", "como", "a", "al", "lo", "su", "sus", "si", "no", "se", "es", "son", "ser",
        "esta", "este", "estos", "estas",
        // English
        "the", "an", "and", "of", "to", "in", "for", "on", "by", "is", "are", "be", "this", "that",
        "these", "those",
    ]
    .into_iter()
    .collect()
});

/// Lowercase and strip diacritics (NFD decomposition, combining marks
/// removed). Punctuation and casing of non-letter characters are preserved.
pub fn normalize(text: &str) -> String {
    text.to_lowercase()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect()
}

/// Extract lowercase word tokens of at least `min_len` characters.
///
/// The input is lowercased but not normalized, so callers decide whether
/// accent folding applies by normalizing first.
pub fn tokenize(text: &str, min_len: usize) -> Vec<String> {
    let lower = text.to_lowercase();
    WORD_RE
        .find_iter(&lower)
        .map(|m| m.as_str().to_string())
        .filter(|t| t.chars().count() >= min_len)
        .collect()
}

/// True if the token is a Spanish or English stop-word.
pub fn is_stopword(token: &str) -> bool {
    STOPWORDS.contains(token)
}

/// Truncate a string to at most `max_chars` characters, respecting UTF-8
/// boundaries.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}
