//! Query rewriting before and between retrieval passes.
//!
//! Two rewrites run per question: lexicon-based typo expansion before the
//! first retrieval pass, and pseudo-relevance feedback that mines the first
//! pass's results for terms to carry into the second.

use std::collections::{HashMap, HashSet};

use crate::config::RagConfig;
use crate::lexicon::Lexicon;
use crate::retrieve::RetrievedChunk;
use crate::text::{is_stopword, tokenize, CONTENT_TOKEN_LEN};

/// How many top chunks feed the feedback-term mining pass.
const PRF_SOURCE_CHUNKS: usize = 6;

/// Append close lexicon matches for each content token of the question.
///
/// Misspelled tokens pull in their corrected forms ("ruter" brings
/// "router"), and correctly spelled tokens re-affirm themselves, which
/// weights them in BM25. The original question text always stays in front.
pub fn expand_query(question: &str, lexicon: &Lexicon, config: &RagConfig) -> String {
    if lexicon.is_empty() {
        return question.to_string();
    }

    let mut extras: Vec<String> = Vec::new();
    for token in tokenize(question, CONTENT_TOKEN_LEN) {
        extras.extend(lexicon.suggest(&token, config.typo_min_similarity));
    }

    let mut seen = HashSet::new();
    extras.retain(|term| seen.insert(term.clone()));
    extras.truncate(config.typo_max_additions);

    append_terms(question, &extras)
}

/// Mine feedback terms from the top retrieved chunks.
///
/// Candidates are content tokens of the chunk texts that the question did
/// not already contain, ranked by frequency with first-seen order breaking
/// ties. When a lexicon is available, terms outside it are dropped so noise
/// from the corpus tail cannot steer the second pass.
pub fn prf_terms(
    retrieved: &[RetrievedChunk],
    question: &str,
    lexicon: &Lexicon,
    config: &RagConfig,
) -> Vec<String> {
    let question_tokens: HashSet<String> =
        tokenize(question, CONTENT_TOKEN_LEN).into_iter().collect();

    let mut counts: HashMap<String, u32> = HashMap::new();
    let mut order: Vec<String> = Vec::new();

    for retrieved_chunk in retrieved.iter().take(PRF_SOURCE_CHUNKS) {
        for token in tokenize(&retrieved_chunk.chunk.text, CONTENT_TOKEN_LEN) {
            if is_stopword(&token) || question_tokens.contains(&token) {
                continue;
            }
            if !counts.contains_key(&token) {
                order.push(token.clone());
            }
            *counts.entry(token).or_insert(0) += 1;
        }
    }

    // Stable sort keeps first-seen order among equal counts
    order.sort_by_key(|term| std::cmp::Reverse(counts[term]));

    if !lexicon.is_empty() {
        order.retain(|term| lexicon.contains(term));
    }

    order.truncate(config.prf_terms);
    order
}

/// Join extra terms onto a query string.
pub fn append_terms(query: &str, terms: &[String]) -> String {
    if terms.is_empty() {
        query.to_string()
    } else {
        format!("{} {}", query, terms.join(" "))
    }
}
