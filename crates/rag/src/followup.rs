//! Follow-up resolution from conversation history.
//!
//! Questions like "¿y la segunda?" or "dame el paso a paso" refer to the
//! assistant's previous answer, not to the corpus. Retrieval would come up
//! empty for them, so they are answered from the last assistant turn: the
//! turn text is split into candidate spans (numbered steps, bullets, bold
//! headers, sentence windows), the span the question points at is chosen
//! by ordinal or by similarity, and the generator answers from that span
//! alone.

use std::collections::HashSet;
use std::sync::LazyLock;

use mesa_core::AppResult;
use mesa_llm::{LlmClient, LlmRequest};
use regex::Regex;
use tracing::debug;
use unicode_segmentation::UnicodeSegmentation;

use crate::config::RagConfig;
use crate::embeddings::EmbeddingProvider;
use crate::generate::mentions_internal_context;
use crate::index::dense::{dot, normalize as normalize_vec};
use crate::types::{ConversationTurn, Role};

/// Sentence-window candidates shorter than this carry too little context.
const MIN_WINDOW_CHARS: usize = 40;

/// Upper bound on candidate spans per base text.
const MAX_CANDIDATES: usize = 30;

/// Phrases that mark a question as being about the previous answer.
const GENERIC_PHRASES: [&str; 23] = [
    "como se hace",
    "cómo se hace",
    "como se prepara",
    "cómo se prepara",
    "instrucciones",
    "y las instrucciones",
    "paso a paso",
    "procedimiento",
    "preparación",
    "preparacion",
    "cómo lo hago",
    "como lo hago",
    "detallame",
    "explícame",
    "explicame",
    "lista",
    "listado",
    "1ra",
    "2da",
    "3ra",
    "primera",
    "segunda",
    "tercera",
];

static NUMBERED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d+)[.)\-]\s+(.*)$").unwrap());

static BULLET_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*[-•]\s+(.*)$").unwrap());

static BOLD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*\*([^*]{3,120})\*\*").unwrap());

/// Digit ordinals with optional Spanish or English suffixes ("3", "2da",
/// "1st"). Single-letter suffixes sit last so they cannot shadow the
/// longer ones.
static ORDINAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d+)\s*(?:°|º|ra|er|st|nd|rd|th|o|a)?\b").unwrap());

static WS_RUN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s{2,}").unwrap());

/// True when the question reads as a follow-up about the previous answer.
pub fn is_generic_followup(question: &str) -> bool {
    let q = question.trim().to_lowercase();
    GENERIC_PHRASES.iter().any(|phrase| q.contains(phrase))
}

/// Most recent non-empty assistant turn within the history window.
pub fn last_assistant_text(history: &[ConversationTurn], window: usize) -> Option<&str> {
    history
        .iter()
        .rev()
        .take(window)
        .find(|turn| turn.role == Role::Assistant && !turn.content.trim().is_empty())
        .map(|turn| turn.content.as_str())
}

/// Which numbered item the question asks for, if any.
fn ordinal_from_question(question: &str) -> Option<usize> {
    let q = question.to_lowercase();

    if let Some(caps) = ORDINAL_RE.captures(&q) {
        if let Ok(n) = caps[1].parse::<usize>() {
            return Some(n);
        }
    }

    const WORDS: [(&str, usize); 9] = [
        ("primera", 1),
        ("1ra", 1),
        ("first", 1),
        ("segunda", 2),
        ("2da", 2),
        ("second", 2),
        ("tercera", 3),
        ("3ra", 3),
        ("third", 3),
    ];
    WORDS
        .iter()
        .find(|(word, _)| q.contains(word))
        .map(|(_, n)| *n)
}

/// Split a base text into candidate spans a follow-up could refer to.
///
/// Numbered lines open blocks that absorb their continuation lines; bullets
/// and bold headers (paired with their first following sentence) are taken
/// as-is. Sentence windows are the fallback for unstructured text. The
/// result is whitespace-collapsed, deduplicated, and capped.
fn split_candidates(base: &str, sentence_window: usize) -> Vec<String> {
    let mut candidates: Vec<String> = Vec::new();

    let mut current: Option<String> = None;
    for line in base.lines() {
        let trimmed = line.trim();
        if NUMBERED_RE.is_match(trimmed) {
            if let Some(block) = current.take() {
                candidates.push(block);
            }
            current = Some(trimmed.to_string());
        } else if !trimmed.is_empty() {
            if let Some(block) = current.as_mut() {
                block.push(' ');
                block.push_str(trimmed);
            }
        }
    }
    if let Some(block) = current.take() {
        candidates.push(block);
    }

    for line in base.lines() {
        if let Some(caps) = BULLET_RE.captures(line) {
            candidates.push(caps[1].to_string());
        }
    }

    for caps in BOLD_RE.captures_iter(base) {
        let title = caps[1].trim();
        let after = caps.get(0).map(|m| m.end()).unwrap_or(base.len());
        let rest = base[after..].trim_start_matches(|c: char| c == ':' || c.is_whitespace());
        match rest
            .split_sentence_bounds()
            .next()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            Some(sentence) => candidates.push(format!("{} {}", title, sentence)),
            None => candidates.push(title.to_string()),
        }
    }

    if candidates.is_empty() {
        let sentences: Vec<&str> = base
            .split_sentence_bounds()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        let window = sentence_window.max(2);
        for group in sentences.chunks(window) {
            let joined = group.join(" ");
            if joined.chars().count() >= MIN_WINDOW_CHARS {
                candidates.push(joined);
            }
        }
    }

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for candidate in candidates {
        let cleaned = WS_RUN_RE
            .replace_all(candidate.trim(), " ")
            .trim()
            .to_string();
        if cleaned.is_empty() || !seen.insert(cleaned.clone()) {
            continue;
        }
        out.push(cleaned);
        if out.len() == MAX_CANDIDATES {
            break;
        }
    }
    out
}

/// Choose the span of `base` the question most plausibly refers to.
///
/// An ordinal in the question picks the corresponding numbered block when
/// one exists. Otherwise the semantically closest candidate wins, with the
/// earliest candidate taking strict-score ties; if even the best falls
/// under the similarity floor, the whole base text is used.
pub async fn choose_span(
    embedder: &dyn EmbeddingProvider,
    base: &str,
    question: &str,
    config: &RagConfig,
) -> AppResult<String> {
    let candidates = split_candidates(base, config.followup_sentence_window);
    if candidates.is_empty() {
        return Ok(base.trim().to_string());
    }

    let numbered: Vec<&String> = candidates
        .iter()
        .filter(|candidate| NUMBERED_RE.is_match(candidate))
        .collect();
    if let Some(n) = ordinal_from_question(question) {
        if n >= 1 && n <= numbered.len() {
            return Ok(numbered[n - 1].clone());
        }
    }

    let mut question_vec = embedder.embed(question).await?;
    normalize_vec(&mut question_vec);

    let vectors = embedder.embed_batch(&candidates).await?;
    let mut best: Option<(usize, f32)> = None;
    for (idx, mut vector) in vectors.into_iter().enumerate() {
        normalize_vec(&mut vector);
        let score = dot(&question_vec, &vector);
        if best.map_or(true, |(_, best_score)| score > best_score) {
            best = Some((idx, score));
        }
    }

    match best {
        Some((idx, score)) if score >= config.followup_min_similarity => {
            debug!(score, "Chose candidate span by similarity");
            Ok(candidates[idx].clone())
        }
        _ => Ok(base.trim().to_string()),
    }
}

/// Answer a follow-up from the last assistant turn, if there is one and
/// the model produces something usable from it.
///
/// `Ok(None)` means "no usable history answer": no assistant turn in the
/// window, an empty or refusal response, or an answer that talks about its
/// own source material. Transport errors propagate.
pub async fn answer_from_history(
    generator: &dyn LlmClient,
    embedder: &dyn EmbeddingProvider,
    question: &str,
    history: &[ConversationTurn],
    config: &RagConfig,
) -> AppResult<Option<String>> {
    let Some(base) = last_assistant_text(history, config.history_window) else {
        return Ok(None);
    };

    let span = choose_span(embedder, base, question, config).await?;
    debug!(
        span_chars = span.chars().count(),
        "Answering follow-up from history"
    );

    let system = format!(
        "Responde EXCLUSIVAMENTE en español. Usa SOLO el texto base provisto \
         a continuación como fuente. Si no hay suficientes datos, responde \
         exactamente: \"{}\".",
        config.refusal_message
    );
    let user = format!(
        "Texto base:\n{}\n\nConsulta del usuario:\n{}\n\n\
         Responde claro y, si corresponde, con pasos.",
        span, question
    );

    let request = LlmRequest::new(user, config.generation_model.clone())
        .with_system(system)
        .with_temperature(0.0)
        .with_max_tokens(config.answer_max_tokens);

    let response = generator.complete(&request).await?;
    let answer = response.content.trim().to_string();

    if answer.is_empty()
        || answer == config.refusal_message
        || mentions_internal_context(&answer)
    {
        return Ok(None);
    }
    Ok(Some(answer))
}
