//! Grounded answer generation and output hygiene.
//!
//! Prompts pin the model to Spanish and to the supplied reference text,
//! with the refusal message spelled out verbatim so an honest "I don't
//! know" is reproducible. Post-processing cleans up the common failure
//! mode where a model answers and then appends the refusal "just in case".

use std::sync::LazyLock;

use mesa_core::AppResult;
use mesa_llm::{LlmClient, LlmRequest};
use regex::Regex;
use tracing::debug;

use crate::config::RagConfig;
use crate::retrieve::RetrievedChunk;
use crate::text::truncate_chars;

/// Words that reveal the model is talking about its own prompt material.
static CONTEXT_MENTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(documentos?|contexto|extractos?|anexos?)\b").unwrap());

/// Trailing hedge of the form "(en caso ...)" at the end of an answer.
static APPENDIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)\(\s*en caso.*?\)\s*$").unwrap());

static NEWLINE_RUN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());

/// Join retrieved chunk texts into the prompt context, oldest rank first,
/// capped at `limit` characters.
pub fn build_context(retrieved: &[RetrievedChunk], limit: usize) -> String {
    let joined = retrieved
        .iter()
        .map(|rc| rc.chunk.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    truncate_chars(&joined, limit).to_string()
}

pub fn build_system_prompt(refusal: &str) -> String {
    format!(
        "Eres un asistente que responde EXCLUSIVAMENTE en español. \
         Usa SOLO la información de referencia provista. \
         Si no hay información suficiente, responde ÚNICAMENTE con el mensaje \
         estándar y nada más: \"{}\". \
         No inventes datos ni agregues contenido fuera del dominio.",
        refusal
    )
}

pub fn build_user_prompt(question: &str, context: &str, refusal: &str) -> String {
    format!(
        "Pregunta del usuario:\n{}\n\nInformación relevante:\n{}\n\n\
         Recuerda: si no hay datos suficientes, responde exactamente: \"{}\".",
        question, context, refusal
    )
}

/// True when the answer talks about documents or context instead of just
/// answering. Such answers leak retrieval internals to the user.
pub fn mentions_internal_context(text: &str) -> bool {
    CONTEXT_MENTION_RE.is_match(text)
}

/// Remove a refusal message pasted onto an otherwise real answer.
///
/// A pure refusal is left untouched. When the refusal rides along with
/// actual content, the refusal and any trailing "(en caso ...)" hedge are
/// cut; if that would leave nothing, the original text is kept so the
/// pipeline's refusal detection still fires on it.
pub fn strip_refusal_appendix(answer: &str, refusal: &str) -> String {
    let trimmed = answer.trim();
    if trimmed == refusal {
        return trimmed.to_string();
    }
    if !trimmed.contains(refusal) {
        return trimmed.to_string();
    }

    let cleaned = trimmed.replace(refusal, "");
    let cleaned = cleaned.trim();
    let cleaned = APPENDIX_RE.replace(cleaned, "");
    let cleaned = cleaned.trim();
    let cleaned = NEWLINE_RUN_RE.replace_all(cleaned, "\n\n").to_string();

    if cleaned.is_empty() {
        trimmed.to_string()
    } else {
        cleaned
    }
}

/// Generate an answer for `question` grounded in `context`.
pub async fn generate_answer(
    generator: &dyn LlmClient,
    question: &str,
    context: &str,
    config: &RagConfig,
) -> AppResult<String> {
    let request = LlmRequest::new(
        build_user_prompt(question, context, &config.refusal_message),
        config.generation_model.clone(),
    )
    .with_system(build_system_prompt(&config.refusal_message))
    .with_temperature(0.0)
    .with_max_tokens(config.answer_max_tokens);

    let response = generator.complete(&request).await?;
    debug!(model = %response.model, "Generated answer");

    Ok(strip_refusal_appendix(
        &response.content,
        &config.refusal_message,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_REFUSAL_MESSAGE;
    use crate::types::Chunk;

    fn retrieved(texts: &[&str]) -> Vec<RetrievedChunk> {
        texts
            .iter()
            .enumerate()
            .map(|(i, text)| RetrievedChunk {
                chunk: Chunk {
                    id: format!("doc.txt#c{}", i),
                    doc_id: "doc.txt".to_string(),
                    source_name: "doc.txt".to_string(),
                    page: None,
                    seq: i as u32,
                    text: text.to_string(),
                    embedding: vec![],
                },
                score: 1.0,
            })
            .collect()
    }

    #[test]
    fn test_build_context_joins_and_caps() {
        let chunks = retrieved(&["uno", "dos"]);
        assert_eq!(build_context(&chunks, 100), "uno\n\ndos");
        assert_eq!(build_context(&chunks, 3), "uno");
    }

    #[test]
    fn test_prompts_embed_refusal_verbatim() {
        let system = build_system_prompt(DEFAULT_REFUSAL_MESSAGE);
        let user = build_user_prompt("¿hola?", "contexto", DEFAULT_REFUSAL_MESSAGE);

        assert!(system.contains(DEFAULT_REFUSAL_MESSAGE));
        assert!(user.contains(DEFAULT_REFUSAL_MESSAGE));
        assert!(user.contains("Pregunta del usuario:\n¿hola?"));
    }

    #[test]
    fn test_mentions_internal_context() {
        assert!(mentions_internal_context(
            "Según los documentos provistos, el router se reinicia."
        ));
        assert!(mentions_internal_context("El contexto no lo menciona."));
        assert!(!mentions_internal_context(
            "Mantené presionado el botón de reset."
        ));
    }

    #[test]
    fn test_strip_keeps_pure_refusal() {
        let refusal = DEFAULT_REFUSAL_MESSAGE;
        assert_eq!(strip_refusal_appendix(refusal, refusal), refusal);
        assert_eq!(
            strip_refusal_appendix(&format!("  {}  ", refusal), refusal),
            refusal
        );
    }

    #[test]
    fn test_strip_removes_appended_refusal() {
        let refusal = DEFAULT_REFUSAL_MESSAGE;
        let answer = format!(
            "Mantené presionado el botón de reset 10 segundos.\n\n{}",
            refusal
        );
        assert_eq!(
            strip_refusal_appendix(&answer, refusal),
            "Mantené presionado el botón de reset 10 segundos."
        );
    }

    #[test]
    fn test_strip_removes_hedge_parenthetical() {
        let refusal = DEFAULT_REFUSAL_MESSAGE;
        let answer = format!(
            "Reiniciá el router.\n\n{}\n(En caso de no poder ayudarte, derivamos tu consulta.)",
            refusal
        );
        assert_eq!(strip_refusal_appendix(&answer, refusal), "Reiniciá el router.");
    }

    #[test]
    fn test_strip_untouched_without_refusal() {
        let answer = "Reiniciá el router con el botón trasero.";
        assert_eq!(
            strip_refusal_appendix(answer, DEFAULT_REFUSAL_MESSAGE),
            answer
        );
    }

    #[test]
    fn test_strip_collapses_newline_runs() {
        let refusal = DEFAULT_REFUSAL_MESSAGE;
        let answer = format!("Primera parte.\n\n\n\nSegunda parte.\n{}", refusal);
        assert_eq!(
            strip_refusal_appendix(&answer, refusal),
            "Primera parte.\n\nSegunda parte."
        );
    }
}
