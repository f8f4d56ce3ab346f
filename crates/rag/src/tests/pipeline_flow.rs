//! Tests for the full answer pipeline: retrieval, gating, generation,
//! refusal recording, and follow-up resolution wired together.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};

use mesa_core::{AppError, AppResult};
use mesa_llm::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
use tempfile::TempDir;

use crate::config::{RagConfig, DEFAULT_REFUSAL_MESSAGE};
use crate::corpus::{CorpusSource, DocumentPage, SourceDocument};
use crate::embeddings::{EmbeddingProvider, TrigramEmbeddings};
use crate::index::{IndexStore, SearchIndex};
use crate::pipeline::{AnswerPipeline, PipelineDeps};
use crate::rerank::EmbeddingScorer;
use crate::types::{Answer, ConversationTurn};
use crate::unresolved::UnresolvedSink;

#[cfg(test)]
mod tests {
    use super::*;

    const ROUTER_TEXT: &str =
        "Para reiniciar el router, mantené presionado el botón de reset durante 10 segundos.";

    const ROUTER_REPLY: &str = "Mantené presionado el botón de reset durante 10 segundos.";

    /// Corpus served from memory.
    struct MemCorpus {
        docs: Vec<SourceDocument>,
    }

    #[async_trait::async_trait]
    impl CorpusSource for MemCorpus {
        async fn load_documents(&self) -> AppResult<Vec<SourceDocument>> {
            Ok(self.docs.clone())
        }
    }

    /// Generation client that replays a fixed script and fails once it is
    /// exhausted, so unexpected calls surface as test failures.
    struct ScriptedLlm {
        replies: Mutex<VecDeque<String>>,
    }

    impl ScriptedLlm {
        fn new(replies: &[&str]) -> Self {
            Self {
                replies: Mutex::new(replies.iter().map(|reply| reply.to_string()).collect()),
            }
        }
    }

    #[async_trait::async_trait]
    impl LlmClient for ScriptedLlm {
        fn provider_name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, _request: &LlmRequest) -> AppResult<LlmResponse> {
            match self.replies.lock().unwrap().pop_front() {
                Some(content) => Ok(LlmResponse {
                    content,
                    model: "scripted".to_string(),
                    usage: LlmUsage::default(),
                }),
                None => Err(AppError::Llm("script exhausted".to_string())),
            }
        }
    }

    /// Sink that keeps recorded questions for inspection.
    #[derive(Default)]
    struct RecordingSink {
        questions: Mutex<Vec<String>>,
    }

    impl RecordingSink {
        fn recorded(&self) -> Vec<String> {
            self.questions.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl UnresolvedSink for RecordingSink {
        async fn record(&self, question: &str) -> AppResult<()> {
            self.questions.lock().unwrap().push(question.to_string());
            Ok(())
        }
    }

    fn router_document() -> SourceDocument {
        SourceDocument {
            doc_id: "manual.pdf".to_string(),
            source_name: "manual.pdf".to_string(),
            pages: vec![DocumentPage {
                page: Some(1),
                text: ROUTER_TEXT.to_string(),
            }],
        }
    }

    fn printer_document() -> SourceDocument {
        SourceDocument {
            doc_id: "impresora.txt".to_string(),
            source_name: "impresora.txt".to_string(),
            pages: vec![DocumentPage {
                page: None,
                text: "La impresora requiere tóner nuevo cada tres meses.".to_string(),
            }],
        }
    }

    fn test_config() -> RagConfig {
        RagConfig {
            // The scripted generator only budgets for answer calls
            multi_query: false,
            ..RagConfig::default()
        }
    }

    fn build_pipeline_at(
        store_path: &Path,
        docs: Vec<SourceDocument>,
        replies: &[&str],
    ) -> (AnswerPipeline, Arc<RecordingSink>) {
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(TrigramEmbeddings::new(384));
        let sink = Arc::new(RecordingSink::default());
        let deps = PipelineDeps {
            corpus: Arc::new(MemCorpus { docs }),
            embedder: Arc::clone(&embedder),
            generator: Arc::new(ScriptedLlm::new(replies)),
            scorer: Arc::new(EmbeddingScorer::new(embedder)),
            unresolved: sink.clone(),
        };
        let pipeline = AnswerPipeline::new(test_config(), deps, IndexStore::new(store_path));
        (pipeline, sink)
    }

    fn build_pipeline(
        docs: Vec<SourceDocument>,
        replies: &[&str],
    ) -> (AnswerPipeline, Arc<RecordingSink>, TempDir) {
        let dir = TempDir::new().unwrap();
        let (pipeline, sink) = build_pipeline_at(&dir.path().join("index.db"), docs, replies);
        (pipeline, sink, dir)
    }

    fn source_labels(answer: &Answer) -> Vec<String> {
        answer.sources.iter().map(|s| s.label()).collect()
    }

    #[tokio::test]
    async fn test_router_question_answered_with_sources() {
        let (pipeline, sink, _dir) = build_pipeline(vec![router_document()], &[ROUTER_REPLY]);
        pipeline.reindex().await.unwrap();

        let answer = pipeline
            .answer("¿Cómo reinicio el router?", &[])
            .await
            .unwrap();

        assert!(answer.text.contains("10 segundos"));
        assert_eq!(source_labels(&answer), vec!["manual.pdf (p. 1)"]);
        assert!(sink.recorded().is_empty());
    }

    #[tokio::test]
    async fn test_unrelated_question_refuses_and_records_once() {
        let (pipeline, sink, _dir) = build_pipeline(vec![router_document()], &[]);
        pipeline.reindex().await.unwrap();

        let answer = pipeline
            .answer("¿Cuál es la capital de Francia?", &[])
            .await
            .unwrap();

        assert_eq!(answer.text, DEFAULT_REFUSAL_MESSAGE);
        assert!(answer.sources.is_empty());
        assert_eq!(sink.recorded(), vec!["¿Cuál es la capital de Francia?"]);
    }

    #[tokio::test]
    async fn test_missing_index_refuses() {
        let (pipeline, sink, _dir) = build_pipeline(vec![router_document()], &[]);
        // No reindex and no persisted snapshot to load

        let answer = pipeline
            .answer("¿Cómo reinicio el router?", &[])
            .await
            .unwrap();

        assert_eq!(answer.text, DEFAULT_REFUSAL_MESSAGE);
        assert!(answer.sources.is_empty());
        assert_eq!(sink.recorded().len(), 1);
    }

    #[tokio::test]
    async fn test_short_question_refused_without_retrieval() {
        let (pipeline, sink, _dir) = build_pipeline(vec![router_document()], &[]);

        let answer = pipeline.answer("¿?", &[]).await.unwrap();

        assert_eq!(answer.text, DEFAULT_REFUSAL_MESSAGE);
        assert!(answer.sources.is_empty());
        assert_eq!(sink.recorded(), vec!["¿?"]);
    }

    #[tokio::test]
    async fn test_generated_refusal_collapses_to_empty_sources() {
        let (pipeline, sink, _dir) =
            build_pipeline(vec![router_document()], &[DEFAULT_REFUSAL_MESSAGE]);
        pipeline.reindex().await.unwrap();

        let answer = pipeline
            .answer("¿Cómo reinicio el router?", &[])
            .await
            .unwrap();

        assert_eq!(answer.text, DEFAULT_REFUSAL_MESSAGE);
        assert!(answer.sources.is_empty());
        assert_eq!(sink.recorded().len(), 1);
    }

    #[tokio::test]
    async fn test_refusal_appendix_stripped_from_real_answer() {
        let reply = format!("{}\n\n{}", ROUTER_REPLY, DEFAULT_REFUSAL_MESSAGE);
        let (pipeline, sink, _dir) = build_pipeline(vec![router_document()], &[&reply]);
        pipeline.reindex().await.unwrap();

        let answer = pipeline
            .answer("¿Cómo reinicio el router?", &[])
            .await
            .unwrap();

        assert_eq!(answer.text, ROUTER_REPLY);
        assert!(!answer.text.contains(DEFAULT_REFUSAL_MESSAGE));
        assert_eq!(source_labels(&answer), vec!["manual.pdf (p. 1)"]);
        assert!(sink.recorded().is_empty());
    }

    #[tokio::test]
    async fn test_context_leaking_answer_refused() {
        let (pipeline, sink, _dir) = build_pipeline(
            vec![router_document()],
            &["Según los documentos provistos, el botón está atrás."],
        );
        pipeline.reindex().await.unwrap();

        let answer = pipeline
            .answer("¿Cómo reinicio el router?", &[])
            .await
            .unwrap();

        assert_eq!(answer.text, DEFAULT_REFUSAL_MESSAGE);
        assert!(answer.sources.is_empty());
        assert_eq!(sink.recorded().len(), 1);
    }

    #[tokio::test]
    async fn test_title_line_stripped_from_answer() {
        let reply = format!("manual.pdf\n{}", ROUTER_REPLY);
        let (pipeline, sink, _dir) = build_pipeline(vec![router_document()], &[&reply]);
        pipeline.reindex().await.unwrap();

        let answer = pipeline
            .answer("¿Cómo reinicio el router?", &[])
            .await
            .unwrap();

        assert_eq!(answer.text, ROUTER_REPLY);
        assert_eq!(source_labels(&answer), vec!["manual.pdf (p. 1)"]);
        assert!(sink.recorded().is_empty());
    }

    #[tokio::test]
    async fn test_followup_ordinal_answered_from_history() {
        let (pipeline, sink, _dir) = build_pipeline(
            vec![router_document()],
            &["Apagá el equipo por completo y esperá unos segundos."],
        );
        pipeline.reindex().await.unwrap();

        let history = vec![
            ConversationTurn::user("¿Cómo configuro el módem?"),
            ConversationTurn::assistant(
                "1. Abrí el panel de control.\n2. Apagá el equipo por completo.\n\
                 3. Encendelo de nuevo.",
            ),
        ];

        let answer = pipeline.answer("¿y la segunda?", &history).await.unwrap();

        assert_eq!(
            answer.text,
            "Apagá el equipo por completo y esperá unos segundos."
        );
        assert!(answer.sources.is_empty());
        assert!(sink.recorded().is_empty());
    }

    #[tokio::test]
    async fn test_followup_without_history_refuses() {
        let (pipeline, sink, _dir) = build_pipeline(vec![router_document()], &[]);
        pipeline.reindex().await.unwrap();

        let answer = pipeline
            .answer("¿y las instrucciones?", &[])
            .await
            .unwrap();

        assert_eq!(answer.text, DEFAULT_REFUSAL_MESSAGE);
        assert!(answer.sources.is_empty());
        assert_eq!(sink.recorded(), vec!["¿y las instrucciones?"]);
    }

    #[tokio::test]
    async fn test_reindex_twice_preserves_answer_and_stats() {
        let (pipeline, sink, _dir) = build_pipeline(vec![router_document()], &[ROUTER_REPLY]);

        let first = pipeline.reindex().await.unwrap();
        let second = pipeline.reindex().await.unwrap();

        assert_eq!(first.documents, second.documents);
        assert_eq!(first.chunks, second.chunks);
        assert_eq!(first.lexicon_terms, second.lexicon_terms);
        assert_eq!(first.embedding_dimensions, second.embedding_dimensions);

        let answer = pipeline
            .answer("¿Cómo reinicio el router?", &[])
            .await
            .unwrap();
        assert_eq!(source_labels(&answer), vec!["manual.pdf (p. 1)"]);
        assert!(sink.recorded().is_empty());
    }

    #[tokio::test]
    async fn test_rebuild_is_deterministic() {
        let embedder = TrigramEmbeddings::new(384);
        let docs = vec![router_document(), printer_document()];
        let config = RagConfig::default();

        let first = SearchIndex::build(&docs, &embedder, &config).await.unwrap();
        let second = SearchIndex::build(&docs, &embedder, &config).await.unwrap();

        let first_ids: Vec<&str> = first.chunks().iter().map(|c| c.id.as_str()).collect();
        let second_ids: Vec<&str> = second.chunks().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(first_ids, second_ids);

        let query_vec = embedder.embed("¿Cómo reinicio el router?").await.unwrap();
        let first_dense: Vec<usize> = first
            .search_dense(&query_vec, 4)
            .iter()
            .map(|(idx, _)| *idx)
            .collect();
        let second_dense: Vec<usize> = second
            .search_dense(&query_vec, 4)
            .iter()
            .map(|(idx, _)| *idx)
            .collect();
        assert_eq!(first_dense, second_dense);

        let first_sparse: Vec<usize> = first
            .search_sparse("router", 4)
            .iter()
            .map(|(idx, _)| *idx)
            .collect();
        let second_sparse: Vec<usize> = second
            .search_sparse("router", 4)
            .iter()
            .map(|(idx, _)| *idx)
            .collect();
        assert_eq!(first_sparse, second_sparse);
    }

    #[tokio::test]
    async fn test_persisted_index_survives_restart() {
        let dir = TempDir::new().unwrap();
        let store_path = dir.path().join("index.db");

        let (first, _sink) = build_pipeline_at(&store_path, vec![router_document()], &[]);
        first.reindex().await.unwrap();
        let built = first.stats().await.unwrap();
        drop(first);

        let (second, sink) =
            build_pipeline_at(&store_path, vec![router_document()], &[ROUTER_REPLY]);
        assert!(second.load_index().await.unwrap());

        let restored = second.stats().await.unwrap();
        assert_eq!(restored.documents, built.documents);
        assert_eq!(restored.chunks, built.chunks);
        assert_eq!(restored.lexicon_terms, built.lexicon_terms);

        let answer = second
            .answer("¿Cómo reinicio el router?", &[])
            .await
            .unwrap();
        assert_eq!(source_labels(&answer), vec!["manual.pdf (p. 1)"]);
        assert!(sink.recorded().is_empty());
    }
}
