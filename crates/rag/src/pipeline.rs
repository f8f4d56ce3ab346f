//! End-to-end question answering pipeline.
//!
//! `AnswerPipeline` wires the stages together: follow-up fast path,
//! two-pass hybrid retrieval, answerability gates, grounded generation,
//! and output hygiene. Every path out of the pipeline yields an [`Answer`];
//! when evidence is insufficient the answer is the configured refusal and
//! the question is recorded for the help desk.

use std::sync::Arc;

use mesa_core::{AppError, AppResult};
use mesa_llm::LlmClient;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::RagConfig;
use crate::corpus::CorpusSource;
use crate::embeddings::EmbeddingProvider;
use crate::followup::{answer_from_history, is_generic_followup};
use crate::gate::{self, GateOutcome};
use crate::generate::{build_context, generate_answer, mentions_internal_context};
use crate::index::{IndexStore, SearchIndex};
use crate::rerank::RelevanceScorer;
use crate::retrieve::{retrieve, RetrievedChunk};
use crate::rewrite::{append_terms, expand_query, prf_terms};
use crate::sources::{aggregate_sources, strip_title_lines};
use crate::types::{Answer, ConversationTurn, IndexStats};
use crate::unresolved::UnresolvedSink;

/// Collaborators injected into the pipeline.
pub struct PipelineDeps {
    pub corpus: Arc<dyn CorpusSource>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub generator: Arc<dyn LlmClient>,
    pub scorer: Arc<dyn RelevanceScorer>,
    pub unresolved: Arc<dyn UnresolvedSink>,
}

/// The question answering pipeline over one corpus index.
///
/// Shared-state layout: the active index sits behind an `RwLock` so
/// concurrent `answer` calls read one consistent snapshot while a rebuild
/// swaps in its replacement. The rebuild itself is single-flight.
pub struct AnswerPipeline {
    config: RagConfig,
    deps: PipelineDeps,
    store: IndexStore,
    index: RwLock<Option<Arc<SearchIndex>>>,
    rebuild_lock: Mutex<()>,
}

impl AnswerPipeline {
    pub fn new(config: RagConfig, deps: PipelineDeps, store: IndexStore) -> Self {
        Self {
            config,
            deps,
            store,
            index: RwLock::new(None),
            rebuild_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Load the persisted index into memory. Returns whether one existed.
    pub async fn load_index(&self) -> AppResult<bool> {
        match self.store.load()? {
            Some(index) => {
                *self.index.write().await = Some(Arc::new(index));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Rebuild the index from the corpus, persist it, and make it active.
    ///
    /// Questions keep being answered against the previous index until the
    /// new one is fully built and saved.
    pub async fn reindex(&self) -> AppResult<IndexStats> {
        let _guard = self.rebuild_lock.lock().await;

        let documents = self.deps.corpus.load_documents().await?;
        if documents.is_empty() {
            return Err(AppError::Index("Corpus contains no documents".to_string()));
        }

        let index =
            SearchIndex::build(&documents, self.deps.embedder.as_ref(), &self.config).await?;
        let stats = index.stats();
        self.store.save(&index)?;
        *self.index.write().await = Some(Arc::new(index));

        info!(
            documents = stats.documents,
            chunks = stats.chunks,
            "Rebuilt search index"
        );
        Ok(stats)
    }

    /// Stats of the active index, if one is loaded.
    pub async fn stats(&self) -> Option<IndexStats> {
        self.index.read().await.as_ref().map(|index| index.stats())
    }

    async fn snapshot(&self) -> Option<Arc<SearchIndex>> {
        self.index.read().await.clone()
    }

    /// Answer one question given the conversation so far.
    ///
    /// Never fails the caller over missing evidence: bad retrieval, failed
    /// gates, and unusable generations all collapse into the refusal
    /// answer, recording the question on the way. Only infrastructure
    /// errors during recording itself are swallowed (with a warning) so a
    /// full help-desk log cannot break answering.
    pub async fn answer(
        &self,
        question: &str,
        history: &[ConversationTurn],
    ) -> AppResult<Answer> {
        let question = question.trim();

        if question.chars().count() < self.config.min_question_chars {
            debug!("Question below minimum length");
            self.record_unresolved(question).await;
            return Ok(self.refusal());
        }

        if is_generic_followup(question) {
            if let Some(text) = self.try_history(question, history).await {
                return Ok(Answer {
                    text,
                    sources: Vec::new(),
                });
            }
            // No usable history: fall through to normal retrieval
        }

        let Some(index) = self.snapshot().await else {
            warn!("No search index loaded; abstaining");
            return Ok(self.abstain(question, history).await);
        };

        let ranked = match self.retrieve_and_gate(&index, question).await {
            Ok(Some(ranked)) => ranked,
            Ok(None) => return Ok(self.abstain(question, history).await),
            Err(e) => {
                warn!("Retrieval failed: {}", e);
                return Ok(self.abstain(question, history).await);
            }
        };

        let context = build_context(&ranked, self.config.context_char_limit);
        let answer_text = match generate_answer(
            self.deps.generator.as_ref(),
            question,
            &context,
            &self.config,
        )
        .await
        {
            Ok(text) => text,
            Err(e) => {
                warn!("Generation failed: {}", e);
                return Ok(self.abstain(question, history).await);
            }
        };

        if answer_text.is_empty()
            || answer_text == self.config.refusal_message
            || mentions_internal_context(&answer_text)
        {
            debug!("Generated answer unusable; refusing");
            self.record_unresolved(question).await;
            return Ok(self.refusal());
        }

        let sources = aggregate_sources(&ranked);
        let cleaned = strip_title_lines(&answer_text, &sources);
        if cleaned.is_empty() {
            self.record_unresolved(question).await;
            return Ok(self.refusal());
        }

        Ok(Answer {
            text: cleaned,
            sources,
        })
    }

    /// Two-pass retrieval plus gate evaluation. `None` means abstain.
    async fn retrieve_and_gate(
        &self,
        index: &SearchIndex,
        question: &str,
    ) -> AppResult<Option<Vec<RetrievedChunk>>> {
        let expanded = expand_query(question, index.lexicon(), &self.config);
        debug!(query = %expanded, "First retrieval pass");

        let first = retrieve(
            index,
            self.deps.embedder.as_ref(),
            self.deps.generator.as_ref(),
            self.deps.scorer.as_ref(),
            &expanded,
            question,
            &self.config,
        )
        .await?;

        let feedback = prf_terms(&first, question, index.lexicon(), &self.config);
        let ranked = if feedback.is_empty() {
            // Nothing mined: the second pass would repeat the first
            first
        } else {
            let final_query = append_terms(&expanded, &feedback);
            debug!(query = %final_query, "Second retrieval pass");
            retrieve(
                index,
                self.deps.embedder.as_ref(),
                self.deps.generator.as_ref(),
                self.deps.scorer.as_ref(),
                &final_query,
                question,
                &self.config,
            )
            .await?
        };

        match gate::evaluate(self.deps.embedder.as_ref(), question, &ranked, &self.config).await? {
            GateOutcome::Proceed => Ok(Some(ranked)),
            GateOutcome::Abstain(stage) => {
                debug!(?stage, "Gate abstained");
                Ok(None)
            }
        }
    }

    /// Try answering from history; errors degrade to `None` with a warning.
    async fn try_history(
        &self,
        question: &str,
        history: &[ConversationTurn],
    ) -> Option<String> {
        match answer_from_history(
            self.deps.generator.as_ref(),
            self.deps.embedder.as_ref(),
            question,
            history,
            &self.config,
        )
        .await
        {
            Ok(answer) => answer,
            Err(e) => {
                warn!("History follow-up failed: {}", e);
                None
            }
        }
    }

    /// Abstain path: history gets a last chance, then record and refuse.
    async fn abstain(&self, question: &str, history: &[ConversationTurn]) -> Answer {
        if let Some(text) = self.try_history(question, history).await {
            return Answer {
                text,
                sources: Vec::new(),
            };
        }
        self.record_unresolved(question).await;
        self.refusal()
    }

    async fn record_unresolved(&self, question: &str) {
        if let Err(e) = self.deps.unresolved.record(question).await {
            warn!("Failed to record unresolved question: {}", e);
        }
    }

    fn refusal(&self) -> Answer {
        Answer {
            text: self.config.refusal_message.clone(),
            sources: Vec::new(),
        }
    }
}
