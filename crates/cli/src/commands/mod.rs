//! Command handlers for the MESA CLI.
//!
//! This module organizes all CLI commands into separate submodules.

pub mod ask;
pub mod chat;
pub mod index;
pub mod stats;

// Re-export command types for convenience
pub use ask::AskCommand;
pub use chat::ChatCommand;
pub use index::IndexCommand;
pub use stats::StatsCommand;

use std::sync::Arc;

use mesa_core::{config::AppConfig, AppError, AppResult};
use mesa_llm::create_client;
use mesa_rag::{
    create_provider, Answer, AnswerPipeline, DirCorpus, EmbeddingScorer, IndexStore,
    JsonlUnresolvedSink, PipelineDeps, RagConfig,
};

/// Assemble the answer pipeline from the application configuration.
///
/// Wires the corpus directory, embedding provider, generation client,
/// reranker and unresolved-question sink together, rooted at the
/// workspace's `.mesa` directory.
pub async fn build_pipeline(config: &AppConfig) -> AppResult<AnswerPipeline> {
    config.validate()?;

    let mut rag_config = RagConfig::load(&config.rag_config_path())?;
    // Model selection lives in AppConfig so -m/--model wins over rag.yaml
    rag_config.generation_model = config.model.clone();
    rag_config.validate()?;

    let embedder = create_provider(
        &config.embedding_provider,
        &config.embedding_model,
        config.embedding_dimensions,
        embedding_endpoint(config),
    )
    .await?;

    let generator = create_client(
        &config.provider,
        config.endpoint.as_deref(),
        config.api_key.as_deref(),
    )
    .map_err(AppError::Config)?;

    let scorer = Arc::new(EmbeddingScorer::new(Arc::clone(&embedder)));
    let deps = PipelineDeps {
        corpus: Arc::new(DirCorpus::new(config.resolved_corpus_dir())),
        embedder,
        generator,
        scorer,
        unresolved: Arc::new(JsonlUnresolvedSink::new(config.unresolved_path())),
    };

    Ok(AnswerPipeline::new(
        rag_config,
        deps,
        IndexStore::new(config.index_path()),
    ))
}

/// The endpoint override targets the generation provider; embeddings share
/// it only when both run against the same Ollama daemon.
fn embedding_endpoint(config: &AppConfig) -> Option<&str> {
    if config.embedding_provider == "ollama" && config.provider == "ollama" {
        config.endpoint.as_deref()
    } else {
        None
    }
}

/// Make sure a usable index backs the pipeline: restore the persisted one,
/// or build from the corpus when none exists yet.
pub async fn ensure_index(pipeline: &AnswerPipeline, force_reindex: bool) -> AppResult<()> {
    if force_reindex {
        pipeline.reindex().await?;
    } else if !pipeline.load_index().await? {
        tracing::info!("No persisted index found, building from corpus");
        pipeline.reindex().await?;
    }
    Ok(())
}

/// Print an answer with its source citations.
pub fn print_answer(answer: &Answer) {
    println!("{}", answer.text);
    if !answer.sources.is_empty() {
        println!();
        println!("Fuentes:");
        for source in &answer.sources {
            println!("- {}", source.label());
        }
    }
}
