//! Index command handler.
//!
//! Builds or rebuilds the search index from the document corpus.

use clap::Args;
use mesa_core::{config::AppConfig, AppResult};

/// Build or rebuild the search index from the corpus
#[derive(Args, Debug)]
pub struct IndexCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl IndexCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing index command");

        let pipeline = super::build_pipeline(config).await?;
        let stats = pipeline.reindex().await?;

        if self.json {
            let output = serde_json::json!({
                "documents": stats.documents,
                "chunks": stats.chunks,
                "lexiconTerms": stats.lexicon_terms,
                "embeddingDimensions": stats.embedding_dimensions,
                "builtAt": stats.built_at,
            });
            println!("{}", serde_json::to_string_pretty(&output).unwrap());
        } else {
            println!(
                "Indexed {} documents ({} chunks, {} lexicon terms)",
                stats.documents, stats.chunks, stats.lexicon_terms
            );
        }

        Ok(())
    }
}
