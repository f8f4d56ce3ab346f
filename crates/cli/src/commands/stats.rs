//! Stats command handler.
//!
//! Reports index statistics and unresolved-question volume.

use clap::Args;
use mesa_core::{config::AppConfig, AppResult};
use mesa_rag::{IndexStore, JsonlUnresolvedSink};

/// Show index and unresolved-question statistics
#[derive(Args, Debug)]
pub struct StatsCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl StatsCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing stats command");

        // Read the persisted index directly; stats must work without a
        // reachable LLM or embedding endpoint.
        let stats = IndexStore::new(config.index_path())
            .load()?
            .map(|index| index.stats());
        let unresolved = JsonlUnresolvedSink::new(config.unresolved_path()).list()?;

        if self.json {
            let output = serde_json::json!({
                "indexed": stats.is_some(),
                "documents": stats.as_ref().map(|s| s.documents),
                "chunks": stats.as_ref().map(|s| s.chunks),
                "lexiconTerms": stats.as_ref().map(|s| s.lexicon_terms),
                "embeddingDimensions": stats.as_ref().map(|s| s.embedding_dimensions),
                "builtAt": stats.as_ref().map(|s| s.built_at),
                "unresolvedCount": unresolved.len(),
            });
            println!("{}", serde_json::to_string_pretty(&output).unwrap());
        } else {
            match &stats {
                Some(stats) => {
                    println!("Index: {}", config.index_path().display());
                    println!("  Documents: {}", stats.documents);
                    println!("  Chunks: {}", stats.chunks);
                    println!("  Lexicon terms: {}", stats.lexicon_terms);
                    println!("  Embedding dimensions: {}", stats.embedding_dimensions);
                    println!("  Built at: {}", stats.built_at);
                }
                None => println!("Index: (not built yet, run `mesa index`)"),
            }
            println!("Unresolved questions: {}", unresolved.len());
        }

        Ok(())
    }
}
