//! Ask command handler.
//!
//! Answers a single question against the indexed corpus.

use clap::Args;
use mesa_core::{config::AppConfig, AppResult};

/// Ask a single question against the indexed corpus
#[derive(Args, Debug)]
pub struct AskCommand {
    /// The question to answer
    pub question: String,

    /// Rebuild the index before answering
    #[arg(long)]
    pub reindex: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl AskCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing ask command");

        let pipeline = super::build_pipeline(config).await?;
        super::ensure_index(&pipeline, self.reindex).await?;

        let answer = pipeline.answer(&self.question, &[]).await?;

        if self.json {
            let sources: Vec<String> = answer.sources.iter().map(|s| s.label()).collect();
            let output = serde_json::json!({
                "question": self.question,
                "answer": answer.text,
                "sources": sources,
            });
            println!("{}", serde_json::to_string_pretty(&output).unwrap());
        } else {
            super::print_answer(&answer);
        }

        Ok(())
    }
}
