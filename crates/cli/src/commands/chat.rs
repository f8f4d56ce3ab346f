//! Chat command handler.
//!
//! Interactive session that keeps the conversation history so follow-up
//! questions ("¿y la segunda?") resolve against earlier answers.

use clap::Args;
use mesa_core::{config::AppConfig, AppResult};
use mesa_rag::ConversationTurn;
use std::io::{self, BufRead, Write};

/// Interactive session with follow-up support
#[derive(Args, Debug)]
pub struct ChatCommand {
    /// Rebuild the index before starting
    #[arg(long)]
    pub reindex: bool,
}

impl ChatCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing chat command");

        let pipeline = super::build_pipeline(config).await?;
        super::ensure_index(&pipeline, self.reindex).await?;

        println!("Escribí tu consulta (\"salir\" para terminar).");

        let stdin = io::stdin();
        let mut history: Vec<ConversationTurn> = Vec::new();

        loop {
            print!("> ");
            io::stdout().flush()?;

            let mut line = String::new();
            if stdin.lock().read_line(&mut line)? == 0 {
                break;
            }

            let question = line.trim();
            if question.is_empty() {
                continue;
            }
            if matches!(question.to_lowercase().as_str(), "salir" | "exit" | "quit") {
                break;
            }

            let answer = pipeline.answer(question, &history).await?;

            super::print_answer(&answer);
            println!();

            history.push(ConversationTurn::user(question));
            history.push(ConversationTurn::assistant(answer.text.clone()));
        }

        Ok(())
    }
}
