//! Unresolved question tracking.
//!
//! Every question the pipeline refuses is handed to an `UnresolvedSink` so a
//! support team can follow up. The provided implementation appends JSONL
//! records; sink failures are logged by the pipeline and never surface to
//! the user.

use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use mesa_core::AppResult;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Destination for questions the pipeline could not answer.
#[async_trait::async_trait]
pub trait UnresolvedSink: Send + Sync {
    /// Record one unresolved question. Called with the original, unexpanded
    /// question text.
    async fn record(&self, question: &str) -> AppResult<()>;
}

/// One persisted unresolved question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnresolvedRecord {
    /// Unique record id
    pub id: Uuid,

    /// The question as the user asked it
    pub question: String,

    /// When the question was recorded
    pub recorded_at: DateTime<Utc>,
}

/// Sink that appends one JSON object per line to a file.
pub struct JsonlUnresolvedSink {
    path: PathBuf,
}

impl JsonlUnresolvedSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Read back all recorded questions.
    pub fn list(&self) -> AppResult<Vec<UnresolvedRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = std::fs::File::open(&self.path)?;
        let reader = BufReader::new(file);
        let mut records = Vec::new();

        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<UnresolvedRecord>(&line) {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping malformed unresolved record");
                }
            }
        }

        Ok(records)
    }
}

#[async_trait::async_trait]
impl UnresolvedSink for JsonlUnresolvedSink {
    async fn record(&self, question: &str) -> AppResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let record = UnresolvedRecord {
            id: Uuid::new_v4(),
            question: question.to_string(),
            recorded_at: Utc::now(),
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let line = serde_json::to_string(&record)?;
        writeln!(file, "{}", line)?;

        tracing::info!(question = %question, "Recorded unresolved question");
        Ok(())
    }
}
