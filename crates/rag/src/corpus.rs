//! Corpus access.
//!
//! The pipeline never reads documents directly; it consumes a `CorpusSource`
//! so the backing store (directory of files, database, object storage) stays
//! swappable, and tests can use in-memory corpora.

use std::path::{Path, PathBuf};

use mesa_core::{AppError, AppResult};
use walkdir::WalkDir;

/// One page of a source document.
#[derive(Debug, Clone)]
pub struct DocumentPage {
    /// 1-based page number; `None` for unpaginated documents
    pub page: Option<u32>,

    /// Page text
    pub text: String,
}

/// A document yielded by a corpus source.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    /// Stable document identifier (e.g., corpus-relative path)
    pub doc_id: String,

    /// Human-readable name used in citations
    pub source_name: String,

    /// Page texts in reading order
    pub pages: Vec<DocumentPage>,
}

/// Read-only access to the document corpus.
#[async_trait::async_trait]
pub trait CorpusSource: Send + Sync {
    /// Load every document in the corpus.
    async fn load_documents(&self) -> AppResult<Vec<SourceDocument>>;
}

/// File extensions read by [`DirCorpus`].
const TEXT_EXTENSIONS: [&str; 3] = ["txt", "md", "text"];

/// Corpus source over a directory of plain-text files.
///
/// Files are visited in sorted order so document and chunk identities are
/// stable across rebuilds. A form-feed character (`\f`) inside a file splits
/// it into numbered pages, matching the page markers that PDF-to-text
/// extraction leaves behind; files without form feeds become one unnumbered
/// page.
pub struct DirCorpus {
    root: PathBuf,
}

impl DirCorpus {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn is_text_file(path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| TEXT_EXTENSIONS.contains(&e.to_lowercase().as_str()))
            .unwrap_or(false)
    }

    fn split_pages(contents: &str) -> Vec<DocumentPage> {
        if contents.contains('\f') {
            contents
                .split('\f')
                .enumerate()
                .map(|(i, text)| DocumentPage {
                    page: Some(i as u32 + 1),
                    text: text.to_string(),
                })
                .collect()
        } else {
            vec![DocumentPage {
                page: None,
                text: contents.to_string(),
            }]
        }
    }
}

#[async_trait::async_trait]
impl CorpusSource for DirCorpus {
    async fn load_documents(&self) -> AppResult<Vec<SourceDocument>> {
        if !self.root.exists() {
            return Err(AppError::Corpus(format!(
                "Corpus directory does not exist: {}",
                self.root.display()
            )));
        }

        let mut documents = Vec::new();

        for entry in WalkDir::new(&self.root)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() || !Self::is_text_file(entry.path()) {
                continue;
            }

            let contents = match std::fs::read_to_string(entry.path()) {
                Ok(contents) => contents,
                Err(e) => {
                    tracing::warn!(path = %entry.path().display(), error = %e, "Skipping unreadable file");
                    continue;
                }
            };

            let doc_id = entry
                .path()
                .strip_prefix(&self.root)
                .unwrap_or(entry.path())
                .to_string_lossy()
                .replace('\\', "/");
            let source_name = entry.file_name().to_string_lossy().to_string();

            documents.push(SourceDocument {
                doc_id,
                source_name,
                pages: Self::split_pages(&contents),
            });
        }

        tracing::debug!(count = documents.len(), root = %self.root.display(), "Loaded corpus documents");
        Ok(documents)
    }
}
