//! Document chunking.
//!
//! Pages are split into overlapping windows that prefer paragraph and
//! sentence boundaries (the splitter descends semantic levels until the
//! target size fits). Chunk ids are derived from document, page, and
//! position, so rebuilding an unchanged corpus reproduces identical ids.

use mesa_core::{AppError, AppResult};
use text_splitter::{ChunkConfig, TextSplitter};

use crate::config::RagConfig;
use crate::corpus::SourceDocument;
use crate::types::Chunk;

/// Split one document into chunks. Embeddings are left empty; the index
/// build fills them in.
pub fn split_document(document: &SourceDocument, config: &RagConfig) -> AppResult<Vec<Chunk>> {
    let chunk_config = ChunkConfig::new(config.chunk_size)
        .with_overlap(config.chunk_overlap)
        .map_err(|e| AppError::Index(format!("Invalid chunk configuration: {}", e)))?;
    let splitter = TextSplitter::new(chunk_config);

    let mut chunks = Vec::new();

    for page in &document.pages {
        let mut seq: u32 = 0;
        for piece in splitter.chunks(&page.text) {
            let text = piece.trim();
            if text.is_empty() {
                continue;
            }

            chunks.push(Chunk {
                id: chunk_id(&document.doc_id, page.page, seq),
                doc_id: document.doc_id.clone(),
                source_name: document.source_name.clone(),
                page: page.page,
                seq,
                text: text.to_string(),
                embedding: Vec::new(),
            });
            seq += 1;
        }
    }

    tracing::debug!(
        doc_id = %document.doc_id,
        chunks = chunks.len(),
        "Split document into chunks"
    );

    Ok(chunks)
}

fn chunk_id(doc_id: &str, page: Option<u32>, seq: u32) -> String {
    match page {
        Some(p) => format!("{}#p{}#c{}", doc_id, p, seq),
        None => format!("{}#c{}", doc_id, seq),
    }
}
