//! SQLite persistence for the search index.
//!
//! The index is written to a sibling temp file and renamed into place, so a
//! crash mid-save leaves the previous snapshot intact and readers never see
//! a half-written database.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use mesa_core::{AppError, AppResult};
use rusqlite::{params, Connection};
use tracing::debug;

use crate::index::SearchIndex;
use crate::types::Chunk;

/// Handle to the on-disk index location.
#[derive(Debug, Clone)]
pub struct IndexStore {
    path: PathBuf,
}

impl IndexStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Persist an index snapshot, replacing any previous one atomically.
    pub fn save(&self, index: &SearchIndex) -> AppResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| AppError::Index(format!("Failed to create index directory: {}", e)))?;
        }

        let temp_path = self.temp_path();
        if temp_path.exists() {
            std::fs::remove_file(&temp_path)
                .map_err(|e| AppError::Index(format!("Failed to clear stale temp index: {}", e)))?;
        }

        let mut conn = Connection::open(&temp_path)
            .map_err(|e| AppError::Index(format!("Failed to open SQLite index: {}", e)))?;

        conn.execute_batch(
            r#"
            CREATE TABLE meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE chunks (
                ord INTEGER PRIMARY KEY,
                id TEXT NOT NULL,
                doc_id TEXT NOT NULL,
                source_name TEXT NOT NULL,
                page INTEGER,
                seq INTEGER NOT NULL,
                text TEXT NOT NULL,
                embedding BLOB NOT NULL
            );

            CREATE TABLE lexicon (
                rank INTEGER PRIMARY KEY,
                term TEXT NOT NULL
            );
            "#,
        )
        .map_err(|e| AppError::Index(format!("Failed to create tables: {}", e)))?;

        let tx = conn
            .transaction()
            .map_err(|e| AppError::Index(format!("Failed to start transaction: {}", e)))?;

        let stats = index.stats();
        for (key, value) in [
            ("dimensions", stats.embedding_dimensions.to_string()),
            ("documents", stats.documents.to_string()),
            ("built_at", index.built_at().to_rfc3339()),
        ] {
            tx.execute(
                "INSERT INTO meta (key, value) VALUES (?1, ?2)",
                params![key, value],
            )
            .map_err(|e| AppError::Index(format!("Failed to insert metadata: {}", e)))?;
        }

        for (ord, chunk) in index.chunks().iter().enumerate() {
            tx.execute(
                "INSERT INTO chunks (ord, id, doc_id, source_name, page, seq, text, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    ord as i64,
                    chunk.id,
                    chunk.doc_id,
                    chunk.source_name,
                    chunk.page,
                    chunk.seq,
                    chunk.text,
                    embedding_to_bytes(&chunk.embedding),
                ],
            )
            .map_err(|e| AppError::Index(format!("Failed to insert chunk: {}", e)))?;
        }

        for (rank, term) in index.lexicon().terms().iter().enumerate() {
            tx.execute(
                "INSERT INTO lexicon (rank, term) VALUES (?1, ?2)",
                params![rank as i64, term],
            )
            .map_err(|e| AppError::Index(format!("Failed to insert lexicon term: {}", e)))?;
        }

        tx.commit()
            .map_err(|e| AppError::Index(format!("Failed to commit index: {}", e)))?;

        drop(conn);
        std::fs::rename(&temp_path, &self.path)
            .map_err(|e| AppError::Index(format!("Failed to move index into place: {}", e)))?;

        debug!(path = %self.path.display(), chunks = index.len(), "Saved search index");
        Ok(())
    }

    /// Load the persisted index, or `None` when no snapshot exists yet.
    pub fn load(&self) -> AppResult<Option<SearchIndex>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let conn = Connection::open(&self.path)
            .map_err(|e| AppError::Index(format!("Failed to open SQLite index: {}", e)))?;

        let dimensions: usize = self.meta_value(&conn, "dimensions")?.parse().map_err(|_| {
            AppError::Index("Stored index has invalid dimensions metadata".to_string())
        })?;
        let documents: usize = self.meta_value(&conn, "documents")?.parse().map_err(|_| {
            AppError::Index("Stored index has invalid document count metadata".to_string())
        })?;
        let built_at_raw = self.meta_value(&conn, "built_at")?;
        let built_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&built_at_raw)
            .map_err(|e| AppError::Index(format!("Stored index has invalid timestamp: {}", e)))?
            .with_timezone(&Utc);

        let mut stmt = conn
            .prepare(
                "SELECT id, doc_id, source_name, page, seq, text, embedding
                 FROM chunks ORDER BY ord",
            )
            .map_err(|e| AppError::Index(format!("Failed to prepare chunk query: {}", e)))?;

        let chunks: Vec<Chunk> = stmt
            .query_map([], |row| {
                let embedding_bytes: Vec<u8> = row.get(6)?;
                Ok(Chunk {
                    id: row.get(0)?,
                    doc_id: row.get(1)?,
                    source_name: row.get(2)?,
                    page: row.get(3)?,
                    seq: row.get(4)?,
                    text: row.get(5)?,
                    embedding: bytes_to_embedding(&embedding_bytes),
                })
            })
            .map_err(|e| AppError::Index(format!("Failed to query chunks: {}", e)))?
            .collect::<Result<_, _>>()
            .map_err(|e| AppError::Index(format!("Failed to read chunk row: {}", e)))?;

        let mut stmt = conn
            .prepare("SELECT term FROM lexicon ORDER BY rank")
            .map_err(|e| AppError::Index(format!("Failed to prepare lexicon query: {}", e)))?;

        let terms: Vec<String> = stmt
            .query_map([], |row| row.get(0))
            .map_err(|e| AppError::Index(format!("Failed to query lexicon: {}", e)))?
            .collect::<Result<_, _>>()
            .map_err(|e| AppError::Index(format!("Failed to read lexicon row: {}", e)))?;

        if let Some(chunk) = chunks.first() {
            if chunk.embedding.len() != dimensions {
                return Err(AppError::Index(format!(
                    "Stored index dimensions {} do not match chunk vectors of length {}",
                    dimensions,
                    chunk.embedding.len()
                )));
            }
        }

        let index = SearchIndex::from_parts(chunks, terms, documents, built_at)?;
        debug!(path = %self.path.display(), chunks = index.len(), "Loaded search index");
        Ok(Some(index))
    }

    fn meta_value(&self, conn: &Connection, key: &str) -> AppResult<String> {
        conn.query_row(
            "SELECT value FROM meta WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .map_err(|e| AppError::Index(format!("Missing index metadata '{}': {}", key, e)))
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

/// Encode an embedding as little-endian f32 bytes for BLOB storage.
fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(embedding.len() * 4);
    for &value in embedding {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Decode little-endian f32 bytes back into a vector. Trailing bytes that
/// do not form a full f32 are ignored.
fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}
