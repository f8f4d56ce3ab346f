//! Core data types for the answer pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A retrievable fragment of a corpus document.
///
/// Chunks are produced once at index build time and are immutable until the
/// next full rebuild. The id is deterministic for a given corpus so repeated
/// rebuilds yield identical identities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Deterministic identity: `{doc_id}#p{page}#c{seq}` (page part omitted
    /// for unpaginated documents)
    pub id: String,

    /// Identifier of the source document (e.g., corpus-relative path)
    pub doc_id: String,

    /// Human-readable source name used in citations
    pub source_name: String,

    /// 1-based page number, if the document is paginated
    pub page: Option<u32>,

    /// Position of the chunk within its page
    pub seq: u32,

    /// Chunk text
    pub text: String,

    /// Unit-normalized embedding vector
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embedding: Vec<f32>,
}

/// Role of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One turn of the conversation history supplied by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl ConversationTurn {
    /// Build a user turn stamped with the current time.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            timestamp: Some(Utc::now()),
        }
    }

    /// Build an assistant turn stamped with the current time.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            timestamp: Some(Utc::now()),
        }
    }
}

/// A source citation: one document with the set of pages that contributed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    /// Source document name
    pub source_name: String,

    /// Contributing pages, ascending and deduplicated; empty for
    /// unpaginated documents
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pages: Vec<u32>,
}

/// The pipeline's final output for one question.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    /// Answer text; equals the configured refusal message when evidence is
    /// insufficient, never empty
    pub text: String,

    /// Citations for the chunks behind the answer; empty on refusal and on
    /// follow-up answers derived from history
    pub sources: Vec<SourceRef>,
}

/// Snapshot statistics of a built search index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    /// Number of source documents
    pub documents: usize,

    /// Number of indexed chunks
    pub chunks: usize,

    /// Number of lexicon terms
    pub lexicon_terms: usize,

    /// Embedding vector dimensionality
    pub embedding_dimensions: usize,

    /// When the index was built
    pub built_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turn_constructors() {
        let turn = ConversationTurn::user("hola");
        assert_eq!(turn.role, Role::User);
        assert!(turn.timestamp.is_some());

        let turn = ConversationTurn::assistant("respuesta");
        assert_eq!(turn.role, Role::Assistant);
    }

    #[test]
    fn test_role_serde_lowercase() {
        let json = serde_json::to_string(&Role::Assistant).unwrap();
        assert_eq!(json, "\"assistant\"");
        let parsed: Role = serde_json::from_str("\"user\"").unwrap();
        assert_eq!(parsed, Role::User);
    }

    #[test]
    fn test_chunk_serde_skips_empty_embedding() {
        let chunk = Chunk {
            id: "doc.md#c0".to_string(),
            doc_id: "doc.md".to_string(),
            source_name: "doc.md".to_string(),
            page: None,
            seq: 0,
            text: "texto".to_string(),
            embedding: vec![],
        };
        let json = serde_json::to_string(&chunk).unwrap();
        assert!(!json.contains("embedding"));
    }
}
