//! Search results handed to callers

use crate::document::{Document, Metadata};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which rankings contributed a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalMethod {
    Dense,
    Sparse,
    Hybrid,
}

impl fmt::Display for RetrievalMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Dense => "dense",
            Self::Sparse => "sparse",
            Self::Hybrid => "hybrid",
        })
    }
}

/// A fused (and possibly reranked) search result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Document id
    pub id: String,

    /// Document text
    pub text: String,

    /// Document metadata
    pub metadata: Metadata,

    /// Fused RRF score (higher is better); kept after reranking
    pub score: f32,

    pub retrieval_method: RetrievalMethod,

    /// Cosine distance from the dense ranking, when the document was in it
    pub dense_distance: Option<f32>,

    /// Cross-encoder score; set only when reranking ran
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rerank_score: Option<f32>,
}

impl Candidate {
    pub fn from_document(
        document: Document,
        score: f32,
        retrieval_method: RetrievalMethod,
        dense_distance: Option<f32>,
    ) -> Self {
        Self {
            id: document.id,
            text: document.text,
            metadata: document.metadata,
            score,
            retrieval_method,
            dense_distance,
            rerank_score: None,
        }
    }

    /// First `max_chars` characters of the text, with an ellipsis when cut
    pub fn preview(&self, max_chars: usize) -> String {
        if self.text.chars().count() <= max_chars {
            self.text.clone()
        } else {
            let cut: String = self.text.chars().take(max_chars).collect();
            format!("{}...", cut)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_respects_char_boundaries() {
        let candidate = Candidate::from_document(
            Document::with_id("1", "Lädt nicht über Nacht"),
            0.1,
            RetrievalMethod::Dense,
            Some(0.2),
        );

        assert_eq!(candidate.preview(4), "Lädt...");
        assert_eq!(candidate.preview(100), "Lädt nicht über Nacht");
    }

    #[test]
    fn test_method_serializes_lowercase() {
        let json = serde_json::to_string(&RetrievalMethod::Hybrid).unwrap();
        assert_eq!(json, "\"hybrid\"");
    }
}
