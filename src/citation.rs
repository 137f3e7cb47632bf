//! Citation helpers for answer generation
//!
//! Turns search results into an id-tagged context block for a language model
//! and into the trimmed source list shown next to its answer.

use crate::document::Metadata;
use crate::retrieval::Candidate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Fused scores below this are not cited
pub const MIN_RELEVANCE_SCORE: f32 = 0.015;

/// Characters of source text kept in a [`SourceRef`]
pub const SOURCE_PREVIEW_CHARS: usize = 200;

/// A cited feedback snippet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    pub id: String,
    pub text: String,
    pub score: f32,
    pub metadata: Metadata,
}

fn tag_prefix() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(\[[^\]]*\]\s*)+").expect("tag prefix is a valid regex"))
}

/// Remove leading `[TAG]` markers
///
/// `"[ID.4] [DE] [voice] Navigation freezes"` becomes `"Navigation freezes"`.
pub fn strip_metadata_prefix(text: &str) -> String {
    tag_prefix().replace(text, "").trim().to_string()
}

/// `"[id]: text"` blocks separated by blank lines, in result order
///
/// Texts keep their tag prefixes; they carry model and market hints.
pub fn build_context(candidates: &[Candidate]) -> String {
    candidates
        .iter()
        .map(|c| format!("[{}]: {}", c.id, c.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Candidates whose fused score reaches `min_score`, as display-ready sources
pub fn relevant_sources(candidates: &[Candidate], min_score: f32) -> Vec<SourceRef> {
    candidates
        .iter()
        .filter(|c| c.score >= min_score)
        .map(|c| SourceRef {
            id: c.id.clone(),
            text: strip_metadata_prefix(&c.text)
                .chars()
                .take(SOURCE_PREVIEW_CHARS)
                .collect(),
            score: c.score,
            metadata: c.metadata.clone(),
        })
        .collect()
}

/// Mean score of the cited sources, 0.0 when there are none
pub fn average_score(sources: &[SourceRef]) -> f32 {
    if sources.is_empty() {
        return 0.0;
    }
    sources.iter().map(|s| s.score).sum::<f32>() / sources.len() as f32
}
