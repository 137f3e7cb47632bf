//! Hybrid retrieval & reranking
//!
//! Combines dense and sparse rankings with Reciprocal Rank Fusion plus
//! confidence boosting, and optionally reorders the fused window with a
//! cross-encoder.

mod candidate;
mod fusion;
mod hybrid;
mod reranker;

pub use candidate::{Candidate, RetrievalMethod};
pub use fusion::{
    reciprocal_rank_fusion, ConfidenceTier, FusedEntry, FusionConfig, FusionError, RankingEntry,
};
pub use hybrid::{EngineBuilder, EngineStats, HybridEngine, RetrievalSettings, SearchError};
pub use reranker::{
    CrossEncoderReranker, FastEmbedScorer, RelevanceScorer, RerankError, RerankerState,
    ScorerLoader, DEFAULT_RERANKER_MODEL,
};

use crate::document::MetadataFilter;
use serde::{Deserialize, Serialize};

/// Search request with optional filters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Query text
    pub query: String,

    /// Maximum number of results (must be ≥ 1)
    pub top_k: usize,

    /// Include sparse keyword scoring; `false` means dense-only
    pub use_hybrid: bool,

    /// Reorder the fused window with the cross-encoder
    pub use_reranking: bool,

    /// Exact-match metadata constraints
    pub filters: Option<MetadataFilter>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>, top_k: usize) -> Self {
        Self {
            query: query.into(),
            top_k,
            use_hybrid: true,
            use_reranking: true,
            filters: None,
        }
    }

    pub fn hybrid(mut self, enabled: bool) -> Self {
        self.use_hybrid = enabled;
        self
    }

    pub fn reranking(mut self, enabled: bool) -> Self {
        self.use_reranking = enabled;
        self
    }

    pub fn filters(mut self, filters: MetadataFilter) -> Self {
        self.filters = if filters.is_empty() {
            None
        } else {
            Some(filters)
        };
        self
    }

    fn active_filter(&self) -> Option<&MetadataFilter> {
        self.filters.as_ref().filter(|f| !f.is_empty())
    }
}
