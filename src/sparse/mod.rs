//! Sparse lexical index
//!
//! A [`SparseBackend`] builds an immutable [`SparseIndex`] from the entire corpus;
//! there is no incremental path. [`SparseCache`] decides when the built index is
//! stale and rebuilds it on demand.

mod bm25;
mod lifecycle;

pub use bm25::{Bm25Backend, Bm25Index};
pub use lifecycle::{SparseCache, SparseIndexState, SparseIndexStats};

use crate::document::CorpusSnapshot;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SparseIndexError {
    #[error("Index build failed: {0}")]
    Build(String),

    #[error("Search failed: {0}")]
    Search(String),

    #[error("Tantivy error: {0}")]
    Tantivy(#[from] tantivy::TantivyError),

    #[error("Background task failed: {0}")]
    Task(String),
}

/// A matched document in the sparse ranking
#[derive(Debug, Clone, PartialEq)]
pub struct SparseHit {
    pub id: String,
    pub score: f32,
}

/// Keyword relevance over one corpus snapshot
pub trait SparseIndex: Send + Sync {
    /// Score ≥ 0 for every document in the corpus.
    ///
    /// Documents sharing no term with the query score 0; callers keep only
    /// `score > 0` as matches.
    fn score(&self, query_tokens: &[String]) -> HashMap<String, f32>;

    /// Document ids in corpus order
    fn doc_ids(&self) -> &[String];

    fn len(&self) -> usize {
        self.doc_ids().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Best `limit` documents by score, ties in corpus order, zero scores dropped
    fn rank(&self, query_tokens: &[String], limit: usize) -> Vec<SparseHit> {
        if query_tokens.is_empty() || limit == 0 {
            return Vec::new();
        }

        let scores = self.score(query_tokens);
        let mut ranked: Vec<SparseHit> = self
            .doc_ids()
            .iter()
            .map(|id| SparseHit {
                id: id.clone(),
                score: scores.get(id).copied().unwrap_or(0.0),
            })
            .collect();

        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
        ranked.truncate(limit);
        ranked.retain(|hit| hit.score > 0.0);
        ranked
    }
}

/// Builds sparse indices from corpus snapshots
pub trait SparseBackend: Send + Sync {
    fn name(&self) -> &str;

    fn build(&self, corpus: &CorpusSnapshot) -> Result<Arc<dyn SparseIndex>, SparseIndexError>;
}
