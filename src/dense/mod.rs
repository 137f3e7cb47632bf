//! Dense vector index adapter
//!
//! The engine talks to its embedding store only through [`VectorStore`]: a
//! text-in, ranked-neighbours-out query with optional metadata filtering, plus
//! add/delete keyed by document id. [`InMemoryVectorStore`] is the in-process
//! implementation backed by an HNSW graph.

mod memory;

pub use memory::{InMemoryVectorStore, VectorIndexConfig};

use crate::document::{CorpusSnapshot, Document, MetadataFilter};
use crate::embedding::EmbeddingError;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VectorStoreError {
    #[error("Embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Invalid dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Background task failed: {0}")]
    Task(String),
}

/// One nearest-neighbour result
#[derive(Debug, Clone, PartialEq)]
pub struct DenseHit {
    pub document: Document,
    /// Cosine distance (0.0 = identical direction)
    pub distance: f32,
}

impl DenseHit {
    pub fn id(&self) -> &str {
        &self.document.id
    }
}

/// External embedding store contract
///
/// Implementations must make each `upsert`/`delete` batch visible atomically:
/// a concurrent `query` sees either the whole batch or none of it.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or overwrite documents by id; returns how many were written
    async fn upsert(&self, documents: Vec<Document>) -> Result<usize, VectorStoreError>;

    /// Nearest neighbours of `text`, ascending by distance, at most `limit`
    async fn query(
        &self,
        text: &str,
        limit: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<DenseHit>, VectorStoreError>;

    /// Fetch documents by id; unknown ids are skipped, order follows `ids`
    async fn get(&self, ids: &[String]) -> Result<Vec<Document>, VectorStoreError>;

    /// Remove documents by id; returns how many existed
    async fn delete(&self, ids: &[String]) -> Result<usize, VectorStoreError>;

    /// Number of live documents
    async fn count(&self) -> Result<usize, VectorStoreError>;

    /// Every live `(id, text)` pair, in a stable order
    async fn snapshot(&self) -> Result<CorpusSnapshot, VectorStoreError>;
}
