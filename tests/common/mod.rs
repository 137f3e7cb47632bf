//! Deterministic stand-ins for the model-backed components
#![allow(dead_code)]

use async_trait::async_trait;
use feedsearch::dense::{
    DenseHit, InMemoryVectorStore, VectorIndexConfig, VectorStore, VectorStoreError,
};
use feedsearch::document::CorpusSnapshot;
use feedsearch::embedding::{EmbeddingError, EmbeddingProvider};
use feedsearch::retrieval::{RelevanceScorer, RerankError};
use feedsearch::{Document, MetadataFilter};
use std::sync::Arc;
use std::time::Duration;

pub const BUCKETS: usize = 64;

/// Bag-of-words hashed into fixed buckets, plus a bias so no vector is zero
pub struct HashedEmbedder;

fn fnv1a(word: &str) -> u64 {
    word.bytes().fold(0xcbf29ce484222325, |hash, byte| {
        (hash ^ byte as u64).wrapping_mul(0x100000001b3)
    })
}

impl EmbeddingProvider for HashedEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vector = vec![0.0; BUCKETS + 1];
        for word in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.len() > 1)
        {
            vector[(fnv1a(word) % BUCKETS as u64) as usize] += 1.0;
        }
        vector[BUCKETS] = 0.1;
        Ok(vector)
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    fn dimension(&self) -> usize {
        BUCKETS + 1
    }

    fn model_name(&self) -> &str {
        "hashed-bow"
    }
}

pub fn memory_store() -> Arc<InMemoryVectorStore> {
    let config = VectorIndexConfig {
        dimension: BUCKETS + 1,
        max_elements: 10_000,
        ..Default::default()
    };
    Arc::new(InMemoryVectorStore::new(Arc::new(HashedEmbedder), config).unwrap())
}

/// Scores by how many query words the text contains; `favourite` texts win outright
pub struct OverlapScorer {
    pub favourite: Option<String>,
}

impl RelevanceScorer for OverlapScorer {
    fn score_pairs(&self, query: &str, texts: &[&str]) -> Result<Vec<f32>, RerankError> {
        let words: Vec<String> = query.split_whitespace().map(str::to_lowercase).collect();
        Ok(texts
            .iter()
            .map(|text| {
                if self.favourite.as_deref() == Some(*text) {
                    return 100.0;
                }
                let lowered = text.to_lowercase();
                words.iter().filter(|w| lowered.contains(w.as_str())).count() as f32
            })
            .collect())
    }

    fn model_name(&self) -> &str {
        "overlap"
    }
}

/// Store whose reads always fail
pub struct FailingStore;

#[async_trait]
impl VectorStore for FailingStore {
    async fn upsert(&self, _documents: Vec<Document>) -> Result<usize, VectorStoreError> {
        Err(VectorStoreError::Backend("connection refused".to_string()))
    }

    async fn query(
        &self,
        _text: &str,
        _limit: usize,
        _filter: Option<&MetadataFilter>,
    ) -> Result<Vec<DenseHit>, VectorStoreError> {
        Err(VectorStoreError::Backend("connection refused".to_string()))
    }

    async fn get(&self, _ids: &[String]) -> Result<Vec<Document>, VectorStoreError> {
        Err(VectorStoreError::Backend("connection refused".to_string()))
    }

    async fn delete(&self, _ids: &[String]) -> Result<usize, VectorStoreError> {
        Err(VectorStoreError::Backend("connection refused".to_string()))
    }

    async fn count(&self) -> Result<usize, VectorStoreError> {
        Err(VectorStoreError::Backend("connection refused".to_string()))
    }

    async fn snapshot(&self) -> Result<CorpusSnapshot, VectorStoreError> {
        Err(VectorStoreError::Backend("connection refused".to_string()))
    }
}

/// Wraps a store and stalls every dense query
pub struct SlowStore {
    pub inner: Arc<InMemoryVectorStore>,
    pub delay: Duration,
}

#[async_trait]
impl VectorStore for SlowStore {
    async fn upsert(&self, documents: Vec<Document>) -> Result<usize, VectorStoreError> {
        self.inner.upsert(documents).await
    }

    async fn query(
        &self,
        text: &str,
        limit: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<DenseHit>, VectorStoreError> {
        tokio::time::sleep(self.delay).await;
        self.inner.query(text, limit, filter).await
    }

    async fn get(&self, ids: &[String]) -> Result<Vec<Document>, VectorStoreError> {
        self.inner.get(ids).await
    }

    async fn delete(&self, ids: &[String]) -> Result<usize, VectorStoreError> {
        self.inner.delete(ids).await
    }

    async fn count(&self) -> Result<usize, VectorStoreError> {
        self.inner.count().await
    }

    async fn snapshot(&self) -> Result<CorpusSnapshot, VectorStoreError> {
        self.inner.snapshot().await
    }
}

/// Small multi-market feedback corpus
pub fn feedback_corpus() -> Vec<Document> {
    vec![
        Document::with_id("fb-1", "Battery drains overnight when parked")
            .with_meta("market", "DE")
            .with_meta("label", "BATTERY"),
        Document::with_id("fb-2", "Navigation map is outdated and slow")
            .with_meta("market", "US")
            .with_meta("label", "NAVIGATION"),
        Document::with_id("fb-3", "Charging the battery takes forever at public stations")
            .with_meta("market", "DE")
            .with_meta("label", "CHARGING"),
        Document::with_id("fb-4", "Seat heating switches off randomly")
            .with_meta("market", "US")
            .with_meta("label", "COMFORT"),
        Document::with_id("fb-5", "Voice assistant misunderstands navigation destinations")
            .with_meta("market", "DE")
            .with_meta("label", "NAVIGATION"),
        Document::with_id("fb-6", "Battery range drops sharply in cold weather")
            .with_meta("market", "US")
            .with_meta("label", "BATTERY"),
    ]
}

pub fn ids(candidates: &[feedsearch::Candidate]) -> Vec<&str> {
    candidates.iter().map(|c| c.id.as_str()).collect()
}
