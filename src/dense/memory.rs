//! In-process vector store: HNSW graph over embeddings plus the documents themselves
use super::{DenseHit, VectorStore, VectorStoreError};
use crate::document::{CorpusSnapshot, Document, MetadataFilter};
use crate::embedding::EmbeddingProvider;
use ahash::AHashMap;
use async_trait::async_trait;
use hnsw_rs::prelude::*;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

const MAX_LAYER: usize = 16;

/// HNSW parameters for [`InMemoryVectorStore`]
#[derive(Debug, Clone)]
pub struct VectorIndexConfig {
    /// Vector dimension (must match the embedding provider)
    pub dimension: usize,
    /// Connections per layer
    pub hnsw_m: usize,
    /// Construction beam width (higher = better recall, slower build)
    pub ef_construction: usize,
    /// Search beam width (higher = better recall, slower search)
    pub ef_search: usize,
    /// Capacity hint used to size the graph's layers
    pub max_elements: usize,
}

impl Default for VectorIndexConfig {
    fn default() -> Self {
        Self {
            dimension: 384,
            hnsw_m: 16,
            ef_construction: 200,
            ef_search: 64,
            max_elements: 100_000,
        }
    }
}

struct StoredDocument {
    document: Document,
    vector: Vec<f32>,
    slot: usize,
}

/// Graph state guarded by one lock so every batch lands atomically
struct IndexState {
    documents: AHashMap<String, StoredDocument>,
    /// Graph slot -> document id; `None` marks a tombstone left by delete/overwrite
    slots: Vec<Option<String>>,
    tombstones: usize,
    graph: Hnsw<'static, f32, DistCosine>,
}

impl IndexState {
    fn new(config: &VectorIndexConfig) -> Self {
        Self {
            documents: AHashMap::new(),
            slots: Vec::new(),
            tombstones: 0,
            graph: new_graph(config),
        }
    }

    fn tombstone(&mut self, id: &str) -> bool {
        match self.documents.remove(id) {
            Some(stored) => {
                self.slots[stored.slot] = None;
                self.tombstones += 1;
                true
            }
            None => false,
        }
    }

    fn insert(&mut self, document: Document, vector: Vec<f32>) {
        self.tombstone(&document.id);

        let slot = self.slots.len();
        self.graph.insert((vector.as_slice(), slot));
        self.slots.push(Some(document.id.clone()));
        self.documents.insert(
            document.id.clone(),
            StoredDocument {
                document,
                vector,
                slot,
            },
        );
    }

    /// Rebuild the graph without tombstones once they outnumber live documents
    fn maybe_compact(&mut self, config: &VectorIndexConfig) {
        if self.tombstones == 0 || self.tombstones <= self.documents.len() {
            return;
        }

        info!(
            "Compacting vector index: {} live, {} tombstones",
            self.documents.len(),
            self.tombstones
        );

        let live: Vec<String> = self.slots.iter().flatten().cloned().collect();
        let graph = new_graph(config);
        let mut slots = Vec::with_capacity(live.len());

        for (slot, id) in live.into_iter().enumerate() {
            if let Some(stored) = self.documents.get_mut(&id) {
                graph.insert((stored.vector.as_slice(), slot));
                stored.slot = slot;
                slots.push(Some(id));
            }
        }

        self.graph = graph;
        self.slots = slots;
        self.tombstones = 0;
    }

    fn live_in_slot_order(&self) -> impl Iterator<Item = &StoredDocument> {
        self.slots
            .iter()
            .flatten()
            .filter_map(|id| self.documents.get(id))
    }

    fn graph_search(&self, query: &[f32], limit: usize, ef_search: usize) -> Vec<DenseHit> {
        if self.documents.is_empty() {
            return Vec::new();
        }

        // Tombstoned slots still occupy neighbour positions
        let knbn = (limit + self.tombstones).min(self.slots.len());
        let ef = ef_search.max(knbn);

        self.graph
            .search(query, knbn, ef)
            .into_iter()
            .filter_map(|neighbour| {
                let id = self.slots.get(neighbour.d_id)?.as_ref()?;
                let stored = self.documents.get(id)?;
                Some(DenseHit {
                    document: stored.document.clone(),
                    distance: sanitize_distance(neighbour.distance),
                })
            })
            .take(limit)
            .collect()
    }

    fn filtered_scan(&self, query: &[f32], limit: usize, filter: &MetadataFilter) -> Vec<DenseHit> {
        let mut hits: Vec<DenseHit> = self
            .live_in_slot_order()
            .filter(|stored| filter.matches(&stored.document.metadata))
            .map(|stored| DenseHit {
                document: stored.document.clone(),
                distance: cosine_distance(query, &stored.vector),
            })
            .collect();

        // Stable sort keeps slot order among equal distances
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits.truncate(limit);
        hits
    }
}

fn new_graph(config: &VectorIndexConfig) -> Hnsw<'static, f32, DistCosine> {
    Hnsw::<f32, DistCosine>::new(
        config.hnsw_m,
        config.max_elements,
        MAX_LAYER,
        config.ef_construction,
        DistCosine,
    )
}

fn sanitize_distance(distance: f32) -> f32 {
    if distance.is_finite() {
        distance
    } else {
        1.0
    }
}

fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    sanitize_distance(1.0 - dot / (norm_a * norm_b))
}

/// Vector store that keeps documents, embeddings and an HNSW graph in memory
///
/// Unfiltered queries walk the graph; filtered queries scan the matching live
/// documents exactly so a selective filter never starves the result list.
pub struct InMemoryVectorStore {
    provider: Arc<dyn EmbeddingProvider>,
    config: VectorIndexConfig,
    state: RwLock<IndexState>,
}

impl InMemoryVectorStore {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        config: VectorIndexConfig,
    ) -> Result<Self, VectorStoreError> {
        if provider.dimension() != config.dimension {
            return Err(VectorStoreError::InvalidDimension {
                expected: config.dimension,
                actual: provider.dimension(),
            });
        }

        info!(
            "Creating in-memory vector store ({}D, model {})",
            config.dimension,
            provider.model_name()
        );

        Ok(Self {
            state: RwLock::new(IndexState::new(&config)),
            provider,
            config,
        })
    }

    pub fn dimension(&self) -> usize {
        self.config.dimension
    }

    fn read(&self) -> RwLockReadGuard<'_, IndexState> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, IndexState> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, VectorStoreError> {
        let provider = Arc::clone(&self.provider);
        let vectors = tokio::task::spawn_blocking(move || provider.embed_batch(&texts))
            .await
            .map_err(|e| VectorStoreError::Task(e.to_string()))??;

        if let Some(bad) = vectors.iter().find(|v| v.len() != self.config.dimension) {
            return Err(VectorStoreError::InvalidDimension {
                expected: self.config.dimension,
                actual: bad.len(),
            });
        }

        Ok(vectors)
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert(&self, documents: Vec<Document>) -> Result<usize, VectorStoreError> {
        if documents.is_empty() {
            return Ok(0);
        }

        let texts = documents.iter().map(|d| d.text.clone()).collect();
        let vectors = self.embed(texts).await?;
        let written = documents.len();

        let mut state = self.write();
        for (document, vector) in documents.into_iter().zip(vectors) {
            state.insert(document, vector);
        }
        state.maybe_compact(&self.config);

        debug!("Upserted {} documents ({} live)", written, state.documents.len());
        Ok(written)
    }

    async fn query(
        &self,
        text: &str,
        limit: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<DenseHit>, VectorStoreError> {
        if limit == 0 || self.read().documents.is_empty() {
            return Ok(Vec::new());
        }

        let query = self
            .embed(vec![text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| VectorStoreError::Backend("No query embedding produced".to_string()))?;

        let state = self.read();
        let hits = match filter {
            Some(filter) if !filter.is_empty() => state.filtered_scan(&query, limit, filter),
            _ => state.graph_search(&query, limit, self.config.ef_search),
        };

        Ok(hits)
    }

    async fn get(&self, ids: &[String]) -> Result<Vec<Document>, VectorStoreError> {
        let state = self.read();
        Ok(ids
            .iter()
            .filter_map(|id| state.documents.get(id))
            .map(|stored| stored.document.clone())
            .collect())
    }

    async fn delete(&self, ids: &[String]) -> Result<usize, VectorStoreError> {
        let mut state = self.write();
        let removed = ids.iter().filter(|id| state.tombstone(id)).count();
        state.maybe_compact(&self.config);
        Ok(removed)
    }

    async fn count(&self) -> Result<usize, VectorStoreError> {
        Ok(self.read().documents.len())
    }

    async fn snapshot(&self) -> Result<CorpusSnapshot, VectorStoreError> {
        let state = self.read();
        Ok(CorpusSnapshot::new(
            state
                .live_in_slot_order()
                .map(|stored| (stored.document.id.clone(), stored.document.text.clone()))
                .collect(),
        ))
    }
}
