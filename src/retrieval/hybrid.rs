//! Hybrid search combining dense and sparse retrieval

use super::{
    reciprocal_rank_fusion, Candidate, ConfidenceTier, CrossEncoderReranker, FusedEntry,
    FusionConfig, RerankerState, SearchRequest,
};
use crate::analysis::Tokenizer;
use crate::config::{Config, RetrievalConfig};
use crate::dense::{DenseHit, InMemoryVectorStore, VectorIndexConfig, VectorStore, VectorStoreError};
use crate::document::{Document, MetadataFilter};
use crate::embedding::{EmbeddingProvider, FastEmbedProvider};
use crate::error::{FeedsearchError, Result};
use crate::sparse::{Bm25Backend, SparseBackend, SparseCache, SparseHit, SparseIndexStats};
use ahash::AHashMap;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Vector search failed: {0}")]
    VectorSearch(#[from] VectorStoreError),

    #[error("Vector search timed out after {0:?}")]
    Timeout(Duration),
}

/// Per-engine retrieval parameters
#[derive(Debug, Clone)]
pub struct RetrievalSettings {
    pub fusion: FusionConfig,

    /// Each ranking fetches `top_k * overfetch_factor` candidates
    pub overfetch_factor: usize,

    /// Fusion keeps `top_k * candidate_window_factor` candidates for reranking
    pub candidate_window_factor: usize,

    /// Upper bound on one dense query
    pub dense_timeout: Duration,
}

impl RetrievalSettings {
    pub fn from_config(config: &RetrievalConfig) -> Result<Self> {
        let fusion = FusionConfig::new(
            config.rrf_k,
            config.confidence_tiers.clone(),
            config.agreement_boost,
        )
        .map_err(|e| FeedsearchError::InvalidConfigValue {
            path: "retrieval".to_string(),
            message: e.to_string(),
        })?;

        Ok(Self {
            fusion,
            overfetch_factor: config.overfetch_factor,
            candidate_window_factor: config.candidate_window_factor,
            dense_timeout: Duration::from_millis(config.dense_timeout_ms),
        })
    }

    fn fetch_limit(&self, top_k: usize) -> usize {
        top_k.saturating_mul(self.overfetch_factor.max(1))
    }

    fn candidate_window(&self, top_k: usize) -> usize {
        top_k.saturating_mul(self.candidate_window_factor.max(1))
    }
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            fusion: FusionConfig::default(),
            overfetch_factor: 3,
            candidate_window_factor: 2,
            dense_timeout: Duration::from_secs(10),
        }
    }
}

/// Engine diagnostics
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    pub documents: usize,
    pub sparse: SparseIndexStats,
    /// `None` when no reranker is configured
    pub reranker: Option<RerankerState>,
    pub stemming: bool,
    pub confidence_tiers: Vec<ConfidenceTier>,
}

/// Assembles a [`HybridEngine`] around a vector store
pub struct EngineBuilder {
    store: Arc<dyn VectorStore>,
    tokenizer: Tokenizer,
    sparse_backend: Option<Arc<dyn SparseBackend>>,
    sparse_enabled: bool,
    reranker: Option<CrossEncoderReranker>,
    settings: RetrievalSettings,
}

impl EngineBuilder {
    pub fn tokenizer(mut self, tokenizer: Tokenizer) -> Self {
        self.tokenizer = tokenizer;
        self
    }

    /// Replace the default BM25 backend
    pub fn sparse_backend(mut self, backend: Arc<dyn SparseBackend>) -> Self {
        self.sparse_backend = Some(backend);
        self.sparse_enabled = true;
        self
    }

    /// Dense-only engine
    pub fn without_sparse(mut self) -> Self {
        self.sparse_enabled = false;
        self
    }

    pub fn reranker(mut self, reranker: CrossEncoderReranker) -> Self {
        self.reranker = Some(reranker);
        self
    }

    pub fn settings(mut self, settings: RetrievalSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn build(self) -> HybridEngine {
        let sparse = if self.sparse_enabled {
            let backend = self
                .sparse_backend
                .unwrap_or_else(|| Arc::new(Bm25Backend::new(self.tokenizer.clone())));
            SparseCache::new(backend)
        } else {
            SparseCache::disabled()
        };

        HybridEngine {
            store: self.store,
            tokenizer: self.tokenizer,
            sparse,
            reranker: self.reranker,
            settings: self.settings,
        }
    }
}

/// Hybrid retrieval engine over one document corpus
///
/// Searches never fail: backend errors are logged and yield an empty list,
/// and a missing sparse backend or reranker degrades to the remaining
/// signals.
pub struct HybridEngine {
    store: Arc<dyn VectorStore>,
    tokenizer: Tokenizer,
    sparse: SparseCache,
    reranker: Option<CrossEncoderReranker>,
    settings: RetrievalSettings,
}

impl HybridEngine {
    pub fn builder(store: Arc<dyn VectorStore>) -> EngineBuilder {
        EngineBuilder {
            store,
            tokenizer: Tokenizer::default(),
            sparse_backend: None,
            sparse_enabled: true,
            reranker: None,
            settings: RetrievalSettings::default(),
        }
    }

    /// Engine with a FastEmbed-backed in-memory store, wired from config
    ///
    /// Loads the embedding model; the reranker model loads on first search.
    pub fn from_config(config: &Config) -> Result<Self> {
        let provider =
            FastEmbedProvider::new(&config.embedding.model, config.embedding.batch_size)?;

        let index_config = VectorIndexConfig {
            dimension: provider.dimension(),
            hnsw_m: config.index.hnsw_m,
            ef_construction: config.index.hnsw_ef_construction,
            ef_search: config.index.hnsw_ef_search,
            max_elements: config.index.max_elements,
        };
        let store = InMemoryVectorStore::new(Arc::new(provider), index_config)?;

        let mut builder = Self::builder(Arc::new(store))
            .tokenizer(Tokenizer::new(config.sparse.stemming))
            .settings(RetrievalSettings::from_config(&config.retrieval)?);

        if !config.sparse.enabled {
            builder = builder.without_sparse();
        }
        if config.reranker.enabled {
            builder = builder.reranker(CrossEncoderReranker::fastembed(
                config.reranker.model.clone(),
                config.reranker.batch_size,
            ));
        }

        Ok(builder.build())
    }

    /// Add or overwrite documents; marks the sparse index stale
    pub async fn add_documents(&self, documents: Vec<Document>) -> Result<usize> {
        if documents.is_empty() {
            return Ok(0);
        }

        let written = self.store.upsert(documents).await;
        // A failed batch may still have partially landed
        self.sparse.invalidate();

        let written = written?;
        info!("Added {} documents", written);
        Ok(written)
    }

    /// Remove documents by id; marks the sparse index stale
    pub async fn delete(&self, ids: &[String]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        let removed = self.store.delete(ids).await;
        self.sparse.invalidate();

        let removed = removed?;
        info!("Deleted {} documents", removed);
        Ok(removed)
    }

    pub async fn count(&self) -> Result<usize> {
        Ok(self.store.count().await?)
    }

    /// Ranked candidates for `request`; empty on any backend failure
    pub async fn search(&self, request: &SearchRequest) -> Vec<Candidate> {
        match self.try_search(request).await {
            Ok(results) => results,
            Err(e) => {
                warn!("Search failed, returning no results: {}", e);
                Vec::new()
            }
        }
    }

    /// Like [`search`](Self::search) but reports dense backend failures
    pub async fn try_search(
        &self,
        request: &SearchRequest,
    ) -> std::result::Result<Vec<Candidate>, SearchError> {
        let top_k = request.top_k;
        if top_k == 0 {
            debug!("top_k = 0, nothing to search");
            return Ok(Vec::new());
        }

        let filter = request.active_filter();
        let fetch_limit = self.settings.fetch_limit(top_k);
        let use_sparse = request.use_hybrid && self.sparse.is_enabled();

        let (dense, (sparse_hits, prefetched)) = tokio::join!(
            self.dense_ranking(&request.query, fetch_limit, filter),
            self.sparse_ranking(&request.query, fetch_limit, filter, use_sparse)
        );
        let dense_hits = dense?;

        let dense_pairs: Vec<(String, f32)> = dense_hits
            .iter()
            .map(|hit| (hit.id().to_string(), hit.distance))
            .collect();
        let sparse_pairs: Vec<(String, f32)> = sparse_hits
            .into_iter()
            .map(|hit| (hit.id, hit.score))
            .collect();

        let mut fused = reciprocal_rank_fusion(&dense_pairs, &sparse_pairs, &self.settings.fusion);
        fused.truncate(self.settings.candidate_window(top_k));

        let mut candidates = self.hydrate(fused, dense_hits, prefetched, filter).await;
        debug!(
            "Fused {} dense + {} sparse into {} candidates",
            dense_pairs.len(),
            sparse_pairs.len(),
            candidates.len()
        );

        match (&self.reranker, request.use_reranking) {
            (Some(reranker), true) => Ok(reranker.rerank(&request.query, candidates, top_k).await),
            _ => {
                candidates.truncate(top_k);
                Ok(candidates)
            }
        }
    }

    /// Dense neighbours of an existing document, excluding itself
    pub async fn similar(&self, doc_id: &str, top_k: usize) -> Result<Vec<Candidate>> {
        let documents = self.store.get(&[doc_id.to_string()]).await?;
        let source = documents
            .into_iter()
            .next()
            .ok_or_else(|| FeedsearchError::DocumentNotFound {
                id: doc_id.to_string(),
            })?;

        if top_k == 0 {
            return Ok(Vec::new());
        }

        let hits = self
            .with_timeout(self.store.query(&source.text, top_k + 1, None))
            .await?;

        let hits: Vec<DenseHit> = hits
            .into_iter()
            .filter(|hit| hit.id() != doc_id)
            .take(top_k)
            .collect();

        let pairs: Vec<(String, f32)> = hits
            .iter()
            .map(|hit| (hit.id().to_string(), hit.distance))
            .collect();
        let fused = reciprocal_rank_fusion(&pairs, &[], &self.settings.fusion);

        Ok(self.hydrate(fused, hits, AHashMap::new(), None).await)
    }

    pub async fn stats(&self) -> EngineStats {
        let documents = match self.store.count().await {
            Ok(count) => count,
            Err(e) => {
                warn!("Document count unavailable: {}", e);
                0
            }
        };

        EngineStats {
            documents,
            sparse: self.sparse.stats(),
            reranker: self.reranker.as_ref().map(CrossEncoderReranker::state),
            stemming: self.tokenizer.is_stemming(),
            confidence_tiers: self.settings.fusion.confidence_tiers().to_vec(),
        }
    }

    /// Rebuild the sparse index now if the corpus changed since the last build
    pub async fn refresh_sparse_index(&self) {
        if self.sparse.fresh_index(self.store.as_ref()).await.is_none() && self.sparse.is_enabled()
        {
            warn!("Sparse index unavailable, searches will be dense-only");
        }
    }

    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    async fn with_timeout<F>(&self, query: F) -> std::result::Result<Vec<DenseHit>, SearchError>
    where
        F: std::future::Future<Output = std::result::Result<Vec<DenseHit>, VectorStoreError>>,
    {
        match tokio::time::timeout(self.settings.dense_timeout, query).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(SearchError::Timeout(self.settings.dense_timeout)),
        }
    }

    async fn dense_ranking(
        &self,
        query: &str,
        limit: usize,
        filter: Option<&MetadataFilter>,
    ) -> std::result::Result<Vec<DenseHit>, SearchError> {
        self.with_timeout(self.store.query(query, limit, filter)).await
    }

    /// Sparse hits for `query`, with documents fetched while filtering
    ///
    /// With a filter, every matching document is ranked and the filter is
    /// applied before truncation, so ranks count only eligible documents.
    async fn sparse_ranking(
        &self,
        query: &str,
        limit: usize,
        filter: Option<&MetadataFilter>,
        enabled: bool,
    ) -> (Vec<SparseHit>, AHashMap<String, Document>) {
        if !enabled {
            return (Vec::new(), AHashMap::new());
        }

        let tokens = self.tokenizer.tokenize(query);
        if tokens.is_empty() {
            return (Vec::new(), AHashMap::new());
        }

        let Some(index) = self.sparse.fresh_index(self.store.as_ref()).await else {
            return (Vec::new(), AHashMap::new());
        };

        let Some(filter) = filter else {
            return (index.rank(&tokens, limit), AHashMap::new());
        };

        let matched = index.rank(&tokens, index.len());
        let ids: Vec<String> = matched.iter().map(|hit| hit.id.clone()).collect();
        let documents = match self.store.get(&ids).await {
            Ok(documents) => documents,
            Err(e) => {
                warn!("Sparse results dropped, documents unavailable: {}", e);
                return (Vec::new(), AHashMap::new());
            }
        };

        let eligible: AHashMap<String, Document> = documents
            .into_iter()
            .filter(|doc| filter.matches(&doc.metadata))
            .map(|doc| (doc.id.clone(), doc))
            .collect();

        let hits = matched
            .into_iter()
            .filter(|hit| eligible.contains_key(&hit.id))
            .take(limit)
            .collect();

        (hits, eligible)
    }

    /// Turn fused entries into candidates, fetching sparse-only documents
    async fn hydrate(
        &self,
        fused: Vec<FusedEntry>,
        dense_hits: Vec<DenseHit>,
        mut documents: AHashMap<String, Document>,
        filter: Option<&MetadataFilter>,
    ) -> Vec<Candidate> {
        let mut dense_docs: AHashMap<String, Document> = dense_hits
            .into_iter()
            .map(|hit| (hit.document.id.clone(), hit.document))
            .collect();

        let missing: Vec<String> = fused
            .iter()
            .map(|f| &f.entry.doc_id)
            .filter(|id| !dense_docs.contains_key(*id) && !documents.contains_key(*id))
            .cloned()
            .collect();

        if !missing.is_empty() {
            match self.store.get(&missing).await {
                Ok(fetched) => {
                    documents.extend(fetched.into_iter().map(|doc| (doc.id.clone(), doc)));
                }
                Err(e) => warn!("Sparse-only candidates dropped, fetch failed: {}", e),
            }
        }

        fused
            .into_iter()
            .filter_map(|fused| {
                let method = fused.entry.retrieval_method();
                let id = &fused.entry.doc_id;

                let document = match dense_docs.remove(id) {
                    Some(document) => document,
                    None => {
                        let document = documents.remove(id)?;
                        // Dense hits were filtered by the store
                        if filter.map(|f| !f.matches(&document.metadata)).unwrap_or(false) {
                            return None;
                        }
                        document
                    }
                };

                Some(Candidate::from_document(
                    document,
                    fused.score,
                    method,
                    fused.entry.dense_distance,
                ))
            })
            .collect()
    }
}
