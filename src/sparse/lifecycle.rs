//! Staleness tracking for the sparse index
//!
//! State machine: Empty → Built → Stale → Built → … Any add or delete moves a
//! built index to Stale by bumping a monotonic generation; the next search that
//! needs sparse scores rebuilds it. The live document count is compared too, so
//! mutations made directly on the vector store are also noticed.

use super::{SparseBackend, SparseIndex, SparseIndexError};
use crate::dense::VectorStore;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

/// Lifecycle state of the cached sparse index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SparseIndexState {
    /// No sparse backend configured; searches are dense-only
    Disabled,
    /// Never built
    Empty,
    /// Matches the last known corpus generation
    Built,
    /// Corpus changed since the last build
    Stale,
}

/// Diagnostics about the cached sparse index
#[derive(Debug, Clone, Serialize)]
pub struct SparseIndexStats {
    pub state: SparseIndexState,
    pub backend: Option<String>,
    pub documents: usize,
    pub generation: u64,
    pub fingerprint: Option<String>,
}

#[derive(Clone)]
struct CachedIndex {
    index: Arc<dyn SparseIndex>,
    generation: u64,
    doc_count: usize,
    fingerprint: String,
}

/// Lazily rebuilt sparse index shared by concurrent searches
///
/// Rebuilds run outside the lock and are idempotent, so two searches racing on
/// a stale index may both rebuild; whichever finishes last wins unless it
/// would replace a newer generation.
pub struct SparseCache {
    backend: Option<Arc<dyn SparseBackend>>,
    generation: AtomicU64,
    cached: RwLock<Option<CachedIndex>>,
}

impl SparseCache {
    pub fn new(backend: Arc<dyn SparseBackend>) -> Self {
        Self {
            backend: Some(backend),
            generation: AtomicU64::new(0),
            cached: RwLock::new(None),
        }
    }

    /// Cache with no backend: never yields an index
    pub fn disabled() -> Self {
        Self {
            backend: None,
            generation: AtomicU64::new(0),
            cached: RwLock::new(None),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    /// Mark the cached index stale
    pub fn invalidate(&self) {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        debug!("Sparse index invalidated (generation {})", generation);
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn state(&self) -> SparseIndexState {
        if self.backend.is_none() {
            return SparseIndexState::Disabled;
        }
        match self.cached_entry() {
            None => SparseIndexState::Empty,
            Some(cached) if cached.generation == self.generation() => SparseIndexState::Built,
            Some(_) => SparseIndexState::Stale,
        }
    }

    pub fn stats(&self) -> SparseIndexStats {
        let cached = self.cached_entry();
        SparseIndexStats {
            state: self.state(),
            backend: self.backend.as_ref().map(|b| b.name().to_string()),
            documents: cached.as_ref().map(|c| c.doc_count).unwrap_or(0),
            generation: self.generation(),
            fingerprint: cached.map(|c| c.fingerprint),
        }
    }

    fn cached_entry(&self) -> Option<CachedIndex> {
        self.cached
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn store(&self, entry: CachedIndex) {
        let mut cached = self
            .cached
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let newer_exists = cached
            .as_ref()
            .map(|current| current.generation > entry.generation)
            .unwrap_or(false);

        if !newer_exists {
            *cached = Some(entry);
        }
    }

    /// Index reflecting the store's current corpus, rebuilding when stale.
    ///
    /// Returns `None` when sparse scoring is unavailable: no backend, the store
    /// could not be read, or the build failed.
    pub async fn fresh_index(&self, store: &dyn VectorStore) -> Option<Arc<dyn SparseIndex>> {
        let backend = Arc::clone(self.backend.as_ref()?);

        // Read the generation before the corpus so a concurrent write can only
        // make the result look staler than it is
        let generation = self.generation();

        let live_count = match store.count().await {
            Ok(count) => count,
            Err(e) => {
                warn!("Sparse index skipped, document count unavailable: {}", e);
                return None;
            }
        };

        let previous = self.cached_entry();
        if let Some(cached) = &previous {
            if cached.generation == generation && cached.doc_count == live_count {
                return Some(Arc::clone(&cached.index));
            }
        }

        let snapshot = match store.snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Sparse index skipped, corpus snapshot unavailable: {}", e);
                return None;
            }
        };

        let doc_count = snapshot.len();
        let built = tokio::task::spawn_blocking(move || {
            let fingerprint = snapshot.fingerprint();
            if let Some(previous) = previous.filter(|p| p.fingerprint == fingerprint) {
                return Ok::<_, SparseIndexError>((previous.index, fingerprint, false));
            }
            let index = backend.build(&snapshot)?;
            Ok((index, fingerprint, true))
        })
        .await
        .map_err(|e| SparseIndexError::Task(e.to_string()))
        .and_then(|result| result);

        match built {
            Ok((index, fingerprint, rebuilt)) => {
                if rebuilt {
                    info!(
                        "Rebuilt sparse index over {} documents (generation {})",
                        doc_count, generation
                    );
                } else {
                    debug!("Corpus content unchanged, reusing sparse index");
                }
                self.store(CachedIndex {
                    index: Arc::clone(&index),
                    generation,
                    doc_count,
                    fingerprint,
                });
                Some(index)
            }
            Err(e) => {
                warn!("Sparse index rebuild failed, continuing dense-only: {}", e);
                None
            }
        }
    }
}
