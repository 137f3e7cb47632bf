//! Cross-encoder reranking using FastEmbed

use super::Candidate;
use fastembed::{RerankInitOptions, RerankerModel, TextRerank};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum RerankError {
    #[error("Reranker initialization failed: {0}")]
    InitializationError(String),

    #[error("Reranking failed: {0}")]
    RerankingError(String),

    #[error("Unsupported reranker model: {0}")]
    UnsupportedModel(String),

    #[error("Scorer returned {actual} scores for {expected} texts")]
    ScoreCountMismatch { expected: usize, actual: usize },
}

/// Scores (query, text) pairs; higher means more relevant
pub trait RelevanceScorer: Send + Sync {
    /// One score per text, aligned with the input order
    fn score_pairs(&self, query: &str, texts: &[&str]) -> Result<Vec<f32>, RerankError>;

    fn model_name(&self) -> &str;
}

pub const DEFAULT_RERANKER_MODEL: &str = "BAAI/bge-reranker-base";

/// Cross-encoder backed by a FastEmbed reranker model
pub struct FastEmbedScorer {
    model: TextRerank,
    model_name: String,
    batch_size: usize,
}

impl FastEmbedScorer {
    /// Load a reranker model (downloads on first use)
    ///
    /// # Arguments
    /// * `model_name` - Model name (e.g., "BAAI/bge-reranker-base")
    /// * `batch_size` - Pairs scored per forward pass
    pub fn new(model_name: &str, batch_size: usize) -> Result<Self, RerankError> {
        info!("Initializing reranker model: {}", model_name);

        let model_type = match model_name {
            "BAAI/bge-reranker-base" => RerankerModel::BGERerankerBase,
            "rozgo/bge-reranker-v2-m3" => RerankerModel::BGERerankerV2M3,
            "jinaai/jina-reranker-v1-turbo-en" => RerankerModel::JINARerankerV1TurboEn,
            _ => return Err(RerankError::UnsupportedModel(model_name.to_string())),
        };

        let init_options = RerankInitOptions::new(model_type).with_show_download_progress(true);

        let model = TextRerank::try_new(init_options)
            .map_err(|e| RerankError::InitializationError(e.to_string()))?;

        Ok(Self {
            model,
            model_name: model_name.to_string(),
            batch_size: batch_size.max(1),
        })
    }

    pub fn with_default_model() -> Result<Self, RerankError> {
        Self::new(DEFAULT_RERANKER_MODEL, 32)
    }
}

impl RelevanceScorer for FastEmbedScorer {
    fn score_pairs(&self, query: &str, texts: &[&str]) -> Result<Vec<f32>, RerankError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let results = self
            .model
            .rerank(query, texts.to_vec(), false, Some(self.batch_size))
            .map_err(|e| RerankError::RerankingError(e.to_string()))?;

        // FastEmbed returns results sorted by score; put them back in input order
        let mut scores = vec![None; texts.len()];
        for result in results {
            if let Some(slot) = scores.get_mut(result.index) {
                *slot = Some(result.score);
            }
        }

        let aligned: Vec<f32> = scores.iter().flatten().copied().collect();
        if aligned.len() != texts.len() {
            return Err(RerankError::ScoreCountMismatch {
                expected: texts.len(),
                actual: aligned.len(),
            });
        }
        Ok(aligned)
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

/// Constructs a scorer; run at most once, on a blocking thread
pub type ScorerLoader = Arc<dyn Fn() -> Result<Arc<dyn RelevanceScorer>, RerankError> + Send + Sync>;

/// Load status of the reranker model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RerankerState {
    /// Not requested yet
    Pending,
    Ready,
    /// Load failed; reranking is a pass-through
    Unavailable,
}

/// Reorders fused candidates by cross-encoder relevance
///
/// The model is loaded on first use. Concurrent first calls share one load;
/// a failed load is remembered and never retried.
pub struct CrossEncoderReranker {
    loader: ScorerLoader,
    scorer: OnceCell<Option<Arc<dyn RelevanceScorer>>>,
}

impl CrossEncoderReranker {
    pub fn new(loader: ScorerLoader) -> Self {
        Self {
            loader,
            scorer: OnceCell::new(),
        }
    }

    /// Reranker backed by a FastEmbed model, loaded lazily
    pub fn fastembed(model_name: impl Into<String>, batch_size: usize) -> Self {
        let model_name = model_name.into();
        Self::new(Arc::new(move || {
            let scorer = FastEmbedScorer::new(&model_name, batch_size)?;
            Ok(Arc::new(scorer) as Arc<dyn RelevanceScorer>)
        }))
    }

    /// Reranker with an already-constructed scorer
    pub fn with_scorer(scorer: Arc<dyn RelevanceScorer>) -> Self {
        let loader_scorer = Arc::clone(&scorer);
        Self {
            loader: Arc::new(move || Ok(Arc::clone(&loader_scorer))),
            scorer: OnceCell::new_with(Some(Some(scorer))),
        }
    }

    pub fn state(&self) -> RerankerState {
        match self.scorer.get() {
            None => RerankerState::Pending,
            Some(Some(_)) => RerankerState::Ready,
            Some(None) => RerankerState::Unavailable,
        }
    }

    async fn scorer(&self) -> Option<Arc<dyn RelevanceScorer>> {
        self.scorer
            .get_or_init(|| async {
                let loader = Arc::clone(&self.loader);
                match tokio::task::spawn_blocking(move || (*loader)()).await {
                    Ok(Ok(scorer)) => {
                        info!("Reranker ready: {}", scorer.model_name());
                        Some(scorer)
                    }
                    Ok(Err(e)) => {
                        warn!("Reranker unavailable, results keep fused order: {}", e);
                        None
                    }
                    Err(e) => {
                        warn!("Reranker load task failed, results keep fused order: {}", e);
                        None
                    }
                }
            })
            .await
            .clone()
    }

    /// Reorder `candidates` by cross-encoder score and keep the best `top_k`
    ///
    /// Falls back to the first `top_k` in fused order when the model is
    /// unavailable or scoring fails.
    pub async fn rerank(
        &self,
        query: &str,
        mut candidates: Vec<Candidate>,
        top_k: usize,
    ) -> Vec<Candidate> {
        if candidates.is_empty() || top_k == 0 {
            candidates.truncate(top_k);
            return candidates;
        }

        let Some(scorer) = self.scorer().await else {
            candidates.truncate(top_k);
            return candidates;
        };

        let query_owned = query.to_string();
        let texts: Vec<String> = candidates.iter().map(|c| c.text.clone()).collect();
        let scored = tokio::task::spawn_blocking(move || {
            let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
            scorer.score_pairs(&query_owned, &refs)
        })
        .await;

        let scores = match scored {
            Ok(Ok(scores)) if scores.len() == candidates.len() => scores,
            Ok(Ok(scores)) => {
                warn!(
                    "Reranking skipped: {}",
                    RerankError::ScoreCountMismatch {
                        expected: candidates.len(),
                        actual: scores.len(),
                    }
                );
                candidates.truncate(top_k);
                return candidates;
            }
            Ok(Err(e)) => {
                warn!("Reranking failed, keeping fused order: {}", e);
                candidates.truncate(top_k);
                return candidates;
            }
            Err(e) => {
                warn!("Reranking task failed, keeping fused order: {}", e);
                candidates.truncate(top_k);
                return candidates;
            }
        };

        for (candidate, score) in candidates.iter_mut().zip(scores) {
            candidate.rerank_score = Some(score);
        }

        // Stable: equal scores keep fused order
        candidates.sort_by(|a, b| {
            let a = a.rerank_score.unwrap_or(f32::NEG_INFINITY);
            let b = b.rerank_score.unwrap_or(f32::NEG_INFINITY);
            b.total_cmp(&a)
        });
        candidates.truncate(top_k);

        debug!("Reranked to {} candidates", candidates.len());
        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use crate::retrieval::RetrievalMethod;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scores by how many query words appear in the text
    struct OverlapScorer;

    impl RelevanceScorer for OverlapScorer {
        fn score_pairs(&self, query: &str, texts: &[&str]) -> Result<Vec<f32>, RerankError> {
            let words: Vec<String> = query.split_whitespace().map(str::to_lowercase).collect();
            Ok(texts
                .iter()
                .map(|text| {
                    let text = text.to_lowercase();
                    words.iter().filter(|w| text.contains(w.as_str())).count() as f32
                })
                .collect())
        }

        fn model_name(&self) -> &str {
            "overlap"
        }
    }

    fn candidates(texts: &[&str]) -> Vec<Candidate> {
        texts
            .iter()
            .enumerate()
            .map(|(i, text)| {
                Candidate::from_document(
                    Document::with_id(i.to_string(), *text),
                    1.0 / (61.0 + i as f32),
                    RetrievalMethod::Dense,
                    Some(0.5),
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn test_rerank_reorders_and_truncates() {
        let reranker = CrossEncoderReranker::with_scorer(Arc::new(OverlapScorer));
        assert_eq!(reranker.state(), RerankerState::Ready);

        let results = reranker
            .rerank(
                "seat heating broken",
                candidates(&["navigation lag", "seat heating is broken", "seat is fine"]),
                2,
            )
            .await;

        let ids: Vec<&str> = results.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);
        assert_eq!(results[0].rerank_score, Some(3.0));
    }

    #[tokio::test]
    async fn test_ties_keep_fused_order() {
        let reranker = CrossEncoderReranker::with_scorer(Arc::new(OverlapScorer));
        let results = reranker
            .rerank("battery", candidates(&["battery a", "battery b", "battery c"]), 3)
            .await;

        let ids: Vec<&str> = results.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["0", "1", "2"]);
    }

    #[tokio::test]
    async fn test_failed_load_passes_through_and_is_not_retried() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        let reranker = CrossEncoderReranker::new(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Err::<Arc<dyn RelevanceScorer>, _>(RerankError::InitializationError(
                "offline".to_string(),
            ))
        }));
        assert_eq!(reranker.state(), RerankerState::Pending);

        let input = candidates(&["a", "b", "c"]);
        let first = reranker.rerank("a", input.clone(), 2).await;
        let second = reranker.rerank("a", input.clone(), 2).await;

        assert_eq!(first, input[..2].to_vec());
        assert_eq!(second, input[..2].to_vec());
        assert!(first.iter().all(|c| c.rerank_score.is_none()));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(reranker.state(), RerankerState::Unavailable);
    }

    #[tokio::test]
    async fn test_scoring_error_keeps_fused_order() {
        struct Broken;
        impl RelevanceScorer for Broken {
            fn score_pairs(&self, _: &str, _: &[&str]) -> Result<Vec<f32>, RerankError> {
                Err(RerankError::RerankingError("boom".to_string()))
            }
            fn model_name(&self) -> &str {
                "broken"
            }
        }

        let reranker = CrossEncoderReranker::with_scorer(Arc::new(Broken));
        let input = candidates(&["x", "y"]);
        let results = reranker.rerank("x", input.clone(), 5).await;
        assert_eq!(results, input);
    }

    #[test]
    fn test_unsupported_model() {
        let result = FastEmbedScorer::new("no/such-reranker", 8);
        assert!(matches!(result, Err(RerankError::UnsupportedModel(_))));
    }

    #[test]
    #[ignore] // Requires model download
    fn test_fastembed_scores_align_with_input() {
        let scorer = FastEmbedScorer::with_default_model().unwrap();
        let scores = scorer
            .score_pairs(
                "battery drains overnight",
                &["The weather is nice today.", "Battery loses charge while parked."],
            )
            .unwrap();

        assert_eq!(scores.len(), 2);
        assert!(scores[1] > scores[0]);
    }
}
