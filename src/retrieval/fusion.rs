//! Reciprocal Rank Fusion with confidence boosting

use super::RetrievalMethod;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FusionError {
    #[error("Invalid RRF constant: {0} (must be finite and >= 0)")]
    InvalidRrfK(f32),

    #[error("Invalid boost {0}: boosts must be positive")]
    InvalidBoost(f32),

    #[error("Invalid confidence tier threshold: {0}")]
    InvalidThreshold(f32),

    #[error("Tier below {max_distance} boosts by {boost}, more than a closer tier")]
    IncreasingBoost { max_distance: f32, boost: f32 },
}

/// Multiplier applied when the dense distance is strictly below `max_distance`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceTier {
    pub max_distance: f32,
    pub boost: f32,
}

impl ConfidenceTier {
    pub fn new(max_distance: f32, boost: f32) -> Self {
        Self {
            max_distance,
            boost,
        }
    }
}

/// Configuration for fusion algorithm
#[derive(Debug, Clone)]
pub struct FusionConfig {
    /// RRF K constant (typically 60)
    pub rrf_k: f32,

    /// Tiers sorted by ascending threshold; the first match wins
    confidence_tiers: Vec<ConfidenceTier>,

    /// Multiplier for documents present in both rankings
    pub agreement_boost: f32,
}

impl FusionConfig {
    pub fn new(
        rrf_k: f32,
        mut confidence_tiers: Vec<ConfidenceTier>,
        agreement_boost: f32,
    ) -> Result<Self, FusionError> {
        if !rrf_k.is_finite() || rrf_k < 0.0 {
            return Err(FusionError::InvalidRrfK(rrf_k));
        }
        if !agreement_boost.is_finite() || agreement_boost <= 0.0 {
            return Err(FusionError::InvalidBoost(agreement_boost));
        }
        for tier in &confidence_tiers {
            if !tier.max_distance.is_finite() {
                return Err(FusionError::InvalidThreshold(tier.max_distance));
            }
            if !tier.boost.is_finite() || tier.boost <= 0.0 {
                return Err(FusionError::InvalidBoost(tier.boost));
            }
        }

        confidence_tiers.sort_by(|a, b| a.max_distance.total_cmp(&b.max_distance));

        // Closer matches must never get a weaker boost than farther ones
        if let Some(pair) = confidence_tiers
            .windows(2)
            .find(|pair| pair[1].boost > pair[0].boost)
        {
            return Err(FusionError::IncreasingBoost {
                max_distance: pair[1].max_distance,
                boost: pair[1].boost,
            });
        }

        Ok(Self {
            rrf_k,
            confidence_tiers,
            agreement_boost,
        })
    }

    pub fn confidence_tiers(&self) -> &[ConfidenceTier] {
        &self.confidence_tiers
    }

    /// Boost of the tightest tier containing `distance`, 1.0 when none does
    pub fn confidence_boost(&self, distance: f32) -> f32 {
        self.confidence_tiers
            .iter()
            .find(|tier| distance < tier.max_distance)
            .map(|tier| tier.boost)
            .unwrap_or(1.0)
    }

    /// RRF contribution of a 1-based rank
    fn rank_score(&self, rank: usize) -> f32 {
        1.0 / (self.rrf_k + rank as f32)
    }
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            rrf_k: 60.0,
            confidence_tiers: vec![ConfidenceTier::new(0.3, 1.2), ConfidenceTier::new(0.5, 1.1)],
            agreement_boost: 1.1,
        }
    }
}

/// Per-document fusion record
#[derive(Debug, Clone, PartialEq)]
pub struct RankingEntry {
    pub doc_id: String,
    /// 1-based position in the dense ranking
    pub dense_rank: Option<usize>,
    pub dense_distance: Option<f32>,
    /// 1-based position in the sparse ranking
    pub sparse_rank: Option<usize>,
    pub sparse_score: Option<f32>,
}

impl RankingEntry {
    fn new(doc_id: &str) -> Self {
        Self {
            doc_id: doc_id.to_string(),
            dense_rank: None,
            dense_distance: None,
            sparse_rank: None,
            sparse_score: None,
        }
    }

    pub fn retrieval_method(&self) -> RetrievalMethod {
        match (self.dense_rank.is_some(), self.sparse_rank.is_some()) {
            (true, true) => RetrievalMethod::Hybrid,
            (false, true) => RetrievalMethod::Sparse,
            _ => RetrievalMethod::Dense,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FusedEntry {
    pub entry: RankingEntry,
    pub score: f32,
}

fn rank_order(a: Option<usize>, b: Option<usize>) -> Ordering {
    a.unwrap_or(usize::MAX).cmp(&b.unwrap_or(usize::MAX))
}

/// Fuse a dense and a sparse ranking into one list
///
/// RRF formula: score(id) = sum over rankings containing id of 1 / (k + rank),
/// then multiplied by the confidence boost of its dense distance and by the
/// agreement boost when both rankings contain it.
///
/// # Arguments
/// * `dense` - (id, cosine distance) pairs, best first
/// * `sparse` - (id, keyword score) pairs, best first
/// * `config` - Fusion configuration
///
/// # Returns
/// One entry per distinct id, sorted by fused score descending. Ties go to the
/// earlier dense rank, then the earlier sparse rank, then first appearance.
pub fn reciprocal_rank_fusion(
    dense: &[(String, f32)],
    sparse: &[(String, f32)],
    config: &FusionConfig,
) -> Vec<FusedEntry> {
    let mut entries: Vec<RankingEntry> = Vec::with_capacity(dense.len() + sparse.len());
    let mut positions: HashMap<&str, usize> = HashMap::new();

    for (rank, (doc_id, distance)) in dense.iter().enumerate() {
        let slot = *positions.entry(doc_id.as_str()).or_insert_with(|| {
            entries.push(RankingEntry::new(doc_id));
            entries.len() - 1
        });
        let entry = &mut entries[slot];
        // Repeated ids keep their best position
        if entry.dense_rank.is_none() {
            entry.dense_rank = Some(rank + 1);
            entry.dense_distance = Some(*distance);
        }
    }

    for (rank, (doc_id, score)) in sparse.iter().enumerate() {
        let slot = *positions.entry(doc_id.as_str()).or_insert_with(|| {
            entries.push(RankingEntry::new(doc_id));
            entries.len() - 1
        });
        let entry = &mut entries[slot];
        if entry.sparse_rank.is_none() {
            entry.sparse_rank = Some(rank + 1);
            entry.sparse_score = Some(*score);
        }
    }

    let mut fused: Vec<FusedEntry> = entries
        .into_iter()
        .map(|entry| {
            let mut score = 0.0;
            if let Some(rank) = entry.dense_rank {
                score += config.rank_score(rank);
            }
            if let Some(rank) = entry.sparse_rank {
                score += config.rank_score(rank);
            }
            if let Some(distance) = entry.dense_distance {
                score *= config.confidence_boost(distance);
            }
            if entry.dense_rank.is_some() && entry.sparse_rank.is_some() {
                score *= config.agreement_boost;
            }
            FusedEntry { entry, score }
        })
        .collect();

    // Stable sort keeps first-seen order for full ties
    fused.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| rank_order(a.entry.dense_rank, b.entry.dense_rank))
            .then_with(|| rank_order(a.entry.sparse_rank, b.entry.sparse_rank))
    });

    fused
}
