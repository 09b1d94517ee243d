// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Hybrid retriever blending vector similarity, importance, and recency.
//!
//! Over-fetches candidates from the store, re-ranks with the hybrid
//! score, then greedily selects a diverse top-k by penalizing candidates
//! similar to already-admitted fragments.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use mnemo_core::types::Scope;
use mnemo_core::MnemoError;

use crate::store::MemoryStore;
use crate::types::{cosine_similarity01, MemoryFragment, QueryFilters, ScoredFragment};

/// Candidate pool multiplier so re-ranking has headroom over the raw
/// similarity order.
const OVERFETCH_FACTOR: usize = 3;

/// Age in days under which recency decay does not apply.
const RECENCY_GRACE_DAYS: i64 = 7;

/// Per-day decay factor beyond the grace period.
const RECENCY_DECAY: f32 = 0.95;

/// Floor for the recency factor.
const RECENCY_FLOOR: f32 = 0.01;

/// Retrieval parameters. A value, not a mutable singleton: the process
/// default lives in configuration and per-call overrides are passed in.
#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub min_importance: i32,
    pub score_threshold: Option<f32>,
    pub boost_recent: bool,
    pub boost_importance: bool,
    pub diversity_penalty: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            min_importance: 5,
            score_threshold: None,
            boost_recent: true,
            boost_importance: true,
            diversity_penalty: 0.1,
        }
    }
}

/// Hybrid retriever over a scope-partitioned fragment store.
pub struct HybridRetriever {
    store: Arc<MemoryStore>,
}

impl HybridRetriever {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }

    /// Select at most `config.top_k` fragments for the query.
    ///
    /// Results never fall below `config.min_importance` and contain no
    /// duplicates; order is selection order (best first).
    pub async fn select(
        &self,
        scope: &Scope,
        query: &str,
        config: &RetrievalConfig,
    ) -> Result<Vec<ScoredFragment>, MnemoError> {
        if config.top_k == 0 {
            return Ok(vec![]);
        }

        let filters = QueryFilters {
            min_importance: Some(config.min_importance),
            speaker: None,
            kind: None,
        };
        let candidates = self
            .store
            .query(scope, query, config.top_k * OVERFETCH_FACTOR, &filters)
            .await?;

        let now = Utc::now();
        let mut ranked: Vec<(MemoryFragment, f32)> = candidates
            .into_iter()
            .map(|(fragment, similarity)| {
                let score = hybrid_score(similarity, &fragment, now, config);
                (fragment, score)
            })
            .collect();

        if let Some(threshold) = config.score_threshold {
            ranked.retain(|(_, score)| *score >= threshold);
        }

        Ok(select_diverse(ranked, config.top_k, config.diversity_penalty))
    }
}

/// Compute the hybrid score for one candidate.
///
/// `base = boost_importance ? 0.7·sim + 0.3·importance/10 : sim`, then
/// multiplied by the recency factor when `boost_recent` is set.
pub fn hybrid_score(
    similarity: f32,
    fragment: &MemoryFragment,
    now: DateTime<Utc>,
    config: &RetrievalConfig,
) -> f32 {
    let importance_weight = fragment.importance_score as f32 / 10.0;
    let base = if config.boost_importance {
        0.7 * similarity + 0.3 * importance_weight
    } else {
        similarity
    };

    if config.boost_recent {
        base * recency_factor(fragment.timestamp, now)
    } else {
        base
    }
}

/// Recency factor: 1.0 within the grace period, then exponential decay
/// per day, floored.
pub fn recency_factor(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> f32 {
    let age_days = (now - timestamp).num_days();
    if age_days <= RECENCY_GRACE_DAYS {
        1.0
    } else {
        RECENCY_DECAY
            .powi((age_days - RECENCY_GRACE_DAYS) as i32)
            .max(RECENCY_FLOOR)
    }
}

/// Greedy diverse selection.
///
/// Iterates by penalized score: each remaining candidate's score is
/// reduced by `penalty · max_sim` against the already-admitted set, and
/// the current best is admitted until `top_k` fragments are selected.
pub fn select_diverse(
    mut ranked: Vec<(MemoryFragment, f32)>,
    top_k: usize,
    penalty: f32,
) -> Vec<ScoredFragment> {
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let mut selected: Vec<ScoredFragment> = Vec::with_capacity(top_k.min(ranked.len()));
    while selected.len() < top_k && !ranked.is_empty() {
        let mut best_index = 0;
        let mut best_score = f32::NEG_INFINITY;
        for (i, (fragment, score)) in ranked.iter().enumerate() {
            let max_sim = selected
                .iter()
                .map(|s| cosine_similarity01(&s.fragment.embedding, &fragment.embedding))
                .fold(0.0f32, f32::max);
            let penalized = score - penalty * max_sim;
            if penalized > best_score {
                best_score = penalized;
                best_index = i;
            }
        }
        let (fragment, score) = ranked.remove(best_index);
        selected.push(ScoredFragment { fragment, score });
    }
    selected
}
