/// Weights and thresholds for the similarity scorer.
///
/// The four field weights sum to 1.0 in every preset, so the weighted sum
/// stays in `[0, 1]` and the band thresholds keep their meaning.
#[derive(Debug, Clone)]
pub struct MatchTuning {
    pub name_weight: f64,
    pub email_weight: f64,
    pub phone_weight: f64,
    pub company_weight: f64,
    /// Jaro-Winkler similarity two company names must exceed before the
    /// company field counts as matched.
    pub company_similarity_gate: f64,
    /// Score at or above which a pair is a high-confidence merge.
    pub high_confidence_threshold: f64,
    /// Score at or above which a pair requires human review.
    pub review_threshold: f64,
}

impl Default for MatchTuning {
    fn default() -> Self {
        Self {
            name_weight: 0.35,
            email_weight: 0.30,
            phone_weight: 0.20,
            company_weight: 0.15,
            company_similarity_gate: 0.8,
            high_confidence_threshold: 0.85,
            review_threshold: 0.70,
        }
    }
}

impl MatchTuning {
    /// Narrower bands: fewer automatic merges, more pairs left distinct
    pub fn strict() -> Self {
        Self {
            high_confidence_threshold: 0.92,
            review_threshold: 0.80,
            ..Default::default()
        }
    }

    /// Wider bands: surfaces more pairs for review
    pub fn lenient() -> Self {
        Self {
            high_confidence_threshold: 0.80,
            review_threshold: 0.60,
            ..Default::default()
        }
    }
}

/// Tuning for the sync executor.
#[derive(Debug, Clone)]
pub struct SyncTuning {
    /// Items applied per batch; cancellation is observed between batches.
    pub batch_size: usize,
    /// Attempt count at which an item is excluded from further runs until an
    /// operator intervenes.
    pub retry_ceiling: u32,
    /// Consecutive failures within one run that trip the circuit breaker.
    pub breaker_threshold: u32,
}

impl Default for SyncTuning {
    fn default() -> Self {
        Self {
            batch_size: 10,
            retry_ceiling: 3,
            breaker_threshold: 5,
        }
    }
}

impl SyncTuning {
    /// Small batches and an early breaker, for flaky remote stores
    pub fn cautious() -> Self {
        Self {
            batch_size: 5,
            retry_ceiling: 2,
            breaker_threshold: 3,
        }
    }

    /// Large batches and a tolerant breaker, for bulk catch-up runs
    pub fn bulk() -> Self {
        Self {
            batch_size: 50,
            retry_ceiling: 5,
            breaker_threshold: 10,
        }
    }
}
