//! # Similarity Scorer
//!
//! Computes a weighted multi-field match probability between two contact
//! records. Each field contributes an independently-weighted sub-score;
//! absence of a field on either side contributes exactly zero. Absence is
//! non-evidence: sparse records score low instead of having their similarity
//! inflated.

use crate::blocking::BlockingIndex;
use crate::config::MatchTuning;
use crate::merge;
use crate::model::{normalize_name, ContactRecord};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use strsim::jaro_winkler;

/// Per-field match evidence surfaced alongside the aggregate score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldEvidence {
    /// Jaro-Winkler similarity of the normalized full names, 0.0 when
    /// either side has no name
    pub name_similarity: f64,
    /// Any exact normalized email address shared
    pub email_match: bool,
    /// Any digit-only normalized phone number shared
    pub phone_match: bool,
    /// Any pair of company names above the similarity gate
    pub company_match: bool,
}

/// Confidence band a score falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchBand {
    /// Safe to merge without review
    HighConfidence,
    /// A human decision is required
    ReviewRequired,
    /// Treated as different people
    Distinct,
}

/// A scored candidate pair together with the suggested merged record.
///
/// The merged record is recomputed deterministically from the pair, so the
/// preview shown at review time is identical to what a later enqueue
/// produces.
#[derive(Debug, Clone)]
pub struct ScoredMatch {
    pub a: ContactRecord,
    pub b: ContactRecord,
    pub score: f64,
    pub evidence: FieldEvidence,
    pub merged: ContactRecord,
}

impl ScoredMatch {
    /// The confidence band under the given tuning
    pub fn band(&self, tuning: &MatchTuning) -> MatchBand {
        band_for(self.score, tuning)
    }
}

/// Classify a score into its confidence band.
pub fn band_for(score: f64, tuning: &MatchTuning) -> MatchBand {
    if score >= tuning.high_confidence_threshold {
        MatchBand::HighConfidence
    } else if score >= tuning.review_threshold {
        MatchBand::ReviewRequired
    } else {
        MatchBand::Distinct
    }
}

/// Score a pair of records.
///
/// Symmetric: `score(a, b)` and `score(b, a)` produce the same score and
/// evidence. The suggested merged record keeps `a` as the surviving side.
pub fn score(a: &ContactRecord, b: &ContactRecord, tuning: &MatchTuning) -> ScoredMatch {
    let evidence = FieldEvidence {
        name_similarity: name_similarity(a, b),
        email_match: shares_any(&a.normalized_emails(), &b.normalized_emails()),
        phone_match: shares_any(&a.normalized_phones(), &b.normalized_phones()),
        company_match: company_match(a, b, tuning.company_similarity_gate),
    };

    let mut total = tuning.name_weight * evidence.name_similarity;
    if evidence.email_match {
        total += tuning.email_weight;
    }
    if evidence.phone_match {
        total += tuning.phone_weight;
    }
    if evidence.company_match {
        total += tuning.company_weight;
    }

    ScoredMatch {
        a: a.clone(),
        b: b.clone(),
        score: total,
        evidence,
        merged: merge::plan(a, b),
    }
}

/// Decision for a reviewed match, as returned by the presentation layer or
/// a configured default policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchDecision {
    /// Fold the incoming record into the matched stored record
    Merge,
    /// Ignore the incoming record
    Skip,
    /// Treat the incoming record as a new person
    New,
}

/// Pick the best-scoring candidate for `record`.
///
/// The winning candidate becomes the surviving side `a` of the returned
/// match, with `record` as the absorbed side. Highest score wins;
/// bit-identical scores resolve to the earliest candidate in input order, so
/// re-runs over the same input see the same winner.
pub fn best_match(
    record: &ContactRecord,
    candidates: &[&ContactRecord],
    tuning: &MatchTuning,
) -> Option<ScoredMatch> {
    let mut best: Option<ScoredMatch> = None;
    for candidate in candidates {
        let scored = score(candidate, record, tuning);
        let improves = match &best {
            None => true,
            Some(current) => scored.score > current.score,
        };
        if improves {
            best = Some(scored);
        }
    }
    best
}

/// Full matching pipeline: blocking, pairwise scoring, band filtering.
///
/// Returns every pair at or above the review threshold, highest score first.
/// The sort is stable, so equal scores keep candidate-pair input order.
pub fn scan(records: &[ContactRecord], tuning: &MatchTuning) -> Vec<ScoredMatch> {
    let index = BlockingIndex::build(records);
    let mut matches = Vec::new();

    for candidate in index.candidate_pairs() {
        let Some((a, b)) = index.pair_records(&candidate) else {
            continue;
        };
        let scored = score(a, b, tuning);
        if scored.score >= tuning.review_threshold {
            matches.push(scored);
        }
    }

    matches.sort_by(|left, right| {
        right
            .score
            .partial_cmp(&left.score)
            .unwrap_or(Ordering::Equal)
    });
    matches
}

fn name_similarity(a: &ContactRecord, b: &ContactRecord) -> f64 {
    let name_a = normalize_name(&a.name.full_name());
    let name_b = normalize_name(&b.name.full_name());
    if name_a.is_empty() || name_b.is_empty() {
        return 0.0;
    }
    jaro_winkler(&name_a, &name_b)
}

fn shares_any(left: &[String], right: &[String]) -> bool {
    left.iter().any(|value| right.contains(value))
}

fn company_match(a: &ContactRecord, b: &ContactRecord, gate: f64) -> bool {
    let companies_a = a.normalized_companies();
    let companies_b = b.normalized_companies();
    companies_a.iter().any(|left| {
        companies_b
            .iter()
            .any(|right| jaro_winkler(left, right) > gate)
    })
}
