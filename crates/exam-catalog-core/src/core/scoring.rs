// crates/exam-catalog-core/src/core/scoring.rs
// ============================================================================
// Module: Exam Catalog Scoring
// Description: Subject percentage derivation for test types.
// Purpose: Keep each test type's percentages proportional to its scores.
// Dependencies: crate::core::model
// ============================================================================

//! ## Overview
//! A subject's percentage is its share of the test type's total score:
//! `100 * score / sum(scores)`. When the total is zero every percentage is
//! zero. The writer recomputes percentages for every test type it touches,
//! so stored percentages always sum to 100 (within [`PERCENTAGE_TOLERANCE`])
//! whenever the score total is positive.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::core::model::Subject;
use crate::core::model::University;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Absolute tolerance for percentage comparisons.
pub const PERCENTAGE_TOLERANCE: f64 = 0.01;

// ============================================================================
// SECTION: Scoring
// ============================================================================

/// Returns the sum of subject scores.
#[must_use]
pub fn score_total(subjects: &[Subject]) -> f64 {
    subjects.iter().map(|subject| subject.score).sum()
}

/// Returns the percentage a score represents of `total`.
#[must_use]
pub fn share_of(score: f64, total: f64) -> f64 {
    if total > 0.0 { 100.0 * score / total } else { 0.0 }
}

/// Rewrites every subject's percentage from the current scores.
pub fn recompute_percentages(subjects: &mut [Subject]) {
    let total = score_total(subjects);
    for subject in subjects.iter_mut() {
        subject.percentage = share_of(subject.score, total);
    }
}

/// Recomputes percentages for every test type in the aggregate.
pub fn normalize_university(university: &mut University) {
    for test_type in university.test_types_mut() {
        recompute_percentages(&mut test_type.subjects);
    }
}

/// Returns true when the subjects' percentages match their scores.
#[must_use]
pub fn percentages_coherent(subjects: &[Subject]) -> bool {
    let total = score_total(subjects);
    if total <= 0.0 {
        return subjects.iter().all(|subject| subject.percentage.abs() <= PERCENTAGE_TOLERANCE);
    }
    let sum: f64 = subjects.iter().map(|subject| subject.percentage).sum();
    (sum - 100.0).abs() <= PERCENTAGE_TOLERANCE
        && subjects.iter().all(|subject| {
            (subject.percentage - share_of(subject.score, total)).abs() <= PERCENTAGE_TOLERANCE
        })
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn subjects(scores: &[f64]) -> Vec<Subject> {
        scores
            .iter()
            .enumerate()
            .map(|(index, score)| {
                Subject::new(format!("科目{index}"), *score, i32::try_from(index).unwrap_or(0))
            })
            .collect()
    }

    #[test]
    fn equal_scores_split_evenly() {
        let mut items = subjects(&[100.0, 100.0]);
        recompute_percentages(&mut items);
        assert!((items[0].percentage - 50.0).abs() < f64::EPSILON);
        assert!((items[1].percentage - 50.0).abs() < f64::EPSILON);
        assert!(percentages_coherent(&items));
    }

    #[test]
    fn zero_score_among_positive_siblings_is_zero_percent() {
        let mut items = subjects(&[0.0, 200.0]);
        recompute_percentages(&mut items);
        assert!(items[0].percentage.abs() < f64::EPSILON);
        assert!((items[1].percentage - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn all_zero_scores_give_zero_percentages() {
        let mut items = subjects(&[0.0, 0.0, 0.0]);
        items[1].percentage = 40.0;
        assert!(!percentages_coherent(&items));
        recompute_percentages(&mut items);
        assert!(items.iter().all(|subject| subject.percentage.abs() < f64::EPSILON));
        assert!(percentages_coherent(&items));
    }

    proptest! {
        #[test]
        fn recomputed_percentages_sum_to_one_hundred(
            scores in proptest::collection::vec(0.0f64..1_000.0, 1..20)
        ) {
            let mut items = subjects(&scores);
            recompute_percentages(&mut items);
            prop_assert!(percentages_coherent(&items));
            if score_total(&items) > 0.0 {
                let sum: f64 = items.iter().map(|subject| subject.percentage).sum();
                prop_assert!((sum - 100.0).abs() <= PERCENTAGE_TOLERANCE);
            }
        }
    }
}
