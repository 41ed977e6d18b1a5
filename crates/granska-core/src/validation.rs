//! Ground-truth records and accuracy metrics for resolver validation.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ids::MentionId;

/// A labeled pair of mentions: do they denote the same real-world identity?
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroundTruthPair {
    pub id: Uuid,
    pub left_mention: MentionId,
    pub right_mention: MentionId,
    pub is_same_entity: bool,
    /// Where the label came from (annotation batch, registry join, ...)
    pub source: String,
}

impl GroundTruthPair {
    pub fn new(
        left_mention: MentionId,
        right_mention: MentionId,
        is_same_entity: bool,
        source: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            left_mention,
            right_mention,
            is_same_entity,
            source: source.into(),
        }
    }
}

/// Confusion-matrix counts with derived specificity and sensitivity
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AccuracyReport {
    pub true_positives: u64,
    pub false_positives: u64,
    pub true_negatives: u64,
    pub false_negatives: u64,
    /// Pairs that could not be evaluated (unresolved mentions)
    pub skipped: u64,
}

impl AccuracyReport {
    /// TN / (TN + FP); 1.0 on an empty denominator
    pub fn specificity(&self) -> f64 {
        let denom = self.true_negatives + self.false_positives;
        if denom == 0 {
            1.0
        } else {
            self.true_negatives as f64 / denom as f64
        }
    }

    /// TP / (TP + FN); 1.0 on an empty denominator
    pub fn sensitivity(&self) -> f64 {
        let denom = self.true_positives + self.false_negatives;
        if denom == 0 {
            1.0
        } else {
            self.true_positives as f64 / denom as f64
        }
    }

    pub fn meets_targets(&self, min_specificity: f64, min_sensitivity: f64) -> bool {
        self.specificity() >= min_specificity && self.sensitivity() >= min_sensitivity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_compute_from_counts() {
        let r = AccuracyReport {
            true_positives: 90,
            false_positives: 1,
            true_negatives: 199,
            false_negatives: 10,
            skipped: 0,
        };
        assert!((r.specificity() - 0.995).abs() < 1e-9);
        assert!((r.sensitivity() - 0.90).abs() < 1e-9);
        assert!(r.meets_targets(0.995, 0.90));
    }

    #[test]
    fn empty_report_is_vacuously_perfect() {
        let r = AccuracyReport::default();
        assert_eq!(r.specificity(), 1.0);
        assert_eq!(r.sensitivity(), 1.0);
    }
}
