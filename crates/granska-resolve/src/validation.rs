//! Validation harness: accuracy metrics over labeled mention pairs.

use tracing::info;

use granska_core::{AccuracyReport, CoreResult};
use granska_persist::Store;

/// Evaluates resolver output against the ground-truth table
pub struct ValidationHarness {
    store: Store,
}

impl ValidationHarness {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// For each labeled pair, check whether both mentions resolved into the
    /// same SAME_AS cluster. Unresolved mentions are counted as skipped.
    pub async fn evaluate(&self) -> CoreResult<AccuracyReport> {
        let mut report = AccuracyReport::default();

        for pair in self.store.ground_truth().await? {
            let left = self.store.mention(pair.left_mention).await?;
            let right = self.store.mention(pair.right_mention).await?;

            let (Some(left_entity), Some(right_entity)) =
                (left.resolution.entity, right.resolution.entity)
            else {
                report.skipped += 1;
                continue;
            };

            let same = self.store.canonical_entity(left_entity).await?.id
                == self.store.canonical_entity(right_entity).await?.id;

            match (pair.is_same_entity, same) {
                (true, true) => report.true_positives += 1,
                (true, false) => report.false_negatives += 1,
                (false, true) => report.false_positives += 1,
                (false, false) => report.true_negatives += 1,
            }
        }

        info!(
            tp = report.true_positives,
            fp = report.false_positives,
            tn = report.true_negatives,
            "fn" = report.false_negatives,
            skipped = report.skipped,
            specificity = report.specificity(),
            sensitivity = report.sensitivity(),
            "ground-truth evaluation complete"
        );
        Ok(report)
    }
}
