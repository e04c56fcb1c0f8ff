use anyhow::Result;
use std::collections::BTreeMap;

use crate::types::ClassificationResult;

/// What a loaded model says about itself.
#[derive(Debug, Clone)]
pub struct ModelDescriptor {
    pub model_type: String,
    pub label2id: BTreeMap<String, u32>,
}

impl ModelDescriptor {
    pub fn num_labels(&self) -> usize {
        self.label2id.len()
    }
}

/// A loaded sequence-classification model.
///
/// `predict` scores every configured label, in the model's own label order,
/// with probabilities that sum to one. Implementations hold no mutable state,
/// so one instance is shared by all requests.
pub trait SequenceClassifier: Send + Sync {
    fn predict(&self, text: &str) -> Result<Vec<ClassificationResult>>;

    fn descriptor(&self) -> &ModelDescriptor;
}

/// Orders scores highest first and applies the selection contract.
///
/// The sort is stable, so tied labels keep the model's order.
pub fn rank(
    mut scores: Vec<ClassificationResult>,
    show_all_scores: bool,
) -> Vec<ClassificationResult> {
    scores.sort_by(|a, b| b.score.total_cmp(&a.score));
    if !show_all_scores {
        scores.truncate(1);
    }
    scores
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scores(pairs: &[(&str, f32)]) -> Vec<ClassificationResult> {
        pairs
            .iter()
            .map(|(label, score)| ClassificationResult {
                label: label.to_string(),
                score: *score,
            })
            .collect()
    }

    fn labels(results: &[ClassificationResult]) -> Vec<&str> {
        results.iter().map(|r| r.label.as_str()).collect()
    }

    #[test]
    fn sorts_descending_regardless_of_model_order() {
        let ranked = rank(
            scores(&[("billing", 0.1), ("support", 0.7), ("sales", 0.2)]),
            true,
        );
        assert_eq!(labels(&ranked), vec!["support", "sales", "billing"]);
        assert!(ranked.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn ties_keep_model_order() {
        let ranked = rank(
            scores(&[("a", 0.25), ("b", 0.5), ("c", 0.25), ("d", 0.0)]),
            true,
        );
        assert_eq!(labels(&ranked), vec!["b", "a", "c", "d"]);
    }

    #[test]
    fn top_only_keeps_single_best() {
        let ranked = rank(scores(&[("billing", 0.3), ("support", 0.6), ("sales", 0.1)]), false);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].label, "support");
    }

    #[test]
    fn empty_scores_stay_empty() {
        assert!(rank(Vec::new(), false).is_empty());
        assert!(rank(Vec::new(), true).is_empty());
    }
}
