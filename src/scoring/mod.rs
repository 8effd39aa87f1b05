pub mod confidence;
pub mod odds;
pub mod reach;
pub mod weights;

use crate::data::types::Metrics;
use confidence::ConfidenceEstimator;
use reach::ReachScorer;

/// Scorer and confidence estimator applied together. Every score shown to a
/// reader is recomputed through this from raw metrics.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoreModel {
    pub scorer: ReachScorer,
    pub estimator: ConfidenceEstimator,
}

impl ScoreModel {
    pub fn new(scorer: ReachScorer, estimator: ConfidenceEstimator) -> Self {
        Self { scorer, estimator }
    }

    /// `(reach_score, confidence)` for one sample.
    pub fn evaluate(&self, metrics: &Metrics) -> (f64, f64) {
        let confidence = self.estimator.estimate(metrics);
        (self.scorer.score(metrics, confidence), confidence)
    }
}
