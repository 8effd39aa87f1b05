use crate::data::types::Metrics;
use crate::scoring::weights::{ConfigError, ScoringConfig};

/// Each signal mapped onto 0-100.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizedMetrics {
    pub google_trends: f64,
    pub twitter_mentions: f64,
    pub reddit_posts: f64,
    pub youtube_views: f64,
}

/// Reduces raw metrics to a single 0-100 reach score.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReachScorer {
    config: ScoringConfig,
}

impl ReachScorer {
    pub fn new(config: ScoringConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn normalize(&self, m: &Metrics) -> NormalizedMetrics {
        let s = &self.config.saturation;
        NormalizedMetrics {
            google_trends: to_percent(m.google_trends, s.google_trends),
            twitter_mentions: to_percent(m.twitter_mentions, s.twitter_mentions),
            reddit_posts: to_percent(m.reddit_posts, s.reddit_posts),
            youtube_views: to_percent(m.youtube_views, s.youtube_views),
        }
    }

    /// Weighted sum of normalized signals, before confidence damping.
    pub fn weighted_sum(&self, m: &Metrics) -> f64 {
        let n = self.normalize(m);
        let w = &self.config.weights;
        w.google_trends * n.google_trends
            + w.twitter_mentions * n.twitter_mentions
            + w.reddit_posts * n.reddit_posts
            + w.youtube_views * n.youtube_views
    }

    /// Weighted sum scaled by `confidence`, clamped to `[0, 100]`.
    pub fn score(&self, m: &Metrics, confidence: f64) -> f64 {
        clamp_percent(self.weighted_sum(m) * confidence)
    }
}

/// Reach score under the default weights.
pub fn compute_reach_score(metrics: &Metrics, confidence: f64) -> f64 {
    ReachScorer::default().score(metrics, confidence)
}

fn to_percent(value: f64, saturation: f64) -> f64 {
    clamp_percent(value / saturation * 100.0)
}

fn clamp_percent(x: f64) -> f64 {
    if x.is_nan() {
        return 0.0;
    }
    x.clamp(0.0, 100.0)
}
