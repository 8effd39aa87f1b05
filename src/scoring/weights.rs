use serde::{Deserialize, Serialize};

/// Allowed drift of the weight sum from 1.0.
const WEIGHT_SUM_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("Metric weights must sum to 1.0, got {0}")]
    WeightSum(f64),

    #[error("Weight for {0} must be finite and non-negative, got {1}")]
    InvalidWeight(&'static str, f64),

    #[error("Saturation point for {0} must be positive, got {1}")]
    InvalidSaturation(&'static str, f64),

    #[error("Odds bounds must satisfy 1.0 <= min <= max, got [{min}, {max}]")]
    OddsBounds { min: f64, max: f64 },

    #[error("Odds sensitivity must be positive, got {0}")]
    OddsSensitivity(f64),

    #[error("Confidence bounds must satisfy 0.0 < floor <= ceiling <= 1.0, got [{floor}, {ceiling}]")]
    ConfidenceBounds { floor: f64, ceiling: f64 },

    #[error("Market window half-width must be between 1 and 8760 hours, got {0}h")]
    MarketWindow(i64),

    #[error("Market threshold must be finite, got {0}")]
    MarketThreshold(f64),

    #[error("Paper balance must be positive, got {0}")]
    PaperBalance(f64),
}

/// Relative weight of each signal in the reach score. Search intent and
/// direct engagement outrank raw views, which are easiest to inflate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricWeights {
    pub google_trends: f64,
    pub twitter_mentions: f64,
    pub reddit_posts: f64,
    pub youtube_views: f64,
}

impl Default for MetricWeights {
    fn default() -> Self {
        Self {
            google_trends: 0.35,
            twitter_mentions: 0.30,
            reddit_posts: 0.20,
            youtube_views: 0.15,
        }
    }
}

impl MetricWeights {
    pub fn sum(&self) -> f64 {
        self.google_trends + self.twitter_mentions + self.reddit_posts + self.youtube_views
    }

    fn named(&self) -> [(&'static str, f64); 4] {
        [
            ("google_trends", self.google_trends),
            ("twitter_mentions", self.twitter_mentions),
            ("reddit_posts", self.reddit_posts),
            ("youtube_views", self.youtube_views),
        ]
    }
}

/// Raw count at which each signal maps to 100.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Saturation {
    pub google_trends: f64,
    pub twitter_mentions: f64,
    pub reddit_posts: f64,
    pub youtube_views: f64,
}

impl Default for Saturation {
    fn default() -> Self {
        Self {
            google_trends: 100.0,
            twitter_mentions: 1_000.0,
            reddit_posts: 100.0,
            youtube_views: 100_000.0,
        }
    }
}

impl Saturation {
    fn named(&self) -> [(&'static str, f64); 4] {
        [
            ("google_trends", self.google_trends),
            ("twitter_mentions", self.twitter_mentions),
            ("reddit_posts", self.reddit_posts),
            ("youtube_views", self.youtube_views),
        ]
    }
}

/// Immutable scoring parameters handed to the scorer at construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub weights: MetricWeights,
    pub saturation: Saturation,
}

impl ScoringConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, w) in self.weights.named() {
            if !w.is_finite() || w < 0.0 {
                return Err(ConfigError::InvalidWeight(name, w));
            }
        }
        let sum = self.weights.sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(ConfigError::WeightSum(sum));
        }
        for (name, s) in self.saturation.named() {
            if !s.is_finite() || s <= 0.0 {
                return Err(ConfigError::InvalidSaturation(name, s));
            }
        }
        Ok(())
    }
}
