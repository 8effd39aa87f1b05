use serde::{Deserialize, Serialize};

use crate::data::types::Metrics;
use crate::scoring::weights::ConfigError;

/// Thresholds and damping factors for signal-quality heuristics.
/// These are policy choices, not measured constants.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceRules {
    pub mention_spike: f64,
    pub mention_spike_factor: f64,
    pub min_views: f64,
    pub low_views_factor: f64,
    pub min_search_interest: f64,
    pub low_search_factor: f64,
    /// Share of mentions+views+posts held by mentions above which the
    /// signal counts as concentrated.
    pub concentration_ratio: f64,
    pub concentration_factor: f64,
    pub floor: f64,
    pub ceiling: f64,
}

impl Default for ConfidenceRules {
    fn default() -> Self {
        Self {
            mention_spike: 10_000.0,
            mention_spike_factor: 0.9,
            min_views: 100.0,
            low_views_factor: 0.85,
            min_search_interest: 10.0,
            low_search_factor: 0.9,
            concentration_ratio: 0.95,
            concentration_factor: 0.85,
            floor: 0.5,
            ceiling: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfidenceFlag {
    /// Mentions implausibly high, likely bot or spam inflation.
    MentionSpike,
    /// Too few views to be a meaningful signal.
    LowViews,
    /// No organic search traction.
    LowSearchInterest,
    /// Mentions dominate the combined engagement total.
    Concentrated,
}

impl std::fmt::Display for ConfidenceFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConfidenceFlag::MentionSpike => "mention_spike",
            ConfidenceFlag::LowViews => "low_views",
            ConfidenceFlag::LowSearchInterest => "low_search_interest",
            ConfidenceFlag::Concentrated => "concentrated",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ConfidenceEstimator {
    rules: ConfidenceRules,
}

impl ConfidenceEstimator {
    pub fn new(rules: ConfidenceRules) -> Result<Self, ConfigError> {
        if !(rules.floor > 0.0 && rules.floor <= rules.ceiling && rules.ceiling <= 1.0) {
            return Err(ConfigError::ConfidenceBounds {
                floor: rules.floor,
                ceiling: rules.ceiling,
            });
        }
        Ok(Self { rules })
    }

    /// Rules triggered by this sample.
    pub fn flags(&self, m: &Metrics) -> Vec<ConfidenceFlag> {
        let r = &self.rules;
        let mut flags = Vec::new();

        if m.twitter_mentions > r.mention_spike {
            flags.push(ConfidenceFlag::MentionSpike);
        }
        if m.youtube_views < r.min_views {
            flags.push(ConfidenceFlag::LowViews);
        }
        if m.google_trends < r.min_search_interest {
            flags.push(ConfidenceFlag::LowSearchInterest);
        }

        let total = m.twitter_mentions + m.youtube_views + m.reddit_posts;
        if total > 0.0 && m.twitter_mentions / total > r.concentration_ratio {
            flags.push(ConfidenceFlag::Concentrated);
        }

        flags
    }

    /// Damping multiplier in `[floor, ceiling]`; 1.0 when nothing triggers.
    pub fn estimate(&self, m: &Metrics) -> f64 {
        let r = &self.rules;
        let confidence: f64 = self
            .flags(m)
            .iter()
            .map(|flag| match flag {
                ConfidenceFlag::MentionSpike => r.mention_spike_factor,
                ConfidenceFlag::LowViews => r.low_views_factor,
                ConfidenceFlag::LowSearchInterest => r.low_search_factor,
                ConfidenceFlag::Concentrated => r.concentration_factor,
            })
            .product();

        if confidence.is_nan() {
            return r.floor;
        }
        confidence.clamp(r.floor, r.ceiling)
    }
}

/// Confidence under the default rules.
pub fn estimate_confidence(metrics: &Metrics) -> f64 {
    ConfidenceEstimator::default().estimate(metrics)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(google_trends: f64, twitter_mentions: f64, reddit_posts: f64, youtube_views: f64) -> Metrics {
        Metrics {
            google_trends,
            twitter_mentions,
            reddit_posts,
            youtube_views,
        }
    }

    #[test]
    fn test_no_rules_is_full_confidence() {
        let m = metrics(80.0, 500.0, 30.0, 20_000.0);
        assert!(ConfidenceEstimator::default().flags(&m).is_empty());
        assert_eq!(estimate_confidence(&m), 1.0);
    }

    #[test]
    fn test_three_rules_multiply() {
        // Posts keep the mention share under 95%: 11000 / 11650 ≈ 0.944
        let m = metrics(5.0, 11_000.0, 600.0, 50.0);
        let c = estimate_confidence(&m);
        assert!((c - 0.9 * 0.85 * 0.9).abs() < 1e-12);
        assert!((c - 0.6885).abs() < 1e-12);
    }

    #[test]
    fn test_concentration_adds_damping() {
        // 11000 / 11050 ≈ 0.995 of the total is mentions
        let m = metrics(5.0, 11_000.0, 0.0, 50.0);
        let flags = ConfidenceEstimator::default().flags(&m);
        assert!(flags.contains(&ConfidenceFlag::Concentrated));
        let c = estimate_confidence(&m);
        assert!((c - 0.6885 * 0.85).abs() < 1e-12);
    }

    #[test]
    fn test_concentration_needs_nonzero_total() {
        let m = metrics(50.0, 0.0, 0.0, 0.0);
        let flags = ConfidenceEstimator::default().flags(&m);
        assert!(!flags.contains(&ConfidenceFlag::Concentrated));
        assert!(flags.contains(&ConfidenceFlag::LowViews));
    }

    #[test]
    fn test_floor_applies() {
        let rules = ConfidenceRules {
            mention_spike_factor: 0.3,
            ..ConfidenceRules::default()
        };
        let estimator = ConfidenceEstimator::new(rules).unwrap();
        let m = metrics(5.0, 20_000.0, 0.0, 10.0);
        assert_eq!(estimator.estimate(&m), 0.5);
    }

    #[test]
    fn test_always_within_bounds() {
        let estimator = ConfidenceEstimator::default();
        for g in [0.0, 5.0, 50.0, 150.0] {
            for t in [0.0, 10.0, 10_001.0, 1e9] {
                for r in [0.0, 50.0, 1e6] {
                    for y in [0.0, 99.0, 1e7] {
                        let c = estimator.estimate(&metrics(g, t, r, y));
                        assert!((0.5..=1.0).contains(&c), "confidence {c} out of range");
                    }
                }
            }
        }
    }

    #[test]
    fn test_rejects_inverted_bounds() {
        let rules = ConfidenceRules {
            floor: 0.9,
            ceiling: 0.6,
            ..ConfidenceRules::default()
        };
        assert!(ConfidenceEstimator::new(rules).is_err());
    }
}
