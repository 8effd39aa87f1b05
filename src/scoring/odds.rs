use serde::{Deserialize, Serialize};

use crate::scoring::weights::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OddsConfig {
    /// Odds when score equals threshold (even money).
    pub base: f64,
    /// Score points per unit of odds.
    pub sensitivity: f64,
    pub min: f64,
    pub max: f64,
}

impl Default for OddsConfig {
    fn default() -> Self {
        Self {
            base: 2.0,
            sensitivity: 40.0,
            min: 1.05,
            max: 20.0,
        }
    }
}

/// Converts a reach score and a threshold into payout odds.
#[derive(Debug, Clone, Copy, Default)]
pub struct OddsDeriver {
    config: OddsConfig,
}

impl OddsDeriver {
    pub fn new(config: OddsConfig) -> Result<Self, ConfigError> {
        if !(config.min >= 1.0 && config.min <= config.max && config.max.is_finite()) {
            return Err(ConfigError::OddsBounds {
                min: config.min,
                max: config.max,
            });
        }
        if !(config.sensitivity > 0.0 && config.sensitivity.is_finite()) {
            return Err(ConfigError::OddsSensitivity(config.sensitivity));
        }
        Ok(Self { config })
    }

    /// Rises as the score falls below the threshold, floors as it clears it.
    pub fn odds(&self, current_score: f64, threshold: f64) -> f64 {
        let c = &self.config;
        let raw = c.base + (threshold - current_score) / c.sensitivity;
        // f64::max ignores NaN, so a NaN input lands on the floor
        raw.max(c.min).min(c.max)
    }

    pub fn quote(&self, current_score: f64, threshold: f64) -> Quote {
        Quote::from_odds(self.odds(current_score, threshold))
    }
}

/// Odds under the default configuration.
pub fn compute_odds(current_score: f64, threshold: f64) -> f64 {
    OddsDeriver::default().odds(current_score, threshold)
}

/// Two-sided cent-denominated price. `yes + no == 100`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub odds: f64,
    pub price_yes: f64,
    pub price_no: f64,
}

impl Quote {
    pub fn from_odds(odds: f64) -> Self {
        let price_yes = 100.0 / odds;
        Self {
            odds,
            price_yes,
            price_no: 100.0 - price_yes,
        }
    }
}

/// Convex payout curve for upside beyond the starting score.
/// 1.0 until the score improves, then `log2(1 + current/start) * 1.5`.
pub fn calculate_multiplier(start_score: f64, current_score: f64) -> f64 {
    if current_score <= start_score || start_score <= 0.0 {
        return 1.0;
    }
    (1.0 + current_score / start_score).log2() * 1.5
}
