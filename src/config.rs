use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::time::Duration;

use crate::data::reddit::RedditCredentials;
use crate::data::types::{Subject, SubjectKey};
use crate::market::view::{MarketBuilder, MarketConfig};
use crate::scoring::confidence::{ConfidenceEstimator, ConfidenceRules};
use crate::scoring::odds::{OddsConfig, OddsDeriver};
use crate::scoring::reach::ReachScorer;
use crate::scoring::weights::{ConfigError, ScoringConfig};
use crate::scoring::ScoreModel;

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub system: SystemConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub confidence: ConfidenceRules,
    #[serde(default)]
    pub odds: OddsConfig,
    #[serde(default)]
    pub market: MarketConfig,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
    #[serde(default)]
    pub subjects: Vec<Subject>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SystemConfig {
    /// SQLite file. Absent means an in-memory store for the life of the process.
    #[serde(default)]
    pub database_path: Option<String>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            log_level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_subject_delay")]
    pub subject_delay_ms: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Fixes the fallback draws. Time-seeded when absent.
    #[serde(default)]
    pub rng_seed: Option<u64>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            subject_delay_ms: default_subject_delay(),
            request_timeout_secs: default_request_timeout(),
            rng_seed: None,
        }
    }
}

impl SyncConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn subject_delay(&self) -> Duration {
        Duration::from_millis(self.subject_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitoringConfig {
    #[serde(default)]
    pub csv_logging: bool,
    #[serde(default = "default_csv_path")]
    pub csv_log_path: String,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            csv_logging: false,
            csv_log_path: default_csv_path(),
        }
    }
}

fn default_log_level() -> String { "info".to_string() }
fn default_interval() -> u64 { 3600 }
fn default_subject_delay() -> u64 { 200 }
fn default_request_timeout() -> u64 { 10 }
fn default_csv_path() -> String { "samples.csv".to_string() }

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        Self::from_toml(&contents).with_context(|| format!("Invalid config file: {}", path))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents).context("Failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects bad weights, odds bounds and seed subjects before anything runs.
    pub fn validate(&self) -> Result<()> {
        self.score_model()?;
        self.market_builder()?;

        if self.sync.interval_secs == 0 {
            bail!("sync.interval_secs must be positive");
        }

        let mut ids = HashSet::new();
        for subject in &self.subjects {
            if !ids.insert(subject.id.as_str()) {
                bail!("Duplicate subject id: {}", subject.id);
            }
            SubjectKey::from_subject(subject)
                .with_context(|| format!("Invalid subject {}", subject.id))?;
        }
        Ok(())
    }

    pub fn score_model(&self) -> Result<ScoreModel, ConfigError> {
        Ok(ScoreModel::new(
            ReachScorer::new(self.scoring)?,
            ConfidenceEstimator::new(self.confidence)?,
        ))
    }

    pub fn market_builder(&self) -> Result<MarketBuilder, ConfigError> {
        MarketBuilder::new(OddsDeriver::new(self.odds)?, self.market)
    }
}

/// Credentials and paths from `.env` and the process environment.
/// Every credential is optional; a missing one routes that signal to its fallback.
#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    pub config_path: String,
    pub twitter_bearer_token: Option<String>,
    pub youtube_api_key: Option<String>,
    pub reddit: Option<RedditCredentials>,
}

impl EnvConfig {
    pub fn load() -> Self {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        // Blank values count as unset
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let reddit = match (get("REDDIT_CLIENT_ID"), get("REDDIT_CLIENT_SECRET")) {
            (Some(client_id), Some(client_secret)) => Some(RedditCredentials {
                client_id,
                client_secret,
            }),
            _ => None,
        };

        Self {
            config_path: get("REACH_CONFIG").unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string()),
            twitter_bearer_token: get("TWITTER_BEARER_TOKEN"),
            youtube_api_key: get("YOUTUBE_API_KEY"),
            reddit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_from_empty_file() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.sync.subject_delay_ms, 200);
        assert_eq!(config.sync.request_timeout_secs, 10);
        assert_eq!(config.market.threshold, 75.0);
        assert_eq!(config.odds.min, 1.05);
        assert_eq!(config.system.log_level, "info");
        assert!(config.system.database_path.is_none());
        assert!(config.subjects.is_empty());
        assert_eq!(config.monitoring.csv_log_path, "samples.csv");
    }

    #[test]
    fn test_parses_subjects_and_sections() {
        let toml = r#"
            [system]
            database_path = "reach.db"
            log_level = "debug"

            [sync]
            interval_secs = 600
            rng_seed = 7

            [odds]
            sensitivity = 20.0

            [[subjects]]
            id = "cr5"
            name = "IShowSpeed"
            handle = "@ishowspeed"
            platforms = ["YouTube", "Twitch"]
            base_score = 93.0
            category = "Entertainment"
            verified = true
        "#;
        let config = Config::from_toml(toml).unwrap();
        assert_eq!(config.system.database_path.as_deref(), Some("reach.db"));
        assert_eq!(config.sync.interval(), Duration::from_secs(600));
        assert_eq!(config.sync.rng_seed, Some(7));
        assert_eq!(config.odds.sensitivity, 20.0);
        assert_eq!(config.odds.base, 2.0);
        assert_eq!(config.subjects[0].handle, "@ishowspeed");
        assert!(config.subjects[0].avatar.is_none());
    }

    #[test]
    fn test_shipped_config_is_valid() {
        let config = Config::from_toml(include_str!("../config.toml")).unwrap();
        assert_eq!(config.subjects.len(), 12);
        assert_eq!(config.sync.subject_delay_ms, 200);

        let frat = config.subjects.iter().find(|s| s.id == "cr3").unwrap();
        assert_eq!(frat.category, "Viral");
        assert!(!frat.verified);
        assert!(config.subjects.iter().all(|s| s.platforms.len() == 3));
    }

    #[test]
    fn test_rejects_bad_weights() {
        let toml = r#"
            [scoring.weights]
            google_trends = 0.5
        "#;
        let err = Config::from_toml(toml).unwrap_err();
        assert!(format!("{err:#}").contains("sum to 1.0"));
    }

    #[test]
    fn test_rejects_duplicate_and_invalid_subjects() {
        let dup = r#"
            [[subjects]]
            id = "a"
            name = "A"
            handle = "@a"
            base_score = 1.0
            category = "Gaming"

            [[subjects]]
            id = "a"
            name = "B"
            handle = "@b"
            base_score = 2.0
            category = "Gaming"
        "#;
        assert!(Config::from_toml(dup).is_err());

        let bad_handle = r#"
            [[subjects]]
            id = "a"
            name = "A"
            handle = "@not a handle"
            base_score = 1.0
            category = "Gaming"
        "#;
        assert!(Config::from_toml(bad_handle).is_err());

        let hyphenated = r#"
            [[subjects]]
            id = "a"
            name = "A"
            handle = "@some-channel"
            base_score = 1.0
            category = "Gaming"
        "#;
        assert!(Config::from_toml(hyphenated).is_ok());
    }

    #[test]
    fn test_load_reports_missing_file() {
        let err = Config::load("/nonexistent/reach.toml").unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_env_lookup() {
        let vars: HashMap<&str, &str> = [
            ("TWITTER_BEARER_TOKEN", "abc"),
            ("YOUTUBE_API_KEY", "  "),
            ("REDDIT_CLIENT_ID", "id"),
        ]
        .into_iter()
        .collect();
        let env = EnvConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(env.twitter_bearer_token.as_deref(), Some("abc"));
        assert!(env.youtube_api_key.is_none());
        // Secret missing, so no reddit credentials
        assert!(env.reddit.is_none());
        assert_eq!(env.config_path, DEFAULT_CONFIG_PATH);
    }
}
