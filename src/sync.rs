use anyhow::Result;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::EnvConfig;
use crate::data::reddit::RedditClient;
use crate::data::source::{with_fallback, FallbackRng, SignalSource};
use crate::data::trends::TrendsClient;
use crate::data::twitter::TwitterClient;
use crate::data::types::{InputError, MetricSample, Metrics, Subject, SubjectKey, SyntheticMask};
use crate::data::youtube::YouTubeClient;
use crate::monitoring::logger::CsvLogger;
use crate::scoring::ScoreModel;
use crate::store::{MetricStore, SubjectRegistry};

/// One adapter per signal.
#[derive(Clone)]
pub struct SignalSources {
    pub search_interest: Arc<dyn SignalSource>,
    pub mentions: Arc<dyn SignalSource>,
    pub discussions: Arc<dyn SignalSource>,
    pub views: Arc<dyn SignalSource>,
}

impl SignalSources {
    /// Live adapters sharing one HTTP client. Missing credentials are not an
    /// error here; those adapters fail each fetch and fall back.
    pub fn from_env(client: Client, env: &EnvConfig) -> Self {
        Self {
            search_interest: Arc::new(TrendsClient::new(client.clone())),
            mentions: Arc::new(TwitterClient::new(client.clone(), env.twitter_bearer_token.clone())),
            discussions: Arc::new(RedditClient::new(client.clone(), env.reddit.clone())),
            views: Arc::new(YouTubeClient::new(client, env.youtube_api_key.clone())),
        }
    }
}

/// Fetches all four signals for a subject and reduces them to a sample.
pub struct Aggregator {
    sources: SignalSources,
    model: ScoreModel,
    rng: Arc<FallbackRng>,
}

impl Aggregator {
    pub fn new(sources: SignalSources, model: ScoreModel, rng: Arc<FallbackRng>) -> Self {
        Self { sources, model, rng }
    }

    /// Never fails because of an upstream; only a malformed subject is an error.
    pub async fn aggregate(&self, subject: &Subject, now: DateTime<Utc>) -> Result<MetricSample, InputError> {
        let key = SubjectKey::from_subject(subject)?;
        let rng = self.rng.as_ref();

        let (trends, mentions, discussions, views) = tokio::join!(
            with_fallback(self.sources.search_interest.as_ref(), &key, rng),
            with_fallback(self.sources.mentions.as_ref(), &key, rng),
            with_fallback(self.sources.discussions.as_ref(), &key, rng),
            with_fallback(self.sources.views.as_ref(), &key, rng),
        );

        let mut synthetic = SyntheticMask::default();
        for raw in [&trends, &mentions, &discussions, &views] {
            if raw.is_synthetic {
                synthetic.set(raw.kind);
            }
        }

        let metrics = Metrics {
            google_trends: trends.value,
            twitter_mentions: mentions.value,
            reddit_posts: discussions.value,
            youtube_views: views.value,
        };
        let (reach_score, confidence) = self.model.evaluate(&metrics);

        debug!(
            subject = %subject.id,
            reach_score,
            confidence,
            synthetic = synthetic.count(),
            "Aggregated {}",
            subject.name
        );

        Ok(MetricSample {
            subject_id: subject.id.clone(),
            metrics,
            reach_score,
            synthetic,
            timestamp: now,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub synced: usize,
    pub synthetic_signals: usize,
    pub skipped: usize,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Runs aggregation cycles over the registry and appends the results.
pub struct SyncEngine {
    registry: Arc<dyn SubjectRegistry>,
    store: Arc<dyn MetricStore>,
    aggregator: Aggregator,
    subject_delay: Duration,
    csv_logger: Option<CsvLogger>,
}

impl SyncEngine {
    pub fn new(
        registry: Arc<dyn SubjectRegistry>,
        store: Arc<dyn MetricStore>,
        aggregator: Aggregator,
        subject_delay: Duration,
    ) -> Self {
        Self {
            registry,
            store,
            aggregator,
            subject_delay,
            csv_logger: None,
        }
    }

    pub fn with_csv_logger(mut self, logger: CsvLogger) -> Self {
        self.csv_logger = Some(logger);
        self
    }

    /// One pass over every subject. Subjects are processed one at a time with
    /// `subject_delay` between them; the cycle's samples land in a single append.
    pub async fn run_cycle(&self) -> Result<SyncReport> {
        let subjects = self.registry.list_subjects()?;
        let started = Utc::now();

        if subjects.is_empty() {
            info!("No creators registered, nothing to sync");
            return Ok(SyncReport {
                synced: 0,
                synthetic_signals: 0,
                skipped: 0,
                timestamp: started,
                message: Some("No creators found".to_string()),
            });
        }

        info!("Syncing {} creators", subjects.len());

        let mut samples = Vec::with_capacity(subjects.len());
        let mut skipped = 0;

        for (i, subject) in subjects.iter().enumerate() {
            if i > 0 && !self.subject_delay.is_zero() {
                tokio::time::sleep(self.subject_delay).await;
            }

            match self.aggregator.aggregate(subject, Utc::now()).await {
                Ok(sample) => samples.push(sample),
                Err(e) => {
                    warn!(subject = %subject.id, "Skipping creator: {}", e);
                    skipped += 1;
                }
            }
        }

        self.store.append(&samples)?;

        if let Some(logger) = &self.csv_logger {
            if let Err(e) = logger.log_samples(&samples) {
                warn!("Failed to write CSV samples: {:#}", e);
            }
        }

        let synthetic_signals = samples.iter().map(|s| s.synthetic.count()).sum();
        let message = if samples.is_empty() {
            warn!("Every creator was skipped this cycle");
            Some("All metric fetches failed".to_string())
        } else {
            None
        };
        let report = SyncReport {
            synced: samples.len(),
            synthetic_signals,
            skipped,
            timestamp: Utc::now(),
            message,
        };

        info!(
            synced = report.synced,
            synthetic_signals = report.synthetic_signals,
            skipped = report.skipped,
            "Sync cycle complete in {}ms",
            (report.timestamp - started).num_milliseconds()
        );

        Ok(report)
    }

    /// Cycle every `every` until the future is dropped. A failed cycle is
    /// logged and retried on the next tick.
    pub async fn run_forever(&self, every: Duration) {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if let Err(e) = self.run_cycle().await {
                error!("Sync cycle failed: {:#}", e);
            }
        }
    }
}
