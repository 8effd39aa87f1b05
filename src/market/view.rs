use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;

use crate::data::source::FallbackRng;
use crate::data::types::{InputError, MetricSample, Metrics, Subject};
use crate::scoring::odds::{calculate_multiplier, OddsDeriver, Quote};
use crate::scoring::weights::ConfigError;
use crate::scoring::ScoreModel;
use crate::store::{MetricStore, SubjectRegistry, HISTORY_WINDOW};

/// Presentation-only volume range, `[low, high)`.
const STAKED_RANGE: (u64, u64) = (20_000, 120_000);

/// Longest allowed half-width of a market window: one year.
pub const MAX_WINDOW_HOURS: i64 = 24 * 365;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    pub threshold: f64,
    /// Markets open this many hours before the build time and close this many after.
    pub window_hours: i64,
    pub paper_balance: f64,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            threshold: 75.0,
            window_hours: 12,
            paper_balance: 10_000.0,
        }
    }
}

impl MarketConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.threshold.is_finite() {
            return Err(ConfigError::MarketThreshold(self.threshold));
        }
        if !(1..=MAX_WINDOW_HOURS).contains(&self.window_hours) {
            return Err(ConfigError::MarketWindow(self.window_hours));
        }
        if !(self.paper_balance > 0.0 && self.paper_balance.is_finite()) {
            return Err(ConfigError::PaperBalance(self.paper_balance));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketKind {
    OverUnder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketStatus {
    Active,
}

/// Over/under market on one subject's reach score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Market {
    pub id: String,
    pub creator_id: String,
    pub creator_name: String,
    #[serde(rename = "type")]
    pub kind: MarketKind,
    pub threshold: f64,
    pub current_odds: f64,
    pub quote: Quote,
    pub total_staked: f64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: MarketStatus,
    pub growth_multiplier: f64,
}

impl Market {
    pub fn market_id(subject_id: &str) -> String {
        format!("mkt-{}", subject_id)
    }

    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        self.status == MarketStatus::Active && now >= self.start_time && now < self.end_time
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MarketBuilder {
    odds: OddsDeriver,
    config: MarketConfig,
}

impl MarketBuilder {
    pub fn new(odds: OddsDeriver, config: MarketConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { odds, config })
    }

    pub fn odds(&self) -> &OddsDeriver {
        &self.odds
    }

    pub fn build(&self, creator: &CreatorView, rng: &FallbackRng, now: DateTime<Utc>) -> Market {
        let half = Duration::hours(self.config.window_hours);
        let quote = self.odds.quote(creator.current_score, self.config.threshold);
        let opening_score = creator
            .history
            .first()
            .map(|p| p.score)
            .unwrap_or(creator.current_score);

        Market {
            id: Market::market_id(&creator.subject.id),
            creator_id: creator.subject.id.clone(),
            creator_name: creator.subject.name.clone(),
            kind: MarketKind::OverUnder,
            threshold: self.config.threshold,
            current_odds: quote.odds,
            quote,
            total_staked: rng.range(STAKED_RANGE.0, STAKED_RANGE.1) as f64,
            start_time: now - half,
            end_time: now + half,
            status: MarketStatus::Active,
            growth_multiplier: calculate_multiplier(opening_score, creator.current_score),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    Flat,
}

impl std::fmt::Display for Trend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Trend::Up => write!(f, "up"),
            Trend::Down => write!(f, "down"),
            Trend::Flat => write!(f, "flat"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPoint {
    pub timestamp: DateTime<Utc>,
    pub score: f64,
    #[serde(flatten)]
    pub metrics: Metrics,
    pub synthetic: bool,
}

/// A subject merged with its freshest sample and recent history.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatorView {
    pub subject: Subject,
    pub current_score: f64,
    /// None until the subject has been synced.
    pub confidence: Option<f64>,
    #[serde(flatten)]
    pub metrics: Metrics,
    pub last_sync: Option<DateTime<Utc>>,
    /// Latest sample used at least one fallback value.
    pub synthetic: bool,
    pub trend: Trend,
    pub history: Vec<HistoryPoint>,
}

impl CreatorView {
    /// Scores are recomputed from raw metrics; the stored cache is ignored.
    pub fn assemble(
        subject: Subject,
        latest: Option<&MetricSample>,
        window: &[MetricSample],
        model: &ScoreModel,
    ) -> Self {
        let history: Vec<HistoryPoint> = window
            .iter()
            .map(|s| HistoryPoint {
                timestamp: s.timestamp,
                score: model.evaluate(&s.metrics).0,
                metrics: s.metrics,
                synthetic: s.is_synthetic(),
            })
            .collect();

        let trend = match history.as_slice() {
            [.., prev, last] if last.score > prev.score => Trend::Up,
            [.., prev, last] if last.score < prev.score => Trend::Down,
            _ => Trend::Flat,
        };

        match latest {
            Some(sample) => {
                let (score, confidence) = model.evaluate(&sample.metrics);
                Self {
                    subject,
                    current_score: score,
                    confidence: Some(confidence),
                    metrics: sample.metrics,
                    last_sync: Some(sample.timestamp),
                    synthetic: sample.is_synthetic(),
                    trend,
                    history,
                }
            }
            None => Self {
                current_score: subject.base_score,
                subject,
                confidence: None,
                metrics: Metrics::UNSYNCED,
                last_sync: None,
                synthetic: false,
                trend,
                history,
            },
        }
    }

    /// Score movement across the visible history.
    pub fn trend_change(&self) -> f64 {
        self.history
            .first()
            .map(|p| self.current_score - p.score)
            .unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoardEntry {
    pub creator: CreatorView,
    pub market: Market,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortBy {
    Score,
    #[default]
    Volume,
    Trending,
}

impl FromStr for SortBy {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "score" => Ok(SortBy::Score),
            "volume" => Ok(SortBy::Volume),
            "trending" | "trend" => Ok(SortBy::Trending),
            _ => Err(InputError::InvalidChoice {
                field: "sort",
                value: s.to_string(),
                expected: "score, volume, trending",
            }),
        }
    }
}

pub const ALL_CATEGORIES: &str = "All";

#[derive(Debug, Clone, Default)]
pub struct BoardQuery {
    pub search: Option<String>,
    pub category: Option<String>,
    pub sort: SortBy,
}

impl BoardQuery {
    pub fn matches(&self, creator: &CreatorView) -> bool {
        let search_ok = match self.search.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(q) => {
                let q = q.to_lowercase();
                creator.subject.name.to_lowercase().contains(&q)
                    || creator.subject.handle.to_lowercase().contains(&q)
            }
        };
        let category_ok = match self.category.as_deref() {
            None | Some(ALL_CATEGORIES) => true,
            Some(c) => creator.subject.category == c,
        };
        search_ok && category_ok
    }

    pub fn order(&self, entries: &mut [BoardEntry]) {
        let key = |e: &BoardEntry| match self.sort {
            SortBy::Score => e.creator.current_score,
            SortBy::Volume => e.market.total_staked,
            SortBy::Trending => e.creator.trend_change(),
        };
        entries.sort_by(|a, b| key(b).partial_cmp(&key(a)).unwrap_or(std::cmp::Ordering::Equal));
    }
}

/// Read side: subjects merged with their samples and priced markets.
pub struct CreatorBoard {
    registry: Arc<dyn SubjectRegistry>,
    store: Arc<dyn MetricStore>,
    model: ScoreModel,
    markets: MarketBuilder,
    rng: Arc<FallbackRng>,
}

impl CreatorBoard {
    pub fn new(
        registry: Arc<dyn SubjectRegistry>,
        store: Arc<dyn MetricStore>,
        model: ScoreModel,
        markets: MarketBuilder,
        rng: Arc<FallbackRng>,
    ) -> Self {
        Self {
            registry,
            store,
            model,
            markets,
            rng,
        }
    }

    fn view(&self, subject: Subject) -> Result<CreatorView> {
        let latest = self.store.latest(&subject.id)?;
        let window = self.store.trailing_window(&subject.id, HISTORY_WINDOW)?;
        Ok(CreatorView::assemble(subject, latest.as_ref(), &window, &self.model))
    }

    /// Every subject, base score descending.
    pub fn creators(&self) -> Result<Vec<CreatorView>> {
        self.registry
            .list_subjects()?
            .into_iter()
            .map(|s| self.view(s))
            .collect()
    }

    pub fn entry(&self, subject_id: &str, now: DateTime<Utc>) -> Result<Option<BoardEntry>> {
        let Some(subject) = self.registry.get_subject(subject_id)? else {
            return Ok(None);
        };
        let creator = self.view(subject)?;
        let market = self.markets.build(&creator, &self.rng, now);
        Ok(Some(BoardEntry { creator, market }))
    }

    pub fn entries(&self, query: &BoardQuery, now: DateTime<Utc>) -> Result<Vec<BoardEntry>> {
        let mut entries: Vec<BoardEntry> = self
            .creators()?
            .into_iter()
            .filter(|c| query.matches(c))
            .map(|creator| {
                let market = self.markets.build(&creator, &self.rng, now);
                BoardEntry { creator, market }
            })
            .collect();
        query.order(&mut entries);
        Ok(entries)
    }

    /// `"All"` followed by each distinct category in board order.
    pub fn categories(&self) -> Result<Vec<String>> {
        let mut categories = vec![ALL_CATEGORIES.to_string()];
        for subject in self.registry.list_subjects()? {
            if !categories.contains(&subject.category) {
                categories.push(subject.category);
            }
        }
        Ok(categories)
    }
}
