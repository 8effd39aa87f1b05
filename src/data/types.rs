use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// A creator being scored. Seeded from config, immutable apart from
/// category/verification corrections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    pub id: String,
    pub name: String,
    pub handle: String,
    #[serde(default)]
    pub platforms: Vec<String>,
    pub base_score: f64,
    #[serde(default)]
    pub avatar: Option<String>,
    pub category: String,
    #[serde(default)]
    pub verified: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InputError {
    #[error("Display name is required")]
    MissingDisplayName,

    #[error("Handle is required")]
    MissingHandle,

    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    #[error("Invalid number for {field}: {value}")]
    InvalidNumber { field: &'static str, value: String },

    #[error("Invalid {field}: {value} (expected one of {expected})")]
    InvalidChoice {
        field: &'static str,
        value: String,
        expected: &'static str,
    },
}

/// Upstream query key for one subject: display name for search engines,
/// `@`-stripped handle for social sources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectKey {
    display_name: String,
    handle: String,
}

fn handle_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // Word characters in any script plus `.` and `-`, as YouTube allows
    PATTERN.get_or_init(|| Regex::new(r"^[\w.\-]{1,100}$").expect("valid handle pattern"))
}

impl SubjectKey {
    pub fn new(display_name: &str, handle: &str) -> Result<Self, InputError> {
        let display_name = display_name.trim();
        if display_name.is_empty() {
            return Err(InputError::MissingDisplayName);
        }

        let raw = handle.trim();
        let stripped = raw.strip_prefix('@').unwrap_or(raw);
        if stripped.is_empty() {
            return Err(InputError::MissingHandle);
        }
        if !handle_pattern().is_match(stripped) {
            return Err(InputError::InvalidHandle(raw.to_string()));
        }

        Ok(Self {
            display_name: display_name.to_string(),
            handle: stripped.to_string(),
        })
    }

    pub fn from_subject(subject: &Subject) -> Result<Self, InputError> {
        Self::new(&subject.name, &subject.handle)
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Handle without the leading `@`.
    pub fn handle(&self) -> &str {
        &self.handle
    }

    /// Query string a given signal kind searches for.
    pub fn query_for(&self, kind: SignalKind) -> &str {
        match kind {
            SignalKind::SearchInterest | SignalKind::Discussions => &self.display_name,
            SignalKind::Mentions | SignalKind::Views => &self.handle,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    /// Google Trends interest, 0-100.
    SearchInterest,
    /// X/Twitter mention count.
    Mentions,
    /// Reddit post count over the last day.
    Discussions,
    /// YouTube views across recent uploads.
    Views,
}

impl SignalKind {
    pub const ALL: [SignalKind; 4] = [
        SignalKind::SearchInterest,
        SignalKind::Mentions,
        SignalKind::Discussions,
        SignalKind::Views,
    ];

    fn bit(self) -> u8 {
        match self {
            SignalKind::SearchInterest => 1,
            SignalKind::Mentions => 1 << 1,
            SignalKind::Discussions => 1 << 2,
            SignalKind::Views => 1 << 3,
        }
    }
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SignalKind::SearchInterest => "google_trends",
            SignalKind::Mentions => "twitter_mentions",
            SignalKind::Discussions => "reddit_posts",
            SignalKind::Views => "youtube_views",
        };
        write!(f, "{s}")
    }
}

/// One adapter outcome. Synthetic values were substituted for a failed or
/// unconfigured upstream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawMetric {
    pub kind: SignalKind,
    pub value: f64,
    pub is_synthetic: bool,
}

impl RawMetric {
    pub fn live(kind: SignalKind, value: f64) -> Self {
        Self { kind, value, is_synthetic: false }
    }

    pub fn synthetic(kind: SignalKind, value: f64) -> Self {
        Self { kind, value, is_synthetic: true }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    pub google_trends: f64,
    pub twitter_mentions: f64,
    pub reddit_posts: f64,
    pub youtube_views: f64,
}

impl Metrics {
    /// Values shown for a creator that has never been synced.
    pub const UNSYNCED: Metrics = Metrics {
        google_trends: 50.0,
        twitter_mentions: 200.0,
        reddit_posts: 10.0,
        youtube_views: 5000.0,
    };

    pub fn get(&self, kind: SignalKind) -> f64 {
        match kind {
            SignalKind::SearchInterest => self.google_trends,
            SignalKind::Mentions => self.twitter_mentions,
            SignalKind::Discussions => self.reddit_posts,
            SignalKind::Views => self.youtube_views,
        }
    }
}

/// Which signals of a sample were synthetic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyntheticMask(u8);

impl SyntheticMask {
    pub fn from_bits(bits: u8) -> Self {
        Self(bits & 0b1111)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn set(&mut self, kind: SignalKind) {
        self.0 |= kind.bit();
    }

    pub fn contains(self, kind: SignalKind) -> bool {
        self.0 & kind.bit() != 0
    }

    pub fn any(self) -> bool {
        self.0 != 0
    }

    pub fn count(self) -> usize {
        self.0.count_ones() as usize
    }
}

/// One aggregation cycle's output for a subject. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSample {
    pub subject_id: String,
    #[serde(flatten)]
    pub metrics: Metrics,
    /// Cached score at sync time; readers recompute from `metrics`.
    pub reach_score: f64,
    pub synthetic: SyntheticMask,
    pub timestamp: DateTime<Utc>,
}

impl MetricSample {
    pub fn is_synthetic(&self) -> bool {
        self.synthetic.any()
    }
}

/// Parse a user-supplied number, rejecting non-finite values.
pub fn parse_number(field: &'static str, raw: &str) -> Result<f64, InputError> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| InputError::InvalidNumber {
            field,
            value: raw.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("score", " 62.5 ").unwrap(), 62.5);
        assert_eq!(
            parse_number("threshold", "seventy"),
            Err(InputError::InvalidNumber {
                field: "threshold",
                value: "seventy".to_string()
            })
        );
        assert!(parse_number("score", "NaN").is_err());
        assert!(parse_number("score", "inf").is_err());
    }

    #[test]
    fn test_subject_key_strips_at() {
        let key = SubjectKey::new("Kai Cenat", "@kaicenat").unwrap();
        assert_eq!(key.handle(), "kaicenat");
        assert_eq!(key.display_name(), "Kai Cenat");
    }

    #[test]
    fn test_query_for_routes_by_kind() {
        let key = SubjectKey::new("Adin Ross", "@adinross").unwrap();
        assert_eq!(key.query_for(SignalKind::SearchInterest), "Adin Ross");
        assert_eq!(key.query_for(SignalKind::Discussions), "Adin Ross");
        assert_eq!(key.query_for(SignalKind::Mentions), "adinross");
        assert_eq!(key.query_for(SignalKind::Views), "adinross");
    }

    #[test]
    fn test_subject_key_rejects_missing_fields() {
        assert_eq!(SubjectKey::new("  ", "@x"), Err(InputError::MissingDisplayName));
        assert_eq!(SubjectKey::new("Name", "@"), Err(InputError::MissingHandle));
        assert_eq!(SubjectKey::new("Name", ""), Err(InputError::MissingHandle));
        assert!(matches!(
            SubjectKey::new("Name", "@bad handle!"),
            Err(InputError::InvalidHandle(_))
        ));
    }

    #[test]
    fn test_subject_key_accepts_channel_style_handles() {
        let key = SubjectKey::new("Some Channel", "@some-channel").unwrap();
        assert_eq!(key.handle(), "some-channel");
        assert_eq!(SubjectKey::new("Dots", "@first.last_99").unwrap().handle(), "first.last_99");
        assert_eq!(SubjectKey::new("Ünï", "ünïcode").unwrap().handle(), "ünïcode");
    }

    #[test]
    fn test_synthetic_mask() {
        let mut mask = SyntheticMask::default();
        assert!(!mask.any());
        mask.set(SignalKind::Mentions);
        mask.set(SignalKind::Views);
        assert!(mask.contains(SignalKind::Mentions));
        assert!(!mask.contains(SignalKind::SearchInterest));
        assert_eq!(mask.count(), 2);
        assert_eq!(SyntheticMask::from_bits(mask.bits()), mask);
    }

    #[test]
    fn test_sample_serializes_flat_camel_case() {
        let sample = MetricSample {
            subject_id: "cr1".to_string(),
            metrics: Metrics {
                google_trends: 80.0,
                twitter_mentions: 500.0,
                reddit_posts: 30.0,
                youtube_views: 20000.0,
            },
            reach_score: 52.0,
            synthetic: SyntheticMask::default(),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&sample).unwrap();
        assert_eq!(json["googleTrends"], 80.0);
        assert_eq!(json["youtubeViews"], 20000.0);
        assert_eq!(json["reachScore"], 52.0);
        assert!(json["timestamp"].is_string());
    }
}
