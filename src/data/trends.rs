use async_trait::async_trait;
use chrono::{Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::data::source::{FetchError, SignalSource};
use crate::data::types::{SignalKind, SubjectKey};

const EXPLORE_URL: &str = "https://trends.google.com/trends/api/explore";
const MULTILINE_URL: &str = "https://trends.google.com/trends/api/widgetdata/multiline";

/// Points averaged from the end of the interest-over-time series.
const RECENT_POINTS: usize = 5;
const LOOKBACK_DAYS: i64 = 7;

/// Search-interest adapter backed by the public Google Trends widget API.
pub struct TrendsClient {
    client: Client,
}

#[derive(Debug, Deserialize)]
struct ExploreResponse {
    #[serde(default)]
    widgets: Vec<ExploreWidget>,
}

#[derive(Debug, Deserialize)]
struct ExploreWidget {
    id: String,
    token: Option<String>,
    request: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct MultilineResponse {
    default: MultilineDefault,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MultilineDefault {
    #[serde(default)]
    timeline_data: Vec<TimelinePoint>,
}

#[derive(Debug, Deserialize)]
struct TimelinePoint {
    #[serde(default)]
    value: Vec<f64>,
}

impl TrendsClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Interest over the last week, averaged over the most recent points.
    pub async fn interest_over_time(&self, keyword: &str) -> Result<f64, FetchError> {
        let end = Utc::now();
        let start = end - Duration::days(LOOKBACK_DAYS);
        let explore_req = json!({
            "comparisonItem": [{
                "keyword": keyword,
                "geo": "",
                "time": format!("{} {}", start.format("%Y-%m-%d"), end.format("%Y-%m-%d")),
            }],
            "category": 0,
            "property": "",
        });

        let explore_req = explore_req.to_string();
        let body = self
            .client
            .get(EXPLORE_URL)
            .query(&[("hl", "en-US"), ("tz", "0"), ("req", explore_req.as_str())])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        let explore: ExploreResponse = serde_json::from_str(strip_guard(&body)?)?;

        let widget = explore
            .widgets
            .into_iter()
            .find(|w| w.id == "TIMESERIES")
            .ok_or_else(|| FetchError::MalformedPayload("No TIMESERIES widget".to_string()))?;
        let token = widget
            .token
            .ok_or_else(|| FetchError::MalformedPayload("Widget has no token".to_string()))?;
        let request = widget
            .request
            .ok_or_else(|| FetchError::MalformedPayload("Widget has no request".to_string()))?;

        let request = request.to_string();
        let body = self
            .client
            .get(MULTILINE_URL)
            .query(&[
                ("hl", "en-US"),
                ("tz", "0"),
                ("req", request.as_str()),
                ("token", token.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        parse_interest(&body)
    }
}

#[async_trait]
impl SignalSource for TrendsClient {
    fn kind(&self) -> SignalKind {
        SignalKind::SearchInterest
    }

    async fn fetch(&self, key: &SubjectKey) -> Result<f64, FetchError> {
        self.interest_over_time(key.query_for(SignalKind::SearchInterest)).await
    }
}

/// Google prefixes JSON bodies with an anti-XSSI guard like `)]}',`.
fn strip_guard(body: &str) -> Result<&str, FetchError> {
    body.find('{')
        .map(|start| &body[start..])
        .ok_or_else(|| FetchError::MalformedPayload("No JSON object in Trends body".to_string()))
}

fn parse_interest(body: &str) -> Result<f64, FetchError> {
    let parsed: MultilineResponse = serde_json::from_str(strip_guard(body)?)?;
    average_recent(&parsed.default.timeline_data, RECENT_POINTS)
        .ok_or_else(|| FetchError::MalformedPayload("No timeline data from Google Trends".to_string()))
}

/// Rounded mean of the first series over the last `n` points.
fn average_recent(points: &[TimelinePoint], n: usize) -> Option<f64> {
    if points.is_empty() || n == 0 {
        return None;
    }
    let recent = &points[points.len().saturating_sub(n)..];
    let sum: f64 = recent
        .iter()
        .map(|p| p.value.first().copied().unwrap_or(0.0))
        .sum();
    Some((sum / recent.len() as f64).round())
}
