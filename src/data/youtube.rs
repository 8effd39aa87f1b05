use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::data::source::{FetchError, SignalSource};
use crate::data::types::{SignalKind, SubjectKey};

const SEARCH_URL: &str = "https://www.googleapis.com/youtube/v3/search";
const VIDEOS_URL: &str = "https://www.googleapis.com/youtube/v3/videos";

/// Recent uploads summed for the view count.
const RECENT_VIDEOS: &str = "10";

/// View-count adapter for the YouTube Data API v3.
pub struct YouTubeClient {
    client: Client,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: SearchItemId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchItemId {
    channel_id: Option<String>,
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VideosResponse {
    #[serde(default)]
    items: Vec<VideoItem>,
}

#[derive(Debug, Deserialize)]
struct VideoItem {
    statistics: Option<VideoStatistics>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoStatistics {
    /// The API encodes counts as decimal strings.
    view_count: Option<String>,
}

impl YouTubeClient {
    pub fn new(client: Client, api_key: Option<String>) -> Self {
        Self { client, api_key }
    }

    async fn search(&self, key: &str, params: &[(&str, &str)]) -> Result<String, FetchError> {
        let body = self
            .client
            .get(SEARCH_URL)
            .query(params)
            .query(&[("key", key)])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(body)
    }

    /// Total views across the channel's most recent uploads.
    pub async fn recent_views(&self, channel: &str) -> Result<f64, FetchError> {
        let key = self
            .api_key
            .as_deref()
            .ok_or(FetchError::MissingCredentials("YouTube"))?;

        let body = self
            .search(
                key,
                &[("part", "snippet"), ("q", channel), ("type", "channel"), ("maxResults", "1")],
            )
            .await?;
        let channel_id = parse_channel_id(&body)?
            .ok_or_else(|| FetchError::NotFound(format!("YouTube channel {channel}")))?;

        let body = self
            .search(
                key,
                &[
                    ("part", "id"),
                    ("channelId", channel_id.as_str()),
                    ("order", "date"),
                    ("maxResults", RECENT_VIDEOS),
                    ("type", "video"),
                ],
            )
            .await?;
        let video_ids = parse_video_ids(&body)?;
        if video_ids.is_empty() {
            return Ok(0.0);
        }

        let ids = video_ids.join(",");
        let body = self
            .client
            .get(VIDEOS_URL)
            .query(&[("part", "statistics"), ("id", ids.as_str()), ("key", key)])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        parse_total_views(&body)
    }
}

#[async_trait]
impl SignalSource for YouTubeClient {
    fn kind(&self) -> SignalKind {
        SignalKind::Views
    }

    async fn fetch(&self, key: &SubjectKey) -> Result<f64, FetchError> {
        self.recent_views(key.query_for(SignalKind::Views)).await
    }
}

fn parse_channel_id(body: &str) -> Result<Option<String>, FetchError> {
    let parsed: SearchResponse = serde_json::from_str(body)?;
    Ok(parsed.items.into_iter().find_map(|i| i.id.channel_id))
}

fn parse_video_ids(body: &str) -> Result<Vec<String>, FetchError> {
    let parsed: SearchResponse = serde_json::from_str(body)?;
    Ok(parsed.items.into_iter().filter_map(|i| i.id.video_id).collect())
}

fn parse_total_views(body: &str) -> Result<f64, FetchError> {
    let parsed: VideosResponse = serde_json::from_str(body)?;
    let total = parsed
        .items
        .iter()
        .filter_map(|v| v.statistics.as_ref())
        .filter_map(|s| s.view_count.as_deref())
        .map(|c| c.parse::<u64>().unwrap_or(0))
        .fold(0u64, u64::saturating_add);
    Ok(total as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_channel_id() {
        let body = r#"{"items":[{"id":{"kind":"youtube#channel","channelId":"UC123"}}]}"#;
        assert_eq!(parse_channel_id(body).unwrap(), Some("UC123".to_string()));
        assert_eq!(parse_channel_id(r#"{"items":[]}"#).unwrap(), None);
    }

    #[test]
    fn test_parse_video_ids() {
        let body = r#"{"items":[{"id":{"videoId":"a"}},{"id":{"videoId":"b"}},{"id":{}}]}"#;
        assert_eq!(parse_video_ids(body).unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_parse_total_views() {
        let body = r#"{"items":[
            {"statistics":{"viewCount":"12000","likeCount":"5"}},
            {"statistics":{"viewCount":"3500"}},
            {"statistics":{}},
            {}
        ]}"#;
        assert_eq!(parse_total_views(body).unwrap(), 15500.0);
    }

    #[test]
    fn test_parse_total_views_saturates() {
        let body = r#"{"items":[
            {"statistics":{"viewCount":"18446744073709551615"}},
            {"statistics":{"viewCount":"18446744073709551615"}}
        ]}"#;
        assert_eq!(parse_total_views(body).unwrap(), u64::MAX as f64);
    }

    #[tokio::test]
    async fn test_missing_api_key() {
        let client = YouTubeClient::new(Client::new(), None);
        let key = SubjectKey::new("Pokimane", "@pokimanelol").unwrap();
        assert!(matches!(
            client.fetch(&key).await,
            Err(FetchError::MissingCredentials("YouTube"))
        ));
    }
}
