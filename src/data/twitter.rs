use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashSet;
use tracing::{info, warn};

use crate::data::source::{FetchError, SignalSource};
use crate::data::types::{SignalKind, SubjectKey};

const COUNTS_URL: &str = "https://api.twitter.com/2/tweets/counts/recent";
const SEARCH_URL: &str = "https://api.twitter.com/2/tweets/search/recent";
const USERS_URL: &str = "https://api.twitter.com/2/users";

const DISCOVERY_QUERY: &str = "(influencer OR creator OR streamer) -is:retweet";
const DISCOVERY_LIMIT: usize = 10;

/// Returned by discovery when the API is not reachable.
pub const PLACEHOLDER_TRENDING: [&str; 3] = ["@newviralcreator", "@trendingnow", "@hotinfluencer"];

/// Mention-count adapter for the X/Twitter v2 API.
pub struct TwitterClient {
    client: Client,
    bearer_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CountsResponse {
    meta: Option<CountsMeta>,
}

#[derive(Debug, Deserialize)]
struct CountsMeta {
    total_tweet_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<Tweet>,
}

#[derive(Debug, Deserialize)]
struct Tweet {
    author_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsersResponse {
    #[serde(default)]
    data: Vec<User>,
}

#[derive(Debug, Deserialize)]
struct User {
    username: String,
    public_metrics: Option<UserMetrics>,
}

#[derive(Debug, Deserialize)]
struct UserMetrics {
    #[serde(default)]
    followers_count: u64,
}

impl TwitterClient {
    pub fn new(client: Client, bearer_token: Option<String>) -> Self {
        Self { client, bearer_token }
    }

    fn token(&self) -> Result<&str, FetchError> {
        self.bearer_token
            .as_deref()
            .ok_or(FetchError::MissingCredentials("Twitter"))
    }

    /// Hourly-bucketed count of recent posts matching the handle.
    pub async fn mention_count(&self, handle: &str) -> Result<f64, FetchError> {
        let token = self.token()?;

        let body = self
            .client
            .get(COUNTS_URL)
            .bearer_auth(token)
            .query(&[("query", handle), ("granularity", "hour")])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        parse_mention_count(&body)
    }

    /// Top handles by follower count among authors of recent creator chatter.
    /// Without credentials, or on any failure, returns a fixed placeholder list.
    pub async fn discover_trending(&self) -> Vec<String> {
        match self.try_discover().await {
            Ok(handles) => {
                info!("Discovered {} trending handles", handles.len());
                handles
            }
            Err(e) => {
                warn!("Trending discovery unavailable: {e} - using placeholder list");
                PLACEHOLDER_TRENDING.iter().map(|s| s.to_string()).collect()
            }
        }
    }

    async fn try_discover(&self) -> Result<Vec<String>, FetchError> {
        let token = self.token()?;

        let search: SearchResponse = self
            .client
            .get(SEARCH_URL)
            .bearer_auth(token)
            .query(&[
                ("query", DISCOVERY_QUERY),
                ("max_results", "100"),
                ("tweet.fields", "public_metrics,author_id"),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let author_ids = unique_authors(&search.data);
        if author_ids.is_empty() {
            return Ok(Vec::new());
        }

        let users: UsersResponse = self
            .client
            .get(USERS_URL)
            .bearer_auth(token)
            .query(&[
                ("ids", author_ids.join(",")),
                ("user.fields", "username,public_metrics".to_string()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(rank_by_followers(users.data, DISCOVERY_LIMIT))
    }
}

#[async_trait]
impl SignalSource for TwitterClient {
    fn kind(&self) -> SignalKind {
        SignalKind::Mentions
    }

    async fn fetch(&self, key: &SubjectKey) -> Result<f64, FetchError> {
        self.mention_count(key.query_for(SignalKind::Mentions)).await
    }
}

fn parse_mention_count(body: &str) -> Result<f64, FetchError> {
    let parsed: CountsResponse = serde_json::from_str(body)?;
    parsed
        .meta
        .and_then(|m| m.total_tweet_count)
        .map(|c| c as f64)
        .ok_or_else(|| FetchError::MalformedPayload("Counts response has no total".to_string()))
}

/// Author ids in first-seen order, capped at the users-lookup limit of 100.
fn unique_authors(tweets: &[Tweet]) -> Vec<String> {
    let mut seen = HashSet::new();
    tweets
        .iter()
        .filter_map(|t| t.author_id.clone())
        .filter(|id| seen.insert(id.clone()))
        .take(100)
        .collect()
}

fn rank_by_followers(mut users: Vec<User>, limit: usize) -> Vec<String> {
    users.sort_by(|a, b| {
        let fa = a.public_metrics.as_ref().map_or(0, |m| m.followers_count);
        let fb = b.public_metrics.as_ref().map_or(0, |m| m.followers_count);
        fb.cmp(&fa)
    });
    users
        .into_iter()
        .take(limit)
        .map(|u| format!("@{}", u.username))
        .collect()
}
