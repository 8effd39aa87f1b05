use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::data::source::{FetchError, SignalSource};
use crate::data::types::{SignalKind, SubjectKey};

const TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";
const SEARCH_URL: &str = "https://oauth.reddit.com/search";
const USER_AGENT: &str = "ReachMarkets/1.0";

#[derive(Debug, Clone)]
pub struct RedditCredentials {
    pub client_id: String,
    pub client_secret: String,
}

/// Discussion-count adapter: posts matching the keyword over the last day.
pub struct RedditClient {
    client: Client,
    credentials: Option<RedditCredentials>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    children: Vec<serde_json::Value>,
}

impl RedditClient {
    pub fn new(client: Client, credentials: Option<RedditCredentials>) -> Self {
        Self { client, credentials }
    }

    async fn access_token(&self, creds: &RedditCredentials) -> Result<String, FetchError> {
        let token: TokenResponse = self
            .client
            .post(TOKEN_URL)
            .basic_auth(&creds.client_id, Some(&creds.client_secret))
            .header("User-Agent", USER_AGENT)
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        token
            .access_token
            .ok_or_else(|| FetchError::MalformedPayload("Token response has no access_token".to_string()))
    }

    pub async fn discussion_count(&self, keyword: &str) -> Result<f64, FetchError> {
        let creds = self
            .credentials
            .as_ref()
            .ok_or(FetchError::MissingCredentials("Reddit"))?;
        let token = self.access_token(creds).await?;

        let body = self
            .client
            .get(SEARCH_URL)
            .bearer_auth(token)
            .header("User-Agent", USER_AGENT)
            .query(&[("q", keyword), ("sort", "new"), ("limit", "100"), ("t", "day")])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        parse_post_count(&body)
    }
}

#[async_trait]
impl SignalSource for RedditClient {
    fn kind(&self) -> SignalKind {
        SignalKind::Discussions
    }

    async fn fetch(&self, key: &SubjectKey) -> Result<f64, FetchError> {
        self.discussion_count(key.query_for(SignalKind::Discussions)).await
    }
}

fn parse_post_count(body: &str) -> Result<f64, FetchError> {
    let listing: Listing = serde_json::from_str(body)?;
    Ok(listing.data.children.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_post_count() {
        let body = r#"{"kind":"Listing","data":{"after":null,"children":[
            {"kind":"t3","data":{"title":"a"}},
            {"kind":"t3","data":{"title":"b"}},
            {"kind":"t3","data":{"title":"c"}}
        ]}}"#;
        assert_eq!(parse_post_count(body).unwrap(), 3.0);
    }

    #[test]
    fn test_parse_post_count_malformed() {
        assert!(matches!(
            parse_post_count(r#"{"error":401}"#),
            Err(FetchError::MalformedPayload(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_credentials() {
        let client = RedditClient::new(Client::new(), None);
        let key = SubjectKey::new("Hasan Piker", "@hasanthehun").unwrap();
        assert!(matches!(
            client.fetch(&key).await,
            Err(FetchError::MissingCredentials("Reddit"))
        ));
    }
}
