use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use super::{AiError, ImageSearchProvider};

const GOOGLE_SEARCH_ENDPOINT: &str = "https://www.googleapis.com/customsearch/v1";

/// Google Custom Search client constrained to image results.
///
/// Reference images are best-effort: missing credentials and provider
/// failures both yield an empty list, never an error.
pub struct GoogleImageSearch {
    endpoint: String,
    credentials: Option<Credentials>,
    client: Client,
}

struct Credentials {
    api_key: String,
    cse_id: String,
}

impl GoogleImageSearch {
    /// Both values must be present for searches to run; otherwise every
    /// call returns an empty list.
    pub fn new(api_key: Option<String>, cse_id: Option<String>) -> Self {
        let credentials = match (api_key, cse_id) {
            (Some(api_key), Some(cse_id)) if !api_key.is_empty() && !cse_id.is_empty() => {
                Some(Credentials { api_key, cse_id })
            }
            _ => None,
        };
        Self {
            endpoint: GOOGLE_SEARCH_ENDPOINT.into(),
            credentials,
            client: Client::new(),
        }
    }

    pub fn has_credentials(&self) -> bool {
        self.credentials.is_some()
    }

    /// Override the endpoint (tests).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    async fn run_search(&self, query: &str, count: usize) -> Result<Vec<String>, AiError> {
        let creds = match self.credentials.as_ref() {
            Some(c) => c,
            None => {
                log::warn!("Image search skipped: Google Search API credentials missing");
                return Ok(Vec::new());
            }
        };

        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("key", creds.api_key.as_str()),
                ("cx", creds.cse_id.as_str()),
                ("searchType", "image"),
                ("q", query),
                ("num", &count.to_string()),
            ])
            .send()
            .await
            .map_err(|e| AiError::ConnectionError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(AiError::ConnectionError(format!(
                "HTTP {}: {}",
                status, error_body
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| AiError::InvalidResponse(format!("bad JSON: {e}")))?;

        Ok(parse_search_links(&body, count))
    }
}

/// Pull `items[].link` out of a Custom Search response, capped at `count`.
/// A missing or malformed `items` array means no results.
fn parse_search_links(body: &Value, count: usize) -> Vec<String> {
    body.get("items")
        .and_then(|i| i.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get("link").and_then(|l| l.as_str()))
                .take(count)
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl ImageSearchProvider for GoogleImageSearch {
    async fn search(&self, query: &str, count: usize) -> Result<Vec<String>, AiError> {
        match self.run_search(query, count).await {
            Ok(links) => {
                log::info!(
                    "Image search for {:?} returned {} result(s)",
                    query,
                    links.len()
                );
                Ok(links)
            }
            Err(e) => {
                log::error!("Google image search error: {}", e);
                Ok(Vec::new())
            }
        }
    }

    fn name(&self) -> &str {
        "google-image-search"
    }
}
