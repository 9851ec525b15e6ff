//! Search API client producing ranked candidate URLs.

use crate::config::{Config, Credentials};
use crate::error::{AppError, Result};
use crate::models::SearchCandidate;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

/// The API refuses `start + num` beyond this.
const MAX_RESULT_INDEX: u32 = 100;

/// Keyword and location terms of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SearchQuery {
    pub keyword: String,
    pub location: String,
}

impl SearchQuery {
    pub(crate) fn new(keyword: &str, location: &str) -> Self {
        Self {
            keyword: keyword.trim().to_string(),
            location: location.trim().to_string(),
        }
    }

    /// Query string sent to the search API.
    pub(crate) fn text(&self) -> String {
        format!("{} {}", self.keyword, self.location).trim().to_string()
    }
}

/// One page of results and the token for the next one.
#[derive(Debug, Clone, Default)]
pub(crate) struct SearchPage {
    pub candidates: Vec<SearchCandidate>,
    pub next_page_token: Option<String>,
}

#[async_trait]
pub(crate) trait SearchProvider: Send + Sync {
    /// Fetches one page. `page_token` is `None` for the first page.
    async fn search(
        &self,
        query: &SearchQuery,
        page_token: Option<&str>,
        page_size: u32,
    ) -> Result<SearchPage>;
}

#[derive(Deserialize, Debug, Default)]
struct ApiResponse {
    #[serde(default)]
    items: Vec<ApiItem>,
    queries: Option<ApiQueries>,
    error: Option<ApiError>,
}

#[derive(Deserialize, Debug)]
struct ApiItem {
    link: Option<String>,
    #[serde(default)]
    title: String,
    #[serde(default)]
    snippet: String,
}

#[derive(Deserialize, Debug)]
struct ApiQueries {
    #[serde(rename = "nextPage", default)]
    next_page: Vec<ApiPageRef>,
}

#[derive(Deserialize, Debug)]
struct ApiPageRef {
    #[serde(rename = "startIndex")]
    start_index: u32,
}

#[derive(Deserialize, Debug)]
struct ApiError {
    code: Option<u16>,
    #[serde(default)]
    message: String,
}

/// Google Custom Search JSON API.
pub(crate) struct GoogleCustomSearch {
    client: Client,
    endpoint: String,
    credentials: Credentials,
}

impl GoogleCustomSearch {
    pub(crate) fn new(config: &Config, credentials: Credentials) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            client,
            endpoint: config.search_endpoint.clone(),
            credentials,
        })
    }
}

fn into_page(response: ApiResponse) -> SearchPage {
    let candidates = response
        .items
        .into_iter()
        .filter_map(|item| {
            let url = item.link.filter(|l| !l.trim().is_empty())?;
            Some(SearchCandidate {
                url,
                title: item.title,
                snippet: item.snippet,
            })
        })
        .collect();

    let next_page_token = response
        .queries
        .and_then(|q| q.next_page.into_iter().next())
        .map(|p| p.start_index)
        .filter(|start| *start < MAX_RESULT_INDEX)
        .map(|start| start.to_string());

    SearchPage {
        candidates,
        next_page_token,
    }
}

#[async_trait]
impl SearchProvider for GoogleCustomSearch {
    async fn search(
        &self,
        query: &SearchQuery,
        page_token: Option<&str>,
        page_size: u32,
    ) -> Result<SearchPage> {
        let start = page_token.unwrap_or("1");
        let num = page_size.clamp(1, 10).to_string();
        let text = query.text();
        tracing::info!(target: "search_task", "Searching '{}' (start={})", text, start);

        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("key", self.credentials.api_key.as_str()),
                ("cx", self.credentials.search_engine_id.as_str()),
                ("q", text.as_str()),
                ("num", num.as_str()),
                ("start", start),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        let parsed: ApiResponse = serde_json::from_str(&body).map_err(|e| {
            AppError::Search(format!("Unreadable search response (status {}): {}", status, e))
        })?;

        if let Some(error) = parsed.error {
            return Err(AppError::Search(format!(
                "API error {}: {}",
                error.code.unwrap_or(status.as_u16()),
                error.message
            )));
        }
        if !status.is_success() {
            return Err(AppError::Search(format!("Search API returned status {}", status)));
        }

        let page = into_page(parsed);
        tracing::debug!(target: "search_task",
            "Search page returned {} candidates, next page: {:?}",
            page.candidates.len(), page.next_page_token
        );
        Ok(page)
    }
}
