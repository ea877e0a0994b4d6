//! Shared web-search plumbing: the Brave client, the module-wide rate
//! limiter, page fetching, and citation bookkeeping.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::{Error, Result};
use crate::services::storage::{ArtifactKind, FileStorage};

const BRAVE_SEARCH_URL: &str = "https://api.search.brave.com/res/v1/web/search";
const SEARCH_RESULT_COUNT: u32 = 3;
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);
const PARTIAL_CONTENT_CHARS: usize = 1000;

/// One hit from the search API. Citation numbers are 1-based and
/// contiguous within a single search call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub description: String,
    pub citation_number: usize,
}

/// A search hit with fetched page content attached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchedResult {
    #[serde(flatten)]
    pub result: SearchResult,
    pub content: String,
}

/// The search capability behind a seam so the pipelines can be driven by
/// canned results in tests.
#[async_trait]
pub trait SearchApi: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<SearchResult>>;
}

/// Spaces calls so at most one starts per interval. First caller goes
/// through immediately; later callers queue behind the last granted slot.
pub struct RateLimiter {
    min_interval: Duration,
    next_slot: Mutex<Instant>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            next_slot: Mutex::new(Instant::now()),
        }
    }

    pub async fn acquire(&self) {
        let scheduled = {
            let mut next_slot = self.next_slot.lock().await;
            let now = Instant::now();
            let scheduled = (*next_slot).max(now);
            *next_slot = scheduled + self.min_interval;
            scheduled
        };
        tokio::time::sleep_until(scheduled).await;
    }
}

/// Brave web-search client. All searches, standard and deep, share one
/// 1 request/second limiter.
pub struct BraveSearchClient {
    http: reqwest::Client,
    api_key: SecretString,
    limiter: Arc<RateLimiter>,
}

#[derive(Debug, Deserialize)]
struct BraveResponse {
    #[serde(default)]
    web: Option<BraveWebResults>,
}

#[derive(Debug, Deserialize)]
struct BraveWebResults {
    #[serde(default)]
    results: Vec<BraveHit>,
}

#[derive(Debug, Deserialize)]
struct BraveHit {
    title: String,
    url: String,
    #[serde(default)]
    description: String,
}

impl BraveSearchClient {
    pub fn new(http: reqwest::Client, api_key: SecretString) -> Self {
        Self {
            http,
            api_key,
            limiter: Arc::new(RateLimiter::new(Duration::from_secs(1))),
        }
    }
}

#[async_trait]
impl SearchApi for BraveSearchClient {
    async fn search(&self, query: &str) -> Result<Vec<SearchResult>> {
        self.limiter.acquire().await;

        let count = SEARCH_RESULT_COUNT.to_string();
        let response = self
            .http
            .get(BRAVE_SEARCH_URL)
            .header("Accept", "application/json")
            .header("X-Subscription-Token", self.api_key.expose_secret())
            .query(&[("q", query), ("count", count.as_str())])
            .timeout(FETCH_TIMEOUT)
            .send()
            .await
            .map_err(|e| Error::Provider(format!("Failed to perform web search: {}", e)))?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(Error::RateLimited(
                "Rate limit reached. Please try again later.".to_string(),
            ));
        }
        if !response.status().is_success() {
            let status = response.status();
            return Err(Error::Provider(format!("Brave search returned {}", status)));
        }

        let decoded = response
            .json::<BraveResponse>()
            .await
            .map_err(|e| Error::Provider(format!("Brave response decode failed: {}", e)))?;

        let hits = decoded.web.map(|w| w.results).unwrap_or_default();
        if hits.is_empty() {
            tracing::warn!("No results found for query: \"{}\"", truncate_chars(query, 50));
        }

        Ok(hits
            .into_iter()
            .enumerate()
            .map(|(i, hit)| SearchResult {
                title: hit.title,
                url: hit.url,
                description: hit.description,
                citation_number: i + 1,
            })
            .collect())
    }
}

/// Strip tags from an HTML document, one text node per line.
pub fn extract_text_from_html(html: &str) -> String {
    let document = scraper::Html::parse_document(html);
    document
        .root_element()
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// First `max` characters of a string, on char boundaries.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

async fn get_page_text(http: &reqwest::Client, url: &str) -> String {
    let response = match http.get(url).timeout(FETCH_TIMEOUT).send().await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!("Error fetching content for {}: {}", url, e);
            return String::new();
        }
    };
    match response.text().await {
        Ok(html) => extract_text_from_html(&html),
        Err(e) => {
            tracing::error!("Error reading content for {}: {}", url, e);
            String::new()
        }
    }
}

/// Fetch the first 1000 characters of text for each hit, concurrently.
/// Fetch errors yield empty content, never failure. Each fetched result is
/// persisted under the per-(user, system message) folder.
pub async fn fetch_partial_content(
    http: &reqwest::Client,
    storage: &FileStorage,
    results: Vec<SearchResult>,
    user_id: i32,
    system_message_id: i32,
) -> Vec<FetchedResult> {
    let fetches = results.iter().map(|result| get_page_text(http, &result.url));
    let contents = futures::future::join_all(fetches).await;

    let mut fetched = Vec::with_capacity(results.len());
    for (result, content) in results.into_iter().zip(contents) {
        let partial = FetchedResult {
            content: truncate_chars(&content, PARTIAL_CONTENT_CHARS).to_string(),
            result,
        };
        persist_result(
            storage,
            user_id,
            system_message_id,
            &format!("partial_result_{}.json", partial.result.citation_number),
            &partial,
        )
        .await;
        fetched.push(partial);
    }
    fetched
}

/// Fetch the full page text for each hit, concurrently, reassigning
/// citation numbers to be unique across the combined set.
pub async fn fetch_full_content(
    http: &reqwest::Client,
    storage: &FileStorage,
    results: Vec<SearchResult>,
    user_id: i32,
    system_message_id: i32,
) -> Vec<FetchedResult> {
    tracing::info!("Starting to fetch full content for {} results", results.len());

    let fetches = results.iter().map(|result| get_page_text(http, &result.url));
    let contents = futures::future::join_all(fetches).await;

    let mut fetched: Vec<FetchedResult> = results
        .into_iter()
        .zip(contents)
        .map(|(result, content)| FetchedResult { result, content })
        .collect();
    assign_unique_citations(&mut fetched);

    for item in &fetched {
        persist_result(
            storage,
            user_id,
            system_message_id,
            &format!("result_{}.json", item.result.citation_number),
            item,
        )
        .await;
    }

    tracing::info!("Completed fetching full content for {} results", fetched.len());
    fetched
}

/// Make citation numbers unique across a merged result set by bumping
/// duplicates to the next free number.
pub fn assign_unique_citations(results: &mut [FetchedResult]) {
    let mut used = std::collections::HashSet::new();
    for item in results.iter_mut() {
        let mut citation = item.result.citation_number;
        while !used.insert(citation) {
            citation += 1;
        }
        item.result.citation_number = citation;
    }
}

async fn persist_result(
    storage: &FileStorage,
    user_id: i32,
    system_message_id: i32,
    file_name: &str,
    result: &FetchedResult,
) {
    let path = match storage
        .artifact_path(user_id, system_message_id, ArtifactKind::WebSearchResults, file_name)
        .await
    {
        Ok(path) => path,
        Err(e) => {
            tracing::error!("Error resolving path for {}: {}", file_name, e);
            return;
        }
    };
    let body = match serde_json::to_string_pretty(result) {
        Ok(body) => body,
        Err(e) => {
            tracing::error!("Error serializing {}: {}", file_name, e);
            return;
        }
    };
    if let Err(e) = tokio::fs::write(&path, body).await {
        tracing::error!("Error saving file for result {}: {}", file_name, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fetched(url: &str, citation: usize) -> FetchedResult {
        FetchedResult {
            result: SearchResult {
                title: format!("title {}", citation),
                url: url.to_string(),
                description: String::new(),
                citation_number: citation,
            },
            content: String::new(),
        }
    }

    #[test]
    fn html_extraction_strips_tags() {
        let html = "<html><body><h1>Header</h1><p>Some <b>bold</b> text.</p></body></html>";
        let text = extract_text_from_html(html);
        assert!(text.contains("Header"));
        assert!(text.contains("bold"));
        assert!(!text.contains('<'));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo wörld", 5), "héllo");
        assert_eq!(truncate_chars("short", 100), "short");
    }

    #[test]
    fn duplicate_citations_are_bumped() {
        let mut results = vec![
            fetched("https://a.example", 1),
            fetched("https://b.example", 2),
            fetched("https://c.example", 1),
            fetched("https://d.example", 2),
        ];
        assign_unique_citations(&mut results);
        let numbers: Vec<usize> = results.iter().map(|r| r.result.citation_number).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4]);
    }

    #[tokio::test(start_paused = true)]
    async fn limiter_spaces_three_calls_over_two_seconds() {
        let limiter = RateLimiter::new(Duration::from_secs(1));
        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn limiter_first_call_is_immediate() {
        let limiter = RateLimiter::new(Duration::from_secs(1));
        let start = Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(100));
    }
}
