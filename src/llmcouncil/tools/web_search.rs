//! Web search providers.
//!
//! [`TavilySearch`] needs an API key and is tried first; [`DuckDuckGoSearch`] scrapes the
//! DuckDuckGo HTML endpoint and needs no credentials. The executor walks them in that order.

use crate::llmcouncil::tool_protocol::ToolError;
use crate::llmcouncil::tools::default_http_client;
use async_trait::async_trait;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};

pub const TAVILY_ENDPOINT: &str = "https://api.tavily.com/search";
pub const DUCKDUCKGO_ENDPOINT: &str = "https://html.duckduckgo.com/html/";

/// One search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// A web search backend.
///
/// Returning an empty list is a valid answer; only `Err` makes the executor move on to the
/// next provider.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Short identifier used in logs and error messages.
    fn name(&self) -> &str;

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>, ToolError>;
}

/// Render results the way models see them.
pub fn format_search_results(results: &[SearchResult]) -> String {
    if results.is_empty() {
        return "No results found.".to_string();
    }
    let entries: Vec<String> = results
        .iter()
        .enumerate()
        .map(|(idx, r)| format!("{}. {}\n   URL: {}\n   {}", idx + 1, r.title, r.url, r.snippet))
        .collect();
    format!("Web search results:\n\n{}", entries.join("\n\n"))
}

/// Tavily search API client.
pub struct TavilySearch {
    client: reqwest::Client,
    api_key: Option<String>,
    endpoint: String,
}

#[derive(Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyHit>,
}

#[derive(Deserialize)]
struct TavilyHit {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
}

impl TavilySearch {
    /// A missing key is not an error here; searches fail with a provider error instead so the
    /// fallback chain moves on.
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: default_http_client(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            endpoint: TAVILY_ENDPOINT.to_string(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl SearchProvider for TavilySearch {
    fn name(&self) -> &str {
        "tavily"
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>, ToolError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ToolError::Provider("TAVILY_API_KEY is not configured".to_string()))?;

        let payload = serde_json::json!({
            "api_key": api_key,
            "query": query,
            "search_depth": "basic",
            "max_results": max_results,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ToolError::Provider(format!("Tavily request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::Provider(format!(
                "Tavily returned HTTP {}",
                status.as_u16()
            )));
        }

        let body: TavilyResponse = response
            .json()
            .await
            .map_err(|e| ToolError::Provider(format!("Tavily response was not valid JSON: {}", e)))?;

        Ok(body
            .results
            .into_iter()
            .take(max_results)
            .map(|hit| SearchResult {
                title: hit.title.unwrap_or_else(|| "No title".to_string()),
                url: hit.url,
                snippet: hit.content,
            })
            .collect())
    }
}

/// DuckDuckGo HTML search; no API key required.
pub struct DuckDuckGoSearch {
    client: reqwest::Client,
    endpoint: String,
}

impl DuckDuckGoSearch {
    pub fn new() -> Self {
        Self {
            client: default_http_client(),
            endpoint: DUCKDUCKGO_ENDPOINT.to_string(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

impl Default for DuckDuckGoSearch {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SearchProvider for DuckDuckGoSearch {
    fn name(&self) -> &str {
        "duckduckgo"
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>, ToolError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("q", query)])
            .send()
            .await
            .map_err(|e| ToolError::Provider(format!("DuckDuckGo request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::Provider(format!(
                "DuckDuckGo returned HTTP {}",
                status.as_u16()
            )));
        }

        let html = response
            .text()
            .await
            .map_err(|e| ToolError::Provider(format!("Failed to read DuckDuckGo response: {}", e)))?;

        parse_duckduckgo_results(&html, max_results)
    }
}

fn selector(css: &str) -> Result<Selector, ToolError> {
    Selector::parse(css)
        .map_err(|e| ToolError::ExecutionFailed(format!("invalid selector '{}': {:?}", css, e)))
}

/// Pull results out of a DuckDuckGo HTML results page. Ads are skipped.
pub fn parse_duckduckgo_results(html: &str, max_results: usize) -> Result<Vec<SearchResult>, ToolError> {
    let document = Html::parse_document(html);
    let result_sel = selector("div.result")?;
    let link_sel = selector("a.result__a")?;
    let snippet_sel = selector(".result__snippet")?;

    let mut results = Vec::new();
    for block in document.select(&result_sel) {
        if results.len() >= max_results {
            break;
        }
        if block.value().classes().any(|c| c == "result--ad") {
            continue;
        }
        let Some(link) = block.select(&link_sel).next() else {
            continue;
        };
        let href = link.value().attr("href").unwrap_or_default();
        let url = clean_duckduckgo_url(href);
        if url.is_empty() {
            continue;
        }
        let title = collapse_whitespace(&link.text().collect::<String>());
        let snippet = block
            .select(&snippet_sel)
            .next()
            .map(|s| collapse_whitespace(&s.text().collect::<String>()))
            .unwrap_or_default();

        results.push(SearchResult {
            title: if title.is_empty() { "No title".to_string() } else { title },
            url,
            snippet,
        });
    }
    Ok(results)
}

/// DuckDuckGo wraps outbound links in a redirect carrying the target in `uddg`.
fn clean_duckduckgo_url(href: &str) -> String {
    if let Some(encoded) = href.split("uddg=").nth(1) {
        let encoded = encoded.split('&').next().unwrap_or(encoded);
        return urlencoding::decode(encoded)
            .map(|decoded| decoded.into_owned())
            .unwrap_or_else(|_| encoded.to_string());
    }
    if href.starts_with("//") {
        return format!("https:{}", href);
    }
    if href.starts_with('/') {
        return String::new();
    }
    href.to_string()
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
