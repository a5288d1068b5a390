//! Tool executor behaviour across provider chains, limits and argument handling.

use async_trait::async_trait;
use llmcouncil::config::{CouncilConfig, ToolLimits};
use llmcouncil::tool_executor::{ToolExecutor, TRUNCATION_MARKER};
use llmcouncil::tool_protocol::{ToolCallRequest, ToolError};
use llmcouncil::tools::url_fetch::FetchedPage;
use llmcouncil::tools::{EncyclopediaProvider, PageFetcher, SearchProvider, SearchResult};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

struct BrokenSearch;

#[async_trait]
impl SearchProvider for BrokenSearch {
    fn name(&self) -> &str {
        "broken"
    }

    async fn search(&self, _query: &str, _max: usize) -> Result<Vec<SearchResult>, ToolError> {
        Err(ToolError::Provider("connection refused".to_string()))
    }
}

struct CannedSearch {
    hits: usize,
    calls: AtomicUsize,
}

impl CannedSearch {
    fn new(hits: usize) -> Self {
        Self {
            hits,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl SearchProvider for CannedSearch {
    fn name(&self) -> &str {
        "canned"
    }

    async fn search(&self, query: &str, _max: usize) -> Result<Vec<SearchResult>, ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok((1..=self.hits)
            .map(|i| SearchResult {
                title: format!("{} result {}", query, i),
                url: format!("https://example.org/{}", i),
                snippet: format!("snippet {}", i),
            })
            .collect())
    }
}

struct StaticPage {
    content_type: &'static str,
    body: String,
}

#[async_trait]
impl PageFetcher for StaticPage {
    fn name(&self) -> &str {
        "static"
    }

    async fn fetch(&self, url: &str) -> Result<FetchedPage, ToolError> {
        Ok(FetchedPage {
            url: url.to_string(),
            content_type: Some(self.content_type.to_string()),
            body: self.body.clone(),
        })
    }
}

struct SlowEncyclopedia;

#[async_trait]
impl EncyclopediaProvider for SlowEncyclopedia {
    fn name(&self) -> &str {
        "slow"
    }

    async fn lookup(&self, _query: &str) -> Result<String, ToolError> {
        tokio::time::sleep(Duration::from_secs(10)).await;
        Ok("too late".to_string())
    }
}

struct QuickEncyclopedia;

#[async_trait]
impl EncyclopediaProvider for QuickEncyclopedia {
    fn name(&self) -> &str {
        "quick"
    }

    async fn lookup(&self, query: &str) -> Result<String, ToolError> {
        Ok(format!("Wikipedia: {}\n\nA short summary.", query))
    }
}

fn limits() -> ToolLimits {
    ToolLimits {
        attempt_timeout: Duration::from_millis(100),
        ..ToolLimits::default()
    }
}

#[tokio::test]
async fn search_falls_back_when_the_primary_fails() {
    let fallback = Arc::new(CannedSearch::new(3));
    let executor = ToolExecutor::new(limits())
        .with_search_provider(Arc::new(BrokenSearch))
        .with_search_provider(fallback.clone());

    let request = ToolCallRequest::new("call_0", "web_search", json!({"query": "rust 2024"}));
    let record = executor.execute_request(&request).await;

    assert!(record.error.is_none());
    assert!(record.result.starts_with("Web search results:"));
    for i in 1..=3 {
        assert!(record.result.contains(&format!("{}. rust 2024 result {}", i, i)));
    }
    assert!(!record.result.contains("connection refused"));
    assert_eq!(fallback.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn every_provider_failing_is_reported_once() {
    let executor = ToolExecutor::new(limits())
        .with_search_provider(Arc::new(BrokenSearch))
        .with_search_provider(Arc::new(BrokenSearch));

    let outcome = executor.execute("web_search", &json!({"query": "x"})).await;
    let error = outcome.error.unwrap();
    assert!(error.starts_with("Tool unavailable: all web_search providers failed"));
    assert!(outcome.text.starts_with("Error: "));
}

#[tokio::test]
async fn search_results_are_capped() {
    let executor = ToolExecutor::new(ToolLimits {
        max_results: 2,
        ..limits()
    })
    .with_search_provider(Arc::new(CannedSearch::new(7)));

    let outcome = executor.execute("web_search", &json!({"query": "q"})).await;
    assert!(outcome.text.contains("2. q result 2"));
    assert!(!outcome.text.contains("3. q result 3"));
}

#[tokio::test]
async fn slow_provider_times_out_and_chain_moves_on() {
    let executor = ToolExecutor::new(limits())
        .with_encyclopedia(Arc::new(SlowEncyclopedia))
        .with_encyclopedia(Arc::new(QuickEncyclopedia));

    let outcome = executor
        .execute("wikipedia_search", &json!({"query": "Ferris"}))
        .await;
    assert!(outcome.is_success());
    assert!(outcome.text.starts_with("Wikipedia: Ferris"));
}

#[tokio::test]
async fn page_text_is_truncated_to_the_output_limit() {
    let body = format!(
        "<html><head><title>Long</title></head><body><main><p>{}</p></main></body></html>",
        "word ".repeat(2000)
    );
    let executor = ToolExecutor::new(limits()).with_page_fetcher(Arc::new(StaticPage {
        content_type: "text/html; charset=utf-8",
        body,
    }));

    let outcome = executor
        .execute("get_url_content", &json!({"url": "https://example.org/long"}))
        .await;
    assert!(outcome.is_success());
    assert!(outcome.text.starts_with("Content from: https://example.org/long\nTitle: Long"));
    assert_eq!(outcome.text.chars().count(), 4000);
    assert!(outcome.text.ends_with(TRUNCATION_MARKER));
}

#[tokio::test]
async fn bad_urls_never_reach_a_fetcher() {
    let executor = ToolExecutor::new(limits()).with_page_fetcher(Arc::new(StaticPage {
        content_type: "text/plain",
        body: "hello".to_string(),
    }));

    for url in ["ftp://example.org/file", "example.org", "https://"] {
        let outcome = executor.execute("get_url_content", &json!({ "url": url })).await;
        assert!(
            outcome.error.as_deref().unwrap().starts_with("Invalid arguments"),
            "{} should be rejected",
            url
        );
    }
}

#[tokio::test]
async fn missing_arguments_name_the_parameter() {
    let executor = ToolExecutor::new(limits());
    let outcome = executor.execute("calculator", &json!({})).await;
    assert!(outcome.error.unwrap().contains("expression"));

    let outcome = executor.execute("web_search", &json!({"query": "   "})).await;
    assert!(outcome.error.unwrap().contains("query"));
}

#[tokio::test]
async fn calculator_errors_are_tool_errors() {
    let executor = ToolExecutor::new(limits());

    let outcome = executor.execute("calculator", &json!({"expression": "1 / 0"})).await;
    assert!(outcome.error.unwrap().contains("not a finite number"));

    let outcome = executor
        .execute("calculator", &json!({"expression": "__import__('os')"}))
        .await;
    assert!(outcome.error.unwrap().starts_with("Disallowed expression"));
}

#[tokio::test]
async fn configured_executor_advertises_all_tools() {
    let executor = ToolExecutor::from_config(&CouncilConfig::default());
    let names: Vec<&str> = executor.definitions().iter().map(|d| d.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["web_search", "calculator", "wikipedia_search", "get_url_content"]
    );
}
