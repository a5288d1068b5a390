//! Tool Executor
//!
//! Runs one named tool call against its backing providers and always answers with a
//! [`ToolOutcome`]; no error crosses this boundary. Every tool with external backends owns an
//! ordered fallback chain: providers are tried in order and the chain only moves on when a
//! provider fails at the provider level (missing credential, transport error, non-2xx status,
//! attempt timeout). An empty result set is an answer and stops the chain.
//!
//! Hard limits come from [`ToolLimits`]: at most `max_results` search hits, at most
//! `max_output_chars` characters of output (the truncation marker counts against the budget),
//! and `attempt_timeout` of wall clock per provider attempt.
//!
//! # Example
//!
//! ```rust
//! use llmcouncil::config::ToolLimits;
//! use llmcouncil::tool_executor::ToolExecutor;
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let executor = ToolExecutor::new(ToolLimits::default());
//! let outcome = executor
//!     .execute("calculator", &json!({"expression": "sqrt(16) + 2 ** 3"}))
//!     .await;
//! assert_eq!(outcome.text, "12");
//!
//! let outcome = executor.execute("teleport", &json!({})).await;
//! assert!(outcome.error.is_some());
//! # }
//! ```

use crate::llmcouncil::config::{CouncilConfig, ToolLimits};
use crate::llmcouncil::tool_protocol::{
    required_str, ToolCallRecord, ToolCallRequest, ToolDefinition, ToolError, ToolOutcome,
};
use crate::llmcouncil::tools::calculator::{format_number, Calculator, CalculatorErrorKind};
use crate::llmcouncil::tools::url_fetch::{render_page, validate_url, PageFetcher};
use crate::llmcouncil::tools::web_search::{format_search_results, SearchProvider};
use crate::llmcouncil::tools::wikipedia::EncyclopediaProvider;
use crate::llmcouncil::tools::{
    tool_definitions, DuckDuckGoSearch, HttpPageFetcher, TavilySearch, WikipediaClient,
    CALCULATOR, GET_URL_CONTENT, WEB_SEARCH, WIKIPEDIA_SEARCH,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

pub const TRUNCATION_MARKER: &str = "\n\n[Content truncated due to length...]";

/// Cut `text` down to `max_chars` characters, marker included.
pub fn truncate_output(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let marker_len = TRUNCATION_MARKER.chars().count();
    let keep = max_chars.saturating_sub(marker_len);
    let mut truncated: String = text.chars().take(keep).collect();
    truncated.push_str(TRUNCATION_MARKER);
    truncated
}

pub struct ToolExecutor {
    limits: ToolLimits,
    definitions: Vec<ToolDefinition>,
    calculator: Calculator,
    search_providers: Vec<Arc<dyn SearchProvider>>,
    encyclopedias: Vec<Arc<dyn EncyclopediaProvider>>,
    page_fetchers: Vec<Arc<dyn PageFetcher>>,
}

impl ToolExecutor {
    /// An executor with the calculator only; add providers with the `with_*` builders.
    pub fn new(limits: ToolLimits) -> Self {
        Self {
            limits,
            definitions: tool_definitions(),
            calculator: Calculator::new(),
            search_providers: Vec::new(),
            encyclopedias: Vec::new(),
            page_fetchers: Vec::new(),
        }
    }

    /// The production wiring: Tavily then DuckDuckGo for search, Wikipedia, plain HTTP fetches.
    pub fn from_config(config: &CouncilConfig) -> Self {
        Self::new(config.limits.clone())
            .with_search_provider(Arc::new(TavilySearch::new(config.tavily_api_key.clone())))
            .with_search_provider(Arc::new(DuckDuckGoSearch::new()))
            .with_encyclopedia(Arc::new(WikipediaClient::new()))
            .with_page_fetcher(Arc::new(HttpPageFetcher::new()))
    }

    /// Append a search provider to the end of the fallback chain.
    pub fn with_search_provider(mut self, provider: Arc<dyn SearchProvider>) -> Self {
        self.search_providers.push(provider);
        self
    }

    pub fn with_encyclopedia(mut self, provider: Arc<dyn EncyclopediaProvider>) -> Self {
        self.encyclopedias.push(provider);
        self
    }

    pub fn with_page_fetcher(mut self, fetcher: Arc<dyn PageFetcher>) -> Self {
        self.page_fetchers.push(fetcher);
        self
    }

    /// Tool definitions advertised to models.
    pub fn definitions(&self) -> &[ToolDefinition] {
        &self.definitions
    }

    pub fn limits(&self) -> &ToolLimits {
        &self.limits
    }

    /// Run a tool by name. Failures come back as an outcome carrying readable error text.
    pub async fn execute(&self, name: &str, arguments: &serde_json::Value) -> ToolOutcome {
        let result = match name {
            WEB_SEARCH => self.web_search(arguments).await,
            CALCULATOR => self.calculate(arguments).await,
            WIKIPEDIA_SEARCH => self.wikipedia_search(arguments).await,
            GET_URL_CONTENT => self.get_url_content(arguments).await,
            other => Err(ToolError::UnsupportedTool(other.to_string())),
        };

        match result {
            Ok(text) => ToolOutcome::success(truncate_output(&text, self.limits.max_output_chars)),
            Err(err) => {
                log::warn!(
                    "llmcouncil::tool_executor::ToolExecutor::execute({}): {}",
                    name,
                    err
                );
                ToolOutcome::failure(&err)
            }
        }
    }

    /// Run a model-issued request and time it.
    pub async fn execute_request(&self, request: &ToolCallRequest) -> ToolCallRecord {
        let started = Instant::now();
        let outcome = self.execute(&request.name, &request.arguments).await;
        ToolCallRecord::new(request, outcome, started.elapsed())
    }

    async fn web_search(&self, arguments: &serde_json::Value) -> Result<String, ToolError> {
        let query = required_str(arguments, "query")?.to_string();
        let max_results = self.limits.max_results;
        let mut results = self
            .run_chain(WEB_SEARCH, &self.search_providers, |p| p.name().to_string(), |provider| {
                let query = query.clone();
                async move { provider.search(&query, max_results).await }
            })
            .await?;
        results.truncate(max_results);
        Ok(format_search_results(&results))
    }

    async fn wikipedia_search(&self, arguments: &serde_json::Value) -> Result<String, ToolError> {
        let query = required_str(arguments, "query")?.to_string();
        self.run_chain(WIKIPEDIA_SEARCH, &self.encyclopedias, |p| p.name().to_string(), |provider| {
            let query = query.clone();
            async move { provider.lookup(&query).await }
        })
        .await
    }

    async fn get_url_content(&self, arguments: &serde_json::Value) -> Result<String, ToolError> {
        let url = required_str(arguments, "url")?.to_string();
        validate_url(&url)?;
        let page = self
            .run_chain(GET_URL_CONTENT, &self.page_fetchers, |p| p.name().to_string(), |fetcher| {
                let url = url.clone();
                async move { fetcher.fetch(&url).await }
            })
            .await?;
        render_page(&url, &page)
    }

    async fn calculate(&self, arguments: &serde_json::Value) -> Result<String, ToolError> {
        let expression = required_str(arguments, "expression")?;
        self.calculator
            .evaluate(expression)
            .await
            .map(format_number)
            .map_err(|err| match err.kind() {
                CalculatorErrorKind::Disallowed => ToolError::Disallowed(err.message().to_string()),
                CalculatorErrorKind::Evaluation => ToolError::ExecutionFailed(err.to_string()),
            })
    }

    /// Try each provider in order under the per-attempt timeout.
    async fn run_chain<P, T, N, F, Fut>(
        &self,
        tool: &str,
        providers: &[Arc<P>],
        name_of: N,
        attempt: F,
    ) -> Result<T, ToolError>
    where
        P: ?Sized,
        N: Fn(&P) -> String,
        F: Fn(Arc<P>) -> Fut,
        Fut: Future<Output = Result<T, ToolError>>,
    {
        if providers.is_empty() {
            return Err(ToolError::Unavailable(format!(
                "no provider is configured for {}",
                tool
            )));
        }

        let mut failures = Vec::new();
        for provider in providers {
            let name = name_of(provider.as_ref());
            let outcome =
                match tokio::time::timeout(self.limits.attempt_timeout, attempt(provider.clone()))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(ToolError::Timeout(self.limits.attempt_timeout)),
                };

            match outcome {
                Ok(value) => {
                    if !failures.is_empty() {
                        log::info!(
                            "llmcouncil::tool_executor::ToolExecutor::run_chain({}): '{}' answered after {} failure(s)",
                            tool,
                            name,
                            failures.len()
                        );
                    }
                    return Ok(value);
                }
                Err(err) if err.is_provider_failure() => {
                    log::warn!(
                        "llmcouncil::tool_executor::ToolExecutor::run_chain({}): provider '{}' failed: {}",
                        tool,
                        name,
                        err
                    );
                    failures.push((name, err));
                }
                Err(err) => return Err(err),
            }
        }

        if failures.len() == 1 {
            if let Some((_, err)) = failures.pop() {
                return Err(err);
            }
        }
        let summary: Vec<String> = failures
            .iter()
            .map(|(name, err)| format!("{}: {}", name, err))
            .collect();
        Err(ToolError::Unavailable(format!(
            "all {} providers failed ({})",
            tool,
            summary.join("; ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llmcouncil::tools::url_fetch::FetchedPage;
    use crate::llmcouncil::tools::web_search::SearchResult;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct FixedSearch {
        hits: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SearchProvider for FixedSearch {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn search(&self, query: &str, _max: usize) -> Result<Vec<SearchResult>, ToolError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok((0..self.hits)
                .map(|i| SearchResult {
                    title: format!("{} #{}", query, i),
                    url: format!("https://example.com/{}", i),
                    snippet: "snippet".into(),
                })
                .collect())
        }
    }

    struct SlowFetcher;

    #[async_trait]
    impl PageFetcher for SlowFetcher {
        fn name(&self) -> &str {
            "slow"
        }

        async fn fetch(&self, url: &str) -> Result<FetchedPage, ToolError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(FetchedPage {
                url: url.to_string(),
                content_type: None,
                body: String::new(),
            })
        }
    }

    #[test]
    fn truncation_keeps_marker_inside_budget() {
        let long = "x".repeat(5000);
        let out = truncate_output(&long, 4000);
        assert_eq!(out.chars().count(), 4000);
        assert!(out.ends_with(TRUNCATION_MARKER));
        assert_eq!(truncate_output("short", 4000), "short");
    }

    #[tokio::test]
    async fn zero_results_do_not_fall_through() {
        let empty = Arc::new(FixedSearch {
            hits: 0,
            calls: AtomicUsize::new(0),
        });
        let backup = Arc::new(FixedSearch {
            hits: 2,
            calls: AtomicUsize::new(0),
        });
        let executor = ToolExecutor::new(ToolLimits::default())
            .with_search_provider(empty.clone())
            .with_search_provider(backup.clone());

        let outcome = executor.execute("web_search", &json!({"query": "nothing"})).await;
        assert_eq!(outcome.text, "No results found.");
        assert_eq!(backup.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn attempt_timeout_is_enforced() {
        let limits = ToolLimits {
            attempt_timeout: Duration::from_millis(50),
            ..ToolLimits::default()
        };
        let executor = ToolExecutor::new(limits).with_page_fetcher(Arc::new(SlowFetcher));
        let outcome = executor
            .execute("get_url_content", &json!({"url": "https://example.com"}))
            .await;
        assert!(outcome.error.unwrap().contains("Timed out"));
    }

    #[tokio::test]
    async fn missing_argument_names_the_parameter() {
        let executor = ToolExecutor::new(ToolLimits::default());
        let outcome = executor.execute("calculator", &json!({"expr": "1+1"})).await;
        assert!(outcome.text.contains("'expression'"));
    }

    #[tokio::test]
    async fn no_configured_provider_is_unavailable() {
        let executor = ToolExecutor::new(ToolLimits::default());
        let outcome = executor.execute("wikipedia_search", &json!({"query": "Rust"})).await;
        assert!(outcome.error.unwrap().starts_with("Tool unavailable"));
    }
}
