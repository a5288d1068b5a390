//! Wikipedia lookups.
//!
//! A lookup resolves the query to an article title with the MediaWiki `opensearch` API, then
//! reads the article's lead from the REST summary endpoint. Not-found and disambiguation pages
//! are answers, not failures: only transport errors and unexpected statuses are `Err`.

use crate::llmcouncil::tool_protocol::ToolError;
use crate::llmcouncil::tools::default_http_client;
use async_trait::async_trait;
use serde::Deserialize;

pub const WIKIPEDIA_BASE_URL: &str = "https://en.wikipedia.org";

const DISAMBIGUATION_OPTIONS: usize = 5;

/// An encyclopedia backend returning model-ready text.
#[async_trait]
pub trait EncyclopediaProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn lookup(&self, query: &str) -> Result<String, ToolError>;
}

pub struct WikipediaClient {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct PageSummary {
    #[serde(rename = "type", default)]
    page_type: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    extract: String,
    #[serde(default)]
    content_urls: Option<ContentUrls>,
}

#[derive(Deserialize)]
struct ContentUrls {
    desktop: Option<PageUrl>,
}

#[derive(Deserialize)]
struct PageUrl {
    page: String,
}

pub fn not_found_message(query: &str) -> String {
    format!(
        "Wikipedia: No article found for '{}'. The page may not exist.",
        query
    )
}

fn disambiguation_message(query: &str, options: &[String]) -> String {
    let listed: Vec<String> = options.iter().map(|o| format!("  - {}", o)).collect();
    format!(
        "Wikipedia disambiguation: Multiple articles match '{}'.\n\nDid you mean:\n{}\n\nPlease be more specific.",
        query,
        listed.join("\n")
    )
}

impl WikipediaClient {
    pub fn new() -> Self {
        Self {
            client: default_http_client(),
            base_url: WIKIPEDIA_BASE_URL.to_string(),
        }
    }

    /// Point the client at another MediaWiki host (another language edition, or a test server).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Candidate article titles for `query`, best match first.
    async fn search_titles(&self, query: &str, limit: usize) -> Result<Vec<String>, ToolError> {
        let url = format!("{}/w/api.php", self.base_url);
        let limit = limit.to_string();
        let response = self
            .client
            .get(&url)
            .query(&[
                ("action", "opensearch"),
                ("search", query),
                ("limit", limit.as_str()),
                ("namespace", "0"),
                ("format", "json"),
            ])
            .send()
            .await
            .map_err(|e| ToolError::Provider(format!("Wikipedia search failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(ToolError::Provider(format!(
                "Wikipedia search returned HTTP {}",
                response.status().as_u16()
            )));
        }

        // [query, [titles], [descriptions], [urls]]
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ToolError::Provider(format!("Wikipedia search returned invalid JSON: {}", e)))?;

        Ok(body
            .get(1)
            .and_then(|titles| titles.as_array())
            .map(|titles| {
                titles
                    .iter()
                    .filter_map(|t| t.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn summary(&self, title: &str) -> Result<Option<PageSummary>, ToolError> {
        let slug = title.replace(' ', "_");
        let url = format!(
            "{}/api/rest_v1/page/summary/{}",
            self.base_url,
            urlencoding::encode(&slug)
        );
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ToolError::Provider(format!("Wikipedia summary failed: {}", e)))?;

        let status = response.status();
        if status.as_u16() == 404 {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(ToolError::Provider(format!(
                "Wikipedia summary returned HTTP {}",
                status.as_u16()
            )));
        }

        let summary: PageSummary = response
            .json()
            .await
            .map_err(|e| ToolError::Provider(format!("Wikipedia summary returned invalid JSON: {}", e)))?;
        Ok(Some(summary))
    }
}

impl Default for WikipediaClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EncyclopediaProvider for WikipediaClient {
    fn name(&self) -> &str {
        "wikipedia"
    }

    async fn lookup(&self, query: &str) -> Result<String, ToolError> {
        let titles = self.search_titles(query, DISAMBIGUATION_OPTIONS + 1).await?;
        let Some(best) = titles.first() else {
            return Ok(not_found_message(query));
        };

        let Some(summary) = self.summary(best).await? else {
            return Ok(not_found_message(query));
        };

        if summary.page_type == "disambiguation" {
            let options: Vec<String> = titles
                .iter()
                .filter(|t| *t != best)
                .take(DISAMBIGUATION_OPTIONS)
                .cloned()
                .collect();
            log::debug!(
                "llmcouncil::tools::wikipedia::lookup(...): '{}' is ambiguous ({} options)",
                query,
                options.len()
            );
            return Ok(disambiguation_message(query, &options));
        }

        let title = if summary.title.is_empty() {
            best.clone()
        } else {
            summary.title
        };
        let url = summary
            .content_urls
            .and_then(|u| u.desktop)
            .map(|d| d.page)
            .unwrap_or_else(|| {
                format!(
                    "{}/wiki/{}",
                    self.base_url,
                    urlencoding::encode(&title.replace(' ', "_"))
                )
            });

        Ok(format!(
            "Wikipedia: {}\n\n{}\n\nURL: {}",
            title,
            summary.extract.trim(),
            url
        ))
    }
}
