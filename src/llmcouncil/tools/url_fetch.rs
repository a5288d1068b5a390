//! Page fetching and readable-text extraction for `get_url_content`.

use crate::llmcouncil::tool_protocol::ToolError;
use crate::llmcouncil::tools::default_http_client;
use async_trait::async_trait;
use scraper::{ElementRef, Html, Node, Selector};

/// Elements whose text never reaches the model.
const SKIPPED_ELEMENTS: [&str; 7] = ["script", "style", "nav", "footer", "header", "noscript", "template"];

/// Candidate containers for the main content, most specific first.
const CONTENT_SELECTORS: [&str; 5] = [
    "main",
    "article",
    "div[class*='content']",
    "div[class*='post']",
    "body",
];

/// Bytes of a page body kept before the rest of the response is dropped.
pub const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Raw response of a page fetch.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub url: String,
    pub content_type: Option<String>,
    pub body: String,
}

/// Text pulled out of an HTML document.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadablePage {
    pub title: String,
    pub text: String,
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch(&self, url: &str) -> Result<FetchedPage, ToolError>;
}

/// Accept only absolute http(s) URLs.
pub fn validate_url(url: &str) -> Result<(), ToolError> {
    let lower = url.trim().to_ascii_lowercase();
    let rest = lower
        .strip_prefix("http://")
        .or_else(|| lower.strip_prefix("https://"))
        .ok_or_else(|| ToolError::InvalidArguments("URL must start with http:// or https://".to_string()))?;
    if rest.is_empty() || rest.starts_with('/') {
        return Err(ToolError::InvalidArguments("URL has no host".to_string()));
    }
    Ok(())
}

pub struct HttpPageFetcher {
    client: reqwest::Client,
    max_body_bytes: usize,
}

impl HttpPageFetcher {
    pub fn new() -> Self {
        Self {
            client: default_http_client(),
            max_body_bytes: MAX_BODY_BYTES,
        }
    }

    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }
}

impl Default for HttpPageFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    fn name(&self) -> &str {
        "http"
    }

    async fn fetch(&self, url: &str) -> Result<FetchedPage, ToolError> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ToolError::Provider(format!("Could not fetch URL: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::Provider(format!(
                "HTTP {} - Could not fetch URL",
                status.as_u16()
            )));
        }

        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        let mut bytes = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| ToolError::Provider(format!("Failed to read response body: {}", e)))?
        {
            let room = self.max_body_bytes - bytes.len();
            if chunk.len() >= room {
                bytes.extend_from_slice(&chunk[..room]);
                log::debug!(
                    "llmcouncil::tools::url_fetch::HttpPageFetcher::fetch(...): body of {} cut at {} bytes",
                    final_url,
                    self.max_body_bytes
                );
                break;
            }
            bytes.extend_from_slice(&chunk);
        }

        Ok(FetchedPage {
            url: final_url,
            content_type,
            body: String::from_utf8_lossy(&bytes).into_owned(),
        })
    }
}

fn is_skipped_element(node: &Node) -> bool {
    node.as_element()
        .map_or(false, |el| SKIPPED_ELEMENTS.contains(&el.name()))
}

fn element_text(root: ElementRef<'_>) -> String {
    let mut lines = Vec::new();
    for node in root.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        if node.ancestors().any(|ancestor| is_skipped_element(ancestor.value())) {
            continue;
        }
        lines.extend(
            text.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(String::from),
        );
    }
    lines.join("\n")
}

/// Extract the title and main text of an HTML document.
///
/// Navigation chrome and scripts are dropped, `main`/`article` containers are preferred over
/// the whole body, and every text run ends up on its own trimmed line.
pub fn extract_readable_text(html: &str) -> ReadablePage {
    let document = Html::parse_document(html);

    let title = Selector::parse("title")
        .ok()
        .and_then(|s| document.select(&s).next())
        .map(|t| t.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "No title".to_string());

    let mut text = String::new();
    for css in CONTENT_SELECTORS {
        let Ok(sel) = Selector::parse(css) else {
            continue;
        };
        if let Some(container) = document.select(&sel).next() {
            text = element_text(container);
            if !text.is_empty() {
                break;
            }
        }
    }
    if text.is_empty() {
        text = element_text(document.root_element());
    }

    ReadablePage { title, text }
}

/// Servers often label HTML as `text/plain` or `application/octet-stream`.
fn looks_like_html(body: &str) -> bool {
    let head: String = body
        .trim_start()
        .chars()
        .take(14)
        .collect::<String>()
        .to_ascii_lowercase();
    head.starts_with("<!doctype html") || head.starts_with("<html")
}

/// Turn a fetched page into model-ready text.
pub fn render_page(requested_url: &str, page: &FetchedPage) -> Result<String, ToolError> {
    let is_html = page
        .content_type
        .as_deref()
        .map_or(true, |ct| ct.contains("html"))
        || looks_like_html(&page.body);

    let readable = if is_html {
        extract_readable_text(&page.body)
    } else {
        ReadablePage {
            title: "No title".to_string(),
            text: page
                .body
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .collect::<Vec<_>>()
                .join("\n"),
        }
    };

    if readable.text.is_empty() {
        return Err(ToolError::ExecutionFailed(
            "Could not extract content from page".to_string(),
        ));
    }

    Ok(format!(
        "Content from: {}\nTitle: {}\n\n{}",
        requested_url, readable.title, readable.text
    ))
}
