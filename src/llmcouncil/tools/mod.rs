//! Built-in Tool Implementations
//!
//! The four tools council models may call while forming a Stage-1 answer, plus the
//! provider traits they sit behind:
//!
//! - **web_search**: [`web_search::SearchProvider`] chain, Tavily first and DuckDuckGo as fallback
//! - **calculator**: [`calculator::Calculator`], a restricted arithmetic evaluator
//! - **wikipedia_search**: [`wikipedia::EncyclopediaProvider`], backed by the Wikipedia APIs
//! - **get_url_content**: [`url_fetch::PageFetcher`] plus readable-text extraction
//!
//! Tools are never called directly by the loop; the
//! [`ToolExecutor`](crate::tool_executor::ToolExecutor) owns them and applies limits.

pub mod calculator;
pub mod url_fetch;
pub mod web_search;
pub mod wikipedia;

pub use calculator::{Calculator, CalculatorError};
pub use url_fetch::{HttpPageFetcher, PageFetcher};
pub use web_search::{DuckDuckGoSearch, SearchProvider, SearchResult, TavilySearch};
pub use wikipedia::{EncyclopediaProvider, WikipediaClient};

use crate::llmcouncil::tool_protocol::{ToolDefinition, ToolParameter, ToolParameterType};

pub const WEB_SEARCH: &str = "web_search";
pub const CALCULATOR: &str = "calculator";
pub const WIKIPEDIA_SEARCH: &str = "wikipedia_search";
pub const GET_URL_CONTENT: &str = "get_url_content";

pub(crate) const USER_AGENT: &str = "Mozilla/5.0 (compatible; LLM-Council/1.0)";

/// HTTP client shared by the built-in providers. Wall-clock limits are applied per attempt by
/// the executor, so the client itself only bounds connection setup.
pub(crate) fn default_http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(std::time::Duration::from_secs(10))
        .user_agent(USER_AGENT)
        .build()
        .unwrap_or_default()
}

/// The fixed set of tools advertised to council models, in a stable order.
pub fn tool_definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition::new(
            WEB_SEARCH,
            "Search the web for current information, news, or real-time data. Use this when you need up-to-date information that may not be in your training data.",
        )
        .with_parameter(
            ToolParameter::new("query", ToolParameterType::String)
                .with_description("The search query to look up on the web")
                .required(),
        ),
        ToolDefinition::new(
            CALCULATOR,
            "Perform mathematical calculations. Supports basic arithmetic, exponents (** or ^), square root (sqrt), rounding (round(x) or round(x, digits)), sum, min and max, trigonometric functions (sin, cos, tan), logarithms (ln, log, log10, log2), and constants (pi, e).",
        )
        .with_parameter(
            ToolParameter::new("expression", ToolParameterType::String)
                .with_description(
                    "The mathematical expression to evaluate (e.g., '2 + 2', 'sqrt(16)', 'sin(pi/2)')",
                )
                .required(),
        ),
        ToolDefinition::new(
            WIKIPEDIA_SEARCH,
            "Search Wikipedia for encyclopedic information about topics, people, places, concepts, etc. Returns a summary of the Wikipedia article.",
        )
        .with_parameter(
            ToolParameter::new("query", ToolParameterType::String)
                .with_description("The topic to search for on Wikipedia")
                .required(),
        ),
        ToolDefinition::new(
            GET_URL_CONTENT,
            "Fetch and extract readable text content from a URL. Use this to read articles, blog posts, or web pages.",
        )
        .with_parameter(
            ToolParameter::new("url", ToolParameterType::String)
                .with_description("The URL to fetch content from (must start with http:// or https://)")
                .required(),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn four_tools_each_with_one_required_argument() {
        let defs = tool_definitions();
        let names: Vec<&str> = defs.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec![WEB_SEARCH, CALCULATOR, WIKIPEDIA_SEARCH, GET_URL_CONTENT]);
        for def in &defs {
            let schema = def.to_function_schema();
            assert_eq!(schema["function"]["parameters"]["required"].as_array().unwrap().len(), 1);
        }
    }
}
