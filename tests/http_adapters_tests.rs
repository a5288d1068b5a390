//! HTTP adapters against a local mock server: search providers, Wikipedia, page fetching
//! and the OpenRouter model client.

use llmcouncil::client_wrapper::{ClientWrapper, Message, ProviderError};
use llmcouncil::clients::openrouter::OpenRouterClient;
use llmcouncil::config::ToolLimits;
use llmcouncil::tool_executor::ToolExecutor;
use llmcouncil::tool_protocol::ToolError;
use llmcouncil::tools::url_fetch::render_page;
use llmcouncil::tools::wikipedia::not_found_message;
use llmcouncil::tools::{
    DuckDuckGoSearch, EncyclopediaProvider, HttpPageFetcher, PageFetcher, SearchProvider,
    TavilySearch, WikipediaClient,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DDG_PAGE: &str = r#"<html><body>
  <div class="result web-result"><a class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fone.example%2F&amp;rut=x">One</a><a class="result__snippet">First hit</a></div>
  <div class="result web-result"><a class="result__a" href="https://two.example/">Two</a><a class="result__snippet">Second hit</a></div>
  <div class="result web-result"><a class="result__a" href="https://three.example/">Three</a><a class="result__snippet">Third hit</a></div>
</body></html>"#;

#[tokio::test]
async fn tavily_posts_query_and_maps_results() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/search"))
        .and(body_partial_json(json!({"api_key": "tvly-key", "query": "rust", "max_results": 5})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [
                {"title": "Rust", "url": "https://www.rust-lang.org/", "content": "A language"},
                {"url": "https://blog.rust-lang.org/", "content": "News"}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let tavily = TavilySearch::new(Some("tvly-key".into()))
        .with_endpoint(format!("{}/search", server.uri()));
    let results = tavily.search("rust", 5).await.unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].title, "Rust");
    assert_eq!(results[0].snippet, "A language");
    assert_eq!(results[1].title, "No title");
}

#[tokio::test]
async fn tavily_error_status_is_a_provider_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(432).set_body_string("plan limit"))
        .mount(&server)
        .await;

    let tavily = TavilySearch::new(Some("tvly-key".into())).with_endpoint(server.uri());
    let err = tavily.search("rust", 5).await.unwrap_err();
    assert!(err.is_provider_failure());
    assert!(err.to_string().contains("432"));
}

#[tokio::test]
async fn duckduckgo_scrapes_the_html_results_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/html/"))
        .and(query_param("q", "rust async"))
        .respond_with(ResponseTemplate::new(200).set_body_string(DDG_PAGE))
        .mount(&server)
        .await;

    let ddg = DuckDuckGoSearch::new().with_endpoint(format!("{}/html/", server.uri()));
    let results = ddg.search("rust async", 5).await.unwrap();

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].url, "https://one.example/");
    assert_eq!(results[2].snippet, "Third hit");
}

#[tokio::test]
async fn search_chain_recovers_through_the_fallback() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/html/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(DDG_PAGE))
        .expect(1)
        .mount(&server)
        .await;

    // Tavily without a key fails at the provider level; DuckDuckGo answers.
    let executor = ToolExecutor::new(ToolLimits::default())
        .with_search_provider(Arc::new(TavilySearch::new(None)))
        .with_search_provider(Arc::new(
            DuckDuckGoSearch::new().with_endpoint(format!("{}/html/", server.uri())),
        ));
    let outcome = executor
        .execute("web_search", &json!({"query": "rust"}))
        .await;

    assert!(outcome.is_success());
    assert!(outcome.text.contains("1. One\n   URL: https://one.example/"));
    assert!(outcome.text.contains("3. Three"));
}

#[tokio::test]
async fn wikipedia_returns_the_article_summary() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/w/api.php"))
        .and(query_param("action", "opensearch"))
        .and(query_param("search", "ferris crab"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(["ferris crab", ["Ferris"], [""], ["https://en.wikipedia.org/wiki/Ferris"]])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/rest_v1/page/summary/Ferris"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "type": "standard",
            "title": "Ferris",
            "extract": "Ferris is the unofficial mascot of Rust. ",
            "content_urls": {"desktop": {"page": "https://en.wikipedia.org/wiki/Ferris"}}
        })))
        .mount(&server)
        .await;

    let wiki = WikipediaClient::new().with_base_url(server.uri());
    let text = wiki.lookup("ferris crab").await.unwrap();
    assert_eq!(
        text,
        "Wikipedia: Ferris\n\nFerris is the unofficial mascot of Rust.\n\nURL: https://en.wikipedia.org/wiki/Ferris"
    );
}

#[tokio::test]
async fn wikipedia_lists_disambiguation_options() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/w/api.php"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            "Mercury",
            ["Mercury", "Mercury (planet)", "Mercury (element)", "Mercury (mythology)"]
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/rest_v1/page/summary/Mercury"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "type": "disambiguation",
            "title": "Mercury",
            "extract": "Mercury may refer to:"
        })))
        .mount(&server)
        .await;

    let text = WikipediaClient::new()
        .with_base_url(server.uri())
        .lookup("Mercury")
        .await
        .unwrap();
    assert!(text.starts_with("Wikipedia disambiguation:"));
    assert!(text.contains("  - Mercury (planet)\n  - Mercury (element)\n  - Mercury (mythology)"));
}

#[tokio::test]
async fn wikipedia_not_found_is_an_answer() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/w/api.php"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(["qwzx", [], [], []])))
        .mount(&server)
        .await;

    let text = WikipediaClient::new()
        .with_base_url(server.uri())
        .lookup("qwzx")
        .await
        .unwrap();
    assert_eq!(text, not_found_message("qwzx"));
}

#[tokio::test]
async fn page_fetcher_extracts_readable_text() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/post"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(
                "<html><head><title> Release notes </title><script>var x = 1;</script></head>\
                 <body><nav>Home | Blog</nav><article><h1>Rust 1.80</h1>\
                 <p>LazyCell is stable.</p></article><footer>(c) 2024</footer></body></html>",
                "text/html; charset=utf-8",
            ),
        )
        .mount(&server)
        .await;

    let url = format!("{}/post", server.uri());
    let page = HttpPageFetcher::new().fetch(&url).await.unwrap();
    let text = render_page(&url, &page).unwrap();

    assert_eq!(
        text,
        format!("Content from: {}\nTitle: Release notes\n\nRust 1.80\nLazyCell is stable.", url)
    );
}

#[tokio::test]
async fn page_fetcher_stops_reading_at_the_body_ceiling() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/huge"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("x".repeat(200_000), "text/plain"))
        .mount(&server)
        .await;

    let url = format!("{}/huge", server.uri());
    let page = HttpPageFetcher::new()
        .with_max_body_bytes(4096)
        .fetch(&url)
        .await
        .unwrap();

    assert_eq!(page.body.len(), 4096);
    assert_eq!(page.content_type.as_deref(), Some("text/plain"));
}

#[tokio::test]
async fn page_fetcher_reports_http_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = HttpPageFetcher::new()
        .fetch(&format!("{}/missing", server.uri()))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ToolError::Provider("HTTP 404 - Could not fetch URL".to_string())
    );
}

#[tokio::test]
async fn openrouter_sends_tools_and_parses_tool_calls() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer or-key"))
        .and(body_partial_json(json!({"model": "openai/gpt-5.2"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": "",
                    "tool_calls": [{
                        "id": "call_abc",
                        "type": "function",
                        "function": {"name": "calculator", "arguments": "{\"expression\":\"6*7\"}"}
                    }]
                }
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = OpenRouterClient::new("or-key").with_base_url(server.uri());
    let executor = ToolExecutor::new(ToolLimits::default());
    let response = client
        .send_message(
            "openai/gpt-5.2",
            &[Message::user("six times seven")],
            Some(executor.definitions()),
        )
        .await
        .unwrap();

    assert_eq!(response.text_content(), None);
    assert_eq!(response.tool_calls.len(), 1);
    assert_eq!(response.tool_calls[0].id, "call_abc");
    assert_eq!(response.tool_calls[0].arguments, json!({"expression": "6*7"}));

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["tools"][1]["function"]["name"], "calculator");
}

#[tokio::test]
async fn openrouter_retries_transient_failures() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "hello"}}]
        })))
        .mount(&server)
        .await;

    let client = OpenRouterClient::new("or-key")
        .with_base_url(server.uri())
        .with_max_retries(2);
    let response = client
        .send_message("m/a", &[Message::user("hi")], None)
        .await
        .unwrap();
    assert_eq!(response.text_content(), Some("hello"));
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn openrouter_does_not_retry_client_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad model"))
        .expect(1)
        .mount(&server)
        .await;

    let client = OpenRouterClient::new("or-key")
        .with_base_url(server.uri())
        .with_timeout(Duration::from_secs(5));
    let err = client
        .send_message("m/unknown", &[Message::user("hi")], None)
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::Status { status: 400, .. }));
}

#[tokio::test]
async fn openrouter_without_key_is_misconfigured() {
    let err = OpenRouterClient::new("")
        .send_message("m/a", &[Message::user("hi")], None)
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::Configuration(_)));
}
