//! Web capabilities: search, page scraping and element scraping.

use async_trait::async_trait;
use quarry_pipeline::{Capability, InvocationFailure};
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::error::{Result, ToolError};
use crate::input::{argument, argument_pair};
use crate::sanitize::{OutputConfig, sanitize_output};

// ─────────────────────────────────────────────────────────────────────────────
// HTTP Client
// ─────────────────────────────────────────────────────────────────────────────

/// Shared HTTP settings for the web capabilities.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Request timeout.
    pub timeout: Duration,
    /// User agent string.
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: concat!("Quarry/", env!("CARGO_PKG_VERSION"), " (Documentation Crawler)")
                .to_string(),
        }
    }
}

impl HttpConfig {
    fn build_client(&self) -> Result<Client> {
        Client::builder()
            .timeout(self.timeout)
            .user_agent(&self.user_agent)
            .build()
            .map_err(|e| ToolError::Config(format!("Failed to build HTTP client: {}", e)))
    }
}

/// A fetched page.
struct Page {
    content_type: String,
    body: String,
}

impl Page {
    fn is_html(&self) -> bool {
        self.content_type.contains("text/html") || self.content_type.contains("xhtml")
    }
}

fn parse_http_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw)
        .map_err(|e| ToolError::InvalidInput(format!("Invalid URL '{}': {}", raw, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ToolError::InvalidInput(format!(
            "Only HTTP and HTTPS URLs are supported, got '{}'",
            other
        ))),
    }
}

async fn fetch_page(client: &Client, url: &Url) -> Result<Page> {
    debug!(url = %url, "Fetching page");
    let response = client.get(url.as_str()).send().await?;

    let status = response.status();
    if !status.is_success() {
        return Err(ToolError::Http(format!("{} returned status {}", url, status)));
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("text/html")
        .to_string();
    let bytes = response.bytes().await?;

    Ok(Page {
        content_type,
        body: String::from_utf8_lossy(&bytes).into_owned(),
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// HTML Extraction
// ─────────────────────────────────────────────────────────────────────────────

/// Main-content containers, most specific first.
const CONTENT_SELECTORS: &[&str] = &[
    "article",
    "main",
    "[role='main']",
    "#content",
    ".content",
    ".markdown",
    "body",
];

/// Elements whose text is never readable content.
const HIDDEN_TAGS: &[&str] = &[
    "script", "style", "noscript", "template", "svg", "nav", "footer", "head",
];

/// Text nodes under `root` that are not inside a hidden element below it, one
/// per line with whitespace collapsed.
fn visible_text(root: ElementRef<'_>) -> String {
    let mut lines = Vec::new();
    for node in root.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node
            .ancestors()
            .take_while(|ancestor| ancestor.id() != root.id())
            .any(|ancestor| {
                ancestor
                    .value()
                    .as_element()
                    .is_some_and(|el| HIDDEN_TAGS.contains(&el.name()))
            });
        if hidden {
            continue;
        }
        let line = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if !line.is_empty() {
            lines.push(line);
        }
    }
    lines.join("\n")
}

/// Extract readable text from an HTML document.
///
/// Uses the first content container that yields text, falling back to the
/// whole body.
pub fn extract_readable_text(html: &str) -> String {
    let document = Html::parse_document(html);
    for selector_str in CONTENT_SELECTORS {
        let Ok(selector) = Selector::parse(selector_str) else {
            continue;
        };
        let text = document
            .select(&selector)
            .map(visible_text)
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n");
        if !text.is_empty() {
            return text;
        }
    }
    String::new()
}

/// Extract the document title.
pub fn extract_title(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("title").ok()?;
    document
        .select(&selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Text of every element matching a CSS selector, in document order.
pub fn select_text(html: &str, selector: &str) -> Result<Vec<String>> {
    let parsed = Selector::parse(selector).map_err(|e| {
        ToolError::InvalidInput(format!("Invalid CSS selector '{}': {}", selector, e))
    })?;
    let document = Html::parse_document(html);
    Ok(document
        .select(&parsed)
        .map(visible_text)
        .filter(|t| !t.is_empty())
        .collect())
}

// ─────────────────────────────────────────────────────────────────────────────
// Scrape Website
// ─────────────────────────────────────────────────────────────────────────────

/// Fetches a page and returns its readable text.
#[derive(Debug, Clone)]
pub struct ScrapeWebsite {
    client: Client,
    output: OutputConfig,
}

impl ScrapeWebsite {
    /// Create the capability with the given HTTP settings.
    pub fn new(http: &HttpConfig) -> Result<Self> {
        Ok(Self {
            client: http.build_client()?,
            output: OutputConfig::for_scrape(),
        })
    }

    /// Override the output limits.
    pub fn with_output(mut self, output: OutputConfig) -> Self {
        self.output = output;
        self
    }

    /// Scrape the page named by `input`.
    pub async fn scrape(&self, input: &str) -> Result<String> {
        let url = parse_http_url(&argument(input, "url")?)?;
        let page = fetch_page(&self.client, &url).await?;

        let text = if page.is_html() {
            let body = extract_readable_text(&page.body);
            match extract_title(&page.body) {
                Some(title) => format!("# {}\nSource: {}\n\n{}", title, url, body),
                None => format!("Source: {}\n\n{}", url, body),
            }
        } else {
            page.body
        };

        let (text, truncated) = sanitize_output(&text, &self.output)?;
        debug!(url = %url, bytes = text.len(), truncated, "Scraped page");
        Ok(text)
    }
}

#[async_trait]
impl Capability for ScrapeWebsite {
    fn name(&self) -> &str {
        "scrape_website"
    }

    fn description(&self) -> &str {
        "Fetch a web page and return its readable text. Input: the page URL."
    }

    async fn invoke(&self, input: &str) -> std::result::Result<String, InvocationFailure> {
        self.scrape(input).await.map_err(|e| e.into_failure(self.name()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Scrape Element
// ─────────────────────────────────────────────────────────────────────────────

/// Fetches a page and returns the text of the elements matching a selector.
#[derive(Debug, Clone)]
pub struct ScrapeElement {
    client: Client,
    output: OutputConfig,
}

impl ScrapeElement {
    /// Create the capability with the given HTTP settings.
    pub fn new(http: &HttpConfig) -> Result<Self> {
        Ok(Self {
            client: http.build_client()?,
            output: OutputConfig::for_scrape(),
        })
    }

    /// Override the output limits.
    pub fn with_output(mut self, output: OutputConfig) -> Self {
        self.output = output;
        self
    }

    /// Scrape elements; `input` is `<url> <css selector>` or
    /// `{"url": .., "selector": ..}`.
    pub async fn scrape(&self, input: &str) -> Result<String> {
        let (raw_url, selector) = argument_pair(input, "url", "selector")?;
        let url = parse_http_url(&raw_url)?;
        // Reject a bad selector before spending a request on it.
        Selector::parse(&selector).map_err(|e| {
            ToolError::InvalidInput(format!("Invalid CSS selector '{}': {}", selector, e))
        })?;

        let page = fetch_page(&self.client, &url).await?;
        let matches = select_text(&page.body, &selector)?;
        if matches.is_empty() {
            return Ok(format!("No elements matched '{}' on {}", selector, url));
        }

        let (text, _) = sanitize_output(&matches.join("\n\n"), &self.output)?;
        debug!(url = %url, selector = %selector, matches = matches.len(), "Scraped elements");
        Ok(text)
    }
}

#[async_trait]
impl Capability for ScrapeElement {
    fn name(&self) -> &str {
        "scrape_element"
    }

    fn description(&self) -> &str {
        "Return the text of the elements matching a CSS selector on a web page. Input: '<url> <css selector>'."
    }

    async fn invoke(&self, input: &str) -> std::result::Result<String, InvocationFailure> {
        self.scrape(input).await.map_err(|e| e.into_failure(self.name()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Web Search
// ─────────────────────────────────────────────────────────────────────────────

/// Web search provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "snake_case")]
pub enum SearchProvider {
    /// Brave Search API.
    Brave { api_key: String },
    /// Serper (Google Search API).
    Serper { api_key: String },
    /// Tavily Search API.
    Tavily { api_key: String },
    /// DuckDuckGo instant answers; no key, limited results.
    DuckDuckGo,
}

impl SearchProvider {
    /// Resolve a provider by name. Keyed providers require `api_key`.
    pub fn from_name(name: &str, api_key: Option<String>) -> Result<Self> {
        let keyed = |api_key: Option<String>| {
            api_key.ok_or_else(|| {
                ToolError::Config(format!("Search provider '{}' requires an API key", name))
            })
        };
        match name.to_ascii_lowercase().as_str() {
            "duckduckgo" | "duck_duck_go" | "ddg" => Ok(Self::DuckDuckGo),
            "brave" => Ok(Self::Brave {
                api_key: keyed(api_key)?,
            }),
            "serper" => Ok(Self::Serper {
                api_key: keyed(api_key)?,
            }),
            "tavily" => Ok(Self::Tavily {
                api_key: keyed(api_key)?,
            }),
            other => Err(ToolError::Config(format!("Unknown search provider '{}'", other))),
        }
    }

    /// Provider name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Brave { .. } => "brave",
            Self::Serper { .. } => "serper",
            Self::Tavily { .. } => "tavily",
            Self::DuckDuckGo => "duckduckgo",
        }
    }

    fn default_endpoint(&self) -> &'static str {
        match self {
            Self::Brave { .. } => "https://api.search.brave.com/res/v1/web/search",
            Self::Serper { .. } => "https://google.serper.dev/search",
            Self::Tavily { .. } => "https://api.tavily.com/search",
            Self::DuckDuckGo => "https://api.duckduckgo.com/",
        }
    }
}

/// Configuration for web search.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Search provider.
    pub provider: SearchProvider,
    /// Maximum number of results to return.
    pub max_results: usize,
    /// Override the provider's API endpoint.
    pub endpoint: Option<String>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            provider: SearchProvider::DuckDuckGo,
            max_results: 10,
            endpoint: None,
        }
    }
}

/// A single search result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// Searches the web through the configured provider.
#[derive(Debug, Clone)]
pub struct WebSearch {
    client: Client,
    config: SearchConfig,
    output: OutputConfig,
}

impl WebSearch {
    /// Create the capability.
    pub fn new(http: &HttpConfig, config: SearchConfig) -> Result<Self> {
        Ok(Self {
            client: http.build_client()?,
            config,
            output: OutputConfig::for_search(),
        })
    }

    /// Override the output limits.
    pub fn with_output(mut self, output: OutputConfig) -> Self {
        self.output = output;
        self
    }

    fn endpoint(&self) -> &str {
        self.config
            .endpoint
            .as_deref()
            .unwrap_or_else(|| self.config.provider.default_endpoint())
    }

    /// Run a search and return the structured results.
    pub async fn search(&self, query: &str) -> Result<Vec<SearchResult>> {
        debug!(provider = self.config.provider.name(), query, "Searching");
        let data = match &self.config.provider {
            SearchProvider::Brave { api_key } => {
                let url = format!(
                    "{}?q={}&count={}",
                    self.endpoint(),
                    urlencoding::encode(query),
                    self.config.max_results
                );
                self.client
                    .get(&url)
                    .header("X-Subscription-Token", api_key)
                    .header("Accept", "application/json")
                    .send()
                    .await?
            }
            SearchProvider::Serper { api_key } => {
                self.client
                    .post(self.endpoint())
                    .header("X-API-KEY", api_key)
                    .json(&json!({ "q": query, "num": self.config.max_results }))
                    .send()
                    .await?
            }
            SearchProvider::Tavily { api_key } => {
                self.client
                    .post(self.endpoint())
                    .json(&json!({
                        "api_key": api_key,
                        "query": query,
                        "max_results": self.config.max_results
                    }))
                    .send()
                    .await?
            }
            SearchProvider::DuckDuckGo => {
                let url = format!(
                    "{}?q={}&format=json&no_html=1&skip_disambig=1",
                    self.endpoint(),
                    urlencoding::encode(query)
                );
                self.client.get(&url).send().await?
            }
        };

        let status = data.status();
        if !status.is_success() {
            return Err(ToolError::Http(format!(
                "{} search returned status {}",
                self.config.provider.name(),
                status
            )));
        }
        let body: Value = data
            .json()
            .await
            .map_err(|e| ToolError::Http(format!("Failed to parse search response: {}", e)))?;

        let mut results = match &self.config.provider {
            SearchProvider::Brave { .. } => {
                collect_results(&body["web"]["results"], "url", "description")
            }
            SearchProvider::Serper { .. } => collect_results(&body["organic"], "link", "snippet"),
            SearchProvider::Tavily { .. } => collect_results(&body["results"], "url", "content"),
            SearchProvider::DuckDuckGo => duckduckgo_results(&body),
        };
        results.truncate(self.config.max_results);
        Ok(results)
    }

    async fn search_text(&self, input: &str) -> Result<String> {
        let query = argument(input, "query")?;
        let results = self.search(&query).await?;
        let text = format_results(&query, &results);
        let (text, _) = sanitize_output(&text, &self.output)?;
        Ok(text)
    }
}

fn collect_results(items: &Value, url_key: &str, snippet_key: &str) -> Vec<SearchResult> {
    items
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|r| {
                    Some(SearchResult {
                        title: r["title"].as_str()?.to_string(),
                        url: r[url_key].as_str()?.to_string(),
                        snippet: r[snippet_key].as_str().unwrap_or("").to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

fn duckduckgo_results(data: &Value) -> Vec<SearchResult> {
    let mut results = Vec::new();

    if let Some(abstract_text) = data["AbstractText"].as_str().filter(|s| !s.is_empty()) {
        results.push(SearchResult {
            title: data["Heading"].as_str().unwrap_or("Result").to_string(),
            url: data["AbstractURL"].as_str().unwrap_or("").to_string(),
            snippet: abstract_text.to_string(),
        });
    }

    if let Some(topics) = data["RelatedTopics"].as_array() {
        for topic in topics {
            if let (Some(text), Some(url)) = (topic["Text"].as_str(), topic["FirstURL"].as_str()) {
                let title = match text.char_indices().nth(60) {
                    Some((idx, _)) => format!("{}...", &text[..idx]),
                    None => text.to_string(),
                };
                results.push(SearchResult {
                    title,
                    url: url.to_string(),
                    snippet: text.to_string(),
                });
            }
        }
    }

    results
}

/// Render results as a numbered list for a reasoning transcript.
pub fn format_results(query: &str, results: &[SearchResult]) -> String {
    if results.is_empty() {
        return format!("No results found for '{}'", query);
    }
    results
        .iter()
        .enumerate()
        .map(|(i, r)| {
            let mut entry = format!("{}. {}\n   {}", i + 1, r.title, r.url);
            if !r.snippet.is_empty() {
                entry.push_str(&format!("\n   {}", r.snippet));
            }
            entry
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[async_trait]
impl Capability for WebSearch {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web. Returns titles, URLs and snippets. Input: the search query."
    }

    async fn invoke(&self, input: &str) -> std::result::Result<String, InvocationFailure> {
        self.search_text(input).await.map_err(|e| e.into_failure(self.name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html>
        <head><title> LangGraph </title><style>body { color: red; }</style></head>
        <body>
            <nav><a href="/">Home</a></nav>
            <main>
                <h1>Overview</h1>
                <script>var tracking = true;</script>
                <p>LangGraph is a library
                   for building stateful agents.</p>
                <ul class="toc"><li>Quickstart</li><li>Concepts</li></ul>
            </main>
            <footer>Copyright</footer>
        </body>
    </html>"#;

    #[test]
    fn test_extract_readable_text_skips_hidden() {
        let text = extract_readable_text(PAGE);
        assert!(text.contains("Overview"));
        assert!(text.contains("LangGraph is a library for building stateful agents."));
        assert!(!text.contains("tracking"));
        assert!(!text.contains("Home"));
        assert!(!text.contains("Copyright"));
    }

    #[test]
    fn test_extract_falls_back_to_body() {
        let text = extract_readable_text("<html><body><div>Plain page</div></body></html>");
        assert_eq!(text, "Plain page");
    }

    #[test]
    fn test_extract_title() {
        assert_eq!(extract_title(PAGE).as_deref(), Some("LangGraph"));
        assert_eq!(extract_title("<p>none</p>"), None);
    }

    #[test]
    fn test_select_text() {
        let items = select_text(PAGE, "ul.toc li").unwrap();
        assert_eq!(items, vec!["Quickstart", "Concepts"]);
        assert!(matches!(select_text(PAGE, "[[["), Err(ToolError::InvalidInput(_))));
    }

    #[test]
    fn test_parse_http_url() {
        assert!(parse_http_url("https://example.com/docs").is_ok());
        assert!(parse_http_url("file:///etc/passwd").is_err());
        assert!(parse_http_url("not a url").is_err());
    }

    #[test]
    fn test_provider_from_name() {
        assert_eq!(
            SearchProvider::from_name("DuckDuckGo", None).unwrap(),
            SearchProvider::DuckDuckGo
        );
        assert_eq!(
            SearchProvider::from_name("serper", Some("k".into())).unwrap(),
            SearchProvider::Serper { api_key: "k".into() }
        );
        assert!(SearchProvider::from_name("brave", None).is_err());
        assert!(SearchProvider::from_name("altavista", None).is_err());
    }

    #[test]
    fn test_duckduckgo_results() {
        let data = json!({
            "Heading": "LangGraph",
            "AbstractText": "A library for agents.",
            "AbstractURL": "https://langchain-ai.github.io/langgraph/",
            "RelatedTopics": [
                {"Text": "LangChain - framework", "FirstURL": "https://duckduckgo.com/LangChain"},
                {"Name": "Category without text"}
            ]
        });
        let results = duckduckgo_results(&data);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].title, "LangGraph");
        assert_eq!(results[1].url, "https://duckduckgo.com/LangChain");
    }

    #[test]
    fn test_format_results() {
        assert_eq!(format_results("q", &[]), "No results found for 'q'");
        let text = format_results(
            "q",
            &[SearchResult {
                title: "T".into(),
                url: "https://u".into(),
                snippet: "S".into(),
            }],
        );
        assert_eq!(text, "1. T\n   https://u\n   S");
    }
}
