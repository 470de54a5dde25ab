//! Web search through the Tavily search API

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{info, warn};

use super::{parse_args, ToolAdapter, ToolContext, ToolError, ToolOutput};

const TAVILY_BASE_URL: &str = "https://api.tavily.com";

/// Default number of snippets returned per query
pub const DEFAULT_SEARCH_RESULTS: usize = 5;

/// Upper bound on snippets per query
pub const MAX_SEARCH_RESULTS: usize = 10;

/// One ranked search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSnippet {
    pub title: String,
    pub url: String,
    pub excerpt: String,
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("search request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("search API returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("malformed search response: {0}")]
    Decode(String),
}

/// Anything that can turn a query into ranked snippets
#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchSnippet>, SearchError>;
}

/// Client for Tavily's `/search` endpoint
#[derive(Clone)]
pub struct TavilyClient {
    client: Client,
    api_key: String,
    base_url: String,
}

#[derive(Serialize)]
struct TavilyRequest<'a> {
    query: &'a str,
    max_results: usize,
    search_depth: &'a str,
    include_answer: bool,
}

#[derive(Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Deserialize)]
struct TavilyResult {
    #[serde(default)]
    title: String,
    url: String,
    #[serde(default)]
    content: String,
}

impl TavilyClient {
    /// Create a client with a per-request timeout
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self, SearchError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: TAVILY_BASE_URL.to_string(),
        })
    }

    /// Point the client at another server (e.g. a proxy)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl SearchBackend for TavilyClient {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchSnippet>, SearchError> {
        let endpoint = format!("{}/search", self.base_url.trim_end_matches('/'));
        let body = TavilyRequest {
            query,
            max_results,
            search_depth: "basic",
            include_answer: false,
        };

        let response = self
            .client
            .post(&endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(SearchError::Api {
                status: status.as_u16(),
                message: api_error_message(status, &text),
            });
        }

        parse_search_response(&text, max_results)
    }
}

/// Decode a Tavily response body into at most `max_results` snippets
pub fn parse_search_response(body: &str, max_results: usize) -> Result<Vec<SearchSnippet>, SearchError> {
    let parsed: TavilyResponse =
        serde_json::from_str(body).map_err(|e| SearchError::Decode(e.to_string()))?;
    Ok(parsed
        .results
        .into_iter()
        .take(max_results)
        .map(|r| SearchSnippet {
            title: if r.title.trim().is_empty() {
                r.url.clone()
            } else {
                r.title.trim().to_string()
            },
            url: r.url,
            excerpt: r.content.trim().to_string(),
        })
        .collect())
}

fn api_error_message(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("detail")
                .and_then(|d| d.get("error").or(Some(d)))
                .or_else(|| v.get("error"))
                .and_then(|e| e.as_str().map(str::to_string))
        })
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                status.canonical_reason().unwrap_or("unknown error").to_string()
            } else {
                body.trim().to_string()
            }
        })
}

/// `web_search` tool: ranked snippets for a query
pub struct WebSearchTool {
    backend: Arc<dyn SearchBackend>,
    default_results: usize,
}

impl WebSearchTool {
    pub fn new(backend: Arc<dyn SearchBackend>, default_results: usize) -> Self {
        Self {
            backend,
            default_results: default_results.clamp(1, MAX_SEARCH_RESULTS),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct WebSearchArgs {
    query: String,
    #[serde(default)]
    max_results: Option<usize>,
}

#[async_trait]
impl ToolAdapter for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web and return the top results as title, url and excerpt. \
         Use it for current information such as library versions or documentation."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                },
                "max_results": {
                    "type": "integer",
                    "description": "Number of results to return (1-10)"
                }
            },
            "required": ["query"]
        })
    }

    async fn invoke(&self, ctx: &ToolContext<'_>, args: Value) -> Result<ToolOutput, ToolError> {
        let args: WebSearchArgs = parse_args(self.name(), args)?;
        let query = args.query.trim();
        if query.is_empty() {
            return Err(ToolError::Validation("search query is empty".to_string()));
        }
        let count = args
            .max_results
            .unwrap_or(self.default_results)
            .clamp(1, MAX_SEARCH_RESULTS);

        info!(trace_id = %ctx.trace_id, query, count, "Web search");
        let results = self.backend.search(query, count).await.map_err(|e| {
            warn!(trace_id = %ctx.trace_id, error = %e, "Web search failed");
            ToolError::Transport(e.to_string())
        })?;

        Ok(ToolOutput::new(json!({
            "query": query,
            "results": results,
        })))
    }
}
