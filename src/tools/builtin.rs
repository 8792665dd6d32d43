//! Built-in tools for the conversational agent.
//!
//! Provides `calculator`, `web_url`, `web_search`, `wikipedia` and
//! `vector_db`. Each tool is constructed via [`AgentTool::new`] and returned
//! as `Arc<dyn Tool>`. Network tools take their base URL from
//! [`BuiltinEndpoints`] so they can be pointed at a local server.
//!
//! # Usage
//!
//! ```rust,no_run
//! use bujji::tools::builtin::{all_tools, BuiltinEndpoints};
//!
//! let tools = all_tools(&BuiltinEndpoints::default());
//! assert_eq!(tools.len(), 5);
//! ```

use std::sync::Arc;

use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;

use crate::error::BujjiError;
use crate::provider::http::{error_from_response, shared_client};
use crate::tools::calculator;
use crate::tools::tool::{AgentTool, Tool, ToolExecutionContext};
use crate::tools::types::{AgentToolParameters, SideEffect};

pub const INVALID_EXPRESSION: &str =
    "Error: Invalid expression. Only numbers and +, -, *, / operators are allowed.";
pub const NO_URL: &str = "No URL provided.";
pub const SEARCH_RATE_LIMITED: &str = "Failed to get context from the web due to rate limiting.";

const PAGE_MAX_BYTES: usize = 32_768;
const WIKIPEDIA_RESULTS: usize = 3;
const VECTOR_DEFAULT_K: i64 = 5;
const VECTOR_MAX_K: i64 = 10;

/// Base URLs for the network-backed tools.
#[derive(Debug, Clone)]
pub struct BuiltinEndpoints {
    pub duckduckgo: String,
    pub wikipedia: String,
}

impl Default for BuiltinEndpoints {
    fn default() -> Self {
        Self {
            duckduckgo: "https://api.duckduckgo.com".to_string(),
            wikipedia: "https://en.wikipedia.org".to_string(),
        }
    }
}

fn truncate_utf8(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }

    let mut cutoff = max_bytes;
    while cutoff > 0 && !s.is_char_boundary(cutoff) {
        cutoff -= 1;
    }
    s[..cutoff].to_string()
}

fn expression_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[\d\s+\-*/().]+$").expect("calculator pattern is valid"))
}

/// Evaluate a calculator expression into the text handed back to the model.
///
/// Input outside the allowed character set is rejected before parsing.
pub fn evaluate_expression(expression: &str) -> String {
    if !expression_pattern().is_match(expression) {
        return INVALID_EXPRESSION.to_string();
    }
    match calculator::evaluate(expression) {
        Ok(value) => value.to_string(),
        Err(e) => format!("Error: {e}"),
    }
}

/// Create the `calculator` tool.
pub fn calculator_tool() -> Arc<dyn Tool> {
    Arc::new(AgentTool::new(
        "calculator",
        "Evaluates a basic arithmetic expression using numbers, parentheses and + - * / operators, and returns the result.",
        AgentToolParameters::object()
            .string("expression", "A string containing a mathematical expression", true)
            .build(),
        |args, _ctx: ToolExecutionContext| async move {
            let expression = args.get_str("expression")?;
            Ok(serde_json::Value::String(evaluate_expression(expression)))
        },
    ))
}

/// Create the `web_url` tool: fetch a page and return its text.
pub fn web_url_tool() -> Arc<dyn Tool> {
    Arc::new(
        AgentTool::new(
            "web_url",
            "Retrieve the readable content of a single web page given its URL.",
            AgentToolParameters::object()
                .string("url", "A single URL to retrieve content from.", true)
                .build(),
            |args, _ctx: ToolExecutionContext| async move {
                let url = args.get_str_opt("url").unwrap_or_default().trim().to_string();
                if url.is_empty() {
                    return Ok(serde_json::Value::String(NO_URL.to_string()));
                }
                let text = fetch_page_text(&url).await?;
                Ok(serde_json::Value::String(format!("Content: {}\n\n", text.trim())))
            },
        )
        .with_side_effect(SideEffect::Network),
    )
}

async fn fetch_page_text(url: &str) -> Result<String, BujjiError> {
    let resp = shared_client()
        .get(url)
        .send()
        .await
        .map_err(|e| BujjiError::tool("web_url", format!("{url}: {e}")))?;
    if !resp.status().is_success() {
        let err = error_from_response(resp).await;
        return Err(BujjiError::tool("web_url", format!("{url}: {err}")));
    }
    let is_html = resp
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.contains("html"))
        .unwrap_or(true);
    let body = resp
        .text()
        .await
        .map_err(|e| BujjiError::tool("web_url", e.to_string()))?;
    let text = if is_html {
        htmd::convert(&body).map_err(|e| BujjiError::tool("web_url", e.to_string()))?
    } else {
        body
    };
    Ok(truncate_utf8(&text, PAGE_MAX_BYTES))
}

/// Create the `web_search` tool (DuckDuckGo instant answers).
pub fn web_search_tool(base_url: impl Into<String>) -> Arc<dyn Tool> {
    let base_url = base_url.into();
    Arc::new(
        AgentTool::new(
            "web_search",
            "Searches the web using DuckDuckGo and returns the results.",
            AgentToolParameters::object()
                .string("query", "The search term to find information from DuckDuckGo.", true)
                .build(),
            move |args, _ctx: ToolExecutionContext| {
                let base_url = base_url.clone();
                async move {
                    let query = args.get_str("query")?.to_string();
                    Ok(serde_json::Value::String(duckduckgo_search(&base_url, &query).await?))
                }
            },
        )
        .with_side_effect(SideEffect::Network),
    )
}

#[derive(Deserialize, Default)]
#[serde(default, rename_all = "PascalCase")]
struct DuckDuckGoResponse {
    heading: String,
    abstract_text: String,
    #[serde(rename = "AbstractURL")]
    abstract_url: String,
    answer: String,
    definition: String,
    related_topics: Vec<DuckDuckGoTopic>,
}

#[derive(Deserialize, Default)]
#[serde(default, rename_all = "PascalCase")]
struct DuckDuckGoTopic {
    text: Option<String>,
    #[serde(rename = "FirstURL")]
    first_url: Option<String>,
    topics: Vec<DuckDuckGoTopic>,
}

async fn duckduckgo_search(base_url: &str, query: &str) -> Result<String, BujjiError> {
    let resp = shared_client()
        .get(format!("{}/", base_url.trim_end_matches('/')))
        .query(&[
            ("q", query),
            ("format", "json"),
            ("no_html", "1"),
            ("skip_disambig", "1"),
        ])
        .send()
        .await
        .map_err(|e| BujjiError::tool("web_search", e.to_string()))?;

    let status = resp.status().as_u16();
    if status == 429 || status == 202 {
        return Ok(SEARCH_RATE_LIMITED.to_string());
    }
    if !resp.status().is_success() {
        let err = error_from_response(resp).await;
        return Err(BujjiError::tool("web_search", err.to_string()));
    }
    // The API answers with `application/x-javascript`, so parse by hand.
    let body = resp
        .text()
        .await
        .map_err(|e| BujjiError::tool("web_search", e.to_string()))?;
    let data: DuckDuckGoResponse = serde_json::from_str(&body)
        .map_err(|e| BujjiError::tool("web_search", format!("unexpected response: {e}")))?;

    let mut lines = Vec::new();
    if !data.answer.is_empty() {
        lines.push(data.answer.clone());
    }
    if !data.abstract_text.is_empty() {
        let mut line = if data.heading.is_empty() {
            data.abstract_text.clone()
        } else {
            format!("{}: {}", data.heading, data.abstract_text)
        };
        if !data.abstract_url.is_empty() {
            line.push_str(&format!(" ({})", data.abstract_url));
        }
        lines.push(line);
    }
    if !data.definition.is_empty() {
        lines.push(data.definition.clone());
    }
    let mut topics: Vec<&DuckDuckGoTopic> = Vec::new();
    for topic in &data.related_topics {
        if topic.topics.is_empty() {
            topics.push(topic);
        } else {
            topics.extend(topic.topics.iter());
        }
    }
    for topic in topics.into_iter().take(5) {
        if let Some(text) = topic.text.as_deref().filter(|t| !t.is_empty()) {
            match topic.first_url.as_deref() {
                Some(url) => lines.push(format!("{text} ({url})")),
                None => lines.push(text.to_string()),
            }
        }
    }

    if lines.is_empty() {
        return Ok(format!("No good DuckDuckGo Search Result was found for '{query}'."));
    }
    Ok(lines.join("\n"))
}

/// Create the `wikipedia` tool: top page summaries for a query.
pub fn wikipedia_tool(base_url: impl Into<String>) -> Arc<dyn Tool> {
    let base_url = base_url.into();
    Arc::new(
        AgentTool::new(
            "wikipedia",
            "Looks up a topic on Wikipedia and returns summaries of the best matching pages.",
            AgentToolParameters::object()
                .string("query", "The topic to look up on Wikipedia.", true)
                .build(),
            move |args, _ctx: ToolExecutionContext| {
                let base_url = base_url.clone();
                async move {
                    let query = args.get_str("query")?.to_string();
                    Ok(serde_json::Value::String(wikipedia_search(&base_url, &query).await?))
                }
            },
        )
        .with_side_effect(SideEffect::Network),
    )
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct WikipediaResponse {
    query: Option<WikipediaQuery>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct WikipediaQuery {
    pages: Vec<WikipediaPage>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct WikipediaPage {
    title: String,
    index: usize,
    extract: String,
}

async fn wikipedia_search(base_url: &str, query: &str) -> Result<String, BujjiError> {
    let limit = WIKIPEDIA_RESULTS.to_string();
    let resp = shared_client()
        .get(format!("{}/w/api.php", base_url.trim_end_matches('/')))
        .query(&[
            ("action", "query"),
            ("format", "json"),
            ("formatversion", "2"),
            ("generator", "search"),
            ("gsrsearch", query),
            ("gsrlimit", limit.as_str()),
            ("prop", "extracts"),
            ("exintro", "1"),
            ("explaintext", "1"),
        ])
        .send()
        .await
        .map_err(|e| BujjiError::tool("wikipedia", e.to_string()))?;
    if !resp.status().is_success() {
        let err = error_from_response(resp).await;
        return Err(BujjiError::tool("wikipedia", err.to_string()));
    }
    let data: WikipediaResponse = resp
        .json()
        .await
        .map_err(|e| BujjiError::tool("wikipedia", e.to_string()))?;

    let mut pages = data.query.map(|q| q.pages).unwrap_or_default();
    pages.sort_by_key(|p| p.index);
    let summaries: Vec<String> = pages
        .into_iter()
        .take(WIKIPEDIA_RESULTS)
        .filter(|p| !p.extract.trim().is_empty())
        .map(|p| format!("Page: {}\nSummary: {}", p.title, p.extract.trim()))
        .collect();

    if summaries.is_empty() {
        return Ok("No good Wikipedia Search Result was found".to_string());
    }
    Ok(summaries.join("\n\n"))
}

/// Create the `vector_db` tool: similarity search over the session's
/// vector store.
pub fn vector_db_tool() -> Arc<dyn Tool> {
    Arc::new(
        AgentTool::new(
            "vector_db",
            "Searches the user's past conversations and stored documents for passages similar to the query.",
            AgentToolParameters::object()
                .string("query", "Text to search the vector database for.", true)
                .integer("k", "Number of chunks to return (at most 10).", false)
                .build(),
            |args, ctx: ToolExecutionContext| async move {
                let query = args.get_str("query")?;
                let k = args
                    .get_i64_opt("k")
                    .unwrap_or(VECTOR_DEFAULT_K)
                    .clamp(1, VECTOR_MAX_K) as usize;
                let store = ctx.vector_store.as_ref().ok_or_else(|| {
                    BujjiError::tool("vector_db", "no vector database is bound to this session")
                })?;
                Ok(serde_json::Value::String(store.query(query, k).await?))
            },
        )
        .with_side_effect(SideEffect::Stateful),
    )
}

/// Return all built-in tools.
pub fn all_tools(endpoints: &BuiltinEndpoints) -> Vec<Arc<dyn Tool>> {
    vec![
        calculator_tool(),
        web_url_tool(),
        web_search_tool(endpoints.duckduckgo.clone()),
        wikipedia_tool(endpoints.wikipedia.clone()),
        vector_db_tool(),
    ]
}
