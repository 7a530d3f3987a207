//! Internet search tool.
//!
//! Defaults to the keyless DuckDuckGo Instant Answer API; switches to
//! Google Custom Search when an API key and engine id are configured.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use agent_core::tool::{ParameterSchema, Tool, ToolArgs, ToolError, ToolSchema};

const MAX_RESULTS: usize = 10;

/// Which search backend to query
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SearchBackend {
    #[default]
    DuckDuckGo,
    Google,
}

/// Search tool configuration
#[derive(Clone, Debug, Default)]
pub struct SearchConfig {
    pub backend: SearchBackend,
    pub google_api_key: Option<String>,
    pub google_engine_id: Option<String>,
}

impl SearchConfig {
    /// Prefer Google when credentials are present in the environment
    pub fn from_env() -> Self {
        let google_api_key = std::env::var("GOOGLE_API_KEY").ok();
        let google_engine_id = std::env::var("GOOGLE_ENGINE_ID").ok();
        let backend = if google_api_key.is_some() && google_engine_id.is_some() {
            SearchBackend::Google
        } else {
            SearchBackend::DuckDuckGo
        };
        Self {
            backend,
            google_api_key,
            google_engine_id,
        }
    }
}

/// Runs a web search and returns matching snippets
pub struct SearchInternetTool {
    client: reqwest::Client,
    config: SearchConfig,
}

impl SearchInternetTool {
    pub fn new(config: SearchConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .user_agent("agent-cli/0.1")
            .build()
            .unwrap_or_default();
        Self { client, config }
    }

    async fn search_google(&self, query: &str) -> Result<String, ToolError> {
        let (Some(key), Some(engine)) = (
            self.config.google_api_key.as_deref(),
            self.config.google_engine_id.as_deref(),
        ) else {
            return Err(ToolError::Execution(
                "Google search requires GOOGLE_API_KEY and GOOGLE_ENGINE_ID".into(),
            ));
        };

        let response = self
            .client
            .get("https://www.googleapis.com/customsearch/v1")
            .query(&[
                ("key", key),
                ("cx", engine),
                ("q", query),
                ("num", "10"),
            ])
            .send()
            .await
            .map_err(|e| ToolError::Execution(format!("Google search request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(ToolError::Execution(format!(
                "Google search request failed: HTTP {}",
                response.status()
            )));
        }

        let data: Value = response
            .json()
            .await
            .map_err(|e| ToolError::Execution(format!("failed to parse search results: {e}")))?;

        let mut snippets = Vec::new();
        if let Some(items) = data.get("items").and_then(Value::as_array) {
            for item in items.iter().take(MAX_RESULTS) {
                snippets.push(format_snippet(
                    item.get("title").and_then(Value::as_str),
                    item.get("snippet").and_then(Value::as_str),
                    item.get("link").and_then(Value::as_str),
                ));
            }
        }
        Ok(render_results(snippets))
    }

    async fn search_duckduckgo(&self, query: &str) -> Result<String, ToolError> {
        let response = self
            .client
            .get("https://api.duckduckgo.com/")
            .query(&[("q", query), ("format", "json"), ("no_html", "1")])
            .send()
            .await
            .map_err(|e| ToolError::Execution(format!("DuckDuckGo search failed: {e}")))?;

        if !response.status().is_success() {
            return Err(ToolError::Execution(format!(
                "DuckDuckGo search failed: HTTP {}",
                response.status()
            )));
        }

        let data: Value = response
            .json()
            .await
            .map_err(|e| ToolError::Execution(format!("failed to parse search results: {e}")))?;

        Ok(render_results(duckduckgo_snippets(&data)))
    }
}

#[async_trait]
impl Tool for SearchInternetTool {
    fn schema(&self) -> ToolSchema {
        let backend = match self.config.backend {
            SearchBackend::DuckDuckGo => "DuckDuckGo",
            SearchBackend::Google => "Google",
        };
        ToolSchema {
            name: "search_internet".into(),
            description: format!(
                "Run an internet search using {backend} and return matching snippets."
            ),
            parameters: vec![ParameterSchema {
                name: "query".into(),
                param_type: "string".into(),
                description: "Search query".into(),
                required: true,
            }],
        }
    }

    async fn execute(&self, args: &ToolArgs) -> Result<String, ToolError> {
        let query = args
            .get("query")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidArguments("'query' must be a string".into()))?;

        match self.config.backend {
            SearchBackend::Google => self.search_google(query).await,
            SearchBackend::DuckDuckGo => self.search_duckduckgo(query).await,
        }
    }
}

/// Pull snippets out of an Instant Answer response: the abstract first,
/// then related topics (including one level of nested groups).
fn duckduckgo_snippets(data: &Value) -> Vec<String> {
    let mut snippets = Vec::new();

    let abstract_text = data
        .get("AbstractText")
        .and_then(Value::as_str)
        .unwrap_or_default();
    if !abstract_text.is_empty() {
        snippets.push(format_snippet(
            data.get("Heading").and_then(Value::as_str),
            Some(abstract_text),
            data.get("AbstractURL").and_then(Value::as_str),
        ));
    }

    let mut topics: Vec<&Value> = Vec::new();
    if let Some(related) = data.get("RelatedTopics").and_then(Value::as_array) {
        for entry in related {
            if let Some(nested) = entry.get("Topics").and_then(Value::as_array) {
                topics.extend(nested.iter());
            } else {
                topics.push(entry);
            }
        }
    }
    for topic in topics {
        if snippets.len() >= MAX_RESULTS {
            break;
        }
        let text = topic.get("Text").and_then(Value::as_str).unwrap_or_default();
        if text.is_empty() {
            continue;
        }
        snippets.push(format_snippet(
            None,
            Some(text),
            topic.get("FirstURL").and_then(Value::as_str),
        ));
    }

    snippets
}

fn format_snippet(title: Option<&str>, body: Option<&str>, url: Option<&str>) -> String {
    let mut entry = format!("- {}", title.unwrap_or("(untitled)"));
    if let Some(body) = body {
        if !body.is_empty() {
            entry.push_str(&format!(" - {body}"));
        }
    }
    if let Some(url) = url {
        if !url.is_empty() {
            entry.push_str(&format!(" ({url})"));
        }
    }
    entry
}

fn render_results(snippets: Vec<String>) -> String {
    if snippets.is_empty() {
        "No search results found.".into()
    } else {
        format!("Search results:\n{}", snippets.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_duckduckgo_snippets_with_abstract_and_topics() {
        let data = json!({
            "Heading": "Rust",
            "AbstractText": "A systems programming language.",
            "AbstractURL": "https://www.rust-lang.org",
            "RelatedTopics": [
                {"Text": "Cargo - package manager", "FirstURL": "https://doc.rust-lang.org/cargo"},
                {"Topics": [
                    {"Text": "Clippy - lints", "FirstURL": "https://github.com/rust-lang/rust-clippy"}
                ]}
            ]
        });

        let snippets = duckduckgo_snippets(&data);
        assert_eq!(snippets.len(), 3);
        assert!(snippets[0].contains("Rust"));
        assert!(snippets[1].contains("Cargo"));
        assert!(snippets[2].contains("Clippy"));
    }

    #[test]
    fn test_empty_results_message() {
        assert_eq!(render_results(Vec::new()), "No search results found.");
        let snippets = duckduckgo_snippets(&json!({"RelatedTopics": []}));
        assert!(snippets.is_empty());
    }

    #[tokio::test]
    async fn test_google_backend_without_keys_fails_softly() {
        let tool = SearchInternetTool::new(SearchConfig {
            backend: SearchBackend::Google,
            google_api_key: None,
            google_engine_id: None,
        });
        let mut args = ToolArgs::new();
        args.insert("query".into(), json!("rust"));

        let err = tool.execute(&args).await.unwrap_err();
        assert!(err.to_string().contains("GOOGLE_API_KEY"));
    }
}
