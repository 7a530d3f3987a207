//! Web page fetch tool.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;

use agent_core::tool::{ParameterSchema, Tool, ToolArgs, ToolError, ToolSchema};

static SCRIPT_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<script.*?</script>").expect("valid pattern"));
static STYLE_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<style.*?</style>").expect("valid pattern"));
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").expect("valid pattern"));
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid pattern"));

/// Fetches a URL and returns its text content, with HTML reduced to
/// readable plain text.
pub struct ReadUrlTool {
    client: reqwest::Client,
}

impl ReadUrlTool {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .user_agent("agent-cli/0.1")
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

impl Default for ReadUrlTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for ReadUrlTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "read_url".into(),
            description: "Fetch the text content of a webpage and return a trimmed plain-text summary."
                .into(),
            parameters: vec![ParameterSchema {
                name: "url".into(),
                param_type: "string".into(),
                description: "Fully-formed http(s) URL".into(),
                required: true,
            }],
        }
    }

    async fn execute(&self, args: &ToolArgs) -> Result<String, ToolError> {
        let url = args
            .get("url")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidArguments("'url' must be a string".into()))?;

        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ToolError::InvalidArguments(
                "only http and https URLs are supported".into(),
            ));
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ToolError::Execution(format!("failed to fetch URL: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::Execution(format!("HTTP error: {status}")));
        }

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_lowercase();
        let body = response
            .text()
            .await
            .map_err(|e| ToolError::Execution(format!("failed to read response: {e}")))?;

        if content_type.contains("html") || content_type.is_empty() {
            Ok(strip_html(&body))
        } else {
            Ok(body.trim().to_string())
        }
    }
}

/// Reduce an HTML document to readable plain text
pub fn strip_html(html: &str) -> String {
    let text = SCRIPT_BLOCK.replace_all(html, "");
    let text = STYLE_BLOCK.replace_all(&text, "");
    let text = TAG.replace_all(&text, " ");
    let text = decode_entities(&text);
    WHITESPACE.replace_all(&text, " ").trim().to_string()
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_html_removes_scripts_and_tags() {
        let html = r#"<html><head><style>body { color: red; }</style>
            <script>alert("x");</script></head>
            <body><h1>Title</h1><p>Some &amp; more text.</p></body></html>"#;
        let text = strip_html(html);
        assert_eq!(text, "Title Some & more text.");
    }

    #[test]
    fn test_strip_html_handles_plain_text() {
        assert_eq!(strip_html("no markup here"), "no markup here");
    }

    #[tokio::test]
    async fn test_rejects_non_http_url() {
        let tool = ReadUrlTool::new();
        let mut args = ToolArgs::new();
        args.insert("url".into(), serde_json::json!("file:///etc/passwd"));
        let err = tool.execute(&args).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
