//! Web search backed by an Ollama-compatible search endpoint.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{Result, SkiffError};
use crate::provider::http::shared_client;
use crate::tools::network_policy::NetworkPolicy;
use crate::tools::tool::{Tool, ToolContext};
use crate::types::ToolDefinition;

const DEFAULT_SEARCH_TIMEOUT: Duration = Duration::from_secs(20);
const DEFAULT_MAX_RESULTS: u32 = 5;

/// Endpoint and credentials for the search backend.
#[derive(Debug, Clone)]
pub struct WebSearchConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
}

impl Default for WebSearchConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://ollama.com/api/web_search".into(),
            api_key: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchArgs {
    #[serde(default)]
    query: String,
    #[serde(default)]
    max_results: Option<Value>,
}

/// Queries the configured search endpoint and normalizes its results.
pub struct WebSearchOllamaTool {
    config: WebSearchConfig,
    policy: NetworkPolicy,
}

impl WebSearchOllamaTool {
    pub fn new(config: WebSearchConfig, policy: NetworkPolicy) -> Self {
        Self { config, policy }
    }
}

#[async_trait]
impl Tool for WebSearchOllamaTool {
    fn name(&self) -> &str {
        "WebSearchOllama"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "WebSearchOllama".into(),
            description: "Search the web and return a list of results with title, url, and \
                          snippet."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "The search query."
                    },
                    "max_results": {
                        "type": "integer",
                        "description": "Maximum number of results to return. Defaults to 5."
                    }
                },
                "required": ["query"]
            }),
        }
    }

    async fn execute(&self, ctx: &ToolContext, arguments: &str) -> Result<Value> {
        let args: SearchArgs = serde_json::from_str(arguments).map_err(|err| {
            SkiffError::InvalidArgument(format!("invalid WebSearchOllama arguments: {err}"))
        })?;
        let query = args.query.trim().to_string();
        if query.is_empty() {
            return Err(SkiffError::InvalidArgument(
                "query must be a non-empty string".into(),
            ));
        }

        let endpoint = self.config.endpoint.trim();
        if endpoint.is_empty() {
            return Err(SkiffError::Configuration(
                "web search endpoint is not configured".into(),
            ));
        }

        self.policy.ensure_url_allowed(endpoint).await?;

        let max_results = coerce_max_results(args.max_results.as_ref());
        let timeout = ctx.effective_timeout(DEFAULT_SEARCH_TIMEOUT);

        let body = tokio::select! {
            _ = ctx.cancel.cancelled() => return Err(SkiffError::Cancelled),
            result = tokio::time::timeout(
                timeout,
                post_query(endpoint, self.config.api_key.as_deref(), &query, max_results),
            ) => match result {
                Ok(body) => body?,
                Err(_) => return Err(SkiffError::Timeout(timeout)),
            },
        };

        Ok(json!({
            "query": query,
            "results": normalize_results(&body),
        }))
    }
}

async fn post_query(
    endpoint: &str,
    api_key: Option<&str>,
    query: &str,
    max_results: u32,
) -> Result<Value> {
    let mut request = shared_client()
        .post(endpoint)
        .json(&json!({ "query": query, "max_results": max_results }));
    if let Some(key) = api_key {
        request = request.bearer_auth(key);
    }

    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(SkiffError::ToolExecution {
            tool_name: "WebSearchOllama".into(),
            message: format!("search request failed with status {status}"),
        });
    }

    Ok(response.json().await?)
}

/// Accept a number or a numeric string; anything else, or a non-positive
/// value, falls back to the default.
fn coerce_max_results(raw: Option<&Value>) -> u32 {
    let value = match raw {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match value {
        Some(n) if n >= 1.0 => n as u32,
        _ => DEFAULT_MAX_RESULTS,
    }
}

/// Flatten whatever shape the backend returned into uniform result rows.
/// Accepts a bare top-level array as well as the keyed wrappers. Rows
/// without a URL are dropped.
fn normalize_results(body: &Value) -> Vec<Value> {
    let rows = match body {
        Value::Array(rows) => Some(rows),
        _ => ["results", "items", "data"]
            .iter()
            .find_map(|key| body.get(*key).and_then(Value::as_array)),
    };
    let Some(rows) = rows else {
        return Vec::new();
    };

    rows.iter()
        .filter_map(|row| {
            let url = first_string(row, &["url", "link"]);
            if url.is_empty() {
                return None;
            }
            Some(json!({
                "title": first_string(row, &["title", "name"]),
                "url": url,
                "snippet": first_string(row, &["snippet", "description", "content"]),
            }))
        })
        .collect()
}

fn first_string(row: &Value, keys: &[&str]) -> String {
    keys.iter()
        .find_map(|key| row.get(*key).and_then(Value::as_str))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn ctx() -> ToolContext {
        ToolContext {
            cwd: "/work".into(),
            allowed_root: "/work".into(),
            ..ToolContext::default()
        }
    }

    fn tool_for(server: &MockServer, api_key: Option<&str>) -> WebSearchOllamaTool {
        WebSearchOllamaTool::new(
            WebSearchConfig {
                endpoint: format!("{}/api/web_search", server.uri()),
                api_key: api_key.map(String::from),
            },
            NetworkPolicy::new(true),
        )
    }

    #[test]
    fn max_results_coercion() {
        assert_eq!(coerce_max_results(None), 5);
        assert_eq!(coerce_max_results(Some(&json!(3))), 3);
        assert_eq!(coerce_max_results(Some(&json!(2.9))), 2);
        assert_eq!(coerce_max_results(Some(&json!("7"))), 7);
        assert_eq!(coerce_max_results(Some(&json!(0))), 5);
        assert_eq!(coerce_max_results(Some(&json!(-2))), 5);
        assert_eq!(coerce_max_results(Some(&json!("junk"))), 5);
        assert_eq!(coerce_max_results(Some(&json!(true))), 5);
    }

    #[test]
    fn result_rows_without_url_are_dropped() {
        let body = json!({
            "results": [
                {"title": "Keep", "url": "https://a.example", "snippet": "good"},
                {"title": "Drop", "url": ""},
                {"title": "NoUrl"}
            ]
        });
        let rows = normalize_results(&body);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["url"], json!("https://a.example"));
    }

    #[test]
    fn top_level_array_payload_is_accepted() {
        let body = json!([
            {"title": "Bare", "url": "https://bare.example", "snippet": "row"},
            {"title": "NoUrl"}
        ]);
        let rows = normalize_results(&body);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["url"], json!("https://bare.example"));
    }

    #[test]
    fn alias_keys_are_recognized() {
        let body = json!({
            "items": [
                {"name": "Aliased", "link": "https://b.example", "description": "text"}
            ]
        });
        let rows = normalize_results(&body);
        assert_eq!(
            rows[0],
            json!({"title": "Aliased", "url": "https://b.example", "snippet": "text"})
        );
    }

    #[tokio::test]
    async fn posts_query_and_returns_normalized_rows() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/web_search"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({"query": "rust agents", "max_results": 2})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [
                    {"title": "One", "url": "https://one.example", "snippet": "first"},
                    {"title": "Two", "url": "https://two.example", "snippet": "second"}
                ]
            })))
            .mount(&server)
            .await;

        let tool = tool_for(&server, Some("sk-test"));
        let result = tool
            .execute(&ctx(), r#"{"query": "rust agents", "max_results": 2}"#)
            .await
            .unwrap();

        assert_eq!(result["query"], json!("rust agents"));
        assert_eq!(result["results"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn backend_failure_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/web_search"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let tool = tool_for(&server, None);
        let err = tool
            .execute(&ctx(), r#"{"query": "anything"}"#)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("500"));
    }

    #[tokio::test]
    async fn blank_query_is_rejected() {
        let server = MockServer::start().await;
        let tool = tool_for(&server, None);
        let err = tool.execute(&ctx(), r#"{"query": "  "}"#).await.unwrap_err();
        assert!(matches!(err, SkiffError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn blank_endpoint_is_a_configuration_error() {
        let tool = WebSearchOllamaTool::new(
            WebSearchConfig {
                endpoint: String::new(),
                api_key: None,
            },
            NetworkPolicy::new(true),
        );
        let err = tool
            .execute(&ctx(), r#"{"query": "anything"}"#)
            .await
            .unwrap_err();
        assert!(matches!(err, SkiffError::Configuration(_)));
    }
}
