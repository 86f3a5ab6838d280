//! Web page fetching behind the network policy.

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{Result, SkiffError};
use crate::provider::http::shared_client;
use crate::tools::network_policy::NetworkPolicy;
use crate::tools::tool::{Tool, ToolContext};
use crate::types::ToolDefinition;

const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(20);

/// Response bodies are read up to this many bytes and then cut off.
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

#[derive(Debug, Deserialize)]
struct FetchArgs {
    #[serde(default)]
    url: String,
}

/// Fetches a URL and returns its content, with HTML reduced to text.
pub struct FetchWebPageTool {
    policy: NetworkPolicy,
}

impl FetchWebPageTool {
    pub fn new(policy: NetworkPolicy) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl Tool for FetchWebPageTool {
    fn name(&self) -> &str {
        "FetchWebPage"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "FetchWebPage".into(),
            description: "Fetch a web page over http or https and return its text content. \
                          HTML is stripped down to readable text."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "url": {
                        "type": "string",
                        "description": "The URL to fetch."
                    }
                },
                "required": ["url"]
            }),
        }
    }

    async fn execute(&self, ctx: &ToolContext, arguments: &str) -> Result<Value> {
        let args: FetchArgs = serde_json::from_str(arguments).map_err(|err| {
            SkiffError::InvalidArgument(format!("invalid FetchWebPage arguments: {err}"))
        })?;
        let url = args.url.trim().to_string();
        if url.is_empty() {
            return Err(SkiffError::InvalidArgument(
                "url must be a non-empty string".into(),
            ));
        }

        self.policy.ensure_url_allowed(&url).await?;

        let timeout = ctx.effective_timeout(DEFAULT_FETCH_TIMEOUT);
        let (content_type, body) = tokio::select! {
            _ = ctx.cancel.cancelled() => return Err(SkiffError::Cancelled),
            result = tokio::time::timeout(timeout, fetch_body(&url)) => match result {
                Ok(fetched) => fetched?,
                Err(_) => return Err(SkiffError::Timeout(timeout)),
            },
        };

        let text = String::from_utf8_lossy(&body);
        let content = if content_type.contains("text/html") {
            html_to_text(&text)
        } else {
            text.into_owned()
        };

        Ok(json!({
            "url": url,
            "content_type": content_type,
            "content": content,
        }))
    }
}

async fn fetch_body(url: &str) -> Result<(String, Vec<u8>)> {
    let mut response = shared_client().get(url).send().await?;

    let status = response.status();
    if !status.is_success() {
        return Err(SkiffError::ToolExecution {
            tool_name: "FetchWebPage".into(),
            message: format!("request failed with status {status}"),
        });
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();

    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        let remaining = MAX_BODY_BYTES - body.len();
        if chunk.len() >= remaining {
            body.extend_from_slice(&chunk[..remaining]);
            break;
        }
        body.extend_from_slice(&chunk);
    }

    Ok((content_type, body))
}

/// Reduce an HTML document to whitespace-normalized text.
fn html_to_text(html: &str) -> String {
    static SCRIPT: OnceLock<Regex> = OnceLock::new();
    static STYLE: OnceLock<Regex> = OnceLock::new();
    static TAG: OnceLock<Regex> = OnceLock::new();
    static SPACE: OnceLock<Regex> = OnceLock::new();

    let script =
        SCRIPT.get_or_init(|| Regex::new(r"(?is)<script[^>]*>.*?</script>").expect("script regex"));
    let style =
        STYLE.get_or_init(|| Regex::new(r"(?is)<style[^>]*>.*?</style>").expect("style regex"));
    let tag = TAG.get_or_init(|| Regex::new(r"(?s)<[^>]+>").expect("tag regex"));
    let space = SPACE.get_or_init(|| Regex::new(r"\s+").expect("space regex"));

    let without_script = script.replace_all(html, " ");
    let without_style = style.replace_all(&without_script, " ");
    let without_tags = tag.replace_all(&without_style, " ");
    let decoded = decode_entities(&without_tags);
    space.replace_all(&decoded, " ").trim().to_string()
}

/// Decode the common named entities and numeric character references.
/// Unknown entities are left as-is.
fn decode_entities(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];

        // Scan for the terminator char-wise; a byte-offset slice could land
        // inside a multi-byte character and panic.
        let end = rest
            .char_indices()
            .take_while(|(index, _)| *index <= 12)
            .find(|(_, ch)| *ch == ';')
            .map(|(index, _)| index);
        if let Some(end) = end {
            if let Some(decoded) = decode_entity(&rest[1..end]) {
                out.push(decoded);
                rest = &rest[end + 1..];
                continue;
            }
        }
        out.push('&');
        rest = &rest[1..];
    }
    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some(' '),
        _ => {
            let digits = name.strip_prefix('#')?;
            let code = if let Some(hex) = digits.strip_prefix(['x', 'X']) {
                u32::from_str_radix(hex, 16).ok()?
            } else {
                digits.parse().ok()?
            };
            char::from_u32(code)
        }
    }
}
