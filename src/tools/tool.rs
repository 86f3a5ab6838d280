//! Tool trait, execution context, and the response envelope.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::types::ToolDefinition;

/// Fallback emitted when the envelope itself cannot be encoded.
const ENCODE_FAILURE_ENVELOPE: &str =
    r#"{"ok":false,"error":{"message":"failed to encode tool response envelope"}}"#;

/// Context available during tool execution.
///
/// Created per tool invocation by the dispatch layer and never persisted.
/// The cancellation token is distinct per invocation, derived from the
/// prompt-wide token; every blocking operation inside a tool must honor it
/// along with the timeout.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub cwd: String,
    pub allowed_root: String,
    pub timeout: Duration,
    pub cancel: CancellationToken,
    pub correlation_id: String,
}

impl ToolContext {
    /// The configured timeout, or `fallback` when none was set.
    pub fn effective_timeout(&self, fallback: Duration) -> Duration {
        if self.timeout > Duration::ZERO {
            self.timeout
        } else {
            fallback
        }
    }
}

impl Default for ToolContext {
    fn default() -> Self {
        Self {
            cwd: String::new(),
            allowed_root: String::new(),
            timeout: Duration::ZERO,
            cancel: CancellationToken::new(),
            correlation_id: String::new(),
        }
    }
}

/// Core tool trait, one implementation per capability.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (must match what the model calls).
    fn name(&self) -> &str;

    /// Machine-readable definition handed to the provider.
    fn definition(&self) -> ToolDefinition;

    /// Execute with normalized JSON argument text.
    async fn execute(&self, ctx: &ToolContext, arguments: &str) -> Result<serde_json::Value>;
}

/// The only shape in which a tool result reaches the provider.
///
/// Exactly one of `data`/`error` is populated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ResponseError>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub meta: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseError {
    pub message: String,
}

/// Encode a success envelope.
pub fn success_envelope(
    data: serde_json::Value,
    meta: serde_json::Map<String, serde_json::Value>,
) -> String {
    encode_envelope(&ResponseEnvelope {
        ok: true,
        data: Some(data),
        error: None,
        meta,
    })
}

/// Encode an error envelope.
pub fn error_envelope(
    message: impl Into<String>,
    meta: serde_json::Map<String, serde_json::Value>,
) -> String {
    encode_envelope(&ResponseEnvelope {
        ok: false,
        data: None,
        error: Some(ResponseError {
            message: message.into(),
        }),
        meta,
    })
}

fn encode_envelope(envelope: &ResponseEnvelope) -> String {
    serde_json::to_string(envelope).unwrap_or_else(|_| ENCODE_FAILURE_ENVELOPE.to_string())
}
