//! Turn orchestration and tool dispatch.

pub mod runner;

pub use runner::{Policy, RunError, Runner};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use uuid::Uuid;

use crate::tools::tool::error_envelope;
use crate::tools::{Registry, ToolContext};
use crate::types::ToolCall;

/// Seam between the turn runner and tool execution.
///
/// Implementations must be total: every call, including one naming a tool
/// that does not exist, yields an encoded envelope string for the model.
#[async_trait]
pub trait ToolDispatcher: Send + Sync {
    async fn dispatch(
        &self,
        cancel: &CancellationToken,
        correlation_id: &str,
        call: &ToolCall,
    ) -> String;
}

/// Dispatcher backed by a [`Registry`], with fixed working-directory
/// confinement and a per-call timeout.
pub struct EnvelopeDispatcher {
    registry: Arc<Registry>,
    cwd: String,
    allowed_root: String,
    tool_timeout: Duration,
}

impl EnvelopeDispatcher {
    pub fn new(
        registry: Arc<Registry>,
        cwd: String,
        allowed_root: String,
        tool_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            cwd,
            allowed_root,
            tool_timeout,
        }
    }
}

#[async_trait]
impl ToolDispatcher for EnvelopeDispatcher {
    async fn dispatch(
        &self,
        cancel: &CancellationToken,
        correlation_id: &str,
        call: &ToolCall,
    ) -> String {
        let ctx = ToolContext {
            cwd: self.cwd.clone(),
            allowed_root: self.allowed_root.clone(),
            timeout: self.tool_timeout,
            cancel: cancel.child_token(),
            correlation_id: correlation_id.to_string(),
        };

        match self.registry.execute(call, &ctx).await {
            Some(envelope) => envelope,
            None => {
                warn!(tool = %call.name, "model requested unknown tool");
                let mut meta = serde_json::Map::new();
                meta.insert("tool".into(), json!(call.name));
                error_envelope(format!("unknown tool '{}'", call.name), meta)
            }
        }
    }
}

/// Fresh id correlating every log line and tool invocation of one prompt.
pub fn new_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

/// System prompt seeded at the start of a fresh conversation.
pub fn build_system_prompt(now: chrono::DateTime<chrono::Local>) -> String {
    format!(
        "You are Skiff, a command-line agent that completes tasks by calling tools.\n\
         \n\
         Guidelines:\n\
         - Prefer tools over guessing. Read files before editing them.\n\
         - File access is confined to the working directory; do not try to escape it.\n\
         - Shell commands run non-interactively with a timeout. Avoid commands that \
         wait for input.\n\
         - When the task is done, reply with a concise summary of what you did.\n\
         \n\
         Current date: {}",
        now.format("%Y-%m-%d")
    )
}
