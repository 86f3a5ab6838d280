//! Tool registry and uniform envelope dispatch.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{json, Map, Value};
use tracing::debug;

use crate::error::SkiffError;
use crate::tools::json_args::normalize_json_arguments;
use crate::tools::tool::{error_envelope, success_envelope, Tool, ToolContext};
use crate::types::{ToolCall, ToolDefinition};

/// Name-keyed collection of tools.
///
/// Keys are the tool names; iteration order (and thus definition order) is
/// lexicographic and stable across runs.
#[derive(Clone)]
pub struct Registry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl Registry {
    pub fn new(tools: Vec<Arc<dyn Tool>>) -> Self {
        let tools = tools
            .into_iter()
            .map(|tool| (tool.name().to_string(), tool))
            .collect();
        Self { tools }
    }

    /// Definitions for every registered tool, in stable name order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|tool| tool.definition()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Execute a tool call, returning the encoded response envelope.
    ///
    /// Returns `None` only when no tool with the call's name is registered.
    /// Every other outcome, including context validation failures, argument
    /// repair failures, and tool errors, is reported inside an envelope so
    /// the model always receives a uniform result shape.
    pub async fn execute(&self, call: &ToolCall, ctx: &ToolContext) -> Option<String> {
        let tool = self.tools.get(&call.name)?;

        let meta = build_meta(call, ctx);

        if ctx.cwd.trim().is_empty() || ctx.allowed_root.trim().is_empty() {
            return Some(error_envelope(
                "invalid tool context: cwd and allowed_root are required",
                meta,
            ));
        }

        if ctx.cancel.is_cancelled() {
            return Some(error_envelope("tool execution cancelled", meta));
        }

        let arguments = match normalize_json_arguments(&call.arguments) {
            Some(arguments) => arguments,
            None => {
                debug!(tool = %call.name, "unrecoverable tool arguments");
                return Some(error_envelope(
                    format!("{}: invalid JSON arguments", call.name),
                    meta,
                ));
            }
        };

        match tool.execute(ctx, &arguments).await {
            Ok(data) => Some(success_envelope(data, meta)),
            Err(err) => {
                // ToolExecution errors already carry the "<tool>: " prefix.
                let message = match &err {
                    SkiffError::ToolExecution { .. } => err.to_string(),
                    _ => format!("{}: {err}", call.name),
                };
                Some(error_envelope(message, meta))
            }
        }
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn build_meta(call: &ToolCall, ctx: &ToolContext) -> Map<String, Value> {
    let mut meta = Map::new();
    meta.insert("tool".into(), json!(call.name));
    if !ctx.cwd.trim().is_empty() {
        meta.insert("cwd".into(), json!(ctx.cwd));
    }
    if !ctx.correlation_id.trim().is_empty() {
        meta.insert("correlation_id".into(), json!(ctx.correlation_id));
    }
    if !ctx.allowed_root.trim().is_empty() {
        meta.insert("allowed_root".into(), json!(ctx.allowed_root));
    }
    if ctx.timeout > std::time::Duration::ZERO {
        meta.insert("timeout_ms".into(), json!(ctx.timeout.as_millis() as u64));
    }
    meta
}
