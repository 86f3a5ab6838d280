//! File reading confined to the allowed root.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{Result, SkiffError};
use crate::tools::path_policy::{ensure_path_allowed, resolve_path};
use crate::tools::tool::{Tool, ToolContext};
use crate::types::ToolDefinition;

#[derive(Debug, Deserialize)]
struct ReadArgs {
    #[serde(default)]
    file_path: String,
}

/// Returns the full text content of a file.
pub struct ReadTool;

#[async_trait]
impl Tool for ReadTool {
    fn name(&self) -> &str {
        "Read"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "Read".into(),
            description: "Read a text file and return its full content.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "file_path": {
                        "type": "string",
                        "description": "Path to the file, absolute or relative to the working directory."
                    }
                },
                "required": ["file_path"]
            }),
        }
    }

    async fn execute(&self, ctx: &ToolContext, arguments: &str) -> Result<Value> {
        let args: ReadArgs = serde_json::from_str(arguments)
            .map_err(|err| SkiffError::InvalidArgument(format!("invalid Read arguments: {err}")))?;
        if args.file_path.trim().is_empty() {
            return Err(SkiffError::InvalidArgument(
                "file_path must be a non-empty string".into(),
            ));
        }

        let path = resolve_path(&ctx.cwd, &args.file_path);
        ensure_path_allowed(&ctx.allowed_root, &path)?;

        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|err| SkiffError::ToolExecution {
                tool_name: "Read".into(),
                message: format!("failed to read {}: {err}", path.display()),
            })?;

        Ok(Value::String(content))
    }
}
