//! File writing confined to the allowed root.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{Result, SkiffError};
use crate::tools::path_policy::{ensure_path_allowed, resolve_path};
use crate::tools::tool::{Tool, ToolContext};
use crate::types::ToolDefinition;

#[derive(Debug, Deserialize)]
struct WriteArgs {
    #[serde(default)]
    file_path: String,
    #[serde(default)]
    content: String,
}

/// Creates or overwrites a file, creating parent directories as needed.
pub struct WriteTool;

#[async_trait]
impl Tool for WriteTool {
    fn name(&self) -> &str {
        "Write"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "Write".into(),
            description: "Write content to a file, replacing any existing content. Parent \
                          directories are created when missing."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "file_path": {
                        "type": "string",
                        "description": "Path to the file, absolute or relative to the working directory."
                    },
                    "content": {
                        "type": "string",
                        "description": "The full content to write."
                    }
                },
                "required": ["file_path", "content"]
            }),
        }
    }

    async fn execute(&self, ctx: &ToolContext, arguments: &str) -> Result<Value> {
        let args: WriteArgs = serde_json::from_str(arguments).map_err(|err| {
            SkiffError::InvalidArgument(format!("invalid Write arguments: {err}"))
        })?;
        if args.file_path.trim().is_empty() {
            return Err(SkiffError::InvalidArgument(
                "file_path must be a non-empty string".into(),
            ));
        }

        let path = resolve_path(&ctx.cwd, &args.file_path);
        ensure_path_allowed(&ctx.allowed_root, &path)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| SkiffError::ToolExecution {
                    tool_name: "Write".into(),
                    message: format!("failed to create {}: {err}", parent.display()),
                })?;
        }

        tokio::fs::write(&path, &args.content)
            .await
            .map_err(|err| SkiffError::ToolExecution {
                tool_name: "Write".into(),
                message: format!("failed to write {}: {err}", path.display()),
            })?;

        Ok(json!({
            "file_path": path.display().to_string(),
            "content": args.content,
        }))
    }
}
