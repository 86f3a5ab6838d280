//! Directory listing confined to the allowed root.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{Result, SkiffError};
use crate::tools::path_policy::{ensure_path_allowed, resolve_path};
use crate::tools::tool::{Tool, ToolContext};
use crate::types::ToolDefinition;

#[derive(Debug, Deserialize)]
struct ListDirArgs {
    #[serde(default)]
    path: String,
}

/// Lists directory entries with a file/dir kind for each.
pub struct ListDirTool;

#[async_trait]
impl Tool for ListDirTool {
    fn name(&self) -> &str {
        "ListDir"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "ListDir".into(),
            description: "List the entries of a directory. Defaults to the working directory."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Directory to list, absolute or relative to the working directory."
                    }
                }
            }),
        }
    }

    async fn execute(&self, ctx: &ToolContext, arguments: &str) -> Result<Value> {
        let args: ListDirArgs = serde_json::from_str(arguments).map_err(|err| {
            SkiffError::InvalidArgument(format!("invalid ListDir arguments: {err}"))
        })?;

        let path = resolve_path(&ctx.cwd, &args.path);
        ensure_path_allowed(&ctx.allowed_root, &path)?;

        let mut reader = tokio::fs::read_dir(&path)
            .await
            .map_err(|err| SkiffError::ToolExecution {
                tool_name: "ListDir".into(),
                message: format!("failed to list {}: {err}", path.display()),
            })?;

        let mut entries = Vec::new();
        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|err| SkiffError::ToolExecution {
                tool_name: "ListDir".into(),
                message: format!("failed to list {}: {err}", path.display()),
            })?
        {
            let kind = match entry.file_type().await {
                Ok(file_type) if file_type.is_dir() => "dir",
                _ => "file",
            };
            entries.push(json!({
                "name": entry.file_name().to_string_lossy(),
                "type": kind,
            }));
        }

        entries.sort_by(|a, b| {
            a["name"]
                .as_str()
                .unwrap_or_default()
                .cmp(b["name"].as_str().unwrap_or_default())
        });

        Ok(json!({
            "path": path.display().to_string(),
            "entries": entries,
        }))
    }
}
