//! Exact string replacement inside a confined file.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{Result, SkiffError};
use crate::tools::path_policy::{ensure_path_allowed, resolve_path};
use crate::tools::tool::{Tool, ToolContext};
use crate::types::ToolDefinition;

#[derive(Debug, Deserialize)]
struct EditPatchArgs {
    #[serde(default)]
    file_path: String,
    #[serde(default)]
    old_string: String,
    #[serde(default)]
    new_string: String,
    #[serde(default)]
    replace_all: bool,
}

/// Replaces occurrences of an exact string in a file.
pub struct EditPatchTool;

#[async_trait]
impl Tool for EditPatchTool {
    fn name(&self) -> &str {
        "EditPatch"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "EditPatch".into(),
            description: "Replace an exact string in a file. Replaces the first occurrence \
                          unless replace_all is true."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "file_path": {
                        "type": "string",
                        "description": "Path to the file, absolute or relative to the working directory."
                    },
                    "old_string": {
                        "type": "string",
                        "description": "Exact text to replace. Must be non-empty."
                    },
                    "new_string": {
                        "type": "string",
                        "description": "Replacement text."
                    },
                    "replace_all": {
                        "type": "boolean",
                        "description": "Replace every occurrence instead of only the first."
                    }
                },
                "required": ["file_path", "old_string", "new_string"]
            }),
        }
    }

    async fn execute(&self, ctx: &ToolContext, arguments: &str) -> Result<Value> {
        let args: EditPatchArgs = serde_json::from_str(arguments).map_err(|err| {
            SkiffError::InvalidArgument(format!("invalid EditPatch arguments: {err}"))
        })?;
        if args.file_path.trim().is_empty() {
            return Err(SkiffError::InvalidArgument(
                "file_path must be a non-empty string".into(),
            ));
        }
        if args.old_string.is_empty() {
            return Err(SkiffError::InvalidArgument(
                "old_string must be a non-empty string".into(),
            ));
        }

        let path = resolve_path(&ctx.cwd, &args.file_path);
        ensure_path_allowed(&ctx.allowed_root, &path)?;

        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|err| SkiffError::ToolExecution {
                tool_name: "EditPatch".into(),
                message: format!("failed to read {}: {err}", path.display()),
            })?;

        let total_matches = content.matches(&args.old_string).count();
        if total_matches == 0 {
            return Err(SkiffError::ToolExecution {
                tool_name: "EditPatch".into(),
                message: "old_string not found in file".into(),
            });
        }

        let (updated, replacements) = if args.replace_all {
            (
                content.replace(&args.old_string, &args.new_string),
                total_matches,
            )
        } else {
            (
                content.replacen(&args.old_string, &args.new_string, 1),
                1,
            )
        };

        tokio::fs::write(&path, &updated)
            .await
            .map_err(|err| SkiffError::ToolExecution {
                tool_name: "EditPatch".into(),
                message: format!("failed to write {}: {err}", path.display()),
            })?;

        Ok(json!({
            "file_path": path.display().to_string(),
            "replacements": replacements,
            "replace_all": args.replace_all,
            "total_matches": total_matches,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx_in(dir: &std::path::Path) -> ToolContext {
        ToolContext {
            cwd: dir.to_str().unwrap().into(),
            allowed_root: dir.to_str().unwrap().into(),
            ..ToolContext::default()
        }
    }

    #[tokio::test]
    async fn replaces_first_occurrence_by_default() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "one two one").unwrap();

        let result = EditPatchTool
            .execute(
                &ctx_in(dir.path()),
                r#"{"file_path": "a.txt", "old_string": "one", "new_string": "1"}"#,
            )
            .await
            .unwrap();

        assert_eq!(result["replacements"], json!(1));
        assert_eq!(result["total_matches"], json!(2));
        assert_eq!(result["replace_all"], json!(false));
        assert_eq!(std::fs::read_to_string(dir.path().join("a.txt")).unwrap(), "1 two one");
    }

    #[tokio::test]
    async fn replace_all_replaces_every_occurrence() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "x.x.x").unwrap();

        let result = EditPatchTool
            .execute(
                &ctx_in(dir.path()),
                r#"{"file_path": "a.txt", "old_string": "x", "new_string": "y", "replace_all": true}"#,
            )
            .await
            .unwrap();

        assert_eq!(result["replacements"], json!(3));
        assert_eq!(std::fs::read_to_string(dir.path().join("a.txt")).unwrap(), "y.y.y");
    }

    #[tokio::test]
    async fn missing_old_string_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "content").unwrap();

        let err = EditPatchTool
            .execute(
                &ctx_in(dir.path()),
                r#"{"file_path": "a.txt", "old_string": "absent", "new_string": "x"}"#,
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("old_string not found in file"));
    }

    #[tokio::test]
    async fn empty_old_string_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = EditPatchTool
            .execute(
                &ctx_in(dir.path()),
                r#"{"file_path": "a.txt", "old_string": "", "new_string": "x"}"#,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SkiffError::InvalidArgument(_)));
    }
}
