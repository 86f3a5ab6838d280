//! Shell command execution behind a layered command policy.

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{Result, SkiffError};
use crate::tools::tool::{Tool, ToolContext};
use crate::types::ToolDefinition;

const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Patterns refused unconditionally, before any configured policy.
fn blocked_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"(?i)\brm\s+-rf\s+/",
            r"(?i)\bshutdown\b",
            r"(?i)\breboot\b",
            r"(?i)\bpoweroff\b",
            r"(?i)\bmkfs(\.|\s)",
            r":\s*\(\s*\)\s*\{\s*:\s*\|\s*:\s*&\s*\}\s*;\s*:",
        ]
        .iter()
        .map(|pattern| Regex::new(pattern).expect("fixed blocklist pattern"))
        .collect()
    })
}

/// Configured allow/deny regex lists layered on the fixed blocklist.
///
/// Deny is consulted before allow. An empty allowlist permits everything not
/// denied; a non-empty allowlist permits only commands matching at least one
/// of its patterns.
#[derive(Debug, Clone, Default)]
pub struct CommandPolicy {
    deny: Vec<Regex>,
    allow: Vec<Regex>,
}

impl CommandPolicy {
    /// Compile a policy from raw list text, where entries are separated by
    /// commas, semicolons, or newlines. Invalid patterns are configuration
    /// errors, not silently dropped.
    pub fn from_lists(allow_raw: &str, deny_raw: &str) -> Result<Self> {
        Ok(Self {
            deny: compile_list(deny_raw, "denylist")?,
            allow: compile_list(allow_raw, "allowlist")?,
        })
    }

    /// The policy verdict for a command, `Err` describing which layer
    /// refused it.
    pub fn check(&self, command: &str) -> std::result::Result<(), &'static str> {
        if blocked_patterns().iter().any(|p| p.is_match(command)) {
            return Err("command blocked by policy");
        }
        if self.deny.iter().any(|p| p.is_match(command)) {
            return Err("command blocked by denylist policy");
        }
        if !self.allow.is_empty() && !self.allow.iter().any(|p| p.is_match(command)) {
            return Err("command blocked by allowlist policy");
        }
        Ok(())
    }
}

fn compile_list(raw: &str, which: &str) -> Result<Vec<Regex>> {
    let mut patterns = Vec::new();
    for entry in raw.split(['\n', ',', ';']) {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let pattern = Regex::new(entry).map_err(|err| {
            SkiffError::Configuration(format!("invalid {which} pattern '{entry}': {err}"))
        })?;
        patterns.push(pattern);
    }
    Ok(patterns)
}

#[derive(Debug, Deserialize)]
struct BashArgs {
    #[serde(default)]
    command: String,
}

/// Runs a command through `bash -c` inside the tool working directory.
pub struct BashTool {
    policy: CommandPolicy,
}

impl BashTool {
    pub fn new(policy: CommandPolicy) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl Tool for BashTool {
    fn name(&self) -> &str {
        "Bash"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "Bash".into(),
            description: "Execute a shell command in the working directory and return its \
                          combined stdout and stderr."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "command": {
                        "type": "string",
                        "description": "The shell command to execute."
                    }
                },
                "required": ["command"]
            }),
        }
    }

    async fn execute(&self, ctx: &ToolContext, arguments: &str) -> Result<Value> {
        let args: BashArgs = serde_json::from_str(arguments)
            .map_err(|err| SkiffError::InvalidArgument(format!("invalid Bash arguments: {err}")))?;

        let command = args.command.trim().to_string();
        if command.is_empty() {
            return Err(SkiffError::InvalidArgument(
                "command must be a non-empty string".into(),
            ));
        }

        if let Err(reason) = self.policy.check(&command) {
            debug!(command = %command, reason, "refusing shell command");
            return Err(SkiffError::ToolExecution {
                tool_name: "Bash".into(),
                message: reason.into(),
            });
        }

        let mut cmd = tokio::process::Command::new("bash");
        cmd.arg("-c").arg(&command).kill_on_drop(true);
        if !ctx.cwd.trim().is_empty() {
            cmd.current_dir(ctx.cwd.trim());
        }

        let timeout = ctx.effective_timeout(DEFAULT_COMMAND_TIMEOUT);
        let output = tokio::select! {
            _ = ctx.cancel.cancelled() => return Err(SkiffError::Cancelled),
            result = tokio::time::timeout(timeout, cmd.output()) => match result {
                Ok(output) => output.map_err(|err| SkiffError::ToolExecution {
                    tool_name: "Bash".into(),
                    message: format!("failed to run command: {err}"),
                })?,
                Err(_) => return Err(SkiffError::Timeout(timeout)),
            },
        };

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        if !output.status.success() {
            let code = output
                .status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".into());
            return Err(SkiffError::ToolExecution {
                tool_name: "Bash".into(),
                message: format!("command exited with status {code}: {}", combined.trim()),
            });
        }

        Ok(json!({ "command": command, "output": combined }))
    }
}
