//! The multi-turn completion loop.
//!
//! One `run_prompt` call appends the user prompt to the history and then
//! alternates completion requests with tool execution until the model stops
//! requesting tools, a budget runs out, or the prompt is cancelled. The
//! history is append-only: the assistant message is recorded before its tool
//! calls are executed, so a failure mid-dispatch never leaves a tool call
//! without its assistant anchor.

use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::agent::ToolDispatcher;
use crate::error::SkiffError;
use crate::provider::{CompletionProvider, CompletionRequest};
use crate::tools::json_args::normalize_json_arguments;
use crate::types::{Message, ToolCall, ToolDefinition};

/// Budgets for one prompt. Zero means unlimited.
#[derive(Debug, Clone, Copy, Default)]
pub struct Policy {
    pub max_turns: u32,
    pub max_tool_calls: u32,
}

/// A failed prompt run, carrying whatever assistant text was produced before
/// the failure so callers can still show it.
#[derive(Debug, Error)]
#[error("{source}")]
pub struct RunError {
    pub partial: String,
    #[source]
    pub source: SkiffError,
}

pub struct Runner {
    provider: Arc<dyn CompletionProvider>,
    model: String,
    tool_definitions: Vec<ToolDefinition>,
    dispatcher: Arc<dyn ToolDispatcher>,
    policy: Policy,
}

impl Runner {
    pub fn new(
        provider: Arc<dyn CompletionProvider>,
        model: impl Into<String>,
        tool_definitions: Vec<ToolDefinition>,
        dispatcher: Arc<dyn ToolDispatcher>,
        policy: Policy,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            tool_definitions,
            dispatcher,
            policy,
        }
    }

    /// Run one prompt to completion, mutating `history` in place.
    ///
    /// Returns the final assistant text. On failure the error carries the
    /// last assistant text seen so far as `partial`.
    pub async fn run_prompt(
        &self,
        cancel: &CancellationToken,
        history: &mut Vec<Message>,
        prompt: &str,
        correlation_id: &str,
    ) -> Result<String, RunError> {
        history.push(Message::user(prompt));

        let mut last_text = String::new();
        let mut turn: u32 = 0;
        let mut tool_calls_used: u32 = 0;

        let fail = |last_text: &str, source: SkiffError| RunError {
            partial: last_text.to_string(),
            source,
        };

        loop {
            if cancel.is_cancelled() {
                return Err(fail(&last_text, SkiffError::Cancelled));
            }
            if self.policy.max_turns > 0 && turn >= self.policy.max_turns {
                return Err(fail(
                    &last_text,
                    SkiffError::MaxTurnsExceeded {
                        limit: self.policy.max_turns,
                    },
                ));
            }
            turn += 1;

            info!(
                event = "turn_start",
                correlation_id,
                turn,
                messages = history.len()
            );

            let request = CompletionRequest {
                model: self.model.clone(),
                messages: history.clone(),
                tools: self.tool_definitions.clone(),
            };
            let response = tokio::select! {
                _ = cancel.cancelled() => return Err(fail(&last_text, SkiffError::Cancelled)),
                result = self.provider.complete(request) => {
                    result.map_err(|err| fail(&last_text, err))?
                }
            };

            let Some(choice) = response.choices.into_iter().next() else {
                return Err(fail(
                    &last_text,
                    SkiffError::Protocol("completion returned no choices".into()),
                ));
            };

            let tool_calls = prune_tool_calls(choice.message.tool_calls);
            if !choice.message.content.is_empty() {
                last_text = choice.message.content.clone();
            }

            history.push(Message {
                role: crate::types::Role::Assistant,
                content: choice.message.content,
                tool_call_id: None,
                tool_calls: tool_calls.clone(),
            });

            info!(
                event = "turn_end",
                correlation_id,
                turn,
                finish_reason = %choice.finish_reason,
                tool_calls = tool_calls.len()
            );

            if choice.finish_reason == "stop" || tool_calls.is_empty() {
                return Ok(last_text);
            }

            let requested = tool_calls.len() as u32;
            if self.policy.max_tool_calls > 0
                && tool_calls_used + requested > self.policy.max_tool_calls
            {
                return Err(fail(
                    &last_text,
                    SkiffError::ToolCallBudgetExceeded {
                        limit: self.policy.max_tool_calls,
                        used: tool_calls_used,
                        requested,
                    },
                ));
            }

            for call in &tool_calls {
                if cancel.is_cancelled() {
                    return Err(fail(&last_text, SkiffError::Cancelled));
                }

                info!(
                    event = "tool_start",
                    correlation_id,
                    tool = %call.name,
                    tool_call_id = %call.id
                );
                let result = self
                    .dispatcher
                    .dispatch(cancel, correlation_id, call)
                    .await;
                info!(
                    event = "tool_end",
                    correlation_id,
                    tool = %call.name,
                    tool_call_id = %call.id,
                    response_bytes = result.len()
                );

                history.push(Message::tool_result(call.id.clone(), result));
                tool_calls_used += 1;
            }
        }
    }
}

/// Drop malformed tool calls and repair argument text before anything is
/// recorded in the history.
///
/// Calls without an id or a name cannot be answered and are dropped.
/// Unrecoverable argument text is replaced with `{}` so the history stays
/// valid JSON on the wire; the tool itself then decides what empty
/// arguments mean.
fn prune_tool_calls(calls: Vec<ToolCall>) -> Vec<ToolCall> {
    calls
        .into_iter()
        .filter_map(|mut call| {
            if call.id.trim().is_empty() || call.name.trim().is_empty() {
                warn!(
                    tool = %call.name,
                    tool_call_id = %call.id,
                    "dropping malformed tool call"
                );
                return None;
            }
            call.arguments = match normalize_json_arguments(&call.arguments) {
                Some(normalized) => normalized,
                None => {
                    warn!(tool = %call.name, "replacing unrecoverable tool arguments");
                    "{}".to_string()
                }
            };
            Some(call)
        })
        .collect()
}
