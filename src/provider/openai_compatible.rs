//! Provider speaking the OpenAI chat-completions wire format.
//!
//! Works against any endpoint exposing `POST {base_url}/chat/completions`
//! with bearer authentication, which covers OpenRouter, Ollama, vLLM, and
//! OpenAI itself.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, SkiffError};
use crate::provider::http::shared_client;
use crate::provider::{Choice, CompletionProvider, CompletionRequest, CompletionResponse};
use crate::types::{Message, Role, ToolCall, ToolDefinition};

pub struct OpenAiCompatibleProvider {
    model: String,
    api_key: String,
    base_url: String,
}

impl OpenAiCompatibleProvider {
    pub fn new(
        model: impl Into<String>,
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        let base_url: String = base_url.into();
        Self {
            model: model.into(),
            api_key: api_key.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl CompletionProvider for OpenAiCompatibleProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let model = if request.model.trim().is_empty() {
            self.model.as_str()
        } else {
            request.model.as_str()
        };

        let body = WireRequest {
            model,
            messages: request.messages.iter().map(wire_message).collect(),
            tools: request.tools.iter().map(wire_tool).collect(),
        };

        let url = format!("{}/chat/completions", self.base_url);
        debug!(%url, model, messages = request.messages.len(), "sending completion request");

        let response = shared_client()
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SkiffError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let wire: WireResponse = response.json().await?;
        Ok(CompletionResponse {
            choices: wire.choices.into_iter().map(into_choice).collect(),
        })
    }
}

fn role_name(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

fn wire_message(message: &Message) -> WireMessage<'_> {
    WireMessage {
        role: role_name(message.role),
        content: &message.content,
        tool_call_id: message.tool_call_id.as_deref(),
        tool_calls: if message.tool_calls.is_empty() {
            None
        } else {
            Some(
                message
                    .tool_calls
                    .iter()
                    .map(|call| WireToolCall {
                        id: &call.id,
                        kind: "function",
                        function: WireFunctionCall {
                            name: &call.name,
                            arguments: &call.arguments,
                        },
                    })
                    .collect(),
            )
        },
    }
}

fn wire_tool(definition: &ToolDefinition) -> WireTool<'_> {
    WireTool {
        kind: "function",
        function: WireFunction {
            name: &definition.name,
            description: &definition.description,
            parameters: &definition.parameters,
        },
    }
}

fn into_choice(wire: WireChoice) -> Choice {
    let content = wire
        .message
        .content
        .or(wire.message.refusal)
        .unwrap_or_default();
    let tool_calls = wire
        .message
        .tool_calls
        .into_iter()
        .map(|call| ToolCall {
            id: call.id,
            name: call.function.name,
            arguments: call.function.arguments,
        })
        .collect();

    Choice {
        finish_reason: wire.finish_reason.unwrap_or_default(),
        message: Message {
            role: Role::Assistant,
            content,
            tool_call_id: None,
            tool_calls,
        },
    }
}

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall<'a>>>,
}

#[derive(Serialize)]
struct WireToolCall<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunctionCall<'a>,
}

#[derive(Serialize)]
struct WireFunctionCall<'a> {
    name: &'a str,
    arguments: &'a str,
}

#[derive(Serialize)]
struct WireTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunction<'a>,
}

#[derive(Serialize)]
struct WireFunction<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a serde_json::Value,
}

#[derive(Deserialize)]
struct WireResponse {
    #[serde(default)]
    choices: Vec<WireChoice>,
}

#[derive(Deserialize)]
struct WireChoice {
    #[serde(default)]
    finish_reason: Option<String>,
    message: WireResponseMessage,
}

#[derive(Deserialize)]
struct WireResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireResponseToolCall>,
}

#[derive(Deserialize)]
struct WireResponseToolCall {
    #[serde(default)]
    id: String,
    #[serde(default)]
    function: WireResponseFunction,
}

#[derive(Deserialize, Default)]
struct WireResponseFunction {
    #[serde(default)]
    name: String,
    #[serde(default)]
    arguments: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request_with(messages: Vec<Message>) -> CompletionRequest {
        CompletionRequest {
            model: "test-model".into(),
            messages,
            tools: vec![ToolDefinition {
                name: "ListDir".into(),
                description: "list".into(),
                parameters: json!({"type": "object"}),
            }],
        }
    }

    #[tokio::test]
    async fn maps_completion_with_tool_calls() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({"model": "test-model"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{
                    "finish_reason": "tool_calls",
                    "message": {
                        "role": "assistant",
                        "content": null,
                        "tool_calls": [{
                            "id": "call_1",
                            "type": "function",
                            "function": {"name": "ListDir", "arguments": "{}"}
                        }]
                    }
                }]
            })))
            .mount(&server)
            .await;

        let provider = OpenAiCompatibleProvider::new("test-model", "sk-test", server.uri());
        let response = provider
            .complete(request_with(vec![Message::user("hi")]))
            .await
            .unwrap();

        assert_eq!(response.choices.len(), 1);
        let choice = &response.choices[0];
        assert_eq!(choice.finish_reason, "tool_calls");
        assert_eq!(choice.message.tool_calls[0].name, "ListDir");
        assert_eq!(choice.message.content, "");
    }

    #[tokio::test]
    async fn refusal_is_used_when_content_missing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{
                    "finish_reason": "stop",
                    "message": {"role": "assistant", "refusal": "cannot help"}
                }]
            })))
            .mount(&server)
            .await;

        let provider = OpenAiCompatibleProvider::new("test-model", "sk-test", server.uri());
        let response = provider
            .complete(request_with(vec![Message::user("hi")]))
            .await
            .unwrap();
        assert_eq!(response.choices[0].message.content, "cannot help");
    }

    #[tokio::test]
    async fn non_success_status_becomes_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let provider = OpenAiCompatibleProvider::new("test-model", "sk-wrong", server.uri());
        let err = provider
            .complete(request_with(vec![Message::user("hi")]))
            .await
            .unwrap_err();

        match err {
            SkiffError::Api { status, message } => {
                assert_eq!(status, 401);
                assert_eq!(message, "bad key");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn tool_result_messages_carry_call_id_on_the_wire() {
        let message = Message::tool_result("call_7", r#"{"ok":true}"#);
        let wire = wire_message(&message);
        let encoded = serde_json::to_value(&wire).unwrap();
        assert_eq!(encoded["role"], json!("tool"));
        assert_eq!(encoded["tool_call_id"], json!("call_7"));
        assert!(encoded.get("tool_calls").is_none());
    }

    #[test]
    fn assistant_tool_calls_are_typed_function_calls() {
        let message = Message {
            role: Role::Assistant,
            content: String::new(),
            tool_call_id: None,
            tool_calls: vec![ToolCall {
                id: "call_2".into(),
                name: "Read".into(),
                arguments: r#"{"file_path":"a.txt"}"#.into(),
            }],
        };
        let encoded = serde_json::to_value(wire_message(&message)).unwrap();
        assert_eq!(encoded["tool_calls"][0]["type"], json!("function"));
        assert_eq!(encoded["tool_calls"][0]["function"]["name"], json!("Read"));
    }

    #[test]
    fn base_url_trailing_slash_is_normalized() {
        let provider =
            OpenAiCompatibleProvider::new("m", "k", "https://api.example.com/v1/");
        assert_eq!(provider.base_url, "https://api.example.com/v1");
    }
}
