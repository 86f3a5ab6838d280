//! End-to-end tests of the turn loop against a scripted provider.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

use skiff::agent::runner::{Policy, Runner};
use skiff::agent::ToolDispatcher;
use skiff::error::SkiffError;
use skiff::provider::{Choice, CompletionProvider, CompletionRequest, CompletionResponse};
use skiff::types::{Message, Role, ToolCall};

struct QueuedProvider {
    responses: Mutex<VecDeque<CompletionResponse>>,
}

impl QueuedProvider {
    fn new(responses: Vec<CompletionResponse>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
        })
    }
}

#[async_trait]
impl CompletionProvider for QueuedProvider {
    async fn complete(&self, _request: CompletionRequest) -> skiff::error::Result<CompletionResponse> {
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| SkiffError::Protocol("no scripted response left".into()))
    }
}

#[derive(Default)]
struct RecordingDispatcher {
    calls: Mutex<Vec<ToolCall>>,
}

#[async_trait]
impl ToolDispatcher for RecordingDispatcher {
    async fn dispatch(
        &self,
        _cancel: &CancellationToken,
        _correlation_id: &str,
        call: &ToolCall,
    ) -> String {
        self.calls.lock().unwrap().push(call.clone());
        format!(r#"{{"ok":true,"data":"ran {}"}}"#, call.name)
    }
}

fn assistant_choice(content: &str, finish_reason: &str, tool_calls: Vec<ToolCall>) -> Choice {
    Choice {
        finish_reason: finish_reason.into(),
        message: Message {
            role: Role::Assistant,
            content: content.into(),
            tool_call_id: None,
            tool_calls,
        },
    }
}

fn response(choice: Choice) -> CompletionResponse {
    CompletionResponse {
        choices: vec![choice],
    }
}

fn tool_call(id: &str, name: &str, arguments: &str) -> ToolCall {
    ToolCall {
        id: id.into(),
        name: name.into(),
        arguments: arguments.into(),
    }
}

fn runner_with(
    provider: Arc<QueuedProvider>,
    dispatcher: Arc<RecordingDispatcher>,
    policy: Policy,
) -> Runner {
    Runner::new(provider, "test-model", Vec::new(), dispatcher, policy)
}

#[tokio::test]
async fn single_turn_conversation_stops_without_tools() {
    let provider = QueuedProvider::new(vec![response(assistant_choice("done", "stop", vec![]))]);
    let dispatcher = Arc::new(RecordingDispatcher::default());
    let runner = runner_with(provider, dispatcher.clone(), Policy::default());

    let mut history = vec![Message::system("be helpful")];
    let answer = runner
        .run_prompt(&CancellationToken::new(), &mut history, "hi", "corr-1")
        .await
        .unwrap();

    assert_eq!(answer, "done");
    assert_eq!(history.len(), 3);
    assert_eq!(history[1].role, Role::User);
    assert_eq!(history[2].role, Role::Assistant);
    assert!(dispatcher.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn tool_call_round_trip_appends_result_before_next_turn() {
    let provider = QueuedProvider::new(vec![
        response(assistant_choice(
            "",
            "tool_calls",
            vec![tool_call("call_1", "ListDir", "{}")],
        )),
        response(assistant_choice("two files here", "stop", vec![])),
    ]);
    let dispatcher = Arc::new(RecordingDispatcher::default());
    let runner = runner_with(provider, dispatcher.clone(), Policy::default());

    let mut history = vec![Message::system("be helpful")];
    let answer = runner
        .run_prompt(&CancellationToken::new(), &mut history, "what is here", "corr-1")
        .await
        .unwrap();

    assert_eq!(answer, "two files here");
    // system, user, assistant(with call), tool result, final assistant
    assert_eq!(history.len(), 5);
    assert_eq!(history[2].tool_calls.len(), 1);
    assert_eq!(history[3].role, Role::Tool);
    assert_eq!(history[3].tool_call_id.as_deref(), Some("call_1"));
    assert_eq!(dispatcher.calls.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn tool_call_budget_refuses_batch_before_executing_any() {
    let provider = QueuedProvider::new(vec![response(assistant_choice(
        "working on it",
        "tool_calls",
        vec![
            tool_call("call_1", "Read", "{}"),
            tool_call("call_2", "Read", "{}"),
        ],
    ))]);
    let dispatcher = Arc::new(RecordingDispatcher::default());
    let runner = runner_with(
        provider,
        dispatcher.clone(),
        Policy {
            max_turns: 0,
            max_tool_calls: 1,
        },
    );

    let mut history = Vec::new();
    let err = runner
        .run_prompt(&CancellationToken::new(), &mut history, "go", "corr-1")
        .await
        .unwrap_err();

    assert!(matches!(
        err.source,
        SkiffError::ToolCallBudgetExceeded {
            limit: 1,
            used: 0,
            requested: 2
        }
    ));
    assert_eq!(err.partial, "working on it");
    assert!(dispatcher.calls.lock().unwrap().is_empty());
    // the assistant message is still recorded
    assert_eq!(history.last().unwrap().role, Role::Assistant);
}

#[tokio::test]
async fn max_turns_stops_after_executing_the_last_allowed_turn() {
    let provider = QueuedProvider::new(vec![response(assistant_choice(
        "",
        "tool_calls",
        vec![tool_call("call_1", "ListDir", "{}")],
    ))]);
    let dispatcher = Arc::new(RecordingDispatcher::default());
    let runner = runner_with(
        provider,
        dispatcher.clone(),
        Policy {
            max_turns: 1,
            max_tool_calls: 0,
        },
    );

    let mut history = Vec::new();
    let err = runner
        .run_prompt(&CancellationToken::new(), &mut history, "go", "corr-1")
        .await
        .unwrap_err();

    assert!(matches!(err.source, SkiffError::MaxTurnsExceeded { limit: 1 }));
    assert_eq!(dispatcher.calls.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn cancelled_token_fails_fast() {
    let provider = QueuedProvider::new(vec![]);
    let dispatcher = Arc::new(RecordingDispatcher::default());
    let runner = runner_with(provider, dispatcher, Policy::default());

    let cancel = CancellationToken::new();
    cancel.cancel();

    let mut history = Vec::new();
    let err = runner
        .run_prompt(&cancel, &mut history, "go", "corr-1")
        .await
        .unwrap_err();

    assert!(err.source.is_cancellation());
    // the user prompt is still appended before the cancellation check
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].role, Role::User);
}

#[tokio::test]
async fn empty_choice_list_is_a_protocol_error() {
    let provider = QueuedProvider::new(vec![CompletionResponse { choices: vec![] }]);
    let dispatcher = Arc::new(RecordingDispatcher::default());
    let runner = runner_with(provider, dispatcher, Policy::default());

    let mut history = Vec::new();
    let err = runner
        .run_prompt(&CancellationToken::new(), &mut history, "go", "corr-1")
        .await
        .unwrap_err();

    assert!(matches!(err.source, SkiffError::Protocol(_)));
}

#[tokio::test]
async fn malformed_tool_calls_are_pruned_and_arguments_repaired() {
    let provider = QueuedProvider::new(vec![
        response(assistant_choice(
            "",
            "tool_calls",
            vec![
                tool_call("", "Read", "{}"),
                tool_call("call_2", "Bash", "please run ls"),
            ],
        )),
        response(assistant_choice("ok", "stop", vec![])),
    ]);
    let dispatcher = Arc::new(RecordingDispatcher::default());
    let runner = runner_with(provider, dispatcher.clone(), Policy::default());

    let mut history = Vec::new();
    runner
        .run_prompt(&CancellationToken::new(), &mut history, "go", "corr-1")
        .await
        .unwrap();

    let recorded = dispatcher.calls.lock().unwrap();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].id, "call_2");
    assert_eq!(recorded[0].arguments, "{}");

    // the assistant message carries only the surviving call
    let assistant = &history[1];
    assert_eq!(assistant.tool_calls.len(), 1);
}

#[tokio::test]
async fn provider_error_carries_partial_text() {
    let provider = QueuedProvider::new(vec![response(assistant_choice(
        "first thoughts",
        "tool_calls",
        vec![tool_call("call_1", "ListDir", "{}")],
    ))]);
    let dispatcher = Arc::new(RecordingDispatcher::default());
    let runner = runner_with(provider, dispatcher, Policy::default());

    let mut history = Vec::new();
    // second turn has no scripted response, so the provider fails
    let err = runner
        .run_prompt(&CancellationToken::new(), &mut history, "go", "corr-1")
        .await
        .unwrap_err();

    assert_eq!(err.partial, "first thoughts");
    assert!(matches!(err.source, SkiffError::Protocol(_)));
}
