//! End-to-end turn tests against a scripted backend.

mod common;

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use common::*;
use parley::attachment::LocalFileStore;
use parley::hooks::{DoneHook, FailHook, InitHook};
use parley::prelude::*;
use parley::turn::{TOOL_CALLS, TOOL_CALLS_SCHEMA};

fn role_and_content(messages: &[Value]) -> Vec<(String, String)> {
    messages
        .iter()
        .map(|m| {
            (
                m["role"].as_str().unwrap_or_default().to_string(),
                m["content"].as_str().unwrap_or_default().to_string(),
            )
        })
        .collect()
}

fn count_named(messages: &[Value], name: &str) -> usize {
    messages.iter().filter(|m| m["name"] == name).count()
}

async fn run(engine: &Engine, assistant_id: &str, input: &str) -> (TurnResult, RecordingSink) {
    run_with(engine, assistant_id, input, Options::new()).await
}

async fn run_with(
    engine: &Engine,
    assistant_id: &str,
    input: &str,
    options: Options,
) -> (TurnResult, RecordingSink) {
    let sink = RecordingSink::new();
    let ctx = TurnContext::new("session-1", "chat-1", assistant_id);
    let result = engine
        .execute(
            ctx,
            Message::user(input),
            options,
            sink.sink(),
            CancellationToken::new(),
        )
        .await;
    (result, sink)
}

fn helper_with_prompt() -> Assistant {
    Assistant::builder()
        .id("helper")
        .name("Helper")
        .connector("test")
        .prompts(vec![Prompt::system("You are helpful")])
        .build()
}

#[tokio::test]
async fn outbound_messages_are_prompts_then_input() {
    let backend = Arc::new(ScriptedBackend::new().queue(vec![text("4"), finish()]));
    let engine = engine(backend.clone(), vec![helper_with_prompt()]);

    let (result, sink) = run(&engine, "helper", "2+2?").await;

    assert_eq!(result.status, TurnStatus::Completed);
    let request = &backend.requests()[0];
    assert_eq!(
        role_and_content(&request.messages),
        vec![
            ("system".to_string(), "You are helpful".to_string()),
            ("user".to_string(), "2+2?".to_string()),
        ]
    );
    assert_eq!(request.messages[0]["name"], "Helper");

    let frames = sink.frames();
    assert_eq!(frames[0].text.as_deref(), Some("4"));
    assert_eq!(frames[0].assistant_id.as_deref(), Some("helper"));
    let last = frames.last().unwrap();
    assert!(last.done);
    assert_eq!(last.text, None);
}

#[tokio::test]
async fn tools_without_native_support_become_prompts() {
    let tools = ToolSet {
        tools: vec![json!({"name": "weather", "parameters": {"type": "object"}})],
        prompts: vec![Prompt::system("Prefer metric units")],
    };
    let assistant = Assistant::builder()
        .id("tooler")
        .name("Tooler")
        .connector("local")
        .tools(tools)
        .build();
    let backend = Arc::new(ScriptedBackend::new().queue(vec![text("ok"), finish()]));
    let engine = engine(backend.clone(), vec![assistant]);

    let mut options = Options::new();
    options.insert("tools".into(), json!([{"name": "sneaky"}]));
    let (result, _sink) = run_with(&engine, "tooler", "weather?", options).await;

    assert_eq!(result.status, TurnStatus::Completed);
    let request = &backend.requests()[0];
    assert!(!request.options.contains_key("tools"));
    assert_eq!(count_named(&request.messages, TOOL_CALLS_SCHEMA), 1);
    assert!(count_named(&request.messages, TOOL_CALLS) >= 1);

    let schema = request
        .messages
        .iter()
        .find(|m| m["name"] == TOOL_CALLS_SCHEMA)
        .unwrap();
    assert_eq!(schema["role"], "system");
    assert!(schema["content"].as_str().unwrap().contains("weather"));
}

#[tokio::test]
async fn native_tools_go_into_options() {
    let assistant = Assistant::builder()
        .id("native")
        .name("Native")
        .connector("openai")
        .tools(ToolSet {
            tools: vec![json!({"type": "function", "function": {"name": "weather"}})],
            prompts: vec![],
        })
        .build();
    let backend = Arc::new(ScriptedBackend::new().queue(vec![finish()]));
    let registry = AssistantRegistry::new();
    registry.insert(assistant);
    let config = ParleyConfig::default().with_connector("openai", ConnectorSettings { tools: true });
    let engine = Engine::new(config, registry, backend.clone());

    run(&engine, "native", "weather?").await;

    let request = &backend.requests()[0];
    assert_eq!(request.options["tools"][0]["function"]["name"], "weather");
    assert_eq!(request.options["tool_choice"], "auto");
    assert_eq!(count_named(&request.messages, TOOL_CALLS_SCHEMA), 0);
}

#[tokio::test]
async fn caller_options_override_assistant_defaults() {
    let mut defaults = Options::new();
    defaults.insert("temperature".into(), json!(0.2));
    defaults.insert("top_p".into(), json!(1));
    let assistant = Assistant::builder()
        .id("tuned")
        .name("Tuned")
        .connector("test")
        .options(defaults)
        .build();
    let backend = Arc::new(ScriptedBackend::new().queue(vec![finish()]));
    let engine = engine(backend.clone(), vec![assistant]);

    let mut options = Options::new();
    options.insert("temperature".into(), json!(0.9));
    run_with(&engine, "tuned", "hi", options).await;

    let request = &backend.requests()[0];
    assert_eq!(request.options["temperature"], 0.9);
    assert_eq!(request.options["top_p"], 1);
}

#[tokio::test]
async fn terminate_emits_nothing_after_done() {
    let done: DoneHook = Arc::new(|_ctx| {
        Box::pin(async {
            Ok(Some(HookResult {
                next: Some(NextAction::Exit),
                ..Default::default()
            }))
        })
    });
    let assistant = Assistant::builder()
        .id("a")
        .name("A")
        .connector("test")
        .hooks(AssistantHooks::default().with_done(done))
        .build();
    let backend = Arc::new(ScriptedBackend::new().queue(vec![text("hi"), finish()]));
    let engine = engine(backend, vec![assistant]);

    let (result, sink) = run(&engine, "a", "hello").await;

    assert_eq!(result.status, TurnStatus::Completed);
    let frames = sink.frames();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].text.as_deref(), Some("hi"));
}

#[tokio::test]
async fn done_hook_output_replaces_bare_done() {
    let done: DoneHook = Arc::new(|ctx| {
        Box::pin(async move {
            Ok(Some(HookResult {
                output: Some(format!("saw {} chars", ctx.contents.text().len())),
                ..Default::default()
            }))
        })
    });
    let assistant = Assistant::builder()
        .id("a")
        .name("A")
        .connector("test")
        .hooks(AssistantHooks::default().with_done(done))
        .build();
    let backend = Arc::new(ScriptedBackend::new().queue(vec![text("four"), finish()]));
    let engine = engine(backend, vec![assistant]);

    let (_, sink) = run(&engine, "a", "hello").await;

    let last = sink.frames().pop().unwrap();
    assert_eq!(last.text.as_deref(), Some("saw 4 chars"));
    assert!(last.done);
    assert!(!last.delta);
}

#[tokio::test]
async fn init_hook_failure_never_reaches_backend() {
    let init: InitHook = Arc::new(|_ctx| {
        Box::pin(async { Err(ParleyError::Provider("policy service down".into())) })
    });
    let assistant = Assistant::builder()
        .id("a")
        .name("A")
        .connector("test")
        .hooks(AssistantHooks::default().with_init(init))
        .build();
    let backend = Arc::new(ScriptedBackend::new().queue(vec![text("unreachable")]));
    let engine = engine(backend.clone(), vec![assistant]);

    let (result, sink) = run(&engine, "a", "hello").await;

    assert_eq!(result.status, TurnStatus::Failed);
    assert_eq!(backend.calls(), 0);
    let frames = sink.frames();
    assert_eq!(frames.len(), 1);
    assert!(frames[0].is_error());
    assert!(frames[0].done);
    assert_eq!(
        frames[0].text.as_deref(),
        Some("init hook error: Provider error: policy service down")
    );
}

#[tokio::test]
async fn init_hook_can_switch_assistant() {
    let init: InitHook = Arc::new(|_ctx| {
        Box::pin(async {
            Ok(Some(HookResult {
                assistant_id: Some("expert".into()),
                ..Default::default()
            }))
        })
    });
    let router = Assistant::builder()
        .id("router")
        .name("Router")
        .connector("test")
        .prompts(vec![Prompt::system("route things")])
        .hooks(AssistantHooks::default().with_init(init))
        .build();
    let expert = Assistant::builder()
        .id("expert")
        .name("Expert")
        .connector("test")
        .prompts(vec![Prompt::system("you are an expert")])
        .build();
    let backend = Arc::new(ScriptedBackend::new().queue(vec![text("answer"), finish()]));
    let engine = engine(backend.clone(), vec![router, expert]);

    let (result, sink) = run(&engine, "router", "question").await;

    assert_eq!(result.status, TurnStatus::Completed);
    assert_eq!(
        role_and_content(&backend.requests()[0].messages),
        vec![
            ("system".to_string(), "you are an expert".to_string()),
            ("user".to_string(), "question".to_string()),
        ]
    );
    assert_eq!(sink.frames()[0].assistant_id.as_deref(), Some("expert"));
}

#[tokio::test]
async fn provider_error_goes_through_fail_hook() {
    let fail: FailHook = Arc::new(|_ctx, raw| {
        Box::pin(async move {
            Ok(Some(HookResult {
                error: Some(format!("Sorry, the model failed ({raw})")),
                ..Default::default()
            }))
        })
    });
    let assistant = Assistant::builder()
        .id("a")
        .name("A")
        .connector("test")
        .hooks(AssistantHooks::default().with_fail(fail))
        .build();
    let backend = Arc::new(
        ScriptedBackend::new().queue(vec![text("par"), provider_error("overloaded"), text("x")]),
    );
    let engine = engine(backend, vec![assistant]);

    let (result, sink) = run(&engine, "a", "hello").await;

    assert_eq!(result.status, TurnStatus::Failed);
    let errors = sink.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(
        errors[0].text.as_deref(),
        Some("Sorry, the model failed (overloaded)")
    );
    assert!(sink.frames().last().unwrap().is_error());
    assert_eq!(sink.text(), "par");
}

#[tokio::test]
async fn failing_fail_hook_falls_back_to_raw_error() {
    let fail: FailHook = Arc::new(|_ctx, _raw| {
        Box::pin(async { Err(ParleyError::Provider("hook crashed".into())) })
    });
    let assistant = Assistant::builder()
        .id("a")
        .name("A")
        .connector("test")
        .hooks(AssistantHooks::default().with_fail(fail))
        .build();
    let backend = Arc::new(ScriptedBackend::new().queue(vec![provider_error("overloaded")]));
    let engine = engine(backend, vec![assistant]);

    let (_, sink) = run(&engine, "a", "hello").await;

    let errors = sink.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].text.as_deref(), Some("overloaded"));
}

#[tokio::test]
async fn unresolved_pending_is_one_error() {
    let backend = Arc::new(ScriptedBackend::new().queue(vec![
        r#"data: {"choices":[{"delta":{"content":"Hel"#.to_string(),
        "<html>bad gateway</html>".to_string(),
    ]));
    let engine = engine(backend, vec![assistant("a", "A")]);

    let (result, sink) = run(&engine, "a", "hello").await;

    assert_eq!(result.status, TurnStatus::Failed);
    let frames = sink.frames();
    assert_eq!(frames.len(), 1);
    assert_eq!(
        frames[0].text.as_deref(),
        Some(r#"{"choices":[{"delta":{"content":"Hel<html>bad gateway</html>"#)
    );
}

#[tokio::test]
async fn stream_without_finish_completes() {
    let backend = Arc::new(ScriptedBackend::new().queue(vec![text("cut"), text(" short")]));
    let engine = engine(backend, vec![assistant("a", "A")]);

    let (result, sink) = run(&engine, "a", "hello").await;

    assert_eq!(result.status, TurnStatus::Completed);
    assert_eq!(sink.text(), "cut short");
    assert_single_terminal(&sink);
}

/// Exactly one frame ends the turn, and it is the last one.
fn assert_single_terminal(sink: &RecordingSink) -> ClientFrame {
    let frames = sink.frames();
    let done: Vec<usize> = frames
        .iter()
        .enumerate()
        .filter(|(_, frame)| frame.done)
        .map(|(idx, _)| idx)
        .collect();
    assert_eq!(done, vec![frames.len() - 1], "frames: {frames:?}");
    frames[frames.len() - 1].clone()
}

fn stored_segments(history: &[HistoryRecord]) -> Vec<Value> {
    serde_json::from_str::<Vec<Value>>(&history[1].content).unwrap()
}

#[tokio::test]
async fn stream_cut_while_thinking_closes_the_block() {
    let backend = Arc::new(ScriptedBackend::new().queue(vec![think("plan")]));
    let store = Arc::new(MemoryStore::default());
    let engine = engine(backend, vec![assistant("a", "A")]).with_storage(store.clone());

    let (result, sink) = run(&engine, "a", "hello").await;

    assert_eq!(result.status, TurnStatus::Completed);
    assert_eq!(sink.text(), "<think>\nplan\n</think>\n");
    assert!(assert_single_terminal(&sink).text.is_none());

    let history = store.get_history("session-1", "chat-1").await.unwrap();
    let segments = stored_segments(&history);
    assert_eq!(segments.len(), 1);
    assert_eq!(segments[0]["type"], "think");
    assert_eq!(segments[0]["props"]["text"].as_str().unwrap().trim(), "plan");
}

#[tokio::test]
async fn stream_cut_inside_native_tool_call_closes_the_block() {
    let backend = Arc::new(ScriptedBackend::new().queue(vec![
        tool_start(0, "c1", "lookup"),
        tool_args(0, r#"{"q":1}"#),
    ]));
    let store = Arc::new(MemoryStore::default());
    let engine = engine(backend, vec![assistant("a", "A")]).with_storage(store.clone());

    let (result, sink) = run(&engine, "a", "hello").await;

    assert_eq!(result.status, TurnStatus::Completed);
    assert!(sink.text().starts_with("\n<tool>\n"));
    assert!(sink.text().ends_with("}\n</tool>\n"), "{}", sink.text());
    assert_single_terminal(&sink);

    let history = store.get_history("session-1", "chat-1").await.unwrap();
    let segments = stored_segments(&history);
    assert_eq!(segments.last().unwrap()["type"], "tool");
}

#[tokio::test]
async fn pending_after_done_is_the_only_terminal_frame() {
    let backend = Arc::new(ScriptedBackend::new().queue(vec![
        "data: {broken".to_string(),
        text("ok"),
        finish(),
    ]));
    let store = Arc::new(MemoryStore::default());
    let engine = engine(backend, vec![assistant("a", "A")]).with_storage(store.clone());

    let (result, sink) = run(&engine, "a", "hello").await;

    assert_eq!(result.status, TurnStatus::Failed);
    let last = assert_single_terminal(&sink);
    assert!(last.is_error());
    assert_eq!(last.text.as_deref(), Some("{broken"));
    assert!(store.get_history("session-1", "chat-1").await.unwrap().is_empty());
}

#[tokio::test]
async fn request_logging_leaves_the_request_unchanged() {
    let backend = Arc::new(ScriptedBackend::new().queue(vec![text("logged"), finish()]));
    let registry = AssistantRegistry::new();
    registry.insert(assistant("a", "A"));
    let config = ParleyConfig::default().with_print_request_messages(true);
    let engine = Engine::new(config, registry, backend.clone());

    let (result, sink) = run(&engine, "a", "hello").await;

    assert_eq!(result.status, TurnStatus::Completed);
    assert_eq!(sink.text(), "logged");
    assert_eq!(
        role_and_content(&backend.requests()[0].messages),
        vec![("user".to_string(), "hello".to_string())]
    );
}

#[tokio::test]
async fn unknown_assistant_is_reported() {
    let backend = Arc::new(ScriptedBackend::new());
    let engine = engine(backend.clone(), vec![]);

    let (result, sink) = run(&engine, "ghost", "hello").await;

    assert_eq!(result.status, TurnStatus::Failed);
    assert_eq!(backend.calls(), 0);
    assert_eq!(
        sink.errors()[0].text.as_deref(),
        Some("Assistant not found: ghost")
    );
}

#[tokio::test]
async fn disconnect_cancels_the_turn() {
    let backend = Arc::new(ScriptedBackend::hanging().queue(vec![text("partial")]));
    let engine = engine(backend, vec![assistant("a", "A")]);
    let sink = RecordingSink::new();
    let disconnect = CancellationToken::new();

    let trigger = disconnect.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let result = engine
        .execute(
            TurnContext::new("s", "c", "a"),
            Message::user("hello"),
            Options::new(),
            sink.sink(),
            disconnect,
        )
        .await;

    assert_eq!(result.status, TurnStatus::Canceled);
    assert!(sink.errors().is_empty());
    assert_eq!(sink.text(), "partial");
}

#[tokio::test]
async fn history_is_replayed_on_the_next_turn() {
    let backend = Arc::new(
        ScriptedBackend::new()
            .queue(vec![think("greeting"), text("hello"), finish()])
            .queue(vec![text("again"), finish()]),
    );
    let store = Arc::new(MemoryStore::default());
    let engine = engine(backend.clone(), vec![assistant("a", "A")]).with_storage(store.clone());

    run(&engine, "a", "hi").await;
    run(&engine, "a", "once more").await;

    let history = store.get_history("session-1", "chat-1").await.unwrap();
    assert_eq!(history.len(), 4);
    assert_eq!(history[1].assistant_id.as_deref(), Some("a"));

    // Reasoning stays out of the replayed context.
    let second = &backend.requests()[1];
    assert_eq!(
        role_and_content(&second.messages),
        vec![
            ("user".to_string(), "hi".to_string()),
            ("assistant".to_string(), "hello".to_string()),
            ("user".to_string(), "once more".to_string()),
        ]
    );
    let hashed = second.messages[0]["name"].as_str().unwrap();
    assert_eq!(hashed.len(), 64);
}

#[tokio::test]
async fn done_hook_failure_still_saves_history() {
    let done: DoneHook = Arc::new(|_ctx| {
        Box::pin(async { Err(ParleyError::Storage("audit log unavailable".into())) })
    });
    let assistant = Assistant::builder()
        .id("a")
        .name("A")
        .connector("test")
        .hooks(AssistantHooks::default().with_done(done))
        .build();
    let backend = Arc::new(ScriptedBackend::new().queue(vec![text("fine"), finish()]));
    let store = Arc::new(MemoryStore::default());
    let engine = engine(backend, vec![assistant]).with_storage(store.clone());

    let (result, sink) = run(&engine, "a", "hello").await;

    assert_eq!(result.status, TurnStatus::Failed);
    assert_eq!(sink.errors().len(), 1);
    assert_eq!(store.get_history("session-1", "chat-1").await.unwrap().len(), 2);
}

fn image(url: &str, content_type: &str) -> Attachment {
    Attachment {
        url: url.into(),
        content_type: content_type.into(),
        ..Default::default()
    }
}

fn with_images(text: &str, attachments: Vec<Attachment>) -> Message {
    Message {
        attachments,
        ..Message::user(text)
    }
}

#[tokio::test]
async fn vision_assistant_gets_inline_images() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("pixel.png"), b"png").unwrap();
    let viewer = Assistant::builder()
        .id("viewer")
        .name("Viewer")
        .connector("test")
        .vision(true)
        .build();
    let backend = Arc::new(ScriptedBackend::new().queue(vec![finish()]));
    let engine = engine(backend.clone(), vec![viewer])
        .with_file_store(Arc::new(LocalFileStore::new(dir.path())));

    let input = with_images(
        "  what is this?  ",
        vec![
            image("pixel.png", "image/png"),
            image("https://example.com/cat.jpg", "image/jpeg"),
            image("notes.txt", "text/plain"),
        ],
    );
    let result = engine
        .execute(
            TurnContext::new("s", "c", "viewer"),
            input,
            Options::new(),
            RecordingSink::new().sink(),
            CancellationToken::new(),
        )
        .await;

    assert_eq!(result.status, TurnStatus::Completed);
    let request = &backend.requests()[0];
    assert_eq!(
        request.messages[0]["content"],
        json!([
            {"type": "text", "text": "what is this?"},
            {"type": "image_url", "image_url": {"url": "data:image/png;base64,cG5n"}},
            {"type": "image_url", "image_url": {"url": "https://example.com/cat.jpg"}},
        ])
    );
}

#[tokio::test]
async fn missing_attachment_fails_before_the_model() {
    let dir = tempfile::tempdir().unwrap();
    let viewer = Assistant::builder()
        .id("viewer")
        .name("Viewer")
        .connector("test")
        .vision(true)
        .build();
    let backend = Arc::new(ScriptedBackend::new());
    let engine = engine(backend.clone(), vec![viewer])
        .with_file_store(Arc::new(LocalFileStore::new(dir.path())));
    let sink = RecordingSink::new();

    let result = engine
        .execute(
            TurnContext::new("s", "c", "viewer"),
            with_images("look", vec![image("missing.png", "image/png")]),
            Options::new(),
            sink.sink(),
            CancellationToken::new(),
        )
        .await;

    assert_eq!(result.status, TurnStatus::Failed);
    assert_eq!(backend.calls(), 0);
    assert_eq!(
        sink.errors()[0].text.as_deref(),
        Some("file missing.png not found")
    );
}

#[tokio::test]
async fn blind_assistant_gets_attachment_descriptions() {
    let backend = Arc::new(ScriptedBackend::new().queue(vec![finish()]));
    let engine = engine(backend.clone(), vec![assistant("a", "A")]);

    let result = engine
        .execute(
            TurnContext::new("s", "c", "a"),
            with_images("describe", vec![image("https://example.com/cat.jpg", "image/jpeg")]),
            Options::new(),
            RecordingSink::new().sink(),
            CancellationToken::new(),
        )
        .await;

    assert_eq!(result.status, TurnStatus::Completed);
    let messages = &backend.requests()[0].messages;
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["role"], "system");
    let described: Attachment =
        serde_json::from_str(messages[0]["content"].as_str().unwrap()).unwrap();
    assert_eq!(described.url, "https://example.com/cat.jpg");
    assert_eq!(messages[1]["content"], "describe");
}

#[tokio::test]
async fn empty_input_is_rejected() {
    let backend = Arc::new(ScriptedBackend::new());
    let engine = engine(backend.clone(), vec![assistant("a", "A")]);

    let (result, sink) = run(&engine, "a", "   ").await;

    assert_eq!(result.status, TurnStatus::Failed);
    assert_eq!(backend.calls(), 0);
    assert_eq!(
        sink.errors()[0].text.as_deref(),
        Some("Invalid input: content should not be empty")
    );
}
