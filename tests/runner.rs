use ai_chat_steps::chat::{ChatStepFactory, ScriptedBackend};
use ai_chat_steps::conversation::{create_manager, ConversationManager, Message, MessageRole};
use ai_chat_steps::runner::{
    deadline_token, run_into_writer, run_to_context_manager, run_to_string, ChatRunnable,
    ConversationRun, RunState,
};
use ai_chat_steps::settings::StepSettings;
use ai_chat_steps::step::{Step, StepEmitter, StreamingStep};
use ai_chat_steps::template::FieldRenderer;
use ai_chat_steps::{Error, Result};
use serde_json::json;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn settings() -> StepSettings {
    let mut s = StepSettings::new();
    s.update_from_parameters(
        json!({
            "ai-api-type": "openai",
            "ai-engine": "gpt-4",
            "ai-stream": true,
            "openai-api-key": "sk-test",
        })
        .as_object()
        .unwrap(),
    )
    .unwrap();
    s
}

fn factory(backend: Arc<ScriptedBackend>) -> ChatStepFactory {
    ChatStepFactory::new(settings(), backend)
}

fn conversation() -> ConversationManager {
    let bindings = json!({"name": "Bob"}).as_object().cloned().unwrap();
    create_manager(
        &FieldRenderer,
        "You are {{.name}}.",
        "Hi {{.name}}",
        &[Message::assistant("Earlier reply")],
        &bindings,
        Vec::new(),
    )
    .unwrap()
}

#[tokio::test]
async fn test_run_to_string_concatenates_partials_and_final() {
    let backend = Arc::new(ScriptedBackend::new(["Hel", "lo", ", "]).with_final("world"));
    let f = factory(backend.clone());
    let manager = conversation();

    let text = run_to_string(&CancellationToken::new(), &f, &manager)
        .await
        .unwrap();

    assert_eq!(text, "Hello, world");
    assert_eq!(manager.len(), 3);
    let request = &backend.requests()[0];
    assert_eq!(request.messages.len(), 3);
    assert_eq!(request.messages[0].text, "You are Bob.");
}

#[tokio::test]
async fn test_run_into_writer_streams_every_piece() {
    let backend = Arc::new(ScriptedBackend::new(["a", "b"]).with_final("c"));
    let f = factory(backend);
    let mut sink: Vec<u8> = Vec::new();

    let text = run_into_writer(&CancellationToken::new(), &f, &conversation(), &mut sink)
        .await
        .unwrap();

    assert_eq!(text, "abc");
    assert_eq!(String::from_utf8(sink).unwrap(), "abc");
}

#[tokio::test]
async fn test_context_manager_receives_reply_with_metadata() {
    let backend = Arc::new(ScriptedBackend::new(["Hi ", "there"]));
    let f = factory(backend);
    let mut manager = conversation();

    let reply = run_to_context_manager(&CancellationToken::new(), &f, &mut manager)
        .await
        .unwrap();
    assert_eq!(reply.role, MessageRole::Assistant);
    assert_eq!(reply.text, "Hi there");
    assert_eq!(reply.metadata.get("ai-engine"), Some(&json!("gpt-4")));
    assert!(reply.time.is_some());

    let texts: Vec<_> = manager.messages().iter().map(|m| m.text.as_str()).collect();
    assert_eq!(
        texts,
        vec!["You are Bob.", "Earlier reply", "Hi Bob", "Hi there"]
    );
}

#[tokio::test]
async fn test_error_result_leaves_manager_untouched() {
    let backend = Arc::new(ScriptedBackend::new(Vec::<String>::new()).failing_with("quota exceeded"));
    let f = factory(backend);
    let mut manager = conversation();

    let err = run_to_context_manager(&CancellationToken::new(), &f, &mut manager)
        .await
        .unwrap_err();

    match err {
        Error::Step { message, .. } => assert_eq!(message, "quota exceeded"),
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(manager.len(), 3);
    assert_eq!(manager.last_message().unwrap().text, "Hi Bob");
}

#[tokio::test]
async fn test_cancel_mid_stream_keeps_written_text() {
    let backend = Arc::new(ScriptedBackend::new(["partial"]).hanging());
    let f = factory(backend);
    let manager = conversation();
    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let mut sink: Vec<u8> = Vec::new();
    let err = tokio::time::timeout(
        Duration::from_secs(5),
        run_into_writer(&token, &f, &manager, &mut sink),
    )
    .await
    .expect("run must return promptly after cancellation")
    .unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(String::from_utf8(sink).unwrap(), "partial");
}

/// A writer that never accepts a byte, like a pipe nobody drains.
struct StalledSink;

impl tokio::io::AsyncWrite for StalledSink {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Poll::Pending
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Pending
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Pending
    }
}

#[tokio::test]
async fn test_cancel_while_sink_is_stalled() {
    let backend = Arc::new(ScriptedBackend::new(["stuck"]).hanging());
    let f = factory(backend);
    let manager = conversation();
    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let err = tokio::time::timeout(
        Duration::from_secs(5),
        run_into_writer(&token, &f, &manager, &mut StalledSink),
    )
    .await
    .expect("a stalled sink must not delay cancellation")
    .unwrap_err();

    assert!(err.is_cancelled());
}

#[tokio::test]
async fn test_cancelled_run_appends_nothing() {
    let backend = Arc::new(ScriptedBackend::new(["x"]).hanging());
    let f = factory(backend);
    let mut manager = conversation();
    let parent = CancellationToken::new();
    let deadline = deadline_token(&parent, Duration::from_millis(30));

    let err = run_to_context_manager(deadline.token(), &f, &mut manager)
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(manager.len(), 3);
    assert!(deadline.is_expired());
    assert!(!parent.is_cancelled());
}

#[tokio::test]
async fn test_already_cancelled_token_never_reaches_backend() {
    let backend = Arc::new(ScriptedBackend::new(["x"]));
    let f = factory(backend.clone());
    let token = CancellationToken::new();
    token.cancel();

    let err = run_to_string(&token, &f, &conversation()).await.unwrap_err();

    assert!(err.is_cancelled());
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(backend.requests().is_empty());
}

#[tokio::test]
async fn test_configuration_error_before_any_request() {
    let backend = Arc::new(ScriptedBackend::new(["x"]));
    let f = ChatStepFactory::new(StepSettings::new(), backend.clone());

    let err = run_to_string(&CancellationToken::new(), &f, &conversation())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Configuration { .. }));
    assert!(backend.requests().is_empty());
}

#[tokio::test]
async fn test_run_state_transitions() {
    let backend = Arc::new(ScriptedBackend::new(["ok"]));
    let f = factory(backend);
    let bindings = json!({"name": "Bob"}).as_object().cloned().unwrap();
    let template = ai_chat_steps::conversation::ConversationTemplate {
        system_prompt: "You are {{.name}}.".into(),
        messages: Vec::new(),
        prompt: "Hi {{.name}}".into(),
    };

    let mut run = ConversationRun::new(&f, CancellationToken::new());
    assert_eq!(run.state(), RunState::Idle);
    let mut manager = run
        .render(&FieldRenderer, &template, &bindings, Vec::new())
        .unwrap();
    assert_eq!(run.state(), RunState::Rendering);

    let reply = run.complete(&mut manager, &mut tokio::io::sink()).await.unwrap();
    assert_eq!(reply.text, "ok");
    assert_eq!(run.state(), RunState::Completed);
    assert!(run.state().is_terminal());

    let err = run.stream(&manager, &mut tokio::io::sink()).await.unwrap_err();
    assert!(matches!(err, Error::Runtime { .. }));
}

#[tokio::test]
async fn test_render_failure_marks_run_failed() {
    let f = factory(Arc::new(ScriptedBackend::new(["ok"])));
    let template = ai_chat_steps::conversation::ConversationTemplate {
        system_prompt: String::new(),
        messages: Vec::new(),
        prompt: "Hi {{.nobody}}".into(),
    };
    let mut run = ConversationRun::new(&f, CancellationToken::new());
    let err = run
        .render(&FieldRenderer, &template, &serde_json::Map::new(), Vec::new())
        .unwrap_err();
    assert!(matches!(err, Error::Render(_)));
    assert_eq!(run.state(), RunState::Failed);
}

struct PanickingRunnable;

impl ChatRunnable for PanickingRunnable {
    fn run_with_manager(
        &self,
        cancel: &CancellationToken,
        manager: &ConversationManager,
    ) -> Result<Box<dyn Step<Vec<Message>, String>>> {
        let mut step = StreamingStep::new(
            "panicking",
            |_messages: Vec<Message>, emitter: StepEmitter<String>| async move {
                emitter.emit("before ".to_string()).await?;
                let explode = true;
                if explode {
                    panic!("provider client bug");
                }
                Ok::<String, Error>(String::new())
            },
        );
        step.run(cancel, manager.messages().to_vec())?;
        Ok(Box::new(step))
    }
}

#[tokio::test]
async fn test_producer_panic_surfaces_as_runtime_error() {
    let mut sink: Vec<u8> = Vec::new();
    let err = run_into_writer(
        &CancellationToken::new(),
        &PanickingRunnable,
        &conversation(),
        &mut sink,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, Error::Runtime { .. }));
    assert_eq!(String::from_utf8(sink).unwrap(), "before ");
}
