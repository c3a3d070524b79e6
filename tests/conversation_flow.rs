//! Conversation Coordinator Flow Tests
//!
//! Drive a full coordinator against mock agent/synthesis endpoints and
//! observe the notification feed: stream reduction into state, supersede
//! semantics between back-to-back messages, error surfacing, and reset.
//!
//! Playback may fail in headless environments (no output device); that
//! only produces an independent error notification, which these tests
//! deliberately tolerate.

use sibyl::conversation::messages::ConversationEvent;
use sibyl::state::Status;
use sibyl::{Conversation, ConversationState, VoiceConfig};
use std::time::Duration;
use tokio::sync::broadcast;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .try_init();
}

fn config_for(server: &MockServer) -> VoiceConfig {
    let mut config = VoiceConfig::default();
    config.agent.url = format!("{}/voice/chat", server.uri());
    config.transcribe.url = format!("{}/voice/transcribe", server.uri());
    config.synthesis.url = format!("{}/voice/tts", server.uri());
    config
}

fn sse_body(events: &[&str]) -> String {
    let mut body = String::new();
    for event in events {
        body.push_str(event);
        body.push_str("\n\n");
    }
    body
}

fn wav_bytes() -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 24_000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = std::io::Cursor::new(Vec::new());
    let mut writer = hound::WavWriter::new(&mut cursor, spec).expect("wav writer");
    for i in 0..2400 {
        let sample = ((i as f32 * 0.05).sin() * 8000.0) as i16;
        writer.write_sample(sample).expect("wav sample");
    }
    writer.finalize().expect("wav finalize");
    cursor.into_inner()
}

async fn mount_synthesis(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/voice/tts"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(wav_bytes(), "audio/wav"))
        .mount(server)
        .await;
}

/// Collect events until `done` matches one, panicking after five seconds.
async fn collect_until(
    rx: &mut broadcast::Receiver<ConversationEvent>,
    mut done: impl FnMut(&ConversationEvent) -> bool,
) -> Vec<ConversationEvent> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    let mut events = Vec::new();
    loop {
        match tokio::time::timeout_at(deadline, rx.recv()).await {
            Ok(Ok(event)) => {
                let stop = done(&event);
                events.push(event);
                if stop {
                    return events;
                }
            }
            Ok(Err(broadcast::error::RecvError::Lagged(_))) => continue,
            Ok(Err(broadcast::error::RecvError::Closed)) => {
                panic!("event feed closed early; events so far: {events:?}")
            }
            Err(_) => panic!("timed out waiting for event; events so far: {events:?}"),
        }
    }
}

fn last_state(events: &[ConversationEvent]) -> ConversationState {
    events
        .iter()
        .rev()
        .find_map(|e| match e {
            ConversationEvent::StateChanged(state) => Some(state.clone()),
            _ => None,
        })
        .expect("no StateChanged event observed")
}

#[tokio::test]
async fn message_flow_reduces_stream_into_state() {
    init_tracing();
    let server = MockServer::start().await;
    mount_synthesis(&server).await;

    let body = sse_body(&[
        "event: RUN_STARTED\ndata: {\"type\":\"RUN_STARTED\"}",
        "event: STATE_SNAPSHOT\ndata: {\"snapshot\":{\"response_text\":\"\",\"panels\":[{\"type\":\"world_list\",\"data\":{\"count\":3}}],\"current_world_id\":null,\"current_world_name\":null,\"status\":\"thinking\",\"breadcrumbs\":[\"worlds\"]}}",
        "event: TEXT_MESSAGE_CONTENT\ndata: {\"delta\":\"Hello\"}",
        "event: TEXT_MESSAGE_CONTENT\ndata: {\"delta\":\" world\"}",
        "event: RUN_FINISHED\ndata: {\"type\":\"RUN_FINISHED\"}",
    ]);
    Mock::given(method("POST"))
        .and(path("/voice/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let conversation = Conversation::new(config_for(&server));
    let handle = conversation.handle();
    let mut rx = conversation.subscribe();
    let loop_task = tokio::spawn(conversation.run());

    handle.send_message("show me worlds").expect("loop alive");

    let events = collect_until(&mut rx, |e| {
        matches!(e, ConversationEvent::Streaming { active: false })
    })
    .await;

    assert!(
        events
            .iter()
            .any(|e| matches!(e, ConversationEvent::Streaming { active: true })),
        "streaming never became active"
    );
    assert!(
        events
            .iter()
            .any(|e| matches!(e, ConversationEvent::ResponseText(t) if t == "Hello world")),
        "accumulated response text never observed"
    );

    let state = last_state(&events);
    assert_eq!(state.status, Status::Idle);
    assert_eq!(state.response_text, "Hello world");
    assert_eq!(state.breadcrumbs, vec!["worlds".to_owned()]);
    assert_eq!(state.panels.len(), 1);
    assert_eq!(state.panels[0].panel_type, "world_list");

    handle.shutdown().expect("loop alive");
    loop_task.await.expect("loop task").expect("loop result");
}

#[tokio::test]
async fn second_message_supersedes_first() {
    init_tracing();
    let server = MockServer::start().await;
    mount_synthesis(&server).await;

    // The first run stalls long enough to be superseded.
    Mock::given(method("POST"))
        .and(path("/voice/chat"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_millis(600))
                .set_body_raw(
                    sse_body(&[
                        "event: TEXT_MESSAGE_CONTENT\ndata: {\"delta\":\"FIRST ANSWER\"}",
                        "event: RUN_FINISHED\ndata: {\"type\":\"RUN_FINISHED\"}",
                    ]),
                    "text/event-stream",
                ),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/voice/chat"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(
                sse_body(&[
                    "event: TEXT_MESSAGE_CONTENT\ndata: {\"delta\":\"SECOND ANSWER\"}",
                    "event: RUN_FINISHED\ndata: {\"type\":\"RUN_FINISHED\"}",
                ]),
                "text/event-stream",
            ),
        )
        .mount(&server)
        .await;

    let conversation = Conversation::new(config_for(&server));
    let handle = conversation.handle();
    let mut rx = conversation.subscribe();
    let loop_task = tokio::spawn(conversation.run());

    handle.send_message("first question").expect("loop alive");
    tokio::time::sleep(Duration::from_millis(100)).await;
    handle.send_message("second question").expect("loop alive");

    let mut events = collect_until(&mut rx, |e| {
        matches!(e, ConversationEvent::Streaming { active: false })
    })
    .await;

    // Drain past the first run's original deadline to catch any stale
    // events that would wrongly mutate state.
    let drain_deadline = tokio::time::Instant::now() + Duration::from_millis(800);
    while let Ok(Ok(event)) = tokio::time::timeout_at(drain_deadline, rx.recv()).await {
        events.push(event);
    }

    assert!(
        events
            .iter()
            .any(|e| matches!(e, ConversationEvent::ResponseText(t) if t == "SECOND ANSWER")),
        "second run's response never observed"
    );
    for event in &events {
        if let ConversationEvent::ResponseText(text) = event {
            assert!(
                !text.contains("FIRST"),
                "stale run leaked into live state: {text:?}"
            );
        }
    }
    assert_eq!(last_state(&events).response_text, "SECOND ANSWER");

    handle.shutdown().expect("loop alive");
    loop_task.await.expect("loop task").expect("loop result");
}

#[tokio::test]
async fn run_error_event_surfaces_and_goes_idle() {
    init_tracing();
    let server = MockServer::start().await;
    mount_synthesis(&server).await;

    let body = sse_body(&[
        "event: RUN_STARTED\ndata: {\"type\":\"RUN_STARTED\"}",
        "event: RUN_ERROR\ndata: {\"message\":\"guide unavailable\"}",
    ]);
    Mock::given(method("POST"))
        .and(path("/voice/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let conversation = Conversation::new(config_for(&server));
    let handle = conversation.handle();
    let mut rx = conversation.subscribe();
    let loop_task = tokio::spawn(conversation.run());

    handle.send_message("hello").expect("loop alive");

    let events = collect_until(&mut rx, |e| {
        matches!(e, ConversationEvent::Streaming { active: false })
    })
    .await;

    assert!(
        events
            .iter()
            .any(|e| matches!(e, ConversationEvent::Error(m) if m == "guide unavailable")),
        "run error never surfaced"
    );
    assert_eq!(last_state(&events).status, Status::Idle);

    handle.shutdown().expect("loop alive");
    loop_task.await.expect("loop task").expect("loop result");
}

#[tokio::test]
async fn transport_failure_surfaces_and_settles() {
    init_tracing();
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/voice/chat"))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal error"))
        .mount(&server)
        .await;

    let conversation = Conversation::new(config_for(&server));
    let handle = conversation.handle();
    let mut rx = conversation.subscribe();
    let loop_task = tokio::spawn(conversation.run());

    handle.send_message("hello").expect("loop alive");

    let events = collect_until(&mut rx, |e| {
        matches!(e, ConversationEvent::Streaming { active: false })
    })
    .await;

    assert!(
        events
            .iter()
            .any(|e| matches!(e, ConversationEvent::Error(m) if m.contains("500"))),
        "transport error never surfaced"
    );
    assert_eq!(last_state(&events).status, Status::Idle);

    handle.shutdown().expect("loop alive");
    loop_task.await.expect("loop task").expect("loop result");
}

#[tokio::test]
async fn reset_returns_to_initial_state() {
    init_tracing();
    let server = MockServer::start().await;
    mount_synthesis(&server).await;

    let body = sse_body(&[
        "event: STATE_SNAPSHOT\ndata: {\"snapshot\":{\"response_text\":\"\",\"panels\":[],\"current_world_id\":\"w-9\",\"current_world_name\":\"Aster\",\"status\":\"thinking\",\"breadcrumbs\":[\"worlds\",\"Aster\"]}}",
        "event: TEXT_MESSAGE_CONTENT\ndata: {\"delta\":\"Aster is a water world.\"}",
        "event: RUN_FINISHED\ndata: {\"type\":\"RUN_FINISHED\"}",
    ]);
    Mock::given(method("POST"))
        .and(path("/voice/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let conversation = Conversation::new(config_for(&server));
    let handle = conversation.handle();
    let mut rx = conversation.subscribe();
    let loop_task = tokio::spawn(conversation.run());

    handle.send_message("tell me about Aster").expect("loop alive");
    let events = collect_until(&mut rx, |e| {
        matches!(e, ConversationEvent::Streaming { active: false })
    })
    .await;
    assert_eq!(last_state(&events).current_world_id.as_deref(), Some("w-9"));

    handle.reset().expect("loop alive");
    let events = collect_until(&mut rx, |e| {
        matches!(e, ConversationEvent::StateChanged(s) if *s == ConversationState::default())
    })
    .await;
    assert_eq!(last_state(&events), ConversationState::default());

    handle.shutdown().expect("loop alive");
    loop_task.await.expect("loop task").expect("loop result");
}
