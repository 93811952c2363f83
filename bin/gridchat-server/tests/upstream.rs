//! `OpenAiClient` against a local stand-in for the provider API.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use futures::StreamExt;
use gridchat_core::sse::MAX_LINE_LEN;
use gridchat_core::{
    CompletionRequest, CompletionStreamer, Frame, Message, OpenAiClient, read_frames,
};
use serde_json::{Value, json};
use tokio::sync::Notify;

/// How the stand-in provider answers.
#[derive(Clone, Copy, Default)]
enum Mode {
    /// Two content chunks, then `[DONE]`.
    #[default]
    Script,
    /// 401 with an OpenAI error body.
    Fail,
    /// One chunk every few milliseconds until the client hangs up.
    Endless,
    /// A single line longer than the decoder accepts.
    LongLine,
}

#[derive(Clone, Default)]
struct Upstream {
    mode: Mode,
    seen: Arc<Mutex<Vec<(Option<String>, Value)>>>,
    hung_up: Arc<Notify>,
}

/// Notifies when the provider's response body is dropped.
struct HangupGuard(Arc<Notify>);

impl Drop for HangupGuard {
    fn drop(&mut self) {
        self.0.notify_one();
    }
}

async fn completions(
    State(upstream): State<Upstream>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> axum::response::Response {
    let auth = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    upstream.seen.lock().unwrap().push((auth, body));

    match upstream.mode {
        Mode::Script => {}
        Mode::Fail => {
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": { "message": "Incorrect API key provided" } })),
            )
                .into_response();
        }
        Mode::Endless => {
            let guard = HangupGuard(upstream.hung_up.clone());
            let ticks = futures::stream::unfold(guard, |guard| async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                let event = json!({ "choices": [{ "index": 0, "delta": { "content": "tick" } }] });
                Some((
                    Ok::<_, std::convert::Infallible>(format!("data: {event}\n\n")),
                    guard,
                ))
            });
            return (
                [(header::CONTENT_TYPE, "text/event-stream")],
                Body::from_stream(ticks),
            )
                .into_response();
        }
        Mode::LongLine => {
            let body = format!("data: {}", "x".repeat(MAX_LINE_LEN + 1));
            return ([(header::CONTENT_TYPE, "text/event-stream")], body).into_response();
        }
    }

    let events = [
        json!({ "choices": [{ "index": 0, "delta": { "role": "assistant", "content": "Hel" } }] }),
        json!({ "choices": [{ "index": 0, "delta": { "content": "lo" }, "finish_reason": "stop" }] }),
    ];
    let mut body = String::new();
    for event in events {
        body.push_str(&format!("data: {event}\n\n"));
    }
    body.push_str("data: [DONE]\n\n");
    ([(header::CONTENT_TYPE, "text/event-stream")], body).into_response()
}

async fn spawn_upstream(upstream: Upstream) -> String {
    let app = Router::new()
        .route("/v1/chat/completions", post(completions))
        .with_state(upstream);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(axum::serve(listener, app).into_future());
    format!("http://{addr}/v1/")
}

fn request() -> CompletionRequest {
    CompletionRequest {
        model: "gpt-5".into(),
        system: "You are an analyst.".into(),
        messages: vec![Message::User {
            content: "hi".into(),
        }],
        tools: vec![],
        tool_choice: None,
        response_format: None,
    }
}

async fn collect_frames(client: &OpenAiClient) -> Vec<Frame> {
    read_frames(client.stream(request()))
        .map(|frame| frame.unwrap())
        .collect()
        .await
}

#[tokio::test]
async fn provider_events_become_chunk_frames() {
    let upstream = Upstream::default();
    let base = spawn_upstream(upstream.clone()).await;
    let client = OpenAiClient::new("sk-test").with_base_url(base);

    let frames = collect_frames(&client).await;

    assert_eq!(frames.len(), 4);
    assert_eq!(frames[0], Frame::GenerationStart);
    assert_eq!(frames[3], Frame::GenerationFinish);
    let Frame::GenerationChunk { chunk } = &frames[2] else {
        panic!("expected chunk, got {:?}", frames[2]);
    };
    assert_eq!(chunk.choices[0].delta.content.as_deref(), Some("lo"));
    assert_eq!(chunk.choices[0].finish_reason.as_deref(), Some("stop"));

    let seen = upstream.seen.lock().unwrap();
    let (auth, body) = &seen[0];
    assert_eq!(auth.as_deref(), Some("Bearer sk-test"));
    assert_eq!(body["stream"], true);
    assert_eq!(body["reasoning_effort"], "low");
    assert_eq!(body["messages"][0]["role"], "system");
}

#[tokio::test]
async fn provider_failure_becomes_error_frame() {
    let base = spawn_upstream(Upstream {
        mode: Mode::Fail,
        ..Default::default()
    })
    .await;
    let client = OpenAiClient::new("sk-wrong").with_base_url(base);

    let frames = collect_frames(&client).await;

    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0], Frame::GenerationStart);
    match &frames[1] {
        Frame::GenerationError { error } => {
            assert!(error.contains("401"), "{error}");
            assert!(error.contains("Incorrect API key provided"), "{error}");
        }
        other => panic!("expected error frame, got {other:?}"),
    }
}

#[tokio::test]
async fn overlong_provider_line_becomes_error_frame() {
    let base = spawn_upstream(Upstream {
        mode: Mode::LongLine,
        ..Default::default()
    })
    .await;
    let client = OpenAiClient::new("sk-test").with_base_url(base);

    let frames = collect_frames(&client).await;

    assert_eq!(frames.len(), 2);
    match &frames[1] {
        Frame::GenerationError { error } => assert!(error.contains("line length"), "{error}"),
        other => panic!("expected error frame, got {other:?}"),
    }
}

#[tokio::test]
async fn dropping_the_frame_stream_closes_the_provider_connection() {
    let upstream = Upstream {
        mode: Mode::Endless,
        ..Default::default()
    };
    let base = spawn_upstream(upstream.clone()).await;
    let client = OpenAiClient::new("sk-test").with_base_url(base);

    let mut frames = Box::pin(read_frames(client.stream(request())));
    assert_eq!(frames.next().await.unwrap().unwrap(), Frame::GenerationStart);
    assert!(matches!(
        frames.next().await.unwrap().unwrap(),
        Frame::GenerationChunk { .. }
    ));
    drop(frames);

    tokio::time::timeout(Duration::from_secs(5), upstream.hung_up.notified())
        .await
        .expect("provider response was still being read after the client went away");
}
