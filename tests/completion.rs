//! Completion and recognition clients against a local stub service

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use secrecy::SecretString;
use serde_json::{Value, json};

use carebot::prompt::{PromptEvent, recognize};
use carebot::voice::{SpeechToText, samples_to_wav};
use carebot::{Completer, Error, OpenAiChatClient, RetryPolicy, Turn};

#[derive(Clone)]
struct Stub {
    hits: Arc<AtomicUsize>,
    /// Status returned before the service starts answering
    failures: Vec<StatusCode>,
}

async fn chat(
    State(stub): State<Stub>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let hit = stub.hits.fetch_add(1, Ordering::SeqCst);
    if let Some(status) = stub.failures.get(hit) {
        return (*status, Json(json!({"error": {"message": "try later"}}))).into_response();
    }

    assert_eq!(
        headers.get("authorization").and_then(|v| v.to_str().ok()),
        Some("Bearer sk-test")
    );
    assert_eq!(body["max_tokens"], 50);

    let last = body["messages"]
        .as_array()
        .and_then(|m| m.last())
        .and_then(|m| m["content"].as_str())
        .unwrap_or_default()
        .to_string();

    Json(json!({
        "choices": [{"message": {"role": "assistant", "content": format!("you said {last}")}}],
        "usage": {"prompt_tokens": 20, "completion_tokens": 5, "total_tokens": 25}
    }))
    .into_response()
}

async fn transcribe() -> Json<Value> {
    Json(json!({"text": "What time is it?"}))
}

async fn serve(failures: Vec<StatusCode>) -> (String, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let stub = Stub {
        hits: Arc::clone(&hits),
        failures,
    };

    let app = Router::new()
        .route("/v1/chat/completions", post(chat))
        .route("/v1/audio/transcriptions", post(transcribe))
        .with_state(stub);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}"), hits)
}

fn client(base_url: String) -> OpenAiChatClient {
    OpenAiChatClient::new(
        SecretString::from("sk-test".to_string()),
        "gpt-3.5-turbo".to_string(),
        Some(base_url),
        50,
    )
    .unwrap()
    .with_retry(RetryPolicy {
        max_retries: 1,
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(50),
    })
}

fn turns() -> Vec<Turn> {
    vec![Turn::system("You are an elderly caretaker"), Turn::user("hello")]
}

#[tokio::test]
async fn test_completion_success() {
    let (base, hits) = serve(Vec::new()).await;

    let completion = client(base).complete(&turns()).await.unwrap();

    assert_eq!(completion.reply, "you said hello");
    assert_eq!(completion.total_tokens, 25);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_transient_failure_retried_once() {
    let (base, hits) = serve(vec![StatusCode::SERVICE_UNAVAILABLE]).await;

    let completion = client(base).complete(&turns()).await.unwrap();

    assert_eq!(completion.reply, "you said hello");
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_retry_budget_exhausted() {
    let (base, hits) = serve(vec![
        StatusCode::TOO_MANY_REQUESTS,
        StatusCode::TOO_MANY_REQUESTS,
    ])
    .await;

    let result = client(base).complete(&turns()).await;

    assert!(matches!(result, Err(Error::Completion(_))));
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_client_error_not_retried() {
    let (base, hits) = serve(vec![StatusCode::BAD_REQUEST]).await;

    let result = client(base).complete(&turns()).await;

    assert!(matches!(result, Err(Error::Completion(_))));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unreachable_service_is_an_error() {
    // Nothing listens on the discard port
    let client = client("http://127.0.0.1:9".to_string());
    assert!(client.complete(&turns()).await.is_err());
}

#[tokio::test]
async fn test_transcription() {
    let (base, _hits) = serve(Vec::new()).await;

    let stt = SpeechToText::new(
        SecretString::from("sk-test".to_string()),
        "whisper-1".to_string(),
        Some(base),
    )
    .unwrap();

    let wav = samples_to_wav(&[0.0; 1600], 16_000).unwrap();
    let text = stt.transcribe(&wav).await.unwrap();

    assert_eq!(text, "What time is it?");
}

/// Recognizer that always answers with `status` and `body`
async fn serve_recognizer(status: StatusCode, body: Value) -> String {
    let app = Router::new().route(
        "/v1/audio/transcriptions",
        post(move || async move { (status, Json(body)) }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{addr}")
}

fn recognizer(base_url: String) -> SpeechToText {
    SpeechToText::new(
        SecretString::from("sk-test".to_string()),
        "whisper-1".to_string(),
        Some(base_url),
    )
    .unwrap()
}

fn phrase() -> Vec<u8> {
    samples_to_wav(&[0.1; 1600], 16_000).unwrap()
}

#[tokio::test]
async fn test_recognized_speech_is_lowercased() {
    let base = serve_recognizer(StatusCode::OK, json!({"text": " Call My Daughter "})).await;

    let event = recognize(&recognizer(base), &phrase()).await;

    assert_eq!(event, PromptEvent::Prompt("call my daughter".into()));
}

#[tokio::test]
async fn test_empty_transcript_is_no_input() {
    let base = serve_recognizer(StatusCode::OK, json!({"text": "  "})).await;

    let event = recognize(&recognizer(base), &phrase()).await;

    assert_eq!(event, PromptEvent::NoInput);
}

#[tokio::test]
async fn test_recognizer_error_is_no_input() {
    let base = serve_recognizer(
        StatusCode::INTERNAL_SERVER_ERROR,
        json!({"error": {"message": "model overloaded"}}),
    )
    .await;

    let event = recognize(&recognizer(base), &phrase()).await;

    assert_eq!(event, PromptEvent::NoInput);
}

#[tokio::test]
async fn test_unreachable_recognizer_is_no_input() {
    let event = recognize(&recognizer("http://127.0.0.1:9".to_string()), &phrase()).await;
    assert_eq!(event, PromptEvent::NoInput);
}
