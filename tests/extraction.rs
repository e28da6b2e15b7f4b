use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode, Uri},
    response::IntoResponse,
};
use scanroute::{
    ADDRESS_INSTRUCTION, AttemptOutcome, ExtractionEngine, ExtractionError, ExtractionRequest,
    GeminiConfig, GeminiError, GeminiModel, ImagePayload, RetryPolicy, VisionModel,
};
use serde_json::{Value, json};
use std::{
    collections::VecDeque,
    fmt,
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::time::Instant;

#[derive(Debug)]
struct Refused;

impl fmt::Display for Refused {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "refused")
    }
}

impl std::error::Error for Refused {}

/// Succeeds for images whose first byte is 1, fails for everything else.
struct ByFirstByte;

impl VisionModel for ByFirstByte {
    type Error = Refused;

    async fn generate(&self, _instruction: &str, image: &ImagePayload) -> Result<String, Refused> {
        match image.data().first() {
            Some(1) => Ok(" 1600 Amphitheatre Pkwy ".to_string()),
            _ => Err(Refused),
        }
    }
}

#[tokio::test(start_paused = true)]
async fn concurrent_requests_do_not_share_retry_state() {
    let engine = Arc::new(ExtractionEngine::new(ByFirstByte));

    let succeeding = ExtractionRequest::address(ImagePayload::new("image/jpeg", vec![1]).unwrap());
    let exhausting = ExtractionRequest::address(ImagePayload::new("image/jpeg", vec![2]).unwrap());

    let start = Instant::now();
    let ok_task = tokio::spawn({
        let engine = engine.clone();
        async move {
            let result = engine.extract(&succeeding).await;
            (result, start.elapsed())
        }
    });
    let failing_task = tokio::spawn({
        let engine = engine.clone();
        async move {
            let result = engine.extract(&exhausting).await;
            (result, start.elapsed())
        }
    });

    let (ok, ok_elapsed) = ok_task.await.unwrap();
    let (failed, failed_elapsed) = failing_task.await.unwrap();

    let ok = ok.unwrap();
    assert_eq!(ok.text, "1600 Amphitheatre Pkwy");
    assert_eq!(ok.attempts.len(), 1);
    assert_eq!(ok_elapsed, Duration::ZERO);

    let failed = failed.unwrap_err();
    assert!(failed.is_exhausted());
    assert_eq!(failed_elapsed, Duration::from_millis(15000));
}

/// A stand-in for the Gemini API that replays canned replies.
#[derive(Default)]
struct Upstream {
    replies: Mutex<VecDeque<(StatusCode, Value)>>,
    seen: Mutex<Vec<Seen>>,
}

struct Seen {
    uri: String,
    api_key: Option<String>,
    body: Value,
}

async fn generate_content(
    State(upstream): State<Arc<Upstream>>,
    uri: Uri,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    let api_key = headers
        .get("x-goog-api-key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    upstream.seen.lock().unwrap().push(Seen {
        uri: uri.to_string(),
        api_key,
        body,
    });
    let (status, reply) = upstream
        .replies
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or((StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": "no reply queued" })));
    (status, Json(reply))
}

async fn spawn_upstream(replies: Vec<(StatusCode, Value)>) -> (String, Arc<Upstream>) {
    let upstream = Arc::new(Upstream {
        replies: Mutex::new(replies.into()),
        ..Default::default()
    });
    let app = Router::new()
        .fallback(generate_content)
        .with_state(upstream.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

    (format!("http://{}", addr), upstream)
}

fn text_reply(text: &str) -> (StatusCode, Value) {
    (
        StatusCode::OK,
        json!({ "candidates": [{ "content": { "parts": [{ "text": text }], "role": "model" } }] }),
    )
}

fn gemini(base_url: &str) -> GeminiModel {
    let config = GeminiConfig::new("test-key")
        .with_model("gemini-test")
        .with_base_url(base_url);
    GeminiModel::new(config).unwrap()
}

#[tokio::test]
async fn gemini_sends_instruction_and_inline_image() {
    let (base_url, upstream) = spawn_upstream(vec![text_reply("\n742 Evergreen Terrace\n")]).await;
    let engine = ExtractionEngine::new(gemini(&base_url));

    let image = ImagePayload::new("image/png", vec![0, 1, 2]).unwrap();
    let extraction = engine.extract(&ExtractionRequest::address(image)).await.unwrap();

    assert_eq!(extraction.text, "742 Evergreen Terrace");

    let seen = upstream.seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    let Seen { uri, api_key, body } = &seen[0];
    assert_eq!(uri, "/v1beta/models/gemini-test:generateContent");
    assert_eq!(api_key.as_deref(), Some("test-key"));
    assert_eq!(body["contents"][0]["parts"][0]["text"], ADDRESS_INSTRUCTION);
    assert_eq!(body["contents"][0]["parts"][1]["inline_data"]["mime_type"], "image/png");
    assert_eq!(body["contents"][0]["parts"][1]["inline_data"]["data"], "AAEC");
}

#[tokio::test]
async fn gemini_errors_are_retried() {
    let (base_url, upstream) = spawn_upstream(vec![
        (StatusCode::SERVICE_UNAVAILABLE, json!({ "error": { "message": "overloaded" } })),
        (StatusCode::OK, json!({ "candidates": [] })),
        text_reply("350 Fifth Avenue"),
    ])
    .await;
    let policy = RetryPolicy::new(3, Duration::from_millis(5));
    let engine = ExtractionEngine::with_policy(gemini(&base_url), policy);

    let image = ImagePayload::new("image/jpeg", vec![0xff, 0xd8]).unwrap();
    let extraction = engine.extract(&ExtractionRequest::address(image)).await.unwrap();

    assert_eq!(extraction.text, "350 Fifth Avenue");
    assert_eq!(extraction.attempts.len(), 3);
    assert_eq!(upstream.seen.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn gemini_reports_status_and_empty_reply() {
    let (base_url, _upstream) = spawn_upstream(vec![
        (StatusCode::FORBIDDEN, json!({ "error": "bad key" })),
        (StatusCode::OK, json!({ "candidates": [{ "content": { "parts": [] } }] })),
    ])
    .await;
    let model = gemini(&base_url);
    let image = ImagePayload::new("image/jpeg", vec![1]).unwrap();

    let err = model.generate("where?", &image).await.unwrap_err();
    assert!(matches!(err, GeminiError::Status { status, .. } if status == StatusCode::FORBIDDEN));

    let err = model.generate("where?", &image).await.unwrap_err();
    assert!(matches!(err, GeminiError::EmptyResponse));
}

#[tokio::test]
async fn unreachable_gemini_exhausts_retries() {
    // bind then drop to get a port nobody listens on
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let policy = RetryPolicy::new(2, Duration::from_millis(1));
    let engine = ExtractionEngine::with_policy(gemini(&format!("http://{}", addr)), policy);
    let image = ImagePayload::new("image/jpeg", vec![1]).unwrap();

    let err = engine.extract(&ExtractionRequest::address(image)).await.unwrap_err();
    assert!(err.is_exhausted());

    let ExtractionError::Exhausted { attempts } = err else {
        unreachable!()
    };
    assert_eq!(attempts.len(), 2);
    for attempt in &attempts {
        let AttemptOutcome::Failed(cause) = &attempt.outcome else {
            panic!("attempt {} should have failed", attempt.index)
        };
        assert!(!cause.contains("test-key"), "api key leaked: {cause}");
        assert!(!cause.contains("generateContent"), "url leaked: {cause}");
    }
}

#[tokio::test]
async fn whitespace_reply_is_an_empty_success() {
    let (base_url, upstream) = spawn_upstream(vec![text_reply("   ")]).await;
    let engine = ExtractionEngine::new(gemini(&base_url));

    let image = ImagePayload::new("image/jpeg", vec![1]).unwrap();
    let extraction = engine.extract(&ExtractionRequest::address(image)).await.unwrap();

    assert_eq!(extraction.text, "");
    assert_eq!(extraction.attempts.len(), 1);
    assert_eq!(upstream.seen.lock().unwrap().len(), 1);
}
