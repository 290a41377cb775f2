//! Server Integration Tests
//!
//! Routes exercised through `tower::ServiceExt::oneshot`, including the
//! Server-Sent Events stream of a full run.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use bidreq::adapters::{
    InferenceClient, InferenceError, MemoryDocumentStore, MemoryRequirementStore,
    PlainTextExtractor,
};
use bidreq::core::{Orchestrator, PipelineSettings};
use bidreq::domain::{ExtractionRequest, ProgressEvent, RunState, SourceDocument};
use bidreq::server::{router, AppState};
use bidreq::testing::{ManualClock, ScriptedInferenceClient};

fn scripted_client() -> ScriptedInferenceClient {
    ScriptedInferenceClient::new()
        .with_categories(["Financial", "Experience"])
        .with_category(
            "Financial",
            vec![Ok(json!({"requirements": [
                {"type": "Financial", "title": "Turnover", "priority": "High", "description": "EUR 2M"}
            ]}))],
        )
        .with_category(
            "Experience",
            vec![Ok(json!({"requirements": [
                {"type": "Experience", "title": "References", "priority": "Medium", "description": "3 projects"}
            ]}))],
        )
}

fn app_with(client: Arc<dyn InferenceClient>, settings: PipelineSettings) -> Router {
    let documents = MemoryDocumentStore::new()
        .with_document("p1", SourceDocument::text("notice", "notice.txt", "Tender notice"))
        .with_document("p1", SourceDocument::text("annex", "annex.txt", "Annex A"));
    let requirements = Arc::new(MemoryRequirementStore::new());

    let orchestrator = Orchestrator::new(
        client,
        Arc::new(PlainTextExtractor::new()),
        requirements.clone(),
        settings,
    )
    .with_clock(Arc::new(ManualClock::new()));

    router(AppState {
        documents: Arc::new(documents),
        requirements,
        orchestrator: Arc::new(orchestrator),
    })
}

fn app() -> Router {
    app_with(Arc::new(scripted_client()), PipelineSettings::default())
}

fn post_json(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Parse the `data:` lines of an SSE body
fn sse_events(body: &str) -> Vec<ProgressEvent> {
    body.lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| serde_json::from_str(data.trim()).unwrap())
        .collect()
}

#[tokio::test]
async fn test_health() {
    let response = app().oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_extract_streams_full_run() {
    let app = app();
    let response = app
        .clone()
        .oneshot(post_json(
            "/api/requirements/extract",
            r#"{"documentIds": ["notice", "annex"], "projectId": "p1"}"#,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "text/event-stream");
    assert_eq!(response.headers()["x-accel-buffering"], "no");
    assert_eq!(response.headers()["cache-control"], "no-cache");

    let events = sse_events(&body_string(response).await);
    let types: Vec<_> = events.iter().map(|e| e.event_type()).collect();
    assert_eq!(types.first(), Some(&"start"));
    assert_eq!(&types[types.len() - 2..], &["complete", "end"]);

    let data = events
        .iter()
        .find_map(|e| match e {
            ProgressEvent::Complete { data, .. } => Some(data.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(data.len(), 2);
    assert_eq!(data[0].ai_metadata.document_ids, vec!["notice", "annex"]);

    // Persisted requirements are listed afterwards
    let response = app
        .oneshot(get("/api/projects/p1/requirements"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(body["count"], 2);
    assert_eq!(body["requirements"][0]["type"], "Financial");
    assert_eq!(body["requirements"][0]["status"], "Pending");
}

#[tokio::test]
async fn test_snake_case_body_is_accepted() {
    let response = app()
        .oneshot(post_json(
            "/api/requirements/extract",
            r#"{"document_ids": ["notice"], "project_id": "p1"}"#,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_unknown_document_is_rejected_before_streaming() {
    let response = app()
        .oneshot(post_json(
            "/api/requirements/extract",
            r#"{"documentIds": ["notice", "missing"], "projectId": "p1"}"#,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(response.headers()["content-type"], "application/json");

    let body: Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(body["error"]["code"], "NOT_FOUND");
    assert!(body["error"]["message"].as_str().unwrap().contains("missing"));
}

#[tokio::test]
async fn test_bad_requests() {
    for body in [
        r#"{"documentIds": [], "projectId": "p1"}"#,
        r#"{"documentIds": ["notice"], "projectId": ""}"#,
        r#"{"documentIds": "#,
    ] {
        let response = app()
            .oneshot(post_json("/api/requirements/extract", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body: {}", body);

        let json: Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(json["error"]["code"], "BAD_REQUEST");
    }
}

/// Delays every call by a real-time interval before delegating
struct SlowClient {
    inner: ScriptedInferenceClient,
    delay: Duration,
}

#[async_trait]
impl InferenceClient for SlowClient {
    fn name(&self) -> &str {
        "slow"
    }

    async fn extract(&self, prompt: &str, schema: &Value) -> Result<Value, InferenceError> {
        tokio::time::sleep(self.delay).await;
        self.inner.extract(prompt, schema).await
    }
}

#[tokio::test]
async fn test_silence_produces_ping_in_stream() {
    let client = SlowClient {
        inner: scripted_client(),
        delay: Duration::from_millis(1500),
    };
    let settings = PipelineSettings {
        keepalive_seconds: 1,
        ..Default::default()
    };
    let app = app_with(Arc::new(client), settings);

    let response = app
        .oneshot(post_json(
            "/api/requirements/extract",
            r#"{"documentIds": ["notice"], "projectId": "p1"}"#,
        ))
        .await
        .unwrap();

    let events = sse_events(&body_string(response).await);
    let types: Vec<_> = events.iter().map(|e| e.event_type()).collect();

    assert!(types.contains(&"ping"));
    assert_eq!(types.last(), Some(&"end"));
    // Pings never carry progress, so percent stays monotonic around them
    let percents: Vec<u8> = events.iter().filter_map(|e| e.percent()).collect();
    assert!(percents.windows(2).all(|w| w[0] <= w[1]));
}

#[tokio::test]
async fn test_fast_run_emits_no_ping() {
    let response = app()
        .oneshot(post_json(
            "/api/requirements/extract",
            r#"{"documentIds": ["notice", "annex"], "projectId": "p1"}"#,
        ))
        .await
        .unwrap();

    let events = sse_events(&body_string(response).await);
    let types: Vec<_> = events.iter().map(|e| e.event_type()).collect();

    // Default keepalive is 15s and nothing in this run is silent that long
    assert!(!types.contains(&"ping"), "unexpected ping in {:?}", types);
    assert_eq!(types.last(), Some(&"end"));
}

#[tokio::test]
async fn test_dropping_stream_cancels_run() {
    let client = SlowClient {
        inner: scripted_client(),
        delay: Duration::from_secs(30),
    };
    let orchestrator = Arc::new(Orchestrator::new(
        Arc::new(client),
        Arc::new(PlainTextExtractor::new()),
        Arc::new(MemoryRequirementStore::new()),
        PipelineSettings::default(),
    ));

    let request = ExtractionRequest::new("p1", ["notice"]).unwrap();
    let documents = vec![SourceDocument::text("notice", "notice.txt", "Tender notice")];
    let (mut receiver, handle) = orchestrator.spawn(request, documents);

    assert_eq!(receiver.next_event().await.unwrap().event_type(), "start");
    drop(receiver);

    let run = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("run stops after disconnect")
        .unwrap();
    assert_eq!(
        run.state,
        RunState::Failed {
            error: "Run cancelled".to_string()
        }
    );
}
