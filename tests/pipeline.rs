//! Pipeline Integration Tests
//!
//! End-to-end runs of the orchestrator against a scripted inference client,
//! a manual clock and an in-memory requirement store.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use bidreq::adapters::{
    FatalKind, InferenceError, MemoryRequirementStore, PlainTextExtractor, RequirementStore,
    StoreError, TransientKind,
};
use bidreq::core::{CancelToken, Orchestrator, PipelineSettings};
use bidreq::domain::{
    ExtractionRequest, PipelineRun, Priority, ProgressEvent, Requirement, RunState,
    SourceDocument, GENERATION_METHOD,
};
use bidreq::testing::{CollectingSink, ManualClock, ScriptedInferenceClient};

fn candidates(category: &str, titles: &[&str]) -> Result<Value, InferenceError> {
    let items: Vec<Value> = titles
        .iter()
        .map(|title| {
            json!({
                "type": category,
                "title": title,
                "priority": "High",
                "description": format!("{} details", title),
            })
        })
        .collect();
    Ok(json!({ "requirements": items }))
}

fn rate_limited() -> Result<Value, InferenceError> {
    Err(InferenceError::transient(TransientKind::RateLimited, "quota exceeded"))
}

fn request() -> ExtractionRequest {
    ExtractionRequest::new("tender-42", ["notice", "annex"]).unwrap()
}

fn documents() -> Vec<SourceDocument> {
    vec![
        SourceDocument::text("notice", "notice.txt", "Bidders must show EUR 2M turnover."),
        SourceDocument::text("annex", "annex.md", "Three similar projects in five years."),
    ]
}

struct Harness {
    orchestrator: Orchestrator,
    client: Arc<ScriptedInferenceClient>,
    clock: Arc<ManualClock>,
    store: Arc<MemoryRequirementStore>,
}

impl Harness {
    fn new(client: ScriptedInferenceClient) -> Self {
        Self::with_store(client, Arc::new(MemoryRequirementStore::new()))
    }

    fn with_store(client: ScriptedInferenceClient, store: Arc<MemoryRequirementStore>) -> Self {
        let clock = Arc::new(ManualClock::new());
        let client = Arc::new(client.with_clock(clock.clone()));
        let orchestrator = Orchestrator::new(
            client.clone(),
            Arc::new(PlainTextExtractor::new()),
            store.clone(),
            PipelineSettings::default(),
        )
        .with_clock(clock.clone());

        Self {
            orchestrator,
            client,
            clock,
            store,
        }
    }

    async fn run(&self) -> (PipelineRun, CollectingSink) {
        let sink = CollectingSink::new();
        let run = self
            .orchestrator
            .run(&request(), documents(), &sink, &CancelToken::new())
            .await;
        (run, sink)
    }
}

fn completed_data(sink: &CollectingSink) -> Vec<Requirement> {
    sink.events()
        .into_iter()
        .find_map(|e| match e {
            ProgressEvent::Complete { data, .. } => Some(data),
            _ => None,
        })
        .expect("complete event")
}

#[tokio::test]
async fn test_empty_taxonomy_reports_single_error() {
    let harness = Harness::new(ScriptedInferenceClient::new().with_categories(Vec::<String>::new()));

    let (run, sink) = harness.run().await;

    let errors = sink.events_of_type("error");
    assert_eq!(errors.len(), 1);
    match &errors[0] {
        ProgressEvent::Error { message, .. } => {
            assert!(message.starts_with("No requirement types could be identified"));
        }
        other => panic!("unexpected event: {:?}", other),
    }

    let types = sink.event_types();
    assert_eq!(types.last(), Some(&"end"));
    assert_eq!(types[types.len() - 2], "error");
    assert!(!types.contains(&"complete"));

    // Only the taxonomy call was made
    assert_eq!(harness.client.calls().len(), 1);
    assert!(harness.client.category_sequence().is_empty());
    assert!(matches!(run.state, RunState::Failed { .. }));
    assert!(harness.store.all().is_empty());
}

#[tokio::test]
async fn test_transient_failures_are_retried_then_kept() {
    let client = ScriptedInferenceClient::new()
        .with_categories(["Financial", "Experience", "Personnel"])
        .with_category("Financial", vec![candidates("Financial", &["Turnover"])])
        .with_category(
            "Experience",
            vec![
                rate_limited(),
                rate_limited(),
                candidates("Experience", &["Similar projects", "References"]),
            ],
        )
        .with_category("Personnel", vec![candidates("Personnel", &["Project manager"])]);
    let harness = Harness::new(client);

    let (run, sink) = harness.run().await;

    let retries = sink.events_of_type("retry");
    assert_eq!(retries.len(), 2);
    for (event, expected_attempt) in retries.iter().zip([2, 3]) {
        match event {
            ProgressEvent::Retry {
                current_type,
                attempt,
                max_attempts,
                wait_time,
                ..
            } => {
                assert_eq!(current_type, "Experience");
                assert_eq!(*attempt, expected_attempt);
                assert_eq!(*max_attempts, 3);
                assert!(*wait_time >= 3.0);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    assert_eq!(
        harness.client.category_sequence(),
        vec!["Financial", "Experience", "Experience", "Experience", "Personnel"]
    );

    assert_eq!(run.state, RunState::Completed);
    let titles: Vec<_> = run.requirements.iter().map(|r| r.title.as_str()).collect();
    assert_eq!(
        titles,
        vec!["Turnover", "Similar projects", "References", "Project manager"]
    );
    assert!(run.skipped_categories.is_empty());
}

#[tokio::test]
async fn test_aggregate_is_union_with_stamped_metadata() {
    let client = ScriptedInferenceClient::new()
        .with_categories(["Financial", "Insurance"])
        .with_category("Financial", vec![candidates("Financial", &["Turnover", "Bank guarantee"])])
        .with_category("Insurance", vec![candidates("Insurance", &["PI cover"])]);
    let harness = Harness::new(client);

    let (run, sink) = harness.run().await;

    let requirements = completed_data(&sink);
    assert_eq!(requirements, run.requirements);
    assert_eq!(requirements, harness.store.all());
    assert_eq!(requirements.len(), 3);

    let ids: HashSet<_> = requirements.iter().map(|r| r.id).collect();
    assert_eq!(ids.len(), 3);

    let created_at = requirements[0].created_at;
    for requirement in &requirements {
        assert_eq!(requirement.project_id, "tender-42");
        assert_eq!(requirement.created_at, created_at);
        assert_eq!(requirement.priority, Priority::High);
        assert_eq!(requirement.description, format!("{} details", requirement.title));
        assert_eq!(requirement.ai_metadata.document_ids, request().document_ids());
        assert_eq!(requirement.ai_metadata.generation_method, GENERATION_METHOD);
    }
    assert_eq!(requirements[2].kind, "Insurance");
}

#[tokio::test]
async fn test_failed_categories_are_skipped() {
    let client = ScriptedInferenceClient::new()
        .with_categories(["Financial", "Legal", "Quality", "Safety"])
        .with_category("Financial", vec![rate_limited(), rate_limited(), rate_limited()])
        .with_category("Legal", vec![candidates("Legal", &["Registration"])])
        .with_category(
            "Quality",
            vec![Err(InferenceError::fatal(FatalKind::MalformedResponse, "not json"))],
        )
        .with_category("Safety", vec![candidates("Safety", &["Safety plan"])]);
    let harness = Harness::new(client);

    let (run, sink) = harness.run().await;

    assert_eq!(run.state, RunState::Completed);
    assert_eq!(run.processed_categories, 4);
    assert_eq!(run.skipped_categories, vec!["Financial", "Quality"]);

    let kinds: Vec<_> = run.requirements.iter().map(|r| r.kind.as_str()).collect();
    assert_eq!(kinds, vec!["Legal", "Safety"]);

    // N categories, each attempted at most three times, in taxonomy order
    assert_eq!(harness.client.category_calls("Financial"), 3);
    assert_eq!(harness.client.category_calls("Legal"), 1);
    assert_eq!(harness.client.category_calls("Quality"), 1);
    assert_eq!(harness.client.category_calls("Safety"), 1);
    let mut order = harness.client.category_sequence();
    order.dedup();
    assert_eq!(order, vec!["Financial", "Legal", "Quality", "Safety"]);

    let types = sink.event_types();
    assert_eq!(types.iter().filter(|t| **t == "complete").count(), 1);
    assert!(!types.contains(&"error"));
}

#[tokio::test]
async fn test_event_order_and_monotonic_percent() {
    let client = ScriptedInferenceClient::new()
        .with_categories(["Financial", "Experience", "Personnel"])
        .with_category("Experience", vec![rate_limited(), candidates("Experience", &["Refs"])]);
    let harness = Harness::new(client);

    let (_run, sink) = harness.run().await;
    let types = sink.event_types();

    assert_eq!(types.first(), Some(&"start"));
    assert_eq!(types.last(), Some(&"end"));
    assert_eq!(types.iter().filter(|t| **t == "end").count(), 1);
    assert_eq!(types[types.len() - 2], "complete");

    let percents: Vec<u8> = sink.events().iter().filter_map(|e| e.percent()).collect();
    assert!(percents.windows(2).all(|w| w[0] <= w[1]), "{:?}", percents);
    assert!(percents.contains(&20));
    assert!(percents.contains(&90));
    assert!(percents.contains(&95));
    assert_eq!(percents.last(), Some(&100));
}

#[tokio::test]
async fn test_calls_are_spaced_by_rate_interval() {
    let client = ScriptedInferenceClient::new()
        .with_categories(["Financial", "Experience", "Personnel"])
        .with_category("Experience", vec![rate_limited(), candidates("Experience", &["Refs"])]);
    let harness = Harness::new(client);

    harness.run().await;

    let times: Vec<Duration> = harness
        .client
        .calls()
        .iter()
        .map(|c| c.at.expect("clock attached"))
        .collect();
    assert_eq!(times.len(), 5);
    assert!(times.windows(2).all(|w| w[1] - w[0] >= Duration::from_secs(2)));

    // Governor waits before each category, one backoff sleep, nothing after the last call
    let sleeps = harness.clock.sleeps();
    assert_eq!(
        sleeps,
        vec![
            Duration::from_secs(2),
            Duration::from_secs(2),
            Duration::from_secs(3),
            Duration::from_secs(2),
        ]
    );
}

#[tokio::test]
async fn test_candidate_type_is_forced_to_category() {
    let client = ScriptedInferenceClient::new()
        .with_categories(["Personnel"])
        .with_category(
            "Personnel",
            vec![Ok(json!({"requirements": [
                {"type": "Experience", "title": "Lead engineer CV", "priority": "urgent", "description": "10 years"},
                {"type": "Personnel", "title": "  ", "priority": "Low", "description": "blank title"}
            ]}))],
        );
    let harness = Harness::new(client);

    let (run, _sink) = harness.run().await;

    assert_eq!(run.requirements.len(), 1);
    assert_eq!(run.requirements[0].kind, "Personnel");
    assert_eq!(run.requirements[0].priority, Priority::Medium);
}

/// Requirement store whose writes always fail
struct BrokenStore;

#[async_trait]
impl RequirementStore for BrokenStore {
    async fn save_all(&self, _requirements: &[Requirement]) -> Result<(), StoreError> {
        Err(StoreError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            "disk full",
        )))
    }

    async fn list(&self, _project_id: &str) -> Result<Vec<Requirement>, StoreError> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn test_persistence_failure_is_reported() {
    let client = Arc::new(
        ScriptedInferenceClient::new()
            .with_categories(["Financial"])
            .with_category("Financial", vec![candidates("Financial", &["Turnover"])]),
    );
    let orchestrator = Orchestrator::new(
        client,
        Arc::new(PlainTextExtractor::new()),
        Arc::new(BrokenStore),
        PipelineSettings::default(),
    )
    .with_clock(Arc::new(ManualClock::new()));
    let sink = CollectingSink::new();

    let run = orchestrator
        .run(&request(), documents(), &sink, &CancelToken::new())
        .await;

    match &run.state {
        RunState::Failed { error } => assert!(error.contains("disk full")),
        other => panic!("unexpected state: {:?}", other),
    }
    let types = sink.event_types();
    assert!(!types.contains(&"complete"));
    assert_eq!(&types[types.len() - 2..], &["error", "end"]);
}
