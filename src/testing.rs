//! Test doubles for the pipeline: a manual clock, a scripted inference
//! client and a sink that records every event.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::time::Instant;

use crate::adapters::{InferenceClient, InferenceError};
use crate::core::{Clock, ProgressSink};
use crate::domain::ProgressEvent;

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Clock whose sleeps return immediately and advance virtual time
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    offset: Mutex<Duration>,
    sleeps: Mutex<Vec<Duration>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    pub fn advance(&self, by: Duration) {
        *lock(&self.offset) += by;
    }

    /// Virtual time elapsed since creation
    pub fn elapsed(&self) -> Duration {
        *lock(&self.offset)
    }

    /// Every sleep requested so far, in order
    pub fn sleeps(&self) -> Vec<Duration> {
        lock(&self.sleeps).clone()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        lock(&self.sleeps).push(duration);
        self.advance(duration);
        tokio::task::yield_now().await;
    }
}

/// One call seen by the scripted client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    /// `None` for the taxonomy call
    pub category: Option<String>,

    /// Virtual time of the call, when a clock is attached
    pub at: Option<Duration>,
}

/// Inference client answering from a script.
///
/// Category calls are recognised from the `type: "<category>"` line of the
/// prompt. Each category has a queue of responses; once it is drained the
/// client answers with an empty requirement list.
#[derive(Default)]
pub struct ScriptedInferenceClient {
    taxonomy: Mutex<VecDeque<Result<Value, InferenceError>>>,
    categories: Mutex<HashMap<String, VecDeque<Result<Value, InferenceError>>>>,
    calls: Mutex<Vec<RecordedCall>>,
    clock: Option<Arc<ManualClock>>,
}

impl ScriptedInferenceClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a taxonomy response
    pub fn with_taxonomy(self, response: Result<Value, InferenceError>) -> Self {
        lock(&self.taxonomy).push_back(response);
        self
    }

    /// Taxonomy response listing `categories`
    pub fn with_categories<I, S>(self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let labels: Vec<String> = categories.into_iter().map(Into::into).collect();
        self.with_taxonomy(Ok(json!({ "requirement_types": labels })))
    }

    /// Queue responses for one category, consumed in order
    pub fn with_category(
        self,
        category: &str,
        responses: Vec<Result<Value, InferenceError>>,
    ) -> Self {
        lock(&self.categories)
            .entry(category.to_string())
            .or_default()
            .extend(responses);
        self
    }

    /// Record call times against `clock`
    pub fn with_clock(mut self, clock: Arc<ManualClock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        lock(&self.calls).clone()
    }

    /// Categories in the order they were called (retries repeat)
    pub fn category_sequence(&self) -> Vec<String> {
        self.calls().into_iter().filter_map(|c| c.category).collect()
    }

    pub fn category_calls(&self, category: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.category.as_deref() == Some(category))
            .count()
    }
}

/// Pull the category out of a category prompt
fn category_of(prompt: &str) -> Option<String> {
    let start = prompt.find("- type: \"")? + "- type: \"".len();
    let rest = &prompt[start..];
    let end = rest.find('"')?;
    Some(rest[..end].to_string())
}

fn is_taxonomy(schema: &Value) -> bool {
    schema.pointer("/properties/requirement_types").is_some()
}

#[async_trait]
impl InferenceClient for ScriptedInferenceClient {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn extract(&self, prompt: &str, schema: &Value) -> Result<Value, InferenceError> {
        let category = if is_taxonomy(schema) {
            None
        } else {
            category_of(prompt)
        };

        lock(&self.calls).push(RecordedCall {
            category: category.clone(),
            at: self.clock.as_ref().map(|c| c.elapsed()),
        });

        match category {
            None => lock(&self.taxonomy)
                .pop_front()
                .unwrap_or_else(|| Ok(json!({ "requirement_types": [] }))),
            Some(category) => lock(&self.categories)
                .get_mut(&category)
                .and_then(VecDeque::pop_front)
                .unwrap_or_else(|| Ok(json!({ "requirements": [] }))),
        }
    }
}

/// Sink that keeps every event in memory
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        lock(&self.events).clone()
    }

    pub fn event_types(&self) -> Vec<&'static str> {
        lock(&self.events).iter().map(|e| e.event_type()).collect()
    }

    pub fn events_of_type(&self, event_type: &str) -> Vec<ProgressEvent> {
        lock(&self.events)
            .iter()
            .filter(|e| e.event_type() == event_type)
            .cloned()
            .collect()
    }
}

impl ProgressSink for CollectingSink {
    fn emit(&self, event: ProgressEvent) {
        lock(&self.events).push(event);
    }
}
