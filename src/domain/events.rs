//! Progress events narrated by the orchestrator.
//!
//! Events are append-only and ordered by emission time. The wire form is a
//! JSON object tagged by `type`, which is what the streaming endpoint sends
//! as each message.

use serde::{Deserialize, Serialize};

use super::requirement::Requirement;

/// Pipeline stage a progress update belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Reading documents and building the corpus (0-10%)
    Analyzing,

    /// Discovering requirement categories (10-20%)
    Discovering,

    /// Extracting requirements category by category (20-90%)
    Extracting,

    /// Persisting the aggregate (~95%)
    Saving,
}

/// Payload of a `progress` event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub stage: Stage,

    pub message: String,

    /// Percent complete, 0-100
    pub progress: u8,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_types: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_types: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_type: Option<String>,

    /// Requirements extracted for `current_type`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_count: Option<usize>,

    /// Requirements extracted so far across all categories
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_extracted: Option<usize>,
}

impl ProgressUpdate {
    pub fn new(stage: Stage, message: impl Into<String>, progress: u8) -> Self {
        Self {
            stage,
            message: message.into(),
            progress: progress.min(100),
            total_types: None,
            processed_types: None,
            current_type: None,
            extracted_count: None,
            total_extracted: None,
        }
    }

    pub fn with_types(mut self, processed: usize, total: usize) -> Self {
        self.processed_types = Some(processed);
        self.total_types = Some(total);
        self
    }

    pub fn with_current_type(mut self, category: impl Into<String>) -> Self {
        self.current_type = Some(category.into());
        self
    }

    pub fn with_counts(mut self, extracted: usize, total: usize) -> Self {
        self.extracted_count = Some(extracted);
        self.total_extracted = Some(total);
        self
    }
}

/// A single event on the progress stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// The run has started
    Start { message: String },

    /// Logical progress with a percent value
    Progress(ProgressUpdate),

    /// A category call failed transiently and is about to be retried
    Retry {
        message: String,
        current_type: String,
        /// The attempt that is about to run (2 for the first retry)
        attempt: u32,
        max_attempts: u32,
        /// Seconds until the retry
        wait_time: f64,
    },

    /// Keepalive with no logical meaning
    Ping,

    /// The run finished and the result was persisted
    Complete {
        message: String,
        progress: u8,
        total_extracted: usize,
        data: Vec<Requirement>,
    },

    /// The run failed
    Error { message: String, error: String },

    /// Last event of every stream
    End,
}

impl ProgressEvent {
    /// Wire name of the event type
    pub fn event_type(&self) -> &'static str {
        match self {
            ProgressEvent::Start { .. } => "start",
            ProgressEvent::Progress(_) => "progress",
            ProgressEvent::Retry { .. } => "retry",
            ProgressEvent::Ping => "ping",
            ProgressEvent::Complete { .. } => "complete",
            ProgressEvent::Error { .. } => "error",
            ProgressEvent::End => "end",
        }
    }

    /// Percent carried by the event, if any
    pub fn percent(&self) -> Option<u8> {
        match self {
            ProgressEvent::Progress(update) => Some(update.progress),
            ProgressEvent::Complete { progress, .. } => Some(*progress),
            _ => None,
        }
    }

    pub fn is_end(&self) -> bool {
        matches!(self, ProgressEvent::End)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_wire_format() {
        let event = ProgressEvent::Progress(
            ProgressUpdate::new(Stage::Extracting, "Extracting Financial requirements", 43)
                .with_types(1, 3)
                .with_current_type("Financial"),
        );

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "progress");
        assert_eq!(json["stage"], "extracting");
        assert_eq!(json["progress"], 43);
        assert_eq!(json["processed_types"], 1);
        assert_eq!(json["total_types"], 3);
        assert_eq!(json["current_type"], "Financial");
        assert!(json.get("extracted_count").is_none());
    }

    #[test]
    fn test_unit_events_serialize_with_type_only() {
        assert_eq!(
            serde_json::to_string(&ProgressEvent::Ping).unwrap(),
            r#"{"type":"ping"}"#
        );
        assert_eq!(
            serde_json::to_string(&ProgressEvent::End).unwrap(),
            r#"{"type":"end"}"#
        );
    }

    #[test]
    fn test_retry_event_parses_back() {
        let json = r#"{"type":"retry","message":"retrying","current_type":"Legal","attempt":2,"max_attempts":3,"wait_time":3.0}"#;
        let event: ProgressEvent = serde_json::from_str(json).unwrap();

        assert_eq!(event.event_type(), "retry");
        assert_eq!(event.percent(), None);
    }

    #[test]
    fn test_progress_is_clamped() {
        let update = ProgressUpdate::new(Stage::Saving, "saving", 140);
        assert_eq!(update.progress, 100);
    }
}
