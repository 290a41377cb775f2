//! Run state for one extraction request.
//!
//! A `PipelineRun` lives only as long as the request it serves; nothing
//! about it is persisted apart from the final requirements.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::request::ExtractionRequest;
use super::requirement::Requirement;

/// State of a pipeline run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum RunState {
    /// Created, not started
    Idle,

    /// Currently executing
    Running,

    /// Completed successfully (possibly with skipped categories)
    Completed,

    /// Failed with error
    Failed { error: String },
}

impl Default for RunState {
    fn default() -> Self {
        Self::Idle
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid run state transition: {from:?} → {to}")]
pub struct InvalidTransition {
    pub from: RunState,
    pub to: &'static str,
}

/// An in-flight extraction run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub id: Uuid,

    pub project_id: String,

    pub document_ids: Vec<String>,

    pub state: RunState,

    pub started_at: Option<DateTime<Utc>>,

    pub completed_at: Option<DateTime<Utc>>,

    /// Categories in discovery order
    pub categories: Vec<String>,

    /// Categories attempted so far (successful or skipped)
    pub processed_categories: usize,

    /// Categories whose extraction failed and were dropped
    pub skipped_categories: Vec<String>,

    /// Stamped and persisted requirements (set on completion)
    pub requirements: Vec<Requirement>,
}

impl PipelineRun {
    pub fn new(request: &ExtractionRequest) -> Self {
        Self {
            id: Uuid::new_v4(),
            project_id: request.project_id().to_string(),
            document_ids: request.document_ids().to_vec(),
            state: RunState::Idle,
            started_at: None,
            completed_at: None,
            categories: Vec::new(),
            processed_categories: 0,
            skipped_categories: Vec::new(),
            requirements: Vec::new(),
        }
    }

    /// idle → running
    pub fn start(&mut self) -> Result<(), InvalidTransition> {
        if self.state != RunState::Idle {
            return Err(self.invalid("running"));
        }
        self.state = RunState::Running;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// running → completed
    pub fn complete(&mut self, requirements: Vec<Requirement>) -> Result<(), InvalidTransition> {
        if self.state != RunState::Running {
            return Err(self.invalid("completed"));
        }
        self.state = RunState::Completed;
        self.requirements = requirements;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// idle | running → failed
    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), InvalidTransition> {
        if self.is_finished() {
            return Err(self.invalid("failed"));
        }
        self.state = RunState::Failed {
            error: error.into(),
        };
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Record the outcome of one category
    pub fn record_category(&mut self, category: &str, succeeded: bool) {
        self.processed_categories += 1;
        if !succeeded {
            self.skipped_categories.push(category.to_string());
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, RunState::Running)
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.state, RunState::Completed | RunState::Failed { .. })
    }

    fn invalid(&self, to: &'static str) -> InvalidTransition {
        InvalidTransition {
            from: self.state.clone(),
            to,
        }
    }
}
