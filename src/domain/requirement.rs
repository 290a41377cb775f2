//! Requirement candidates and the stamped records that get persisted.
//!
//! A `RequirementCandidate` is what the model returns for one category.
//! A `Requirement` is the same candidate after the aggregator has given it
//! an identity, a timestamp and provenance metadata.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generation method recorded on every stamped requirement
pub const GENERATION_METHOD: &str = "layered_extraction";

/// Priority assigned by the model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
}

impl Priority {
    pub const ALL: [Priority; 4] = [
        Priority::Critical,
        Priority::High,
        Priority::Medium,
        Priority::Low,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Critical => "Critical",
            Priority::High => "High",
            Priority::Medium => "Medium",
            Priority::Low => "Low",
        }
    }

    /// Parse leniently, falling back to `Medium` for anything unrecognised
    pub fn parse_or_default(value: Option<&str>) -> Self {
        value
            .and_then(|v| v.parse().ok())
            .unwrap_or(Priority::Medium)
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::Medium
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "critical" => Ok(Priority::Critical),
            "high" => Ok(Priority::High),
            "medium" => Ok(Priority::Medium),
            "low" => Ok(Priority::Low),
            other => Err(format!("unknown priority '{}'", other)),
        }
    }
}

/// Review status of a requirement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequirementStatus {
    Pending,
}

impl Default for RequirementStatus {
    fn default() -> Self {
        Self::Pending
    }
}

/// A requirement as produced by one category extraction call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementCandidate {
    /// Category this requirement belongs to
    #[serde(rename = "type")]
    pub kind: String,

    /// Short title (never empty)
    pub title: String,

    pub priority: Priority,

    pub description: String,

    #[serde(default)]
    pub status: RequirementStatus,
}

impl RequirementCandidate {
    pub fn new(
        kind: impl Into<String>,
        title: impl Into<String>,
        priority: Priority,
        description: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            title: title.into(),
            priority,
            description: description.into(),
            status: RequirementStatus::Pending,
        }
    }
}

/// Provenance attached to every stamped requirement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementMetadata {
    pub generated_at: DateTime<Utc>,

    /// The document ids of the request that produced this requirement
    pub document_ids: Vec<String>,

    pub generation_method: String,
}

impl RequirementMetadata {
    pub fn new(generated_at: DateTime<Utc>, document_ids: Vec<String>) -> Self {
        Self {
            generated_at,
            document_ids,
            generation_method: GENERATION_METHOD.to_string(),
        }
    }
}

/// The persisted requirement record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirement {
    pub id: Uuid,

    pub project_id: String,

    #[serde(rename = "type")]
    pub kind: String,

    pub title: String,

    pub description: String,

    pub priority: Priority,

    pub status: RequirementStatus,

    pub created_at: DateTime<Utc>,

    pub ai_metadata: RequirementMetadata,
}

impl Requirement {
    /// Stamp a candidate with a fresh id and the given metadata.
    ///
    /// The candidate's type, title, priority and description are carried
    /// over untouched.
    pub fn stamp(
        candidate: RequirementCandidate,
        project_id: &str,
        created_at: DateTime<Utc>,
        metadata: RequirementMetadata,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            project_id: project_id.to_string(),
            kind: candidate.kind,
            title: candidate.title,
            description: candidate.description,
            priority: candidate.priority,
            status: candidate.status,
            created_at,
            ai_metadata: metadata,
        }
    }
}
