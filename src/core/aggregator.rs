//! Merge per-category results and stamp them for persistence.

use chrono::{DateTime, Utc};

use crate::domain::{ExtractionRequest, Requirement, RequirementCandidate, RequirementMetadata};

/// Collects candidates in the order categories were processed
pub struct Aggregator {
    project_id: String,
    document_ids: Vec<String>,
    candidates: Vec<RequirementCandidate>,
}

impl Aggregator {
    pub fn new(request: &ExtractionRequest) -> Self {
        Self {
            project_id: request.project_id().to_string(),
            document_ids: request.document_ids().to_vec(),
            candidates: Vec::new(),
        }
    }

    pub fn push(&mut self, candidates: Vec<RequirementCandidate>) {
        self.candidates.extend(candidates);
    }

    /// Candidates collected so far
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Stamp every candidate with a fresh id, `now`, and the request's
    /// document ids
    pub fn stamp(self, now: DateTime<Utc>) -> Vec<Requirement> {
        let metadata = RequirementMetadata::new(now, self.document_ids);
        let project_id = self.project_id;

        self.candidates
            .into_iter()
            .map(|candidate| Requirement::stamp(candidate, &project_id, now, metadata.clone()))
            .collect()
    }
}
