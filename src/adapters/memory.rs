//! In-memory stores.
//!
//! Used by tests and by embedders that keep documents elsewhere.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use super::{DocumentStore, RequirementStore, StoreError};
use crate::domain::{ExtractionRequest, Requirement, SourceDocument, ValidationError};

/// Documents keyed by project, then by document id
#[derive(Default)]
pub struct MemoryDocumentStore {
    projects: RwLock<HashMap<String, Vec<SourceDocument>>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a document to a project (builder style)
    pub fn with_document(self, project_id: &str, document: SourceDocument) -> Self {
        self.insert(project_id, document);
        self
    }

    pub fn insert(&self, project_id: &str, document: SourceDocument) {
        let mut projects = self.projects.write().unwrap_or_else(|e| e.into_inner());
        projects
            .entry(project_id.to_string())
            .or_default()
            .push(document);
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn resolve(&self, request: &ExtractionRequest) -> Result<Vec<SourceDocument>, StoreError> {
        let projects = self.projects.read().unwrap_or_else(|e| e.into_inner());
        let documents = projects
            .get(request.project_id())
            .ok_or_else(|| ValidationError::UnknownProject(request.project_id().to_string()))?;

        request
            .document_ids()
            .iter()
            .map(|id| {
                documents
                    .iter()
                    .find(|d| &d.id == id)
                    .cloned()
                    .ok_or_else(|| {
                        StoreError::from(ValidationError::UnknownDocument {
                            project_id: request.project_id().to_string(),
                            document_id: id.clone(),
                        })
                    })
            })
            .collect()
    }
}

/// Requirements held in a vector, in insertion order
#[derive(Default)]
pub struct MemoryRequirementStore {
    requirements: RwLock<Vec<Requirement>>,
}

impl MemoryRequirementStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything saved so far, across projects
    pub fn all(&self) -> Vec<Requirement> {
        self.requirements
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl RequirementStore for MemoryRequirementStore {
    async fn save_all(&self, requirements: &[Requirement]) -> Result<(), StoreError> {
        self.requirements
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .extend_from_slice(requirements);
        Ok(())
    }

    async fn list(&self, project_id: &str) -> Result<Vec<Requirement>, StoreError> {
        Ok(self
            .requirements
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|r| r.project_id == project_id)
            .cloned()
            .collect())
    }
}
