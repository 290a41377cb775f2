//! Extraction requests and the documents they resolve to.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Request rejected before any streaming starts
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Project id is required")]
    MissingProject,

    #[error("At least one document id is required")]
    NoDocuments,

    #[error("Document '{document_id}' was not found in project '{project_id}'")]
    UnknownDocument {
        project_id: String,
        document_id: String,
    },

    #[error("Project '{0}' was not found")]
    UnknownProject(String),
}

/// An immutable request to extract requirements from a set of documents
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractionRequest {
    project_id: String,
    document_ids: Vec<String>,
}

impl ExtractionRequest {
    /// Build a request, trimming ids and dropping duplicates (first occurrence wins)
    pub fn new<I, S>(project_id: impl Into<String>, document_ids: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let project_id = project_id.into().trim().to_string();
        if project_id.is_empty() {
            return Err(ValidationError::MissingProject);
        }

        let mut ids: Vec<String> = Vec::new();
        for id in document_ids {
            let id = id.into().trim().to_string();
            if !id.is_empty() && !ids.contains(&id) {
                ids.push(id);
            }
        }

        if ids.is_empty() {
            return Err(ValidationError::NoDocuments);
        }

        Ok(Self {
            project_id,
            document_ids: ids,
        })
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn document_ids(&self) -> &[String] {
        &self.document_ids
    }
}

/// A stored document resolved for a request
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub id: String,

    /// Display name (usually the file name)
    pub name: String,

    pub mime_type: String,

    pub bytes: Vec<u8>,
}

impl SourceDocument {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        mime_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }

    /// Convenience constructor for plain text documents
    pub fn text(id: impl Into<String>, name: impl Into<String>, text: &str) -> Self {
        Self::new(id, name, "text/plain", text.as_bytes().to_vec())
    }
}
