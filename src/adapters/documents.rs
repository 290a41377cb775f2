//! Filesystem document store.
//!
//! Layout: `<root>/<project_id>/<document_id>.<ext>`. The file stem is the
//! document id and the extension decides the mime type. Resolving a request
//! is the validation step: every id must exist under the project directory.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

use super::content::mime_for_extension;
use super::{DocumentStore, StoreError};
use crate::domain::{ExtractionRequest, SourceDocument, ValidationError};

/// Document store reading project directories from disk
pub struct FsDocumentStore {
    root: PathBuf,
}

impl FsDocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Find the file whose stem equals `document_id`
    async fn find_document(&self, project_dir: &Path, document_id: &str) -> Result<Option<PathBuf>, StoreError> {
        let mut entries = fs::read_dir(project_dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let path = entry.path();
            if path.file_stem().and_then(|s| s.to_str()) == Some(document_id) {
                return Ok(Some(path));
            }
        }

        Ok(None)
    }
}

/// Ids become path components, so only plain names are accepted
fn is_safe_component(id: &str) -> bool {
    !id.is_empty() && id != "." && id != ".." && !id.contains(['/', '\\'])
}

#[async_trait]
impl DocumentStore for FsDocumentStore {
    async fn resolve(&self, request: &ExtractionRequest) -> Result<Vec<SourceDocument>, StoreError> {
        let project_id = request.project_id();
        let project_dir = self.root.join(project_id);

        if !is_safe_component(project_id) || !project_dir.is_dir() {
            return Err(ValidationError::UnknownProject(project_id.to_string()).into());
        }

        let mut documents = Vec::with_capacity(request.document_ids().len());

        for document_id in request.document_ids() {
            let unknown = || ValidationError::UnknownDocument {
                project_id: project_id.to_string(),
                document_id: document_id.clone(),
            };

            if !is_safe_component(document_id) {
                return Err(unknown().into());
            }

            let path = self
                .find_document(&project_dir, document_id)
                .await?
                .ok_or_else(unknown)?;

            let bytes = fs::read(&path).await?;
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| document_id.clone());
            let extension = path
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or_default();

            documents.push(SourceDocument::new(
                document_id.clone(),
                name,
                mime_for_extension(extension),
                bytes,
            ));
        }

        Ok(documents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, FsDocumentStore) {
        let temp = TempDir::new().unwrap();
        let project = temp.path().join("proj-1");
        std::fs::create_dir_all(&project).unwrap();
        std::fs::write(project.join("notice.txt"), "Tender notice").unwrap();
        std::fs::write(project.join("annex.md"), "# Annex A").unwrap();
        let store = FsDocumentStore::new(temp.path());
        (temp, store)
    }

    #[tokio::test]
    async fn test_resolves_documents_in_request_order() {
        let (_temp, store) = setup();
        let request = ExtractionRequest::new("proj-1", ["annex", "notice"]).unwrap();

        let documents = store.resolve(&request).await.unwrap();

        assert_eq!(documents.len(), 2);
        assert_eq!(documents[0].id, "annex");
        assert_eq!(documents[0].mime_type, "text/markdown");
        assert_eq!(documents[1].name, "notice.txt");
        assert_eq!(documents[1].bytes, b"Tender notice");
    }

    #[tokio::test]
    async fn test_unknown_document_is_a_validation_error() {
        let (_temp, store) = setup();
        let request = ExtractionRequest::new("proj-1", ["notice", "missing"]).unwrap();

        let err = store.resolve(&request).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::Validation(ValidationError::UnknownDocument { ref document_id, .. })
                if document_id == "missing"
        ));
    }

    #[tokio::test]
    async fn test_unknown_project_is_a_validation_error() {
        let (_temp, store) = setup();
        let request = ExtractionRequest::new("other", ["notice"]).unwrap();

        let err = store.resolve(&request).await.unwrap_err();
        assert!(matches!(err, StoreError::Validation(ValidationError::UnknownProject(_))));
    }

    #[tokio::test]
    async fn test_path_traversal_is_rejected() {
        let (_temp, store) = setup();
        let request = ExtractionRequest::new("proj-1", ["../proj-1/notice"]).unwrap();

        let err = store.resolve(&request).await.unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }
}
